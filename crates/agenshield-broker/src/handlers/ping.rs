//! `ping`: liveness echo.

use super::Reply;
use agenshield_core::error::ShieldError;
use chrono::Utc;
use serde_json::{json, Value};

pub fn handle(params: &Value) -> Result<Reply, ShieldError> {
    let echo = params.get("echo").cloned().unwrap_or(Value::Null);
    Ok(Reply::new(json!({
        "pong": true,
        "echo": echo,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })))
}
