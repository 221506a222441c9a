//! `secret_inject`: return a plaintext secret to a socket peer.
//!
//! Socket-only - HTTP callers get error 1008 no matter what the resolver
//! holds. Rejection is otherwise opaque: name unknown, no bundle pushed,
//! or empty bundle all read as "Secret not found".

use super::{parse_params, Deps, Reply};
use agenshield_core::error::ShieldError;
use agenshield_core::protocol::Channel;
use crate::context::HandlerContext;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct SecretParams {
    name: String,
}

pub fn handle(params: &Value, ctx: &HandlerContext, deps: &Deps) -> Result<Reply, ShieldError> {
    if ctx.channel == Channel::Http {
        return Err(ShieldError::ChannelRefused(
            "Secret injection is not available over HTTP".to_string(),
        ));
    }
    let p: SecretParams = parse_params(params)?;
    let value = deps
        .secrets
        .global_secret(&p.name)
        .ok_or_else(|| ShieldError::NotFound("Secret".to_string()))?;
    Ok(Reply::with_metadata(
        json!({ "value": value, "injected": true }),
        json!({ "secret": p.name }),
    ))
}
