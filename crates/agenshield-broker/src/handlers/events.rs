//! `events_batch`: append-only events forwarded upstream to the daemon.

use super::{parse_params, Deps, Reply};
use agenshield_core::error::ShieldError;
use agenshield_core::protocol::ShieldEvent;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct EventsParams {
    events: Vec<ShieldEvent>,
}

pub fn handle(params: &Value, deps: &Deps) -> Result<Reply, ShieldError> {
    let p: EventsParams = parse_params(params)?;
    let forwarded = match deps.daemon {
        Some(ref daemon) if !p.events.is_empty() => daemon.push_events(&p.events),
        _ => 0,
    };
    Ok(Reply::with_metadata(
        json!({ "received": p.events.len(), "forwarded": forwarded }),
        json!({ "count": p.events.len() }),
    ))
}
