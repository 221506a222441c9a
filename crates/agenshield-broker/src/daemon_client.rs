//! Upstream channel to the daemon.
//!
//! Two uses: forwarding a denied policy check for a user-rule second chance
//! (at most one forward per request, short timeout), and pushing event
//! batches for the UI stream. Daemon unavailability is never an error the
//! client sees - it collapses to the broker's own decision.

use agenshield_core::protocol::{OperationKind, ShieldEvent};
use serde_json::json;
use std::time::Duration;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(2);

pub struct DaemonClient {
    base_url: String,
    agent: ureq::Agent,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(FORWARD_TIMEOUT)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    /// Ask the daemon to re-evaluate a denied check against user rules.
    /// `Some(true)` overrides the denial; `None` means the daemon could not
    /// be reached or gave no usable answer.
    pub fn forward_policy_check(&self, op: OperationKind, target: &str) -> Option<bool> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "policy_check",
            "params": { "operation": op.method(), "target": target },
        });
        let response = self
            .agent
            .post(&format!("{}/rpc", self.base_url))
            .send_json(body);
        match response {
            Ok(resp) => {
                let value: serde_json::Value = resp.into_json().ok()?;
                let allowed = value.get("result")?.get("allowed")?.as_bool()?;
                tracing::debug!(target = %target, allowed, "daemon second-chance answer");
                Some(allowed)
            }
            Err(e) => {
                tracing::debug!(error = %e, "daemon forward unavailable");
                None
            }
        }
    }

    /// Push a batch of events upstream. Best-effort; returns how many were
    /// accepted.
    pub fn push_events(&self, events: &[ShieldEvent]) -> usize {
        let response = self
            .agent
            .post(&format!("{}/api/events", self.base_url))
            .send_json(json!({ "events": events }));
        match response {
            Ok(_) => events.len(),
            Err(e) => {
                tracing::debug!(error = %e, "event push to daemon failed");
                0
            }
        }
    }
}
