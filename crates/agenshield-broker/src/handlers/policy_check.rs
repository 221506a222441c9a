//! `policy_check`: side-effect-free evaluation for UIs and pre-checks.

use super::{parse_params, Deps, Reply};
use agenshield_core::error::ShieldError;
use agenshield_core::protocol::OperationKind;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct CheckParams {
    operation: String,
    target: String,
}

pub fn handle(params: &Value, deps: &Deps) -> Result<Reply, ShieldError> {
    let p: CheckParams = parse_params(params)?;
    let op = OperationKind::from_method(&p.operation)
        .ok_or_else(|| ShieldError::validation(format!("Unknown operation: {}", p.operation)))?;
    let decision = deps.engine.evaluate(op, &p.target);
    Ok(Reply::new(json!({
        "allowed": decision.allowed,
        "policyId": decision.policy_id,
        "policyName": decision.policy_name,
        "requiresApproval": decision.requires_approval,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::secrets::SecretResolver;
    use agenshield_core::config::BrokerConfig;
    use agenshield_policy::{Policy, PolicyAction, PolicyEngine, PolicyTarget};
    use std::sync::Arc;

    fn deps_with(policies: Vec<Policy>) -> (tempfile::TempDir, Deps) {
        let tmp = tempfile::tempdir().unwrap();
        let deps = Deps {
            config: BrokerConfig::from_env(),
            engine: Arc::new(PolicyEngine::new(policies, true)),
            audit: Arc::new(AuditLog::new(tmp.path().join("audit.log"))),
            secrets: Arc::new(SecretResolver::new()),
            allowlist: None,
            daemon: None,
        };
        (tmp, deps)
    }

    #[test]
    fn default_allow() {
        let (_tmp, deps) = deps_with(vec![]);
        let reply = handle(&json!({ "operation": "exec", "target": "ls" }), &deps).unwrap();
        assert_eq!(reply.data["allowed"], true);
        assert_eq!(reply.data["policyId"], Value::Null);
    }

    #[test]
    fn deny_reports_policy_id() {
        let p = Policy::new(
            "Block curl",
            PolicyAction::Deny,
            PolicyTarget::Command,
            vec!["curl:*".into()],
        );
        let id = p.id.clone();
        let (_tmp, deps) = deps_with(vec![p]);
        let reply = handle(
            &json!({ "operation": "exec", "target": "curl https://x" }),
            &deps,
        )
        .unwrap();
        assert_eq!(reply.data["allowed"], false);
        assert_eq!(reply.data["policyId"], id);
    }

    #[test]
    fn unknown_operation_is_validation_error() {
        let (_tmp, deps) = deps_with(vec![]);
        assert!(matches!(
            handle(&json!({ "operation": "fly", "target": "moon" }), &deps),
            Err(ShieldError::Validation(_))
        ));
    }
}
