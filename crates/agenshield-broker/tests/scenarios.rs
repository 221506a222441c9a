//! End-to-end decision scenarios through the full dispatch pipeline,
//! exercised over both transports.

use agenshield_broker::audit::AuditLog;
use agenshield_broker::context::HandlerContext;
use agenshield_broker::handlers::{dispatch, Deps};
use agenshield_broker::secrets::SecretResolver;
use agenshield_core::config::BrokerConfig;
use agenshield_core::protocol::{RpcRequest, SecretsSyncPayload};
use agenshield_policy::{Policy, PolicyAction, PolicyEngine, PolicyTarget};
use serde_json::{json, Value};
use std::sync::Arc;

struct Harness {
    _tmp: tempfile::TempDir,
    deps: Deps,
}

impl Harness {
    fn new(policies: Vec<Policy>) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let deps = Deps {
            config: BrokerConfig::from_env(),
            engine: Arc::new(PolicyEngine::new(policies, true)),
            audit: Arc::new(AuditLog::new(tmp.path().join("audit.log"))),
            secrets: Arc::new(SecretResolver::new()),
            allowlist: None,
            daemon: None,
        };
        Self { _tmp: tmp, deps }
    }

    fn check(&self, operation: &str, target: &str) -> Value {
        let request = RpcRequest {
            jsonrpc: "2.0".into(),
            id: json!(1),
            method: "policy_check".into(),
            params: json!({ "operation": operation, "target": target }),
        };
        let response = dispatch(&request, &HandlerContext::socket(None, None, None), &self.deps);
        assert!(response.error.is_none(), "policy_check must not error");
        response.result.unwrap()
    }
}

fn policy(
    name: &str,
    action: PolicyAction,
    target: PolicyTarget,
    patterns: &[&str],
    priority: i64,
) -> Policy {
    let mut p = Policy::new(
        name,
        action,
        target,
        patterns.iter().map(|s| s.to_string()).collect(),
    );
    p.priority = priority;
    p
}

// Scenario 1: no policies → default allow.
#[test]
fn default_allow() {
    let h = Harness::new(vec![]);
    assert_eq!(h.check("exec", "ls")["allowed"], true);
}

// Scenario 2: deny-all plus a higher-priority allow for git.
#[test]
fn deny_all_with_allow_specific_priority() {
    let h = Harness::new(vec![
        policy("Block All", PolicyAction::Deny, PolicyTarget::Command, &["*"], 0),
        policy("Allow git", PolicyAction::Allow, PolicyTarget::Command, &["git:*"], 10),
    ]);
    assert_eq!(h.check("exec", "git push origin main")["allowed"], true);
    // No space after `git`, so the allow does not apply.
    assert_eq!(h.check("exec", "git-lfs")["allowed"], false);
}

// Scenario 3: URL pattern with trailing wildcard.
#[test]
fn url_pattern_with_trailing_wildcard() {
    let h = Harness::new(vec![policy(
        "Block api",
        PolicyAction::Deny,
        PolicyTarget::Url,
        &["api.example.com/*"],
        0,
    )]);
    assert_eq!(
        h.check("http_request", "https://api.example.com/v1/users")["allowed"],
        false
    );
    assert_eq!(h.check("http_request", "https://other.com/x")["allowed"], true);
}

// Scenario 4: absolute-path command patterns normalise to basenames, and
// `:*` requires arguments.
#[test]
fn absolute_path_normalization() {
    let h = Harness::new(vec![policy(
        "Block curl",
        PolicyAction::Deny,
        PolicyTarget::Command,
        &["/usr/bin/curl:*"],
        0,
    )]);
    assert_eq!(h.check("exec", "curl https://evil.com")["allowed"], false);
    assert_eq!(h.check("exec", "/usr/bin/curl")["allowed"], true);
}

// Scenario 5: disabled policies evaluate as absent.
#[test]
fn disabled_policy_is_inert() {
    let mut p = policy("Block rm", PolicyAction::Deny, PolicyTarget::Command, &["rm"], 0);
    p.enabled = false;
    let h = Harness::new(vec![p]);
    assert_eq!(h.check("exec", "rm")["allowed"], true);
}

// Scenario 6: secret injection is socket-only.
#[test]
fn secret_injection_is_socket_only() {
    let h = Harness::new(vec![]);
    h.deps.secrets.replace(SecretsSyncPayload {
        version: 1,
        synced_at: chrono::Utc::now(),
        global_secrets: [("X".to_string(), "v".to_string())].into(),
        policy_bindings: vec![],
    });
    let request = RpcRequest {
        jsonrpc: "2.0".into(),
        id: json!(1),
        method: "secret_inject".into(),
        params: json!({ "name": "X" }),
    };

    let over_http = dispatch(&request, &HandlerContext::http(), &h.deps);
    assert_eq!(over_http.error.unwrap().code, 1008);

    let over_socket = dispatch(
        &request,
        &HandlerContext::socket(Some(501), None, None),
        &h.deps,
    );
    let result = over_socket.result.unwrap();
    assert_eq!(result["value"], "v");
    assert_eq!(result["injected"], true);
}

// Audit property: no secret value ever appears in the audit trail.
#[test]
fn audit_never_contains_secret_values() {
    let tmp = tempfile::tempdir().unwrap();
    let audit_path = tmp.path().join("audit.log");
    let deps = Deps {
        config: {
            let mut c = BrokerConfig::from_env();
            c.op_timeout_secs = 5;
            c
        },
        engine: Arc::new(PolicyEngine::new(vec![], true)),
        audit: Arc::new(AuditLog::new(&audit_path)),
        secrets: Arc::new(SecretResolver::new()),
        allowlist: None,
        daemon: None,
    };
    deps.secrets.replace(SecretsSyncPayload {
        version: 1,
        synced_at: chrono::Utc::now(),
        global_secrets: [("LEAKY".to_string(), "swordfish-9000".to_string())].into(),
        policy_bindings: vec![],
    });

    let request = RpcRequest {
        jsonrpc: "2.0".into(),
        id: json!(1),
        method: "exec".into(),
        params: json!({ "command": "true", "args": [] }),
    };
    let response = dispatch(&request, &HandlerContext::socket(None, None, None), &deps);
    assert!(response.error.is_none());

    let audit = std::fs::read_to_string(&audit_path).unwrap();
    assert!(audit.contains("LEAKY"));
    assert!(!audit.contains("swordfish-9000"));
}
