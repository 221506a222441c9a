//! `exec`: run a command for the agent.
//!
//! Dispatch already policy-checked the joined command line. Here the
//! optional command allowlist applies a second, stricter filter, matched
//! secrets are merged into the child environment, and the child runs under
//! the deadline supervisor (SIGTERM, then SIGKILL; exit 124 on timeout).
//! The audit record names injected secrets - never their values.

use super::{parse_params, Deps, Reply};
use agenshield_core::error::ShieldError;
use agenshield_sandbox::spawn::{harden, run_with_deadline};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ExecParams {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    stdin: Option<String>,
}

pub fn handle(params: &Value, deps: &Deps) -> Result<Reply, ShieldError> {
    let p: ExecParams = parse_params(params)?;
    if p.command.trim().is_empty() {
        return Err(ShieldError::validation("Command must not be empty"));
    }

    let command_line = if p.args.is_empty() {
        p.command.clone()
    } else {
        format!("{} {}", p.command, p.args.join(" "))
    };

    // Second filter: the on-disk allowlist, when configured.
    if let Some(ref allowlist) = deps.allowlist {
        allowlist.check(&command_line)?;
    }

    let secrets = deps.secrets.resolve_for_exec(&p.command, &p.args);
    let secret_names: Vec<&String> = secrets.keys().collect();

    let mut cmd = Command::new(&p.command);
    cmd.args(&p.args);
    if let Some(ref cwd) = p.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &p.env {
        cmd.env(k, v);
    }
    for (k, v) in &secrets {
        cmd.env(k, v);
    }
    harden(&mut cmd);

    let timeout = Duration::from_secs(p.timeout.unwrap_or(deps.config.op_timeout_secs));
    let outcome = run_with_deadline(cmd, p.stdin.as_deref().map(|s| s.as_bytes()), timeout)
        .map_err(|e| ShieldError::internal(format!("exec failed: {:#}", e)))?;

    let metadata = json!({
        "injectedSecrets": secret_names,
        "timedOut": outcome.timed_out,
        "exitCode": outcome.exit_code,
    });
    Ok(Reply::with_metadata(
        json!({
            "exitCode": outcome.exit_code,
            "stdout": outcome.stdout,
            "stderr": outcome.stderr,
            "signal": outcome.signal,
        }),
        metadata,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::secrets::SecretResolver;
    use agenshield_core::config::BrokerConfig;
    use agenshield_core::protocol::SecretsSyncPayload;
    use agenshield_policy::PolicyEngine;
    use chrono::Utc;
    use std::sync::Arc;

    fn deps(tmp: &tempfile::TempDir) -> Deps {
        let mut config = BrokerConfig::from_env();
        config.op_timeout_secs = 5;
        Deps {
            config,
            engine: Arc::new(PolicyEngine::new(vec![], true)),
            audit: Arc::new(AuditLog::new(tmp.path().join("audit.log"))),
            secrets: Arc::new(SecretResolver::new()),
            allowlist: None,
            daemon: None,
        }
    }

    #[test]
    fn runs_and_captures_output() {
        let tmp = tempfile::tempdir().unwrap();
        let reply = handle(
            &json!({ "command": "echo", "args": ["hello"] }),
            &deps(&tmp),
        )
        .unwrap();
        assert_eq!(reply.data["exitCode"], 0);
        assert_eq!(reply.data["stdout"].as_str().unwrap().trim(), "hello");
    }

    #[test]
    fn timeout_yields_124() {
        let tmp = tempfile::tempdir().unwrap();
        let reply = handle(
            &json!({ "command": "sleep", "args": ["30"], "timeout": 1 }),
            &deps(&tmp),
        )
        .unwrap();
        assert_eq!(reply.data["exitCode"], 124);
        assert_eq!(reply.data["signal"], "SIGKILL");
    }

    #[test]
    fn secrets_reach_child_env_but_audit_gets_names_only() {
        let tmp = tempfile::tempdir().unwrap();
        let d = deps(&tmp);
        d.secrets.replace(SecretsSyncPayload {
            version: 1,
            synced_at: Utc::now(),
            global_secrets: [("EXEC_SECRET".to_string(), "super-value".to_string())].into(),
            policy_bindings: vec![],
        });
        let reply = handle(
            &json!({ "command": "sh", "args": ["-c", "printf %s \"$EXEC_SECRET\""] }),
            &d,
        )
        .unwrap();
        assert_eq!(reply.data["stdout"], "super-value");
        let meta = reply.metadata.unwrap();
        assert_eq!(meta["injectedSecrets"][0], "EXEC_SECRET");
        assert!(!meta.to_string().contains("super-value"));
    }

    #[test]
    fn allowlist_second_filter_applies() {
        let tmp = tempfile::tempdir().unwrap();
        let list_path = tmp.path().join("allowlist");
        std::fs::write(&list_path, "echo\n").unwrap();
        let mut d = deps(&tmp);
        d.allowlist = crate::allowlist::CommandAllowlist::load(&list_path);

        assert!(handle(&json!({ "command": "echo", "args": ["hi"] }), &d).is_ok());
        let denied = handle(&json!({ "command": "rm", "args": ["-rf", "/"] }), &d);
        assert!(matches!(denied, Err(ShieldError::PolicyDenied { .. })));
    }

    #[test]
    fn empty_command_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            handle(&json!({ "command": "  " }), &deps(&tmp)),
            Err(ShieldError::Validation(_))
        ));
    }
}
