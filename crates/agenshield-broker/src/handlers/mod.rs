//! Operation handlers and the dispatch pipeline.
//!
//! Dispatch is uniform: resolve the method, extract and normalise the
//! policy target, evaluate policy (with at most one second-chance forward
//! to the daemon on denial), run the handler, and write exactly one audit
//! record for the decision.

mod events;
mod exec;
mod files;
mod http_request;
mod open_url;
mod ping;
mod policy_check;
mod secret;
mod skill;

use crate::allowlist::CommandAllowlist;
use crate::audit::AuditLog;
use crate::context::HandlerContext;
use crate::daemon_client::DaemonClient;
use crate::secrets::SecretResolver;
use agenshield_core::config::BrokerConfig;
use agenshield_core::error::{ShieldError, RPC_METHOD_NOT_FOUND};
use agenshield_core::protocol::{
    AuditEntry, AuditResult, OperationKind, RpcRequest, RpcResponse, ShieldEvent,
};
use agenshield_policy::PolicyEngine;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Everything a handler may need. One instance per broker process.
pub struct Deps {
    pub config: BrokerConfig,
    pub engine: Arc<PolicyEngine>,
    pub audit: Arc<AuditLog>,
    pub secrets: Arc<SecretResolver>,
    pub allowlist: Option<CommandAllowlist>,
    pub daemon: Option<DaemonClient>,
}

/// Handler result: response data plus optional audit metadata.
pub struct Reply {
    pub data: Value,
    pub metadata: Option<Value>,
}

impl Reply {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            metadata: None,
        }
    }

    pub fn with_metadata(data: Value, metadata: Value) -> Self {
        Self {
            data,
            metadata: Some(metadata),
        }
    }
}

/// Typed parameter extraction; malformed params are a `ValidationError`.
pub(crate) fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ShieldError> {
    serde_json::from_value(params.clone())
        .map_err(|e| ShieldError::validation(format!("Invalid params: {}", e)))
}

/// The normalised policy target of a request, or `None` for control-plane
/// operations that are not policy-scoped.
fn extract_target(op: OperationKind, params: &Value) -> Result<Option<String>, ShieldError> {
    let str_field = |key: &str| -> Result<String, ShieldError> {
        params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ShieldError::validation(format!("Missing required field: {}", key)))
    };
    Ok(match op {
        OperationKind::HttpRequest | OperationKind::OpenUrl => Some(str_field("url")?),
        OperationKind::FileRead | OperationKind::FileWrite | OperationKind::FileList => {
            Some(str_field("path")?)
        }
        OperationKind::Exec => {
            let command = str_field("command")?;
            let args: Vec<String> = params
                .get("args")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            Some(if args.is_empty() {
                command
            } else {
                format!("{} {}", command, args.join(" "))
            })
        }
        OperationKind::SkillInstall | OperationKind::SkillUninstall => Some(str_field("slug")?),
        _ => None,
    })
}

/// Process one JSON-RPC request end to end.
pub fn dispatch(request: &RpcRequest, ctx: &HandlerContext, deps: &Deps) -> RpcResponse {
    let Some(op) = OperationKind::from_method(&request.method) else {
        return RpcResponse::failure(
            request.id.clone(),
            RPC_METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        );
    };

    let started = Instant::now();
    let mut entry = AuditEntry::new(op, ctx.channel, String::new());
    entry.client_uid = ctx.uid;

    // Target extraction doubles as the shared validation step.
    let target = match extract_target(op, &request.params) {
        Ok(t) => t,
        Err(e) => {
            entry.result = AuditResult::Error;
            entry.error_message = Some(e.to_string());
            entry.duration_ms = started.elapsed().as_millis() as u64;
            deps.audit.append(&entry);
            return RpcResponse::failure(request.id.clone(), e.code(), e.to_string());
        }
    };

    // Policy gate with a single second-chance forward on denial.
    if let Some(ref target) = target {
        entry.target = target.clone();
        let decision = deps.engine.evaluate(op, target);
        entry.policy_id = decision.policy_id.clone();
        let mut allowed = decision.allowed;

        if decision.requires_approval {
            emit_event(
                deps,
                ShieldEvent::new(
                    "approval:requested",
                    json!({
                        "operation": op.method(),
                        "target": target,
                        "policyId": decision.policy_id,
                    }),
                ),
            );
        }

        if !allowed {
            if let Some(ref daemon) = deps.daemon {
                if daemon.forward_policy_check(op, target) == Some(true) {
                    tracing::info!(target = %target, "daemon overrode broker denial");
                    allowed = true;
                }
            }
        }

        if !allowed {
            let err = ShieldError::PolicyDenied {
                policy_id: decision.policy_id,
                target: target.clone(),
            };
            entry.allowed = false;
            entry.result = AuditResult::Denied;
            entry.error_message = Some(err.to_string());
            entry.duration_ms = started.elapsed().as_millis() as u64;
            deps.audit.append(&entry);
            return RpcResponse::failure(request.id.clone(), err.code(), err.to_string());
        }
        entry.allowed = true;
    } else {
        entry.target = request.method.clone();
        entry.allowed = true;
    }

    let outcome = run_handler(op, &request.params, ctx, deps);
    entry.duration_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(reply) => {
            entry.result = AuditResult::Success;
            entry.metadata = reply.metadata.clone();
            deps.audit.append(&entry);
            RpcResponse::success(request.id.clone(), reply.data)
        }
        Err(e) => {
            entry.result = AuditResult::Error;
            entry.error_message = Some(e.to_string());
            deps.audit.append(&entry);
            RpcResponse::failure(request.id.clone(), e.code(), e.to_string())
        }
    }
}

fn run_handler(
    op: OperationKind,
    params: &Value,
    ctx: &HandlerContext,
    deps: &Deps,
) -> Result<Reply, ShieldError> {
    match op {
        OperationKind::HttpRequest => http_request::handle(params, deps),
        OperationKind::FileRead => files::handle_read(params),
        OperationKind::FileWrite => files::handle_write(params),
        OperationKind::FileList => files::handle_list(params),
        OperationKind::Exec => exec::handle(params, deps),
        OperationKind::OpenUrl => open_url::handle(params),
        OperationKind::SecretInject => secret::handle(params, ctx, deps),
        OperationKind::SkillInstall => skill::handle_install(params, deps),
        OperationKind::SkillUninstall => skill::handle_uninstall(params, deps),
        OperationKind::PolicyCheck => policy_check::handle(params, deps),
        OperationKind::EventsBatch => events::handle(params, deps),
        OperationKind::SecretsSync => {
            let payload = parse_params(params)?;
            deps.secrets.replace(payload);
            let version = deps.secrets.version();
            Ok(Reply::new(json!({ "applied": true, "version": version })))
        }
        OperationKind::Ping => ping::handle(params),
    }
}

/// Best-effort event push to the daemon stream.
pub(crate) fn emit_event(deps: &Deps, event: ShieldEvent) {
    if let Some(ref daemon) = deps.daemon {
        daemon.push_events(std::slice::from_ref(&event));
    }
}
