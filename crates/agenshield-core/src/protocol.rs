//! Wire types shared by the broker, daemon, and wrapper binaries.
//!
//! These are the "currency" of the system: JSON-RPC 2.0 envelopes, the
//! operation vocabulary, audit records, daemon events, and the secret
//! binding bundle pushed from daemon to broker. They intentionally carry
//! only what a remote peer needs, never process internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Maximum JSON-RPC request size (10 MB) to prevent OOM DoS.
pub const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

// ─── JSON-RPC envelopes ──────────────────────────────────────────────────────

/// Incoming JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Outgoing JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Every operation the broker mediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    HttpRequest,
    FileRead,
    FileWrite,
    FileList,
    Exec,
    OpenUrl,
    SecretInject,
    SkillInstall,
    SkillUninstall,
    PolicyCheck,
    EventsBatch,
    SecretsSync,
    Ping,
}

impl OperationKind {
    /// JSON-RPC method name for this operation.
    pub fn method(&self) -> &'static str {
        match self {
            OperationKind::HttpRequest => "http_request",
            OperationKind::FileRead => "file_read",
            OperationKind::FileWrite => "file_write",
            OperationKind::FileList => "file_list",
            OperationKind::Exec => "exec",
            OperationKind::OpenUrl => "open_url",
            OperationKind::SecretInject => "secret_inject",
            OperationKind::SkillInstall => "skill_install",
            OperationKind::SkillUninstall => "skill_uninstall",
            OperationKind::PolicyCheck => "policy_check",
            OperationKind::EventsBatch => "events_batch",
            OperationKind::SecretsSync => "secrets_sync",
            OperationKind::Ping => "ping",
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        Some(match method {
            "http_request" => OperationKind::HttpRequest,
            "file_read" => OperationKind::FileRead,
            "file_write" => OperationKind::FileWrite,
            "file_list" => OperationKind::FileList,
            "exec" => OperationKind::Exec,
            "open_url" => OperationKind::OpenUrl,
            "secret_inject" => OperationKind::SecretInject,
            "skill_install" => OperationKind::SkillInstall,
            "skill_uninstall" => OperationKind::SkillUninstall,
            "policy_check" => OperationKind::PolicyCheck,
            "events_batch" => OperationKind::EventsBatch,
            "secrets_sync" => OperationKind::SecretsSync,
            "ping" => OperationKind::Ping,
            _ => return None,
        })
    }
}

/// Which transport a request arrived on. Secret injection is socket-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Socket,
    Http,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Socket => write!(f, "socket"),
            Channel::Http => write!(f, "http"),
        }
    }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// Outcome of a mediated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Denied,
    Error,
}

/// One line of the append-only audit log. Secret values never appear here,
/// only names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: OperationKind,
    pub channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uid: Option<u32>,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    pub target: String,
    pub result: AuditResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl AuditEntry {
    /// New entry with a fresh id and the current timestamp.
    pub fn new(operation: OperationKind, channel: Channel, target: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation,
            channel,
            client_uid: None,
            allowed: false,
            policy_id: None,
            target: target.into(),
            result: AuditResult::Error,
            error_message: None,
            duration_ms: 0,
            metadata: None,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Event pushed to UI subscribers over the daemon SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ShieldEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

// ─── Secret bindings (daemon → broker push) ──────────────────────────────────

/// What a binding's patterns match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingTarget {
    Url,
    Command,
}

/// Secrets scoped to a URL or command pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBinding {
    pub policy_id: String,
    pub target: BindingTarget,
    pub patterns: Vec<String>,
    /// name → value. Values live in broker memory only.
    pub secrets: BTreeMap<String, String>,
}

/// Full bundle pushed by the daemon on every secrets change. The broker
/// replaces its in-memory copy atomically and never persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsSyncPayload {
    pub version: u64,
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub global_secrets: BTreeMap<String, String>,
    #[serde(default)]
    pub policy_bindings: Vec<SecretBinding>,
}
