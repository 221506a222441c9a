//! Error taxonomy shared by the broker, daemon, and wrapper binaries.
//!
//! Every error that crosses the JSON-RPC boundary carries a numeric code.
//! Handler-specific codes live in the 1000-range; transport codes use the
//! JSON-RPC 2.0 reserved range.

use thiserror::Error;

/// JSON-RPC transport error codes.
pub const RPC_PARSE_ERROR: i64 = -32700;
pub const RPC_INVALID_REQUEST: i64 = -32600;
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;
pub const RPC_INTERNAL_ERROR: i64 = -32603;

/// Handler error codes (also used as process exit codes by the wrappers).
pub const CODE_POLICY_DENIED: i64 = 1001;
pub const CODE_VALIDATION: i64 = 1003;
pub const CODE_INTERNAL: i64 = 1005;
pub const CODE_NOT_FOUND: i64 = 1007;
pub const CODE_CHANNEL_REFUSED: i64 = 1008;

/// Exec timeout exit code (mirrors `timeout(1)`).
pub const EXIT_TIMEOUT: i32 = 124;

/// Errors returned by operation handlers and the stores underneath them.
#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", denied_message(.policy_id))]
    PolicyDenied {
        policy_id: Option<String>,
        target: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    ChannelRefused(String),

    #[error("{0}")]
    Internal(String),

    #[error("Vault data is corrupt or the key does not match: {0}")]
    VaultCorrupt(String),

    #[error("Daemon unavailable: {0}")]
    UpstreamDaemonUnavailable(String),
}

fn denied_message(policy_id: &Option<String>) -> String {
    match policy_id {
        Some(id) => format!("Denied by policy {}", id),
        None => "Denied by policy".to_string(),
    }
}

impl ShieldError {
    /// Numeric code for the JSON-RPC error object.
    pub fn code(&self) -> i64 {
        match self {
            ShieldError::Validation(_) => CODE_VALIDATION,
            ShieldError::PolicyDenied { .. } => CODE_POLICY_DENIED,
            ShieldError::NotFound(_) => CODE_NOT_FOUND,
            ShieldError::ChannelRefused(_) => CODE_CHANNEL_REFUSED,
            ShieldError::Internal(_) => CODE_INTERNAL,
            ShieldError::VaultCorrupt(_) => CODE_INTERNAL,
            ShieldError::UpstreamDaemonUnavailable(_) => CODE_INTERNAL,
        }
    }

    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        ShieldError::Validation(msg.into())
    }

    /// Shorthand for an internal failure.
    pub fn internal(msg: impl Into<String>) -> Self {
        ShieldError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_contract() {
        assert_eq!(ShieldError::validation("x").code(), 1003);
        assert_eq!(
            ShieldError::PolicyDenied {
                policy_id: None,
                target: "t".into()
            }
            .code(),
            1001
        );
        assert_eq!(ShieldError::NotFound("secret".into()).code(), 1007);
        assert_eq!(ShieldError::ChannelRefused("http".into()).code(), 1008);
        assert_eq!(ShieldError::internal("x").code(), 1005);
        assert_eq!(ShieldError::VaultCorrupt("bad tag".into()).code(), 1005);
    }

    #[test]
    fn denied_message_includes_policy_id() {
        let e = ShieldError::PolicyDenied {
            policy_id: Some("pol-1".into()),
            target: "curl".into(),
        };
        assert_eq!(e.to_string(), "Denied by policy pol-1");
    }
}
