//! Environment variable key constants.
//!
//! Primary variables use `AGENSHIELD_*`. Alias chains exist where an older
//! flat name is still honoured by deployed wrappers.

/// Broker transport and stores.
pub mod broker {
    pub const AGENSHIELD_SOCKET: &str = "AGENSHIELD_SOCKET";
    pub const AGENSHIELD_HTTP_HOST: &str = "AGENSHIELD_HTTP_HOST";
    pub const AGENSHIELD_HTTP_PORT: &str = "AGENSHIELD_HTTP_PORT";
    pub const AGENSHIELD_CONFIG: &str = "AGENSHIELD_CONFIG";
    pub const AGENSHIELD_POLICIES: &str = "AGENSHIELD_POLICIES";
    pub const AGENSHIELD_AUDIT_LOG: &str = "AGENSHIELD_AUDIT_LOG";
    pub const AGENSHIELD_FAIL_OPEN: &str = "AGENSHIELD_FAIL_OPEN";
    pub const AGENSHIELD_AGENT_HOME: &str = "AGENSHIELD_AGENT_HOME";
    pub const AGENSHIELD_DAEMON_URL: &str = "AGENSHIELD_DAEMON_URL";
    pub const AGENSHIELD_PROFILE_DIR: &str = "AGENSHIELD_PROFILE_DIR";
    pub const AGENSHIELD_TIMEOUT: &str = "AGENSHIELD_TIMEOUT";
}

/// Observability and logging.
pub mod observability {
    pub const AGENSHIELD_QUIET: &str = "AGENSHIELD_QUIET";
    pub const AGENSHIELD_LOG_LEVEL: &str = "AGENSHIELD_LOG_LEVEL";
    pub const AGENSHIELD_LOG_JSON: &str = "AGENSHIELD_LOG_JSON";
}

/// Agent-side interceptor switches. Read by the wrapper binaries, never by
/// the broker.
pub mod interceptor {
    pub const AGENSHIELD_INTERCEPT_FETCH: &str = "AGENSHIELD_INTERCEPT_FETCH";
    pub const AGENSHIELD_INTERCEPT_HTTP: &str = "AGENSHIELD_INTERCEPT_HTTP";
    pub const AGENSHIELD_INTERCEPT_WS: &str = "AGENSHIELD_INTERCEPT_WS";
    pub const AGENSHIELD_INTERCEPT_EXEC: &str = "AGENSHIELD_INTERCEPT_EXEC";
    pub const AGENSHIELD_USER_SECRETS: &str = "AGENSHIELD_USER_SECRETS";
}
