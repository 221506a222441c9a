//! Per-domain configuration structs, loaded from the environment with a
//! unified fallback chain.

use super::env_keys::{broker as broker_keys, observability as obv_keys};
use super::loader::{env_bool, env_or, env_u64, env_optional};
use std::path::PathBuf;

/// Default per-operation deadline (seconds).
pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 30;

/// Broker runtime configuration: transport endpoints and store locations.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Unix socket path the broker listens on.
    pub socket_path: PathBuf,
    /// Loopback HTTP fallback bind host.
    pub http_host: String,
    /// Loopback HTTP fallback bind port.
    pub http_port: u16,
    /// On-disk policy store (JSON) the broker loads at start-up.
    pub policies_path: PathBuf,
    /// Append-only audit JSONL path.
    pub audit_log: PathBuf,
    /// Seatbelt profile cache directory.
    pub profile_dir: PathBuf,
    /// No-policy-match default: true = allow (fail-open).
    pub fail_open: bool,
    /// Sandboxed agent user home (wrapper + skill materialisation root).
    pub agent_home: PathBuf,
    /// Daemon control-plane base URL for second-chance forwards and events.
    pub daemon_url: Option<String>,
    /// Per-operation deadline in seconds.
    pub op_timeout_secs: u64,
}

impl BrokerConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let socket_path = env_or(broker_keys::AGENSHIELD_SOCKET, &[], || {
            "/var/run/agenshield/agenshield.sock".to_string()
        });
        let http_host = env_or(broker_keys::AGENSHIELD_HTTP_HOST, &[], || {
            "127.0.0.1".to_string()
        });
        let http_port = env_optional(broker_keys::AGENSHIELD_HTTP_PORT, &[])
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(5201);
        let policies_path = env_or(broker_keys::AGENSHIELD_POLICIES, &[], || {
            "/opt/agenshield/policies/policies.json".to_string()
        });
        let audit_log = env_or(broker_keys::AGENSHIELD_AUDIT_LOG, &[], || {
            "/var/log/agenshield/audit.log".to_string()
        });
        let profile_dir = env_or(broker_keys::AGENSHIELD_PROFILE_DIR, &[], || {
            "/var/run/agenshield/profiles".to_string()
        });
        let fail_open = env_bool(broker_keys::AGENSHIELD_FAIL_OPEN, &[], true);
        let agent_home = env_or(broker_keys::AGENSHIELD_AGENT_HOME, &[], || {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/var/empty"))
                .to_string_lossy()
                .to_string()
        });
        let daemon_url = env_optional(broker_keys::AGENSHIELD_DAEMON_URL, &[]);
        let op_timeout_secs = env_u64(
            broker_keys::AGENSHIELD_TIMEOUT,
            &[],
            DEFAULT_OP_TIMEOUT_SECS,
        );

        Self {
            socket_path: PathBuf::from(socket_path),
            http_host,
            http_port,
            policies_path: PathBuf::from(policies_path),
            audit_log: PathBuf::from(audit_log),
            profile_dir: PathBuf::from(profile_dir),
            fail_open,
            agent_home: PathBuf::from(agent_home),
            daemon_url,
            op_timeout_secs,
        }
    }
}

/// Daemon control-plane configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Per-user state file (config + policies + passcode hash).
    pub state_path: PathBuf,
    /// UI HTTP bind port.
    pub ui_port: u16,
    /// RPC HTTP bind port.
    pub rpc_port: u16,
    /// Bind host for both servers.
    pub host: String,
    /// Broker socket for downstream pushes.
    pub broker_socket: PathBuf,
    /// Authoritative skills source directory watched for changes.
    pub skills_dir: PathBuf,
    /// Sandboxed agent user home (openclaw.json, wrappers).
    pub agent_home: PathBuf,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let state_path = env_optional(broker_keys::AGENSHIELD_CONFIG, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".agenshield")
                    .join("daemon.json")
            });
        let ui_port = env_optional("AGENSHIELD_UI_PORT", &[])
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(6969);
        let rpc_port = env_optional("AGENSHIELD_RPC_PORT", &[])
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(5200);
        let broker_socket = env_or(broker_keys::AGENSHIELD_SOCKET, &[], || {
            "/var/run/agenshield/agenshield.sock".to_string()
        });
        let skills_dir = env_or("AGENSHIELD_SKILLS_DIR", &[], || {
            "/opt/agenshield/skills".to_string()
        });
        let agent_home = env_or(broker_keys::AGENSHIELD_AGENT_HOME, &[], || {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/var/empty"))
                .to_string_lossy()
                .to_string()
        });
        Self {
            state_path,
            ui_port,
            rpc_port,
            host: "127.0.0.1".to_string(),
            broker_socket: PathBuf::from(broker_socket),
            skills_dir: PathBuf::from(skills_dir),
            agent_home: PathBuf::from(agent_home),
        }
    }
}

/// Observability configuration: quiet, log_level, log_json.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            let quiet = env_bool(obv_keys::AGENSHIELD_QUIET, &[], false);
            let log_level = env_or(obv_keys::AGENSHIELD_LOG_LEVEL, &[], || {
                "agenshield=info".to_string()
            });
            let log_json = env_bool(obv_keys::AGENSHIELD_LOG_JSON, &[], false);
            Self {
                quiet,
                log_level,
                log_json,
            }
        })
    }
}
