//! Configuration: env key constants, loading helpers, per-domain schema.

pub mod env_keys;
mod loader;
mod schema;

pub use loader::{
    env_bool, env_optional, env_or, env_u64, load_dotenv, remove_env_var, set_env_var,
};
pub use schema::{BrokerConfig, DaemonConfig, ObservabilityConfig, DEFAULT_OP_TIMEOUT_SECS};
