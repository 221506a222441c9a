//! Sandbox orchestration for agent child processes.
//!
//! - [`config`]: the declarative [`config::SandboxConfig`] that drives
//!   profile synthesis
//! - [`profile`]: macOS Seatbelt (SBPL) generation and the content-addressed
//!   profile cache
//! - [`wrappers`]: command wrapper scripts under the agent's `bin/`
//! - [`env_filter`]: the base environment allowlist applied to wrapped
//!   children
//! - [`spawn`]: deadline-supervised child execution with the
//!   SIGTERM-then-SIGKILL ladder

pub mod config;
pub mod env_filter;
pub mod profile;
pub mod spawn;
pub mod wrappers;

pub use config::SandboxConfig;
pub use profile::{synthesize_profile, HostPaths, ProfileCache};
