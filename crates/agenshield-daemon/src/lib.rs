//! The AgenShield daemon: user-session control plane over the broker.
//!
//! Owns the encrypted vault and the authoritative config (including the
//! policy set), serves the UI over HTTP + SSE, gates mutations behind the
//! passcode, pushes policies and secrets down to the broker, and drives the
//! setup wizard state machine.

pub mod auth;
pub mod broker_push;
pub mod openclaw;
pub mod server;
pub mod skill_sync;
pub mod sse;
pub mod state;
pub mod wizard;

pub use server::{build_rpc_router, build_ui_router, Daemon};
pub use state::{ConfigStore, DaemonDocument};
