//! Runtime bridge between wrapped agent processes and the broker.
//!
//! The original outbound facilities (HTTP, exec) of the agent process are
//! replaced by the wrapper binaries, which serialise each call, send it
//! over the broker socket, block for the response, and return the result
//! transparently. Child processes spawn under `sandbox-exec` with a
//! filtered environment.
//!
//! Internal file-system access (profile writes, logs) goes through plain
//! `std::fs` handles taken at process start; no interception layer sits
//! beneath them, so the profile writer can never loop through itself.

pub mod client;
pub mod exec;

pub use client::BrokerClient;
