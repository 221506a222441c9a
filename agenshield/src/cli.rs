//! CLI definition.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "agenshield",
    version,
    about = "Sandbox untrusted AI-agent processes behind a policy-enforcing broker"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the privileged broker service (socket + HTTP fallback).
    Broker,

    /// Run the user-session daemon (UI, SSE, vault, wizard).
    Daemon,

    /// Evaluate a policy decision against the on-disk policy store.
    Check {
        /// Operation to evaluate (exec, http_request, file_read, ...).
        #[arg(long)]
        operation: String,
        /// Normalised target (command line, URL, or absolute path).
        #[arg(long)]
        target: String,
    },

    /// Install or verify the command wrappers under the agent's bin dir.
    Wrappers {
        /// Only report wrapper health, do not modify anything.
        #[arg(long)]
        verify: bool,
    },

    /// Remove seatbelt profiles older than the given age (hours).
    CleanProfiles {
        #[arg(long, default_value_t = 24)]
        max_age_hours: u64,
    },
}
