//! Declarative sandbox configuration.
//!
//! Sets are ordered (`BTreeSet`) so canonicalisation is free: two configs
//! with the same logical content serialise and synthesise identically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Input to Seatbelt profile synthesis. Paths in `allowed_binaries` follow
/// the trailing-`/` convention: `/opt/tools/` covers the subtree, a bare
/// path is a literal. Deny entries always beat allow entries at the SBPL
/// layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxConfig {
    pub network_allowed: bool,
    pub allowed_hosts: BTreeSet<String>,
    pub allowed_ports: BTreeSet<u16>,
    pub allowed_binaries: BTreeSet<String>,
    pub denied_binaries: BTreeSet<String>,
    pub allowed_write_paths: BTreeSet<String>,
    pub denied_paths: BTreeSet<String>,
    /// Pre-generated SBPL; when present it bypasses synthesis verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_content: Option<String>,
}

impl SandboxConfig {
    /// Whether the host set is loopback-only (DNS clauses are skipped then).
    pub fn hosts_are_loopback_only(&self) -> bool {
        !self.allowed_hosts.is_empty()
            && self
                .allowed_hosts
                .iter()
                .all(|h| h == "localhost" || h == "127.0.0.1" || h == "::1")
    }
}
