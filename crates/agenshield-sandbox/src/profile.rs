//! macOS Seatbelt (SBPL) profile synthesis and the content-addressed cache.
//!
//! Synthesis is deterministic: the config's sets are ordered, host paths are
//! passed in explicitly, and clauses are emitted in a fixed order, so
//! identical inputs produce byte-identical profiles. Profiles are addressed
//! as `sb-<sha256(content)[:16]>.sb` under a world-writable sticky directory
//! shared by the broker and the wrapper binaries.

use crate::config::SandboxConfig;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Escape a string for interpolation into an SBPL literal.
fn sbpl_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

/// Host-derived exec roots resolved once at synthesis time. Passing them in
/// keeps `synthesize_profile` a pure function of its arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPaths {
    pub home: Option<String>,
    pub nvm_dir: Option<String>,
    pub homebrew_prefix: Option<String>,
}

impl HostPaths {
    pub fn from_env() -> Self {
        Self {
            home: std::env::var("HOME").ok().filter(|s| !s.is_empty()),
            nvm_dir: std::env::var("NVM_DIR").ok().filter(|s| !s.is_empty()),
            homebrew_prefix: std::env::var("HOMEBREW_PREFIX")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Generate the SBPL document for `config`. A pre-generated
/// `profile_content` bypasses synthesis verbatim.
pub fn synthesize_profile(config: &SandboxConfig, host: &HostPaths) -> String {
    if let Some(ref content) = config.profile_content {
        return content.clone();
    }

    let mut p = String::new();

    p.push_str("(version 1)\n");
    p.push_str("(deny default)\n\n");

    // Universal read: APFS firmlinks make subpath-restricted reads
    // unreliable, sensitive paths are covered by the deny clauses below.
    p.push_str("; Universal read\n");
    p.push_str("(allow file-read*)\n\n");

    p.push_str("; Writable scratch space\n");
    p.push_str("(allow file-write* (subpath \"/tmp\"))\n");
    p.push_str("(allow file-write* (subpath \"/private/tmp\"))\n");
    p.push_str("(allow file-write* (subpath \"/var/folders\"))\n");
    for path in &config.allowed_write_paths {
        p.push_str(&format!(
            "(allow file-write* (subpath \"{}\"))\n",
            sbpl_escape(path)
        ));
    }
    for dev in ["/dev/null", "/dev/zero", "/dev/random", "/dev/urandom"] {
        p.push_str(&format!("(allow file-write* (literal \"{}\"))\n", dev));
    }
    p.push('\n');

    if !config.denied_paths.is_empty() {
        p.push_str("; Denied paths always win over the allowances above\n");
        for path in &config.denied_paths {
            p.push_str(&format!(
                "(deny file* (subpath \"{}\"))\n",
                sbpl_escape(path)
            ));
        }
        p.push('\n');
    }

    p.push_str("; Executable roots\n");
    let mut exec_subpaths: Vec<String> = vec![
        "/bin".to_string(),
        "/sbin".to_string(),
        "/usr/bin".to_string(),
        "/usr/sbin".to_string(),
        "/usr/local/bin".to_string(),
        "/opt/agenshield/bin".to_string(),
    ];
    if let Some(ref home) = host.home {
        exec_subpaths.push(format!("{}/bin", home));
        exec_subpaths.push(format!("{}/homebrew", home));
    }
    if let Some(ref nvm) = host.nvm_dir {
        exec_subpaths.push(nvm.clone());
    }
    if let Some(ref brew) = host.homebrew_prefix {
        exec_subpaths.push(format!("{}/bin", brew));
        exec_subpaths.push(format!("{}/lib", brew));
    }
    for path in &exec_subpaths {
        p.push_str(&format!(
            "(allow process-exec (subpath \"{}\"))\n",
            sbpl_escape(path)
        ));
    }

    // Additional binaries, deduplicated against the fixed roots.
    let fixed: BTreeSet<&str> = exec_subpaths.iter().map(|s| s.as_str()).collect();
    for binary in &config.allowed_binaries {
        if let Some(dir) = binary.strip_suffix('/') {
            if fixed.contains(dir) {
                continue;
            }
            p.push_str(&format!(
                "(allow process-exec (subpath \"{}\"))\n",
                sbpl_escape(dir)
            ));
        } else {
            if fixed.contains(binary.as_str()) {
                continue;
            }
            p.push_str(&format!(
                "(allow process-exec (literal \"{}\"))\n",
                sbpl_escape(binary)
            ));
        }
    }
    for binary in &config.denied_binaries {
        p.push_str(&format!(
            "(deny process-exec (literal \"{}\"))\n",
            sbpl_escape(binary)
        ));
    }
    p.push('\n');

    p.push_str("; Network\n");
    if config.network_allowed
        && (!config.allowed_hosts.is_empty() || !config.allowed_ports.is_empty())
    {
        if config.allowed_hosts.is_empty() {
            for port in &config.allowed_ports {
                p.push_str(&format!(
                    "(allow network-outbound (remote tcp \"*:{}\"))\n",
                    port
                ));
            }
        } else {
            for host_name in &config.allowed_hosts {
                if config.allowed_ports.is_empty() {
                    p.push_str(&format!(
                        "(allow network-outbound (remote tcp \"{}:*\"))\n",
                        sbpl_escape(host_name)
                    ));
                } else {
                    for port in &config.allowed_ports {
                        p.push_str(&format!(
                            "(allow network-outbound (remote tcp \"{}:{}\"))\n",
                            sbpl_escape(host_name),
                            port
                        ));
                    }
                }
            }
        }
        // DNS, unless everything stays on loopback.
        if !config.hosts_are_loopback_only() {
            p.push_str("(allow network-outbound (remote udp \"*:53\"))\n");
            p.push_str("(allow network-outbound (remote tcp \"*:53\"))\n");
        }
    } else if config.network_allowed {
        p.push_str("(allow network*)\n");
    } else {
        p.push_str("(deny network*)\n");
    }
    p.push('\n');

    p.push_str("; Broker socket and runtime dir\n");
    p.push_str("(allow network-outbound (remote unix))\n");
    p.push_str("(allow network-inbound (local unix))\n");
    p.push_str("(allow file-read* (subpath \"/var/run/agenshield\"))\n");
    p.push_str("(allow file-write* (subpath \"/var/run/agenshield\"))\n");
    p.push_str("(allow file-read* (subpath \"/private/var/run/agenshield\"))\n");
    p.push_str("(allow file-write* (subpath \"/private/var/run/agenshield\"))\n\n");

    p.push_str("; Process basics\n");
    p.push_str("(allow process-fork)\n");
    p.push_str("(allow signal (target self))\n");
    p.push_str("(allow sysctl-read)\n");
    p.push_str("(allow mach-lookup)\n");

    p
}

/// Short content address: first 16 hex chars of sha256.
pub fn content_address(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Content-addressed profile directory shared across sandbox users.
pub struct ProfileCache {
    dir: PathBuf,
}

impl ProfileCache {
    /// Create the cache, making the directory world-writable + sticky so the
    /// broker and per-user wrappers can coexist as writers.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Create profile dir {}", dir.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o1777));
        }
        Ok(Self { dir })
    }

    /// Materialise the profile for `config`, returning its path. Existing
    /// files are reused - the address is the content hash, so a hit is
    /// always byte-correct.
    pub fn ensure(&self, config: &SandboxConfig, host: &HostPaths) -> Result<PathBuf> {
        let content = synthesize_profile(config, host);
        let path = self.dir.join(format!("sb-{}.sb", content_address(&content)));
        if !path.exists() {
            let tmp = path.with_extension(format!("sb.{}", std::process::id()));
            std::fs::write(&tmp, &content)
                .with_context(|| format!("Write profile {}", tmp.display()))?;
            std::fs::rename(&tmp, &path)
                .with_context(|| format!("Publish profile {}", path.display()))?;
            tracing::debug!(profile = %path.display(), "synthesized seatbelt profile");
        }
        Ok(path)
    }

    /// Remove cached profiles older than `max_age`.
    pub fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Read profile dir {}", self.dir.display()))?
            .flatten()
        {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("sb-") || !name.ends_with(".sb") {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if now.duration_since(modified).unwrap_or_default() >= max_age
                && std::fs::remove_file(&path).is_ok()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
