//! Command wrapper management under the agent's `bin/`.
//!
//! Each proxied command gets a wrapper: preferably a symlink to
//! `shield-exec`, falling back to a small shell script that routes through
//! `shield-client exec`. The wrapper set is the fixed proxied-command list
//! plus every installed skill slug.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Commands that are always proxied through the broker.
pub const PROXIED_COMMANDS: &[&str] = &[
    "curl", "wget", "git", "ssh", "scp", "rsync", "brew", "npm", "npx", "pip", "pip3",
    "open-url", "shieldctl", "agenco",
];

/// Default locations of the wrapper entry points.
pub const SHIELD_EXEC_PATH: &str = "/opt/agenshield/bin/shield-exec";
pub const SHIELD_CLIENT_PATH: &str = "/opt/agenshield/bin/shield-client";

/// Health of one wrapper on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapperState {
    Ok,
    Missing,
    Tampered,
}

/// Manages the wrapper files in one bin directory.
pub struct WrapperManager {
    bin_dir: PathBuf,
    shield_exec: PathBuf,
    shield_client: PathBuf,
}

impl WrapperManager {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            shield_exec: PathBuf::from(SHIELD_EXEC_PATH),
            shield_client: PathBuf::from(SHIELD_CLIENT_PATH),
        }
    }

    /// Override the entry-point locations (tests, non-standard installs).
    pub fn with_entry_points(
        mut self,
        shield_exec: impl Into<PathBuf>,
        shield_client: impl Into<PathBuf>,
    ) -> Self {
        self.shield_exec = shield_exec.into();
        self.shield_client = shield_client.into();
        self
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    fn wrapper_path(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    fn script_body(&self, name: &str) -> String {
        format!(
            "#!/bin/sh\nexec \"{}\" exec {} \"$@\"\n",
            self.shield_client.display(),
            name
        )
    }

    /// Create the bin directory (setgid so group ownership is inherited) and
    /// materialise wrappers for the fixed command set plus `skill_slugs`.
    /// Idempotent: an existing, healthy wrapper is left untouched.
    pub fn install_all(&self, skill_slugs: &[String]) -> Result<()> {
        self.ensure_bin_dir()?;
        for name in PROXIED_COMMANDS {
            self.install(name)?;
        }
        for slug in skill_slugs {
            self.install(slug)?;
        }
        Ok(())
    }

    /// Materialise a single wrapper.
    pub fn install(&self, name: &str) -> Result<()> {
        self.ensure_bin_dir()?;
        let path = self.wrapper_path(name);
        if self.state(name) == WrapperState::Ok {
            return Ok(());
        }
        if path.exists() || path.is_symlink() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Remove stale wrapper {}", path.display()))?;
        }

        // Symlink to shield-exec when it exists; script fallback otherwise.
        if self.shield_exec.exists() {
            #[cfg(unix)]
            {
                std::os::unix::fs::symlink(&self.shield_exec, &path)
                    .with_context(|| format!("Symlink wrapper {}", path.display()))?;
                return Ok(());
            }
        }
        std::fs::write(&path, self.script_body(name))
            .with_context(|| format!("Write wrapper {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .with_context(|| format!("chmod wrapper {}", path.display()))?;
        }
        tracing::debug!(wrapper = %name, "installed command wrapper");
        Ok(())
    }

    /// Remove one wrapper (skill uninstall path). Missing is fine.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.wrapper_path(name);
        if path.exists() || path.is_symlink() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Remove wrapper {}", path.display()))?;
        }
        Ok(())
    }

    /// Integrity state of one wrapper.
    pub fn state(&self, name: &str) -> WrapperState {
        let path = self.wrapper_path(name);
        if path.is_symlink() {
            return match std::fs::read_link(&path) {
                Ok(dest) if dest == self.shield_exec => WrapperState::Ok,
                _ => WrapperState::Tampered,
            };
        }
        if !path.exists() {
            return WrapperState::Missing;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) if content == self.script_body(name) => WrapperState::Ok,
            _ => WrapperState::Tampered,
        }
    }

    /// Check every expected wrapper, returning the unhealthy ones.
    pub fn verify(&self, skill_slugs: &[String]) -> Vec<(String, WrapperState)> {
        let mut bad = Vec::new();
        let names = PROXIED_COMMANDS
            .iter()
            .map(|s| s.to_string())
            .chain(skill_slugs.iter().cloned());
        for name in names {
            let state = self.state(&name);
            if state != WrapperState::Ok {
                bad.push((name, state));
            }
        }
        bad
    }

    fn ensure_bin_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.bin_dir)
            .with_context(|| format!("Create bin dir {}", self.bin_dir.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // setgid pins group inheritance for files created by root.
            let _ = std::fs::set_permissions(
                &self.bin_dir,
                std::fs::Permissions::from_mode(0o2755),
            );
        }
        Ok(())
    }
}
