//! Skill materialisation and install orchestration.
//!
//! `materialize` is the broker-side primitive: stage the validated bundle,
//! swap it into place, normalise modes (`a+rX,go-w`). `Installer` is the
//! daemon-side orchestrator: version diff, analysis gate, backend install,
//! version record, event. Uninstall reverses in the opposite order.

use crate::analysis::AnalysisHook;
use crate::model::SkillSpec;
use crate::quarantine::Quarantine;
use crate::version_store::{SkillRecord, VersionStore};
use agenshield_core::error::ShieldError;
use agenshield_core::protocol::ShieldEvent;
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Write the bundle under `skills_root/<slug>`, replacing any previous
/// contents, and normalise permissions. Returns the skill directory.
pub fn materialize(spec: &SkillSpec, skills_root: &Path) -> Result<PathBuf, ShieldError> {
    spec.validate()?;
    let final_dir = skills_root.join(&spec.slug);
    let staging = skills_root.join(format!(".{}.staging", spec.slug));

    let io = |e: std::io::Error| ShieldError::internal(format!("skill install I/O: {}", e));

    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(io)?;
    }
    std::fs::create_dir_all(&staging).map_err(io)?;

    for file in &spec.files {
        let path = staging.join(&file.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(&path, file.bytes()?).map_err(io)?;
        #[cfg(unix)]
        if let Some(mode) = file.mode {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode & 0o7777))
                .map_err(io)?;
        }
    }
    normalize_tree_modes(&staging).map_err(io)?;

    if final_dir.exists() {
        std::fs::remove_dir_all(&final_dir).map_err(io)?;
    }
    std::fs::rename(&staging, &final_dir).map_err(io)?;
    tracing::info!(skill = %spec.slug, dir = %final_dir.display(), "materialized skill");
    Ok(final_dir)
}

/// Remove a materialised skill directory. Missing is fine.
pub fn unmaterialize(slug: &str, skills_root: &Path) -> Result<(), ShieldError> {
    crate::model::validate_slug(slug)?;
    let dir = skills_root.join(slug);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)
            .map_err(|e| ShieldError::internal(format!("skill uninstall I/O: {}", e)))?;
    }
    Ok(())
}

/// `chmod -R a+rX,go-w`: world-readable, group/other never writable,
/// execute preserved where any execute bit was present (and on dirs).
#[cfg(unix)]
fn normalize_tree_modes(root: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::symlink_metadata(root)?;
    let mut mode = meta.permissions().mode() & 0o7777;
    mode |= 0o444;
    if meta.is_dir() || mode & 0o111 != 0 {
        mode |= 0o111;
    }
    mode &= !0o022;
    std::fs::set_permissions(root, std::fs::Permissions::from_mode(mode))?;
    if meta.is_dir() {
        for entry in std::fs::read_dir(root)?.flatten() {
            normalize_tree_modes(&entry.path())?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn normalize_tree_modes(_root: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Where the broker applies the bundle (over the socket in production,
/// in-process in tests).
pub trait SkillBackend: Send + Sync {
    fn install(&self, spec: &SkillSpec) -> Result<()>;
    fn uninstall(&self, slug: &str) -> Result<()>;
}

/// Outcome of one orchestrated install.
#[derive(Debug)]
pub struct InstallOutcome {
    /// False when the bundle's sha matched the recorded version (no-op).
    pub installed: bool,
    pub sha: String,
    pub event: Option<ShieldEvent>,
}

/// Daemon-side orchestrator for the skill lifecycle.
pub struct Installer {
    store: VersionStore,
    quarantine: Quarantine,
    analyzer: Box<dyn AnalysisHook>,
    backend: Box<dyn SkillBackend>,
}

impl Installer {
    pub fn new(
        store: VersionStore,
        quarantine: Quarantine,
        analyzer: Box<dyn AnalysisHook>,
        backend: Box<dyn SkillBackend>,
    ) -> Self {
        Self {
            store,
            quarantine,
            analyzer,
            backend,
        }
    }

    /// Validate, analyse (unless trusted), install through the backend, and
    /// record the version. Identical sha is a no-op.
    pub fn install(&self, spec: &SkillSpec) -> Result<InstallOutcome> {
        spec.validate().map_err(anyhow::Error::from)?;
        let sha = spec.sha256().map_err(anyhow::Error::from)?;

        let existing = self.store.load()?;
        if let Some(record) = existing.get(&spec.slug) {
            if record.sha == sha {
                tracing::debug!(skill = %spec.slug, "skill unchanged, skipping install");
                return Ok(InstallOutcome {
                    installed: false,
                    sha,
                    event: None,
                });
            }
        }

        if !spec.trusted {
            let verdict = self.analyzer.analyze(spec)?;
            if !verdict.approved {
                self.quarantine.hold(spec, &verdict)?;
                anyhow::bail!(
                    "skill {} failed vulnerability analysis ({} findings), quarantined",
                    spec.slug,
                    verdict.findings.len()
                );
            }
        }

        self.backend
            .install(spec)
            .with_context(|| format!("Install skill {}", spec.slug))?;
        self.store.record(
            &spec.slug,
            SkillRecord {
                version: spec.version.clone().unwrap_or_else(|| sha[..8].to_string()),
                sha: sha.clone(),
                source_id: spec.source_id.clone(),
                installed_at: Utc::now(),
                trusted: spec.trusted,
            },
        )?;

        Ok(InstallOutcome {
            installed: true,
            sha: sha.clone(),
            event: Some(ShieldEvent::new(
                "skills:installed",
                json!({ "slug": spec.slug, "sha": sha }),
            )),
        })
    }

    /// Uninstall through the backend and drop the version record.
    pub fn uninstall(&self, slug: &str) -> Result<Option<ShieldEvent>> {
        crate::model::validate_slug(slug).map_err(anyhow::Error::from)?;
        self.backend
            .uninstall(slug)
            .with_context(|| format!("Uninstall skill {}", slug))?;
        self.store.remove(slug)?;
        Ok(Some(ShieldEvent::new(
            "skills:uninstalled",
            json!({ "slug": slug }),
        )))
    }
}
