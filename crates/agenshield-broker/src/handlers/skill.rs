//! `skill_install` / `skill_uninstall`: materialise validated bundles.
//!
//! The broker writes files and wrappers only; the daemon owns the
//! openclaw.json entry and the skill's policy registration. Install with an
//! unchanged file set is a no-op at the filesystem level (same content,
//! same wrapper).

use super::{parse_params, Deps, Reply};
use agenshield_core::error::ShieldError;
use agenshield_sandbox::wrappers::WrapperManager;
use agenshield_skills::installer::{materialize, unmaterialize};
use agenshield_skills::SkillSpec;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Skills live under the agent's managed workspace.
fn skills_root(deps: &Deps) -> PathBuf {
    deps.config
        .agent_home
        .join(".openclaw")
        .join("workspace")
        .join("skills")
}

fn wrapper_manager(deps: &Deps) -> WrapperManager {
    WrapperManager::new(deps.config.agent_home.join("bin"))
}

#[derive(Debug, Deserialize)]
struct InstallParams {
    #[serde(flatten)]
    spec: SkillSpec,
    /// Materialise a command wrapper for the slug (default true).
    #[serde(default = "default_wrapper")]
    wrapper: bool,
}

fn default_wrapper() -> bool {
    true
}

pub fn handle_install(params: &Value, deps: &Deps) -> Result<Reply, ShieldError> {
    let p: InstallParams = parse_params(params)?;
    p.spec.validate()?;
    let sha = p.spec.sha256()?;

    let root = skills_root(deps);
    std::fs::create_dir_all(&root)
        .map_err(|e| ShieldError::internal(format!("Create skills root: {}", e)))?;
    let dir = materialize(&p.spec, &root)?;

    if p.wrapper {
        wrapper_manager(deps)
            .install(&p.spec.slug)
            .map_err(|e| ShieldError::internal(format!("Install wrapper: {:#}", e)))?;
    }

    tracing::info!(skill = %p.spec.slug, sha = %sha, "skill installed");
    Ok(Reply::with_metadata(
        json!({
            "installed": true,
            "slug": p.spec.slug,
            "sha": sha,
            "dir": dir.to_string_lossy(),
        }),
        json!({ "sha": sha, "files": p.spec.files.len() }),
    ))
}

#[derive(Debug, Deserialize)]
struct UninstallParams {
    slug: String,
}

pub fn handle_uninstall(params: &Value, deps: &Deps) -> Result<Reply, ShieldError> {
    let p: UninstallParams = parse_params(params)?;
    unmaterialize(&p.slug, &skills_root(deps))?;
    wrapper_manager(deps)
        .remove(&p.slug)
        .map_err(|e| ShieldError::internal(format!("Remove wrapper: {:#}", e)))?;
    tracing::info!(skill = %p.slug, "skill uninstalled");
    Ok(Reply::new(json!({ "uninstalled": true, "slug": p.slug })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::secrets::SecretResolver;
    use agenshield_core::config::BrokerConfig;
    use agenshield_policy::PolicyEngine;
    use std::sync::Arc;

    fn deps(tmp: &tempfile::TempDir) -> Deps {
        let mut config = BrokerConfig::from_env();
        config.agent_home = tmp.path().to_path_buf();
        Deps {
            config,
            engine: Arc::new(PolicyEngine::new(vec![], true)),
            audit: Arc::new(AuditLog::new(tmp.path().join("audit.log"))),
            secrets: Arc::new(SecretResolver::new()),
            allowlist: None,
            daemon: None,
        }
    }

    fn install_params(slug: &str) -> Value {
        json!({
            "slug": slug,
            "files": [
                { "name": "SKILL.md", "content": "# skill" },
                { "name": "run.sh", "content": "echo ok", "mode": 0o755 }
            ]
        })
    }

    #[test]
    fn install_materializes_and_wraps() {
        let tmp = tempfile::tempdir().unwrap();
        let d = deps(&tmp);
        let reply = handle_install(&install_params("weather"), &d).unwrap();
        assert_eq!(reply.data["installed"], true);
        assert!(tmp
            .path()
            .join(".openclaw/workspace/skills/weather/SKILL.md")
            .exists());
        assert!(tmp.path().join("bin/weather").exists());
    }

    #[test]
    fn reinstall_same_sha_reports_same_address() {
        let tmp = tempfile::tempdir().unwrap();
        let d = deps(&tmp);
        let a = handle_install(&install_params("weather"), &d).unwrap();
        let b = handle_install(&install_params("weather"), &d).unwrap();
        assert_eq!(a.data["sha"], b.data["sha"]);
    }

    #[test]
    fn traversal_file_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let d = deps(&tmp);
        let bad = json!({
            "slug": "evil",
            "files": [{ "name": "../outside.sh", "content": "x" }]
        });
        assert!(matches!(
            handle_install(&bad, &d),
            Err(ShieldError::Validation(_))
        ));
        assert!(!tmp.path().join("outside.sh").exists());
    }

    #[test]
    fn bad_slug_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let d = deps(&tmp);
        let bad = json!({
            "slug": "../up",
            "files": [{ "name": "SKILL.md", "content": "x" }]
        });
        assert!(handle_install(&bad, &d).is_err());
        assert!(matches!(
            handle_uninstall(&json!({ "slug": "a/b" }), &d),
            Err(ShieldError::Validation(_))
        ));
    }

    #[test]
    fn uninstall_reverses_install() {
        let tmp = tempfile::tempdir().unwrap();
        let d = deps(&tmp);
        handle_install(&install_params("weather"), &d).unwrap();
        handle_uninstall(&json!({ "slug": "weather" }), &d).unwrap();
        assert!(!tmp.path().join(".openclaw/workspace/skills/weather").exists());
        assert!(!tmp.path().join("bin/weather").exists());
    }
}
