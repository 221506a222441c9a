//! Skill synchronisation loop.
//!
//! Each tick: diff the authoritative skills directory against the version
//! store, drive the installer for installs/updates/removals, keep the
//! agent's openclaw.json and the skill policies in step, and emit events
//! for the UI stream. The broker applies the bundles through the
//! [`SocketSkillBackend`].

use crate::openclaw;
use crate::state::ConfigStore;
use agenshield_core::protocol::ShieldEvent;
use agenshield_policy::{Policy, PolicyAction, PolicyTarget};
use agenshield_skills::installer::{Installer, SkillBackend};
use agenshield_skills::watcher::{load_spec, SkillChange, SkillWatcher};
use agenshield_skills::SkillSpec;
use anyhow::{Context, Result};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Applies skill bundles by calling the broker over its socket.
pub struct SocketSkillBackend {
    socket_path: PathBuf,
}

impl SocketSkillBackend {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    fn call(&self, method: &str, params: serde_json::Value) -> Result<()> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        });
        let stream = UnixStream::connect(&self.socket_path)
            .with_context(|| format!("Connect broker {}", self.socket_path.display()))?;
        stream.set_read_timeout(Some(Duration::from_secs(30)))?;
        let mut writer = stream.try_clone()?;
        writeln!(writer, "{}", request)?;
        writer.flush()?;
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line)?;
        let response: serde_json::Value =
            serde_json::from_str(line.trim()).context("Parse broker response")?;
        if let Some(error) = response.get("error") {
            anyhow::bail!("broker refused {}: {}", method, error);
        }
        Ok(())
    }
}

impl SkillBackend for SocketSkillBackend {
    fn install(&self, spec: &SkillSpec) -> Result<()> {
        self.call("skill_install", serde_json::to_value(spec)?)
    }

    fn uninstall(&self, slug: &str) -> Result<()> {
        self.call("skill_uninstall", json!({ "slug": slug }))
    }
}

fn skill_policy_name(slug: &str) -> String {
    format!("Allow skill {}", slug)
}

/// The builtin allow policy registered for an installed skill.
fn skill_policy(slug: &str) -> Policy {
    let mut policy = Policy::new(
        skill_policy_name(slug),
        PolicyAction::Allow,
        PolicyTarget::Command,
        vec![slug.to_string(), format!("{}:*", slug)],
    );
    policy.priority = 5;
    policy
}

/// One synchronisation pass. Returns the events to publish.
pub fn sync_once(
    watcher: &SkillWatcher,
    installer: &Installer,
    agent_home: &Path,
    config: &ConfigStore,
) -> Result<Vec<ShieldEvent>> {
    let mut events = Vec::new();
    for change in watcher.scan()? {
        match change {
            SkillChange::Install(found) | SkillChange::Update(found) => {
                let spec = load_spec(&found.dir, &found.slug, false)?;
                match installer.install(&spec) {
                    Ok(outcome) if outcome.installed => {
                        openclaw::add_entry(agent_home, &found.slug, &outcome.sha)?;
                        config.update(|doc| {
                            let name = skill_policy_name(&found.slug);
                            if !doc.policies.iter().any(|p| p.name == name) {
                                doc.policies.push(skill_policy(&found.slug));
                            }
                        })?;
                        if let Some(event) = outcome.event {
                            events.push(event);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(skill = %found.slug, error = %e, "skill install failed");
                        events.push(ShieldEvent::new(
                            "skills:install_failed",
                            json!({ "slug": found.slug, "error": e.to_string() }),
                        ));
                    }
                }
            }
            SkillChange::Remove(slug) => {
                match installer.uninstall(&slug) {
                    Ok(event) => {
                        openclaw::remove_entry(agent_home, &slug)?;
                        config.update(|doc| {
                            let name = skill_policy_name(&slug);
                            doc.policies.retain(|p| p.name != name);
                        })?;
                        events.extend(event);
                    }
                    Err(e) => {
                        tracing::warn!(skill = %slug, error = %e, "skill uninstall failed");
                    }
                }
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenshield_skills::analysis::TrustingAnalyzer;
    use agenshield_skills::quarantine::Quarantine;
    use agenshield_skills::version_store::VersionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingBackend {
        installs: AtomicUsize,
        uninstalls: AtomicUsize,
    }

    struct RecordingBackendHandle(Arc<RecordingBackend>);

    impl SkillBackend for RecordingBackendHandle {
        fn install(&self, _spec: &SkillSpec) -> Result<()> {
            self.0.installs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn uninstall(&self, _slug: &str) -> Result<()> {
            self.0.uninstalls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        tmp: tempfile::TempDir,
        backend: Arc<RecordingBackend>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tmp: tempfile::tempdir().unwrap(),
                backend: Arc::new(RecordingBackend::default()),
            }
        }

        fn skills_dir(&self) -> PathBuf {
            self.tmp.path().join("skills")
        }

        fn watcher(&self) -> SkillWatcher {
            SkillWatcher::new(
                self.skills_dir(),
                VersionStore::new(self.tmp.path().join("versions.json")),
            )
        }

        fn installer(&self) -> Installer {
            Installer::new(
                VersionStore::new(self.tmp.path().join("versions.json")),
                Quarantine::new(self.tmp.path().join("quarantine")),
                Box::new(TrustingAnalyzer),
                Box::new(RecordingBackendHandle(self.backend.clone())),
            )
        }

        fn config(&self) -> ConfigStore {
            ConfigStore::new(self.tmp.path().join("daemon.json"))
        }

        fn write_skill(&self, slug: &str, body: &str) {
            let dir = self.skills_dir().join(slug);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("SKILL.md"), format!("# {}", slug)).unwrap();
            std::fs::write(dir.join("run.sh"), body).unwrap();
        }
    }

    #[test]
    fn install_registers_openclaw_and_policy() {
        let f = Fixture::new();
        f.write_skill("weather", "echo");
        let events = sync_once(
            &f.watcher(),
            &f.installer(),
            f.tmp.path(),
            &f.config(),
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "skills:installed");
        assert_eq!(f.backend.installs.load(Ordering::SeqCst), 1);
        assert_eq!(openclaw::entries(f.tmp.path()).unwrap(), vec!["weather"]);
        let doc = f.config().load().unwrap();
        assert!(doc.policies.iter().any(|p| p.name == "Allow skill weather"));
    }

    #[test]
    fn second_tick_is_quiet() {
        let f = Fixture::new();
        f.write_skill("weather", "echo");
        sync_once(&f.watcher(), &f.installer(), f.tmp.path(), &f.config()).unwrap();
        let events =
            sync_once(&f.watcher(), &f.installer(), f.tmp.path(), &f.config()).unwrap();
        assert!(events.is_empty());
        assert_eq!(f.backend.installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removal_reverses_registration() {
        let f = Fixture::new();
        f.write_skill("weather", "echo");
        sync_once(&f.watcher(), &f.installer(), f.tmp.path(), &f.config()).unwrap();

        std::fs::remove_dir_all(f.skills_dir().join("weather")).unwrap();
        let events =
            sync_once(&f.watcher(), &f.installer(), f.tmp.path(), &f.config()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "skills:uninstalled");
        assert!(openclaw::entries(f.tmp.path()).unwrap().is_empty());
        assert!(f
            .config()
            .load()
            .unwrap()
            .policies
            .iter()
            .all(|p| p.name != "Allow skill weather"));
        assert_eq!(f.backend.uninstalls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn changed_skill_reinstalls() {
        let f = Fixture::new();
        f.write_skill("weather", "v1");
        sync_once(&f.watcher(), &f.installer(), f.tmp.path(), &f.config()).unwrap();
        f.write_skill("weather", "v2");
        let events =
            sync_once(&f.watcher(), &f.installer(), f.tmp.path(), &f.config()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(f.backend.installs.load(Ordering::SeqCst), 2);
    }
}
