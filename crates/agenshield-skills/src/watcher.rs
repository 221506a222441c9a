//! Skill directory watcher.
//!
//! Polls the authoritative skills directory for subdirectories containing
//! `SKILL.md`, hashes each one (file names and contents, sorted by relative
//! path), and diffs against the version store to produce an install/update/
//! remove plan. Event-driven watching can layer on top; the poll is the
//! correctness baseline.

use crate::model::{validate_slug, SkillFile, SkillSpec};
use crate::version_store::VersionStore;
use anyhow::{Context, Result};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A skill found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredSkill {
    pub slug: String,
    pub dir: PathBuf,
    pub sha: String,
}

/// One element of the watcher's plan.
#[derive(Debug, Clone)]
pub enum SkillChange {
    Install(DiscoveredSkill),
    Update(DiscoveredSkill),
    Remove(String),
}

/// Collect a skill directory's files sorted by relative path.
fn collect_files(dir: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> Result<()> {
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Read skill dir {}", dir.display()))?
            .flatten()
        {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else if path.is_file() {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string();
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("Read skill file {}", path.display()))?;
                out.push((rel, bytes));
            }
        }
        Ok(())
    }
    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Hash a skill directory: `name||content` per file, sorted by name.
pub fn hash_skill_dir(dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for (name, bytes) in collect_files(dir)? {
        hasher.update(name.as_bytes());
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Load a discovered skill directory into a wire bundle. Binary files are
/// carried base64-encoded.
pub fn load_spec(dir: &Path, slug: &str, trusted: bool) -> Result<SkillSpec> {
    let mut files = Vec::new();
    for (name, bytes) in collect_files(dir)? {
        let (content, is_base64) = match String::from_utf8(bytes) {
            Ok(text) => (text, false),
            Err(e) => (
                base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
                true,
            ),
        };
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::metadata(dir.join(&name))
                .ok()
                .map(|m| m.permissions().mode() & 0o7777)
        };
        #[cfg(not(unix))]
        let mode = None;
        files.push(SkillFile {
            name,
            content,
            mode,
            base64: is_base64,
        });
    }
    Ok(SkillSpec {
        slug: slug.to_string(),
        files,
        version: None,
        trusted,
        source_id: None,
    })
}

/// Poll-based watcher over one skills directory.
pub struct SkillWatcher {
    skills_dir: PathBuf,
    store: VersionStore,
}

impl SkillWatcher {
    pub fn new(skills_dir: impl Into<PathBuf>, store: VersionStore) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            store,
        }
    }

    /// Discover every skill directory (contains `SKILL.md`, slug-shaped
    /// name) under the watched root, sorted by slug.
    pub fn discover(&self) -> Result<Vec<DiscoveredSkill>> {
        let mut found = Vec::new();
        if !self.skills_dir.is_dir() {
            return Ok(found);
        }
        let mut entries: Vec<_> = std::fs::read_dir(&self.skills_dir)
            .with_context(|| format!("Read skills dir {}", self.skills_dir.display()))?
            .flatten()
            .collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let dir = entry.path();
            if !dir.is_dir() || !dir.join("SKILL.md").exists() {
                continue;
            }
            let slug = entry.file_name().to_string_lossy().to_string();
            if validate_slug(&slug).is_err() {
                tracing::warn!(dir = %dir.display(), "skipping directory with invalid slug");
                continue;
            }
            let sha = hash_skill_dir(&dir)?;
            found.push(DiscoveredSkill { slug, dir, sha });
        }
        Ok(found)
    }

    /// Diff discovery against the version store.
    pub fn scan(&self) -> Result<Vec<SkillChange>> {
        let discovered = self.discover()?;
        let recorded = self.store.load()?;
        let mut changes = Vec::new();

        for skill in &discovered {
            match recorded.get(&skill.slug) {
                None => changes.push(SkillChange::Install(skill.clone())),
                Some(record) if record.sha != skill.sha => {
                    changes.push(SkillChange::Update(skill.clone()))
                }
                Some(_) => {}
            }
        }
        for slug in recorded.keys() {
            if !discovered.iter().any(|s| &s.slug == slug) {
                changes.push(SkillChange::Remove(slug.clone()));
            }
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version_store::SkillRecord;
    use chrono::Utc;

    fn write_skill(root: &Path, slug: &str, body: &str) {
        let dir = root.join(slug);
        std::fs::create_dir_all(dir.join("scripts")).unwrap();
        std::fs::write(dir.join("SKILL.md"), format!("# {}", slug)).unwrap();
        std::fs::write(dir.join("scripts/run.sh"), body).unwrap();
    }

    #[test]
    fn discovers_only_skill_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "weather", "echo");
        std::fs::create_dir_all(tmp.path().join("not-a-skill")).unwrap();
        std::fs::write(tmp.path().join("loose-file"), "x").unwrap();

        let watcher = SkillWatcher::new(tmp.path(), VersionStore::new(tmp.path().join("v.json")));
        let found = watcher.discover().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "weather");
    }

    #[test]
    fn hash_tracks_content() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "weather", "v1");
        let before = hash_skill_dir(&tmp.path().join("weather")).unwrap();
        std::fs::write(tmp.path().join("weather/scripts/run.sh"), "v2").unwrap();
        let after = hash_skill_dir(&tmp.path().join("weather")).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn scan_plans_install_update_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VersionStore::new(tmp.path().join("versions.json"));
        write_skill(tmp.path(), "fresh", "echo");
        write_skill(tmp.path(), "changed", "v2");
        store
            .record(
                "changed",
                SkillRecord {
                    version: "1".into(),
                    sha: "stale-sha".into(),
                    source_id: None,
                    installed_at: Utc::now(),
                    trusted: false,
                },
            )
            .unwrap();
        store
            .record(
                "gone",
                SkillRecord {
                    version: "1".into(),
                    sha: "x".into(),
                    source_id: None,
                    installed_at: Utc::now(),
                    trusted: false,
                },
            )
            .unwrap();

        let watcher =
            SkillWatcher::new(tmp.path(), VersionStore::new(tmp.path().join("versions.json")));
        let changes = watcher.scan().unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes
            .iter()
            .any(|c| matches!(c, SkillChange::Install(s) if s.slug == "fresh")));
        assert!(changes
            .iter()
            .any(|c| matches!(c, SkillChange::Update(s) if s.slug == "changed")));
        assert!(changes
            .iter()
            .any(|c| matches!(c, SkillChange::Remove(slug) if slug == "gone")));
    }

    #[test]
    fn unchanged_skill_produces_no_change() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "stable", "same");
        let sha = hash_skill_dir(&tmp.path().join("stable")).unwrap();
        let store = VersionStore::new(tmp.path().join("versions.json"));
        store
            .record(
                "stable",
                SkillRecord {
                    version: "1".into(),
                    sha,
                    source_id: None,
                    installed_at: Utc::now(),
                    trusted: true,
                },
            )
            .unwrap();
        let watcher =
            SkillWatcher::new(tmp.path(), VersionStore::new(tmp.path().join("versions.json")));
        assert!(watcher.scan().unwrap().is_empty());
    }

    #[test]
    fn load_spec_roundtrips_text_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "weather", "echo hi");
        let spec = load_spec(&tmp.path().join("weather"), "weather", true).unwrap();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.files.len(), 2);
        assert!(spec.files.iter().any(|f| f.name == "SKILL.md"));
        assert!(spec
            .files
            .iter()
            .any(|f| f.name == "scripts/run.sh" && f.content == "echo hi"));
    }
}
