//! Installed-skill version store.
//!
//! One JSON document keyed by skill id, rewritten atomically. The watcher
//! diffs discovery results against this store to decide installs, updates,
//! and removals.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    pub version: String,
    pub sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub trusted: bool,
}

/// JSON-backed map of installed skills.
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<BTreeMap<String, SkillRecord>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Read version store {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Parse version store {}", self.path.display()))
    }

    pub fn record(&self, skill_id: &str, record: SkillRecord) -> Result<()> {
        let mut map = self.load()?;
        map.insert(skill_id.to_string(), record);
        self.save(&map)
    }

    pub fn remove(&self, skill_id: &str) -> Result<()> {
        let mut map = self.load()?;
        map.remove(skill_id);
        self.save(&map)
    }

    fn save(&self, map: &BTreeMap<String, SkillRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Create store dir {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(map).context("Serialize version store")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).with_context(|| format!("Write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Rename into {}", self.path.display()))?;
        Ok(())
    }
}
