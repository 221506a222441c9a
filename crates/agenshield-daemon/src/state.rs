//! Daemon config persistence.
//!
//! One JSON document under `~/.agenshield/daemon.json`, written via temp
//! file + atomic rename. The daemon is the exclusive owner; the broker only
//! ever sees pushed copies.

use agenshield_policy::Policy;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

const DOCUMENT_VERSION: u32 = 1;

/// The persisted daemon state: policies plus free-form UI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonDocument {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl Default for DaemonDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            updated_at: Utc::now(),
            policies: Vec::new(),
            settings: BTreeMap::new(),
        }
    }
}

/// Serialised access to the on-disk document.
pub struct ConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the document; a missing file is the default document.
    pub fn load(&self) -> Result<DaemonDocument> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.load_unlocked()
    }

    fn load_unlocked(&self) -> Result<DaemonDocument> {
        if !self.path.exists() {
            return Ok(DaemonDocument::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Read daemon config {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Parse daemon config {}", self.path.display()))
    }

    /// Persist atomically, stamping `updated_at`.
    pub fn save(&self, mut doc: DaemonDocument) -> Result<DaemonDocument> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        doc.version = DOCUMENT_VERSION;
        doc.updated_at = Utc::now();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Create config dir {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&doc).context("Serialize daemon config")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).with_context(|| format!("Write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Rename into {}", self.path.display()))?;
        Ok(doc)
    }

    /// Read-modify-write under the store lock.
    pub fn update<F>(&self, mutate: F) -> Result<DaemonDocument>
    where
        F: FnOnce(&mut DaemonDocument),
    {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.load_unlocked()?;
        mutate(&mut doc);
        doc.version = DOCUMENT_VERSION;
        doc.updated_at = Utc::now();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&doc).context("Serialize daemon config")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(doc)
    }
}
