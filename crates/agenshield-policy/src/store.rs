//! On-disk policy store.
//!
//! A single JSON document `{version, policies: [...]}` owned by the daemon;
//! the broker loads it at start-up and receives subsequent sets over the
//! push channel. Writes go through a temp file and an atomic rename.

use crate::model::Policy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PolicyDocument {
    version: u32,
    policies: Vec<Policy>,
}

/// Load policies from `path`. A missing file is an empty set.
pub fn load_policies(path: &Path) -> Result<Vec<Policy>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Read policy store {}", path.display()))?;
    let doc: PolicyDocument = serde_json::from_str(&content)
        .with_context(|| format!("Parse policy store {}", path.display()))?;
    Ok(doc.policies)
}

/// Persist policies to `path` atomically.
pub fn save_policies(path: &Path, policies: &[Policy]) -> Result<()> {
    let doc = PolicyDocument {
        version: STORE_VERSION,
        policies: policies.to_vec(),
    };
    let content = serde_json::to_string_pretty(&doc).context("Serialize policy store")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Create policy dir {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).with_context(|| format!("Write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Rename into {}", path.display()))?;
    Ok(())
}
