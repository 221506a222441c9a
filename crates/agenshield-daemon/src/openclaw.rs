//! Managed openclaw.json entries.
//!
//! The daemon is the sole writer of the agent's `openclaw.json`; the broker
//! materialises skill files but never touches this document. Entries are
//! keyed by slug under `skills`.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

fn openclaw_path(agent_home: &Path) -> PathBuf {
    agent_home.join(".openclaw").join("openclaw.json")
}

fn load(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(json!({ "skills": {} }));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Parse {}", path.display()))
}

fn save(path: &Path, doc: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Register (or refresh) a skill entry.
pub fn add_entry(agent_home: &Path, slug: &str, sha: &str) -> Result<()> {
    let path = openclaw_path(agent_home);
    let mut doc = load(&path)?;
    if !doc.get("skills").map(|s| s.is_object()).unwrap_or(false) {
        doc["skills"] = json!({});
    }
    doc["skills"][slug] = json!({
        "enabled": true,
        "sha": sha,
        "installedAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    });
    save(&path, &doc)
}

/// Remove a skill entry. Missing entries are fine.
pub fn remove_entry(agent_home: &Path, slug: &str) -> Result<()> {
    let path = openclaw_path(agent_home);
    let mut doc = load(&path)?;
    if let Some(skills) = doc.get_mut("skills").and_then(|s| s.as_object_mut()) {
        skills.remove(slug);
    }
    save(&path, &doc)
}

/// Slugs currently registered.
pub fn entries(agent_home: &Path) -> Result<Vec<String>> {
    let doc = load(&openclaw_path(agent_home))?;
    Ok(doc
        .get("skills")
        .and_then(|s| s.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default())
}
