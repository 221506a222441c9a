//! Quarantine for skills that failed analysis.
//!
//! Held bundles are parked as JSON (spec + verdict) in a dedicated
//! directory; nothing from a held bundle is ever materialised. An operator
//! can release (returning the spec for a trusted re-install) or discard.

use crate::analysis::AnalysisVerdict;
use crate::model::SkillSpec;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeldSkill {
    spec: SkillSpec,
    verdict: AnalysisVerdict,
    held_at: DateTime<Utc>,
}

pub struct Quarantine {
    dir: PathBuf,
}

impl Quarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug))
    }

    /// Park a bundle together with the verdict that rejected it.
    pub fn hold(&self, spec: &SkillSpec, verdict: &AnalysisVerdict) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Create quarantine dir {}", self.dir.display()))?;
        let held = HeldSkill {
            spec: spec.clone(),
            verdict: verdict.clone(),
            held_at: Utc::now(),
        };
        let path = self.path_for(&spec.slug);
        std::fs::write(&path, serde_json::to_string_pretty(&held)?)
            .with_context(|| format!("Write quarantined skill {}", path.display()))?;
        tracing::warn!(skill = %spec.slug, "skill held in quarantine");
        Ok(())
    }

    /// Slugs currently held.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut slugs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)?.flatten() {
            let name = entry.file_name();
            if let Some(slug) = name.to_string_lossy().strip_suffix(".json") {
                slugs.push(slug.to_string());
            }
        }
        slugs.sort();
        Ok(slugs)
    }

    /// Take a bundle back out of quarantine (operator-approved).
    pub fn release(&self, slug: &str) -> Result<SkillSpec> {
        let path = self.path_for(slug);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Read quarantined skill {}", path.display()))?;
        let held: HeldSkill = serde_json::from_str(&content)
            .with_context(|| format!("Parse quarantined skill {}", path.display()))?;
        std::fs::remove_file(&path)?;
        Ok(held.spec)
    }

    /// Drop a held bundle permanently.
    pub fn discard(&self, slug: &str) -> Result<()> {
        let path = self.path_for(slug);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SkillFile;

    fn spec() -> SkillSpec {
        SkillSpec {
            slug: "shady".into(),
            files: vec![SkillFile {
                name: "SKILL.md".into(),
                content: "# shady".into(),
                mode: None,
                base64: false,
            }],
            version: None,
            trusted: false,
            source_id: None,
        }
    }

    fn verdict() -> AnalysisVerdict {
        AnalysisVerdict {
            approved: false,
            findings: Vec::new(),
        }
    }

    #[test]
    fn hold_list_release() {
        let tmp = tempfile::tempdir().unwrap();
        let q = Quarantine::new(tmp.path().join("quarantine"));
        assert!(q.list().unwrap().is_empty());

        q.hold(&spec(), &verdict()).unwrap();
        assert_eq!(q.list().unwrap(), vec!["shady".to_string()]);

        let released = q.release("shady").unwrap();
        assert_eq!(released.slug, "shady");
        assert!(q.list().unwrap().is_empty());
    }

    #[test]
    fn discard_is_tolerant() {
        let tmp = tempfile::tempdir().unwrap();
        let q = Quarantine::new(tmp.path().join("quarantine"));
        q.discard("never-held").unwrap();
        q.hold(&spec(), &verdict()).unwrap();
        q.discard("shady").unwrap();
        assert!(q.list().unwrap().is_empty());
    }
}
