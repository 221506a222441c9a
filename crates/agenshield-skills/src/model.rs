//! Skill bundle model and validation.

use agenshield_core::error::ShieldError;
use agenshield_core::path_validation::validate_relative_name;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Slug shape: alphanumeric start, then alphanumerics, `_`, `-`.
fn slug_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new("^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap())
}

/// Validate a skill slug. Traversal characters can never pass the regex,
/// but the explicit checks keep the error messages useful.
pub fn validate_slug(slug: &str) -> Result<(), ShieldError> {
    if slug.is_empty() {
        return Err(ShieldError::validation("Skill slug must not be empty"));
    }
    if slug.contains("..") || slug.contains('/') {
        return Err(ShieldError::validation(format!(
            "Skill slug must not contain path separators: {}",
            slug
        )));
    }
    if !slug_regex().is_match(slug) {
        return Err(ShieldError::validation(format!(
            "Invalid skill slug: {}",
            slug
        )));
    }
    Ok(())
}

/// One file inside a skill bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillFile {
    /// Relative path inside the skill directory.
    pub name: String,
    /// File body; base64-encoded when `base64` is set.
    pub content: String,
    /// Unix mode, e.g. 0o755 for scripts. Defaults to 0644.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub base64: bool,
}

impl SkillFile {
    /// Decoded file bytes.
    pub fn bytes(&self) -> Result<Vec<u8>, ShieldError> {
        if self.base64 {
            base64::engine::general_purpose::STANDARD
                .decode(self.content.as_bytes())
                .map_err(|e| ShieldError::validation(format!("Invalid base64 in {}: {}", self.name, e)))
        } else {
            Ok(self.content.clone().into_bytes())
        }
    }
}

/// A validated skill bundle as it crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSpec {
    pub slug: String,
    pub files: Vec<SkillFile>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub trusted: bool,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl SkillSpec {
    /// Validate slug and every file name.
    pub fn validate(&self) -> Result<(), ShieldError> {
        validate_slug(&self.slug)?;
        if self.files.is_empty() {
            return Err(ShieldError::validation("Skill must contain at least one file"));
        }
        for file in &self.files {
            validate_relative_name(&file.name)?;
        }
        Ok(())
    }

    /// Content hash: files sorted by name, each contributing `name||content`.
    pub fn sha256(&self) -> Result<String, ShieldError> {
        let mut files: Vec<&SkillFile> = self.files.iter().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        let mut hasher = Sha256::new();
        for file in files {
            hasher.update(file.name.as_bytes());
            hasher.update(file.bytes()?);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}
