//! On-disk command allowlist.
//!
//! When configured, exec requests pass a second, stricter filter after the
//! policy engine: the command's basename must appear in the allowlist file.
//! The file is one command per line, `#` comments allowed; the broker owns
//! it. An absent file disables the filter entirely.

use agenshield_core::error::ShieldError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub struct CommandAllowlist {
    path: PathBuf,
    commands: BTreeSet<String>,
}

impl CommandAllowlist {
    /// Load the allowlist from `path`. Missing file yields `None` - the
    /// caller then skips the second filter.
    pub fn load(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).ok()?;
        let commands = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.to_lowercase())
            .collect();
        Some(Self { path, commands })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Check the first token of a command line against the list.
    pub fn check(&self, command_line: &str) -> Result<(), ShieldError> {
        let first = command_line
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase();
        let base = first.rsplit('/').next().unwrap_or(&first);
        if base.is_empty() {
            return Err(ShieldError::validation("Empty command"));
        }
        if self.commands.contains(base) {
            Ok(())
        } else {
            Err(ShieldError::PolicyDenied {
                policy_id: None,
                target: command_line.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist(content: &str) -> CommandAllowlist {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("allowlist");
        std::fs::write(&path, content).unwrap();
        // Keep tempdir alive through the read, then it can drop.
        CommandAllowlist::load(&path).unwrap()
    }

    #[test]
    fn absent_file_disables_filter() {
        assert!(CommandAllowlist::load("/nonexistent/allowlist").is_none());
    }

    #[test]
    fn basename_and_case_normalized() {
        let list = allowlist("git\ncurl\n# comment\n\n");
        assert_eq!(list.len(), 2);
        assert!(list.check("git push").is_ok());
        assert!(list.check("/usr/bin/GIT status").is_ok());
        assert!(list.check("rm -rf /").is_err());
        assert!(list.check("").is_err());
    }
}
