//! Path validation utilities.
//!
//! File operations mediated by the broker only accept absolute paths, and
//! skill file names must stay inside the skill directory. Normalisation is
//! lexical: the target may not exist yet (file_write), so `canonicalize`
//! is not an option.

use crate::error::ShieldError;
use std::path::{Component, Path, PathBuf};

/// Normalise an absolute path lexically: resolve `.` and `..`, strip any
/// trailing slash. Rejects relative paths and `..` escapes above the root.
pub fn normalize_absolute(path: &str) -> Result<PathBuf, ShieldError> {
    let p = Path::new(path.trim());
    if !p.is_absolute() {
        return Err(ShieldError::validation(format!(
            "Path must be absolute: {}",
            path
        )));
    }
    let mut out = PathBuf::from("/");
    for comp in p.components() {
        match comp {
            Component::RootDir | Component::Prefix(_) => {}
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    out = PathBuf::from("/");
                }
            }
            Component::Normal(c) => out.push(c),
        }
    }
    Ok(out)
}

/// Validate a skill-relative file name: rejects empty names, traversal
/// segments, and leading slashes.
pub fn validate_relative_name(name: &str) -> Result<(), ShieldError> {
    if name.is_empty() {
        return Err(ShieldError::validation("File name must not be empty"));
    }
    if name.starts_with('/') {
        return Err(ShieldError::validation(format!(
            "File name must be relative: {}",
            name
        )));
    }
    let has_traversal = Path::new(name)
        .components()
        .any(|c| matches!(c, Component::ParentDir));
    if has_traversal || name.contains("..") {
        return Err(ShieldError::validation(format!(
            "File name must not contain traversal segments: {}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(
            normalize_absolute("/usr/bin/../lib/./x").unwrap(),
            PathBuf::from("/usr/lib/x")
        );
        assert_eq!(
            normalize_absolute("/etc/passwd/").unwrap(),
            PathBuf::from("/etc/passwd")
        );
    }

    #[test]
    fn parent_escape_clamps_to_root() {
        assert_eq!(
            normalize_absolute("/../../etc").unwrap(),
            PathBuf::from("/etc")
        );
    }

    #[test]
    fn rejects_relative() {
        assert!(normalize_absolute("etc/passwd").is_err());
    }

    #[test]
    fn rejects_traversal_names() {
        assert!(validate_relative_name("../evil.sh").is_err());
        assert!(validate_relative_name("a/../../b").is_err());
        assert!(validate_relative_name("/abs").is_err());
        assert!(validate_relative_name("").is_err());
        assert!(validate_relative_name("scripts/run.sh").is_ok());
    }
}
