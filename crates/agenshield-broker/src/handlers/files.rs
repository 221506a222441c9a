//! `file_read` / `file_write` / `file_list`.
//!
//! Paths must be absolute; dispatch already ran the policy check on the
//! normalised path. Writes stage into a sibling temp file and rename, so a
//! failed write leaves the previous content intact.

use super::{parse_params, Reply};
use agenshield_core::error::ShieldError;
use agenshield_core::path_validation::normalize_absolute;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
}

pub fn handle_read(params: &Value) -> Result<Reply, ShieldError> {
    let p: ReadParams = parse_params(params)?;
    let path = normalize_absolute(&p.path)?;
    let content = std::fs::read_to_string(&path).map_err(map_io(&path))?;
    let size = content.len();
    Ok(Reply::with_metadata(
        json!({ "content": content, "size": size }),
        json!({ "bytes": size }),
    ))
}

#[derive(Debug, Deserialize)]
struct WriteParams {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

pub fn handle_write(params: &Value) -> Result<Reply, ShieldError> {
    let p: WriteParams = parse_params(params)?;
    let path = normalize_absolute(&p.path)?;

    if p.append {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(map_io(&path))?;
        file.write_all(p.content.as_bytes()).map_err(map_io(&path))?;
    } else {
        // Stage + rename: a failure at any point leaves the original file.
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, p.content.as_bytes()).map_err(map_io(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            map_io(&path)(e)
        })?;
    }

    Ok(Reply::with_metadata(
        json!({ "written": p.content.len() }),
        json!({ "bytes": p.content.len(), "append": p.append }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    path: String,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    pattern: Option<String>,
}

pub fn handle_list(params: &Value) -> Result<Reply, ShieldError> {
    let p: ListParams = parse_params(params)?;
    let path = normalize_absolute(&p.path)?;
    let matcher = match p.pattern {
        Some(ref pat) => Some(
            glob::Pattern::new(pat)
                .map_err(|e| ShieldError::validation(format!("Invalid glob pattern: {}", e)))?,
        ),
        None => None,
    };

    let mut entries = Vec::new();
    collect_entries(&path, p.recursive, &matcher, &mut entries)?;
    entries.sort_by(|a, b| a["path"].as_str().cmp(&b["path"].as_str()));
    let count = entries.len();
    Ok(Reply::with_metadata(
        json!({ "entries": entries }),
        json!({ "count": count }),
    ))
}

fn collect_entries(
    dir: &Path,
    recursive: bool,
    matcher: &Option<glob::Pattern>,
    out: &mut Vec<Value>,
) -> Result<(), ShieldError> {
    let reader = std::fs::read_dir(dir).map_err(map_io(dir))?;
    for entry in reader.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = path.is_dir();
        let keep = matcher.as_ref().map(|m| m.matches(&name)).unwrap_or(true);
        if keep {
            let size = if is_dir {
                0
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            };
            out.push(json!({
                "name": name,
                "path": path.to_string_lossy(),
                "isDir": is_dir,
                "size": size,
            }));
        }
        if recursive && is_dir {
            collect_entries(&path, true, matcher, out)?;
        }
    }
    Ok(())
}

fn map_io(path: &Path) -> impl Fn(std::io::Error) -> ShieldError + '_ {
    move |e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            ShieldError::NotFound(format!("Path {}", path.display()))
        }
        _ => ShieldError::internal(format!("{}: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_write_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("note.txt");
        handle_write(&json!({ "path": file.to_str().unwrap(), "content": "hello" })).unwrap();
        let reply =
            handle_read(&json!({ "path": file.to_str().unwrap() })).unwrap();
        assert_eq!(reply.data["content"], "hello");
    }

    #[test]
    fn append_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("log.txt");
        let path = file.to_str().unwrap();
        handle_write(&json!({ "path": path, "content": "a" })).unwrap();
        handle_write(&json!({ "path": path, "content": "b", "append": true })).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "ab");
    }

    #[test]
    fn relative_paths_rejected() {
        assert!(matches!(
            handle_read(&json!({ "path": "relative.txt" })),
            Err(ShieldError::Validation(_))
        ));
        assert!(matches!(
            handle_write(&json!({ "path": "relative.txt", "content": "" })),
            Err(ShieldError::Validation(_))
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.txt");
        assert!(matches!(
            handle_read(&json!({ "path": missing.to_str().unwrap() })),
            Err(ShieldError::NotFound(_))
        ));
    }

    #[test]
    fn failed_write_preserves_previous_content() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("keep.txt");
        let path = file.to_str().unwrap().to_string();
        handle_write(&json!({ "path": path, "content": "original" })).unwrap();
        // Writing over a path whose parent vanished must not clobber: use a
        // directory as the target to force the rename to fail.
        let dir_target = tmp.path().join("adir");
        std::fs::create_dir(&dir_target).unwrap();
        let result = handle_write(&json!({
            "path": dir_target.to_str().unwrap(),
            "content": "new"
        }));
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");
    }

    #[test]
    fn list_with_pattern_and_recursion() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("a.rs"), "x").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("sub/c.rs"), "x").unwrap();

        let flat = handle_list(&json!({
            "path": tmp.path().to_str().unwrap(),
            "pattern": "*.rs"
        }))
        .unwrap();
        let entries = flat.data["entries"].as_array().unwrap().clone();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "a.rs");

        let deep = handle_list(&json!({
            "path": tmp.path().to_str().unwrap(),
            "pattern": "*.rs",
            "recursive": true
        }))
        .unwrap();
        assert_eq!(deep.data["entries"].as_array().unwrap().len(), 2);
    }
}
