//! Append-only JSONL audit log.
//!
//! One JSON object per line, flushed per record - the decision trail is
//! worth more than write throughput here. If the file cannot be opened or
//! written, the record goes to stderr instead; the decision path never
//! drops. The writer re-stats the path on each append and reopens when the
//! inode changed underneath it (external logrotate).

use agenshield_core::protocol::AuditEntry;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct Writer {
    file: Option<File>,
    inode: Option<u64>,
}

/// Single-writer audit sink, shared behind `Arc`.
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<Writer>,
}

#[cfg(unix)]
fn inode_of(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.ino())
}

#[cfg(not(unix))]
fn inode_of(_path: &Path) -> Option<u64> {
    None
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(Writer {
                file: None,
                inode: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Never fails: on any I/O error the line is emitted
    /// to stderr.
    pub fn append(&self, entry: &AuditEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("[audit] failed to serialize entry: {}", e);
                return;
            }
        };

        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());

        // Rotation awareness: reopen when the file behind the path changed.
        let current_inode = inode_of(&self.path);
        if guard.file.is_none() || guard.inode != current_inode || current_inode.is_none() {
            guard.file = self.open_file();
            guard.inode = inode_of(&self.path);
        }

        let written = guard
            .file
            .as_mut()
            .map(|f| writeln!(f, "{}", line).and_then(|_| f.flush()))
            .transpose();
        match written {
            Ok(Some(())) => {}
            _ => {
                // Disk failure: fall back to stderr, drop the handle so the
                // next append retries the open.
                guard.file = None;
                guard.inode = None;
                eprintln!("{}", line);
            }
        }
    }

    fn open_file(&self) -> Option<File> {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                eprintln!("[audit] cannot open {}: {}", self.path.display(), e);
                e
            })
            .ok()
    }
}
