//! Encrypted at-rest secret storage.
//!
//! One JSON document of AES-256-GCM envelopes, keyed by secret name, with a
//! per-install 32-byte key stored mode 0600 beside the vault. The read path
//! gives no oracle: a torn document, an unparsable envelope, and a failed
//! tag check all surface as [`VaultError::Corrupt`].

pub mod passcode;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

const VAULT_VERSION: u32 = 1;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Vault failure modes. `Corrupt` deliberately covers every decrypt-side
/// cause so callers cannot distinguish a wrong tag from mangled ciphertext.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("secret {0} not found")]
    NotFound(String),

    #[error("vault data is corrupt or the key does not match")]
    Corrupt,

    #[error("vault I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultEntry {
    encrypted: String,
    iv: String,
    tag: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    access_count: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    secrets: BTreeMap<String, VaultEntry>,
}

fn default_version() -> u32 {
    VAULT_VERSION
}

/// The daemon's secret store. All operations serialise on an internal mutex;
/// the file is rewritten atomically after every mutation.
pub struct Vault {
    path: PathBuf,
    key: [u8; KEY_LEN],
    lock: Mutex<()>,
}

impl Vault {
    /// Open (or create) the vault at `path`. The key file lives beside it
    /// with a `.key` extension; 32 random bytes are generated and persisted
    /// mode 0600 on first open.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let path = path.into();
        let key_path = key_path_for(&path);
        let key = load_or_create_key(&key_path)?;
        Ok(Self {
            path,
            key,
            lock: Mutex::new(()),
        })
    }

    /// Decrypt a secret, bump its access count, and rewrite the store.
    pub fn get(&self, name: &str) -> Result<String, VaultError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.read_document()?;
        let entry = doc
            .secrets
            .get_mut(name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;

        let plaintext = decrypt_entry(&self.key, entry)?;
        entry.access_count += 1;
        self.write_document(&doc)?;
        Ok(plaintext)
    }

    /// Encrypt and store a secret under `name` with a fresh IV.
    pub fn set(&self, name: &str, value: &str) -> Result<(), VaultError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.read_document()?;

        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), value.as_bytes())
            .map_err(|_| VaultError::Corrupt)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        doc.secrets.insert(
            name.to_string(),
            VaultEntry {
                encrypted: hex::encode(ciphertext),
                iv: hex::encode(iv),
                tag: hex::encode(tag),
                created_at: Utc::now(),
                access_count: 0,
            },
        );
        self.write_document(&doc)
    }

    /// Remove a secret. Missing names are reported as [`VaultError::NotFound`].
    pub fn delete(&self, name: &str) -> Result<(), VaultError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.read_document()?;
        if doc.secrets.remove(name).is_none() {
            return Err(VaultError::NotFound(name.to_string()));
        }
        self.write_document(&doc)
    }

    /// Names only - values never leave `get`.
    pub fn list(&self) -> Result<Vec<String>, VaultError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let doc = self.read_document()?;
        Ok(doc.secrets.keys().cloned().collect())
    }

    fn read_document(&self) -> Result<VaultDocument, VaultError> {
        if !self.path.exists() {
            return Ok(VaultDocument::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|_| VaultError::Corrupt)
    }

    fn write_document(&self, doc: &VaultDocument) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(doc).map_err(|_| VaultError::Corrupt)?;
        let tmp = self.path.with_extension("enc.tmp");
        std::fs::write(&tmp, content)?;
        restrict_mode(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn key_path_for(vault_path: &Path) -> PathBuf {
    vault_path.with_extension("key")
}

fn load_or_create_key(key_path: &Path) -> Result<[u8; KEY_LEN], VaultError> {
    if key_path.exists() {
        let raw = std::fs::read_to_string(key_path)?;
        let bytes = hex::decode(raw.trim()).map_err(|_| VaultError::Corrupt)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::Corrupt)?;
        return Ok(key);
    }
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    if let Some(parent) = key_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(key_path, hex::encode(key))?;
    restrict_mode(key_path)?;
    Ok(key)
}

#[cfg(unix)]
fn restrict_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn decrypt_entry(key: &[u8; KEY_LEN], entry: &VaultEntry) -> Result<String, VaultError> {
    let ciphertext = hex::decode(&entry.encrypted).map_err(|_| VaultError::Corrupt)?;
    let iv = hex::decode(&entry.iv).map_err(|_| VaultError::Corrupt)?;
    let tag = hex::decode(&entry.tag).map_err(|_| VaultError::Corrupt)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::Corrupt);
    }
    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
        .map_err(|_| VaultError::Corrupt)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::Corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_vault() -> (tempfile::TempDir, Vault) {
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::open(tmp.path().join("vault.enc")).unwrap();
        (tmp, vault)
    }

    #[test]
    fn set_get_roundtrip() {
        let (_tmp, vault) = temp_vault();
        vault.set("API_KEY", "sk-123").unwrap();
        assert_eq!(vault.get("API_KEY").unwrap(), "sk-123");
    }

    #[test]
    fn get_bumps_access_count() {
        let (tmp, vault) = temp_vault();
        vault.set("X", "v").unwrap();
        vault.get("X").unwrap();
        vault.get("X").unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("vault.enc")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["secrets"]["X"]["accessCount"], 2);
    }

    #[test]
    fn missing_file_is_empty_vault() {
        let (_tmp, vault) = temp_vault();
        assert!(vault.list().unwrap().is_empty());
        assert!(matches!(vault.get("nope"), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn values_not_stored_in_plaintext() {
        let (tmp, vault) = temp_vault();
        vault.set("TOKEN", "hunter2-plaintext").unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("vault.enc")).unwrap();
        assert!(!raw.contains("hunter2-plaintext"));
    }

    #[test]
    fn tampered_ciphertext_is_corrupt_without_oracle() {
        let (tmp, vault) = temp_vault();
        vault.set("X", "value").unwrap();
        let path = tmp.path().join("vault.enc");
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        // Flip the tag and the ciphertext independently; both must read as
        // the same error kind.
        let orig = doc["secrets"]["X"].clone();
        doc["secrets"]["X"]["tag"] = serde_json::json!(hex::encode([0u8; 16]));
        std::fs::write(&path, doc.to_string()).unwrap();
        assert!(matches!(vault.get("X"), Err(VaultError::Corrupt)));

        doc["secrets"]["X"] = orig;
        doc["secrets"]["X"]["encrypted"] = serde_json::json!("00ff00ff");
        std::fs::write(&path, doc.to_string()).unwrap();
        assert!(matches!(vault.get("X"), Err(VaultError::Corrupt)));
    }

    #[test]
    fn delete_removes_entry() {
        let (_tmp, vault) = temp_vault();
        vault.set("A", "1").unwrap();
        vault.delete("A").unwrap();
        assert!(matches!(vault.get("A"), Err(VaultError::NotFound(_))));
        assert!(matches!(vault.delete("A"), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn key_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vault.enc");
        {
            let vault = Vault::open(&path).unwrap();
            vault.set("K", "persisted").unwrap();
        }
        let vault = Vault::open(&path).unwrap();
        assert_eq!(vault.get("K").unwrap(), "persisted");
    }

    #[cfg(unix)]
    #[test]
    fn key_file_mode_is_0600() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vault.enc");
        let _vault = Vault::open(&path).unwrap();
        let mode = std::fs::metadata(tmp.path().join("vault.key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
