//! Passcode subvault.
//!
//! Stores a single PBKDF2-HMAC-SHA512 hash as `iterations:salt:hash` (hex
//! fields) in its own file beside the vault. Verification is constant-time.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;

use crate::VaultError;

const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct PasscodeDocument {
    hash: String,
}

/// The daemon's passcode store. Absent file means no passcode is configured.
pub struct PasscodeVault {
    path: PathBuf,
}

impl PasscodeVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Whether a passcode has been configured.
    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    /// Hash and persist a new passcode, replacing any existing one.
    pub fn set(&self, passcode: &str) -> Result<(), VaultError> {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let mut hash = [0u8; HASH_LEN];
        pbkdf2_hmac::<Sha512>(passcode.as_bytes(), &salt, ITERATIONS, &mut hash);
        let doc = PasscodeDocument {
            hash: format!("{}:{}:{}", ITERATIONS, hex::encode(salt), hex::encode(hash)),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(
            &tmp,
            serde_json::to_string(&doc).map_err(|_| VaultError::Corrupt)?,
        )?;
        restrict_mode(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Verify a candidate passcode in constant time. A missing store always
    /// fails verification.
    pub fn verify(&self, passcode: &str) -> Result<bool, VaultError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let doc: PasscodeDocument =
            serde_json::from_str(&content).map_err(|_| VaultError::Corrupt)?;

        let mut parts = doc.hash.splitn(3, ':');
        let (iters, salt_hex, hash_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(i), Some(s), Some(h)) => (i, s, h),
            _ => return Err(VaultError::Corrupt),
        };
        let iterations: u32 = iters.parse().map_err(|_| VaultError::Corrupt)?;
        let salt = hex::decode(salt_hex).map_err(|_| VaultError::Corrupt)?;
        let expected = hex::decode(hash_hex).map_err(|_| VaultError::Corrupt)?;
        if expected.len() != HASH_LEN {
            return Err(VaultError::Corrupt);
        }

        let mut candidate = [0u8; HASH_LEN];
        pbkdf2_hmac::<Sha512>(passcode.as_bytes(), &salt, iterations, &mut candidate);
        Ok(candidate.ct_eq(expected.as_slice()).into())
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let pv = PasscodeVault::new(tmp.path().join("passcode.json"));
        assert!(!pv.is_set());
        assert!(!pv.verify("1234").unwrap());

        pv.set("1234").unwrap();
        assert!(pv.is_set());
        assert!(pv.verify("1234").unwrap());
        assert!(!pv.verify("4321").unwrap());
    }

    #[test]
    fn stored_format_is_iterations_salt_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let pv = PasscodeVault::new(tmp.path().join("passcode.json"));
        pv.set("secret").unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("passcode.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let hash = doc["hash"].as_str().unwrap();
        let parts: Vec<&str> = hash.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "100000");
        assert_eq!(parts[2].len(), 128);
        assert!(!raw.contains("secret"));
    }

    #[test]
    fn replacing_passcode_invalidates_old() {
        let tmp = tempfile::tempdir().unwrap();
        let pv = PasscodeVault::new(tmp.path().join("passcode.json"));
        pv.set("old").unwrap();
        pv.set("new").unwrap();
        assert!(!pv.verify("old").unwrap());
        assert!(pv.verify("new").unwrap());
    }
}
