//! Downstream push channel: daemon → broker.
//!
//! Policies travel through the shared on-disk store (the broker hot-reloads
//! it); secrets travel over the socket as a `secrets_sync` bundle and are
//! never written to disk outside the vault. Both pushes are idempotent.

use agenshield_core::protocol::{SecretBinding, SecretsSyncPayload};
use agenshield_policy::{store, Policy};
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct BrokerPush {
    socket_path: PathBuf,
    policies_path: PathBuf,
    sync_version: AtomicU64,
}

impl BrokerPush {
    pub fn new(socket_path: impl Into<PathBuf>, policies_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            policies_path: policies_path.into(),
            sync_version: AtomicU64::new(0),
        }
    }

    /// Publish the policy set to the store the broker watches.
    pub fn push_policies(&self, policies: &[Policy]) -> Result<()> {
        store::save_policies(&self.policies_path, policies)
            .with_context(|| format!("Publish policies {}", self.policies_path.display()))?;
        tracing::info!(count = policies.len(), "policies published to broker store");
        Ok(())
    }

    /// Push the secret bundle over the socket. Failure is reported but not
    /// fatal - the broker keeps its previous bundle.
    pub fn push_secrets(
        &self,
        global_secrets: std::collections::BTreeMap<String, String>,
        policy_bindings: Vec<SecretBinding>,
    ) -> Result<u64> {
        let version = self.sync_version.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = SecretsSyncPayload {
            version,
            synced_at: Utc::now(),
            global_secrets,
            policy_bindings,
        };
        let request = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "secrets_sync",
            "params": payload,
        });

        let stream = UnixStream::connect(&self.socket_path)
            .with_context(|| format!("Connect broker {}", self.socket_path.display()))?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let mut writer = stream.try_clone().context("Clone stream")?;
        writeln!(writer, "{}", request).context("Write secrets_sync")?;
        writer.flush().context("Flush secrets_sync")?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).context("Read sync response")?;
        let response: serde_json::Value =
            serde_json::from_str(line.trim()).context("Parse sync response")?;
        if response.get("error").is_some() {
            anyhow::bail!("broker rejected secrets_sync: {}", response["error"]);
        }
        tracing::info!(version, "secrets pushed to broker");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn push_policies_writes_store() {
        let tmp = tempfile::tempdir().unwrap();
        let push = BrokerPush::new(
            tmp.path().join("none.sock"),
            tmp.path().join("policies.json"),
        );
        push.push_policies(&[]).unwrap();
        assert!(tmp.path().join("policies.json").exists());
    }

    #[test]
    fn push_secrets_speaks_the_socket_protocol() {
        let tmp = tempfile::tempdir().unwrap();
        let socket_path = tmp.path().join("broker.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let req: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
            assert_eq!(req["method"], "secrets_sync");
            assert_eq!(req["params"]["globalSecrets"]["API_KEY"], "v");
            let mut writer = stream;
            writeln!(
                writer,
                "{}",
                json!({"jsonrpc":"2.0","id":req["id"],"result":{"applied":true}})
            )
            .unwrap();
        });

        let push = BrokerPush::new(&socket_path, tmp.path().join("policies.json"));
        let version = push
            .push_secrets(
                [("API_KEY".to_string(), "v".to_string())].into(),
                vec![],
            )
            .unwrap();
        assert_eq!(version, 1);
        server.join().unwrap();
    }

    #[test]
    fn versions_are_monotonic() {
        let tmp = tempfile::tempdir().unwrap();
        let push = BrokerPush::new(
            tmp.path().join("none.sock"),
            tmp.path().join("policies.json"),
        );
        // Socket is absent so pushes fail, but each attempt still burns a
        // version - monotonicity is what the broker keys on.
        assert!(push.push_secrets([].into(), vec![]).is_err());
        assert!(push.push_secrets([].into(), vec![]).is_err());
        assert_eq!(push.sync_version.load(Ordering::SeqCst), 2);
    }
}
