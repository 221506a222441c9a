//! Blocking JSON-RPC client for the broker.
//!
//! Primary transport is the Unix socket (newline framing, one request per
//! call); when the socket is unreachable the client falls back to the
//! loopback HTTP endpoint. Handler errors come back as [`RpcFailure`] with
//! the broker's numeric code so wrappers can translate them into exit
//! codes.

use agenshield_core::config::BrokerConfig;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A JSON-RPC error returned by the broker (as opposed to a transport
/// failure reaching it).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
}

pub struct BrokerClient {
    socket_path: PathBuf,
    http_url: String,
    timeout: Duration,
}

impl BrokerClient {
    pub fn new(socket_path: impl Into<PathBuf>, http_url: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            http_url: http_url.into(),
            timeout: Duration::from_secs(35),
        }
    }

    /// Client wired from `AGENSHIELD_*` environment.
    pub fn from_env() -> Self {
        let config = BrokerConfig::from_env();
        let http_url = format!("http://{}:{}", config.http_host, config.http_port);
        let mut client = Self::new(config.socket_path, http_url);
        // Stay above the broker-side per-op deadline so the broker times the
        // operation out first and reports 124 properly.
        client.timeout = Duration::from_secs(config.op_timeout_secs + 5);
        client
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One request, one response. Returns the `result` payload.
    pub fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        });
        let response = match self.call_socket(&request) {
            Ok(response) => response,
            Err(socket_err) => {
                tracing::debug!(error = %socket_err, "socket unreachable, trying HTTP fallback");
                self.call_http(&request).map_err(|http_err| {
                    anyhow::anyhow!(
                        "broker unreachable (socket: {socket_err:#}; http: {http_err:#})"
                    )
                })?
            }
        };

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown broker error")
                .to_string();
            return Err(RpcFailure { code, message }.into());
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    fn call_socket(&self, request: &Value) -> Result<Value> {
        let stream = UnixStream::connect(&self.socket_path)
            .with_context(|| format!("Connect {}", self.socket_path.display()))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;

        let mut writer = stream.try_clone().context("Clone stream")?;
        writeln!(writer, "{}", request).context("Write request")?;
        writer.flush().context("Flush request")?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let n = reader.read_line(&mut line).context("Read response")?;
        if n == 0 {
            anyhow::bail!("broker closed the connection without a response");
        }
        serde_json::from_str(line.trim()).context("Parse response")
    }

    fn call_http(&self, request: &Value) -> Result<Value> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = agent
            .post(&format!("{}/rpc", self.http_url.trim_end_matches('/')))
            .send_json(request.clone())
            .map_err(|e| anyhow::anyhow!("HTTP fallback failed: {}", e))?;
        response.into_json().context("Parse HTTP response")
    }

    // ─── Typed convenience calls used by the wrapper binaries ────────────────

    /// Proxy one command execution through the broker.
    pub fn exec(&self, command: &str, args: &[String]) -> Result<ExecResult> {
        let result = self.call("exec", json!({ "command": command, "args": args }))?;
        Ok(ExecResult {
            exit_code: result
                .get("exitCode")
                .and_then(|c| c.as_i64())
                .unwrap_or(-1) as i32,
            stdout: result
                .get("stdout")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .to_string(),
            stderr: result
                .get("stderr")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .to_string(),
        })
    }

    /// Pre-check an operation without side effects.
    pub fn policy_check(&self, operation: &str, target: &str) -> Result<bool> {
        let result = self.call(
            "policy_check",
            json!({ "operation": operation, "target": target }),
        )?;
        Ok(result.get("allowed").and_then(|a| a.as_bool()).unwrap_or(false))
    }

    /// Fetch an injected secret (socket channel only - the broker enforces
    /// this).
    pub fn secret_inject(&self, name: &str) -> Result<String> {
        let result = self.call("secret_inject", json!({ "name": name }))?;
        result
            .get("value")
            .and_then(|v| v.as_str())
            .map(String::from)
            .context("Broker returned no secret value")
    }
}

/// Outcome of a proxied exec.
#[derive(Debug)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}
