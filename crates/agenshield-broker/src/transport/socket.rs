//! Unix socket transport: newline-framed JSON-RPC 2.0.
//!
//! One thread per connection; requests within a connection run serially in
//! arrival order, which also keeps that connection's audit records ordered.
//! The socket file is mode 0666 - the parent directory's group membership
//! is the actual access boundary - and is removed on clean shutdown.

use crate::context::HandlerContext;
use crate::handlers::{dispatch, Deps};
use crate::transport::decode_request;
use agenshield_core::protocol::MAX_REQUEST_SIZE;
use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

pub struct SocketServer {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketServer {
    /// Bind the broker socket, replacing any stale file, and open access up
    /// to the socket group via mode 0666.
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Create socket dir {}", parent.display()))?;
        }
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Remove stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("Bind socket {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))
                .with_context(|| format!("chmod socket {}", path.display()))?;
        }
        tracing::info!(socket = %path.display(), "broker socket bound");
        Ok(Self { path, listener })
    }

    /// Accept loop: one handler thread per connection. Blocks forever.
    pub fn run(&self, deps: Arc<Deps>) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let deps = deps.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &deps) {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
        Ok(())
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Serve one connection until EOF. Exposed for tests via `UnixStream::pair`.
pub fn handle_connection(stream: UnixStream, deps: &Deps) -> Result<()> {
    let (uid, gid, pid) = peer_credentials(&stream);
    let ctx = HandlerContext::socket(uid, gid, pid);
    tracing::debug!(uid = ?uid, pid = ?pid, "connection opened");

    let mut writer = stream.try_clone().context("Clone socket stream")?;
    let mut reader = BufReader::new(stream);

    loop {
        let line = match read_line_limited(&mut reader) {
            Ok(None) => break,
            Ok(Some(line)) => line,
            Err(e) => {
                let resp = agenshield_core::protocol::RpcResponse::failure(
                    serde_json::Value::Null,
                    agenshield_core::error::RPC_PARSE_ERROR,
                    format!("Request size error: {}", e),
                );
                write_response(&mut writer, &resp)?;
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match decode_request(line) {
            Ok(request) => dispatch(&request, &ctx, deps),
            Err(error_response) => error_response,
        };
        write_response(&mut writer, &response)?;
    }
    Ok(())
}

fn write_response(
    writer: &mut impl Write,
    response: &agenshield_core::protocol::RpcResponse,
) -> Result<()> {
    let body = serde_json::to_string(response).context("Serialize response")?;
    writeln!(writer, "{}", body).context("Write response")?;
    writer.flush().context("Flush response")?;
    Ok(())
}

/// Read a single newline-terminated frame, enforcing [`MAX_REQUEST_SIZE`].
/// Returns `Ok(None)` on EOF.
fn read_line_limited(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        let available = match reader.fill_buf() {
            Ok(b) => b,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return if buf.is_empty() {
                Ok(None)
            } else {
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                String::from_utf8(buf)
                    .map(Some)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"))
            };
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if buf.len() + pos > MAX_REQUEST_SIZE {
                    reader.consume(pos + 1);
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Request exceeds 10MB size limit",
                    ));
                }
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                return String::from_utf8(buf)
                    .map(Some)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"));
            }
            None => {
                let len = available.len();
                if buf.len() + len > MAX_REQUEST_SIZE {
                    reader.consume(len);
                    skip_until_newline(reader);
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Request exceeds 10MB size limit",
                    ));
                }
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

fn skip_until_newline(reader: &mut impl BufRead) {
    loop {
        match reader.fill_buf() {
            Ok(b) if b.is_empty() => break,
            Ok(b) => {
                if let Some(pos) = b.iter().position(|&c| c == b'\n') {
                    reader.consume(pos + 1);
                    break;
                }
                let len = b.len();
                reader.consume(len);
            }
            Err(_) => break,
        }
    }
}

/// Peer credentials, where the OS exposes them.
#[cfg(target_os = "linux")]
fn peer_credentials(stream: &UnixStream) -> (Option<u32>, Option<u32>, Option<i32>) {
    match nix::sys::socket::getsockopt(stream, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(creds) => (Some(creds.uid()), Some(creds.gid()), Some(creds.pid())),
        Err(e) => {
            tracing::debug!(error = %e, "peer credentials unavailable");
            (None, None, None)
        }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn peer_credentials(stream: &UnixStream) -> (Option<u32>, Option<u32>, Option<i32>) {
    use std::os::fd::AsFd;
    match nix::unistd::getpeereid(stream.as_fd()) {
        Ok((uid, gid)) => (Some(uid.as_raw()), Some(gid.as_raw()), None),
        Err(e) => {
            tracing::debug!(error = %e, "peer credentials unavailable");
            (None, None, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::secrets::SecretResolver;
    use agenshield_core::config::BrokerConfig;
    use agenshield_policy::{Policy, PolicyAction, PolicyEngine, PolicyTarget};
    use std::io::{BufRead, BufReader, Write};

    fn deps(tmp: &tempfile::TempDir, policies: Vec<Policy>) -> Arc<Deps> {
        Arc::new(Deps {
            config: BrokerConfig::from_env(),
            engine: Arc::new(PolicyEngine::new(policies, true)),
            audit: Arc::new(AuditLog::new(tmp.path().join("audit.log"))),
            secrets: Arc::new(SecretResolver::new()),
            allowlist: None,
            daemon: None,
        })
    }

    /// Run one request/response exchange over a socketpair.
    fn roundtrip(deps: &Arc<Deps>, lines: &[&str]) -> Vec<serde_json::Value> {
        let (client, server) = UnixStream::pair().unwrap();
        let deps = deps.clone();
        let handle = thread::spawn(move || {
            let _ = handle_connection(server, &deps);
        });

        let mut writer = client.try_clone().unwrap();
        for line in lines {
            writeln!(writer, "{}", line).unwrap();
        }
        writer.flush().unwrap();
        // Half-close so the server sees EOF after our requests; responses
        // still flow back on the read direction.
        client.shutdown(std::net::Shutdown::Write).unwrap();
        drop(writer);
        let reader = BufReader::new(client);
        let responses: Vec<serde_json::Value> = reader
            .lines()
            .map_while(|l| l.ok())
            .map(|l| serde_json::from_str(&l).unwrap())
            .collect();
        handle.join().unwrap();
        responses
    }

    #[test]
    fn ping_over_socket() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = deps(&tmp, vec![]);
        let responses = roundtrip(
            &deps,
            &[r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#],
        );
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["result"]["pong"], true);
        assert_eq!(responses[0]["id"], 1);
    }

    #[test]
    fn responses_keep_arrival_order() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = deps(&tmp, vec![]);
        let responses = roundtrip(
            &deps,
            &[
                r#"{"jsonrpc":"2.0","id":"a","method":"ping","params":{}}"#,
                r#"{"jsonrpc":"2.0","id":"b","method":"ping","params":{}}"#,
                r#"{"jsonrpc":"2.0","id":"c","method":"ping","params":{}}"#,
            ],
        );
        let ids: Vec<&str> = responses.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn malformed_json_gets_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = deps(&tmp, vec![]);
        let responses = roundtrip(&deps, &["{oops"]);
        assert_eq!(responses[0]["error"]["code"], -32700);
    }

    #[test]
    fn unknown_method_gets_method_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = deps(&tmp, vec![]);
        let responses = roundtrip(
            &deps,
            &[r#"{"jsonrpc":"2.0","id":1,"method":"teleport","params":{}}"#],
        );
        assert_eq!(responses[0]["error"]["code"], -32601);
    }

    #[test]
    fn denied_exec_returns_1001_and_audits() {
        let tmp = tempfile::tempdir().unwrap();
        let deny = Policy::new(
            "Block All",
            PolicyAction::Deny,
            PolicyTarget::Command,
            vec!["*".into()],
        );
        let deps = deps(&tmp, vec![deny]);
        let responses = roundtrip(
            &deps,
            &[r#"{"jsonrpc":"2.0","id":9,"method":"exec","params":{"command":"rm","args":["-rf","/"]}}"#],
        );
        assert_eq!(responses[0]["error"]["code"], 1001);

        let audit = std::fs::read_to_string(tmp.path().join("audit.log")).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(audit.lines().last().unwrap()).unwrap();
        assert_eq!(record["result"], "denied");
        assert_eq!(record["target"], "rm -rf /");
    }

    #[test]
    fn secret_inject_over_socket_succeeds_when_pushed() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = deps(&tmp, vec![]);
        deps.secrets.replace(agenshield_core::protocol::SecretsSyncPayload {
            version: 1,
            synced_at: chrono::Utc::now(),
            global_secrets: [("X".to_string(), "v".to_string())].into(),
            policy_bindings: vec![],
        });
        let responses = roundtrip(
            &deps,
            &[r#"{"jsonrpc":"2.0","id":1,"method":"secret_inject","params":{"name":"X"}}"#],
        );
        assert_eq!(responses[0]["result"]["value"], "v");
        assert_eq!(responses[0]["result"]["injected"], true);
    }

    #[test]
    fn missing_secret_is_opaque_1007() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = deps(&tmp, vec![]);
        let responses = roundtrip(
            &deps,
            &[r#"{"jsonrpc":"2.0","id":1,"method":"secret_inject","params":{"name":"nope"}}"#],
        );
        assert_eq!(responses[0]["error"]["code"], 1007);
        assert_eq!(responses[0]["error"]["message"], "Secret not found");
    }
}
