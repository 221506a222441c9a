//! Broker composition and lifecycle.
//!
//! Start-up order matters: policy store, audit sink, and socket bind are
//! fatal when they fail (the service exits non-zero with a diagnostic);
//! the HTTP fallback and daemon channel degrade gracefully.

use crate::allowlist::CommandAllowlist;
use crate::audit::AuditLog;
use crate::daemon_client::DaemonClient;
use crate::handlers::Deps;
use crate::secrets::SecretResolver;
use crate::transport::{http, socket::SocketServer};
use agenshield_core::config::BrokerConfig;
use agenshield_policy::{store, PolicyEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Policy-store poll interval for hot reload.
const POLICY_RELOAD_INTERVAL: Duration = Duration::from_secs(2);

pub struct Broker {
    deps: Arc<Deps>,
    config: BrokerConfig,
}

impl Broker {
    /// Load stores and assemble the handler dependencies.
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let policies = store::load_policies(&config.policies_path)
            .with_context(|| format!("Load policies {}", config.policies_path.display()))?;
        tracing::info!(
            count = policies.len(),
            fail_open = config.fail_open,
            "policy store loaded"
        );
        let engine = Arc::new(PolicyEngine::new(policies, config.fail_open));
        let audit = Arc::new(AuditLog::new(&config.audit_log));

        let allowlist_path = config
            .policies_path
            .parent()
            .map(|d| d.join("allowlist"))
            .unwrap_or_else(|| "/opt/agenshield/config/allowlist".into());
        let allowlist = CommandAllowlist::load(&allowlist_path);
        if let Some(ref list) = allowlist {
            tracing::info!(commands = list.len(), "command allowlist active");
        }

        let daemon = config.daemon_url.as_deref().map(DaemonClient::new);

        let deps = Arc::new(Deps {
            config: config.clone(),
            engine,
            audit,
            secrets: Arc::new(SecretResolver::new()),
            allowlist,
            daemon,
        });
        Ok(Self { deps, config })
    }

    /// Handler dependencies (tests and embedders).
    pub fn deps(&self) -> Arc<Deps> {
        self.deps.clone()
    }

    /// Run the broker: HTTP fallback and policy-reload watcher on
    /// background threads, socket accept loop on the caller's thread.
    pub fn run(self) -> Result<()> {
        let socket = SocketServer::bind(&self.config.socket_path)?;

        // HTTP fallback on its own runtime thread.
        {
            let deps = self.deps.clone();
            let host = self.config.http_host.clone();
            let port = self.config.http_port;
            thread::Builder::new()
                .name("http-fallback".into())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to start HTTP runtime");
                            return;
                        }
                    };
                    if let Err(e) = runtime.block_on(http::serve(&host, port, deps)) {
                        tracing::error!(error = %e, "HTTP fallback terminated");
                    }
                })
                .context("Spawn HTTP fallback thread")?;
        }

        // Policy hot reload: watch the store's mtime, swap atomically.
        {
            let deps = self.deps.clone();
            let path = self.config.policies_path.clone();
            thread::Builder::new()
                .name("policy-reload".into())
                .spawn(move || {
                    let mut last_modified: Option<SystemTime> = modified(&path);
                    loop {
                        thread::sleep(POLICY_RELOAD_INTERVAL);
                        let current = modified(&path);
                        if current == last_modified {
                            continue;
                        }
                        last_modified = current;
                        match store::load_policies(&path) {
                            Ok(policies) => {
                                tracing::info!(count = policies.len(), "policies hot-reloaded");
                                deps.engine.replace(policies);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "policy reload failed, keeping active set");
                            }
                        }
                    }
                })
                .context("Spawn policy reload thread")?;
        }

        socket.run(self.deps)
    }
}

fn modified(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
