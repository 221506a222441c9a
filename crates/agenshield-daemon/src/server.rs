//! Daemon HTTP surface.
//!
//! Two listeners: the UI server (config, auth, events, SSE, update status)
//! and the RPC server (`policy_check` + `ping` for the broker's
//! second-chance forwards and agent pre-checks). Mutations are passcode
//! gated; unauthenticated clients get the read-only surface.

use crate::auth::AuthState;
use crate::broker_push::BrokerPush;
use crate::sse::Broadcaster;
use crate::state::ConfigStore;
use agenshield_core::config::DaemonConfig;
use agenshield_core::protocol::{OperationKind, RpcResponse, ShieldEvent};
use agenshield_policy::{Policy, PolicyEngine};
use agenshield_vault::passcode::PasscodeVault;
use agenshield_vault::Vault;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct AppState {
    pub store: ConfigStore,
    pub engine: PolicyEngine,
    pub broadcaster: Broadcaster,
    pub auth: AuthState,
    pub vault: Vault,
    pub push: BrokerPush,
}

pub type SharedState = Arc<AppState>;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

// ─── UI surface ──────────────────────────────────────────────────────────────

pub fn build_ui_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/config", get(handle_get_config))
        .route("/api/config", put(handle_put_config))
        .route("/api/auth/setup", post(handle_auth_setup))
        .route("/api/auth/login", post(handle_auth_login))
        .route("/api/auth/status", get(handle_auth_status))
        .route("/api/secrets", get(handle_list_secrets))
        .route("/api/secrets", post(handle_set_secret))
        .route("/api/events", post(handle_ingest_events))
        .route("/api/update/status", get(handle_update_status))
        .route("/sse/events", get(handle_sse))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "agenshield-daemon",
        "version": env!("CARGO_PKG_VERSION"),
        "passcodeSet": state.auth.passcode_set(),
        "sseSubscribers": state.broadcaster.subscriber_count(),
    }))
}

async fn handle_get_config(State(state): State<SharedState>) -> impl IntoResponse {
    match state.store.load() {
        Ok(doc) => (StatusCode::OK, Json(serde_json::to_value(doc).unwrap_or(Value::Null))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct PutConfigBody {
    #[serde(default)]
    policies: Option<Vec<Policy>>,
    #[serde(default)]
    settings: Option<std::collections::BTreeMap<String, Value>>,
}

async fn handle_put_config(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<PutConfigBody>,
) -> impl IntoResponse {
    if !state.auth.may_mutate(bearer_token(&headers)) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Passcode required" })),
        );
    }

    let result = state.store.update(|doc| {
        if let Some(policies) = body.policies.clone() {
            doc.policies = policies;
        }
        if let Some(settings) = body.settings.clone() {
            doc.settings = settings;
        }
    });
    let doc = match result {
        Ok(doc) => doc,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    };

    // Apply locally, then push downstream; the broker hot-reloads the store.
    state.engine.replace(doc.policies.clone());
    if let Err(e) = state.push.push_policies(&doc.policies) {
        tracing::warn!(error = %e, "policy push to broker store failed");
    }
    state
        .broadcaster
        .publish(ShieldEvent::new("config:updated", json!({
            "policies": doc.policies.len(),
        })));

    (
        StatusCode::OK,
        Json(serde_json::to_value(doc).unwrap_or(Value::Null)),
    )
}

#[derive(Debug, Deserialize)]
struct SetupBody {
    passcode: String,
    #[serde(default)]
    current: Option<String>,
}

async fn handle_auth_setup(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SetupBody>,
) -> impl IntoResponse {
    // Changing an existing passcode is a mutation; first-time setup is open.
    if state.auth.passcode_set() && !state.auth.may_mutate(bearer_token(&headers)) {
        // Still allowed when the current passcode is supplied in the body.
        if body.current.is_none() {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Passcode required" })),
            );
        }
    }
    match state.auth.setup(&body.passcode, body.current.as_deref()) {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))),
    }
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    passcode: String,
}

async fn handle_auth_login(
    State(state): State<SharedState>,
    Json(body): Json<LoginBody>,
) -> impl IntoResponse {
    match state.auth.login(&body.passcode) {
        Some(token) => (StatusCode::OK, Json(json!({ "token": token }))),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid passcode" })),
        ),
    }
}

async fn handle_auth_status(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "passcodeSet": state.auth.passcode_set() }))
}

async fn handle_list_secrets(State(state): State<SharedState>) -> impl IntoResponse {
    match state.vault.list() {
        Ok(names) => (StatusCode::OK, Json(json!({ "secrets": names }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct SetSecretBody {
    name: String,
    value: String,
}

async fn handle_set_secret(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SetSecretBody>,
) -> impl IntoResponse {
    if !state.auth.may_mutate(bearer_token(&headers)) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Passcode required" })),
        );
    }
    if body.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Secret name must not be empty" })),
        );
    }
    if let Err(e) = state.vault.set(&body.name, &body.value) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        );
    }
    // Re-push the full bundle so the broker picks the change up immediately.
    match collect_global_secrets(&state.vault) {
        Ok(globals) => {
            if let Err(e) = state.push.push_secrets(globals, vec![]) {
                tracing::warn!(error = %e, "secrets push to broker failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "could not read vault for push"),
    }
    (StatusCode::OK, Json(json!({ "ok": true })))
}

fn collect_global_secrets(
    vault: &Vault,
) -> Result<std::collections::BTreeMap<String, String>> {
    let mut out = std::collections::BTreeMap::new();
    for name in vault.list()? {
        if let Ok(value) = vault.get(&name) {
            out.insert(name, value);
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct IngestBody {
    events: Vec<ShieldEvent>,
}

async fn handle_ingest_events(
    State(state): State<SharedState>,
    Json(body): Json<IngestBody>,
) -> Json<Value> {
    let count = body.events.len();
    for event in body.events {
        state.broadcaster.publish(event);
    }
    Json(json!({ "received": count }))
}

async fn handle_update_status() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "updateAvailable": false,
        "checkedAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

async fn handle_sse(State(state): State<SharedState>) -> impl IntoResponse {
    state.broadcaster.sse_stream()
}

// ─── RPC surface ─────────────────────────────────────────────────────────────

pub fn build_rpc_router(state: SharedState) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/api/health", get(handle_health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_rpc(State(state): State<SharedState>, Json(body): Json<Value>) -> Json<Value> {
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let method = body.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = body.get("params").cloned().unwrap_or(Value::Null);

    let response = match method {
        "ping" => RpcResponse::success(
            id,
            json!({
                "pong": true,
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            }),
        ),
        "policy_check" => {
            let operation = params.get("operation").and_then(|o| o.as_str());
            let target = params.get("target").and_then(|t| t.as_str());
            match (operation.and_then(OperationKind::from_method), target) {
                (Some(op), Some(target)) => {
                    let decision = state.engine.evaluate(op, target);
                    RpcResponse::success(
                        id,
                        json!({
                            "allowed": decision.allowed,
                            "policyId": decision.policy_id,
                            "requiresApproval": decision.requires_approval,
                        }),
                    )
                }
                _ => RpcResponse::failure(
                    id,
                    agenshield_core::error::CODE_VALIDATION,
                    "policy_check requires operation and target",
                ),
            }
        }
        other => RpcResponse::failure(
            id,
            agenshield_core::error::RPC_METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        ),
    };
    Json(serde_json::to_value(response).unwrap_or(Value::Null))
}

// ─── Composition ─────────────────────────────────────────────────────────────

pub struct Daemon {
    state: SharedState,
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let state_dir = config
            .state_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| ".".into());
        let store = ConfigStore::new(&config.state_path);
        let doc = store.load().context("Load daemon config")?;

        let broker_config = agenshield_core::config::BrokerConfig::from_env();
        let state = Arc::new(AppState {
            engine: PolicyEngine::new(doc.policies.clone(), broker_config.fail_open),
            store,
            broadcaster: Broadcaster::new(),
            auth: AuthState::new(PasscodeVault::new(state_dir.join("passcode.json"))),
            vault: Vault::open(state_dir.join("vault.enc")).context("Open vault")?,
            push: BrokerPush::new(&config.broker_socket, &broker_config.policies_path),
        });
        Ok(Self { state, config })
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Serve the UI and RPC listeners until the process exits, with the
    /// skill sync loop polling in the background.
    pub async fn run(self) -> Result<()> {
        self.spawn_skill_sync();
        let ui_addr = format!("{}:{}", self.config.host, self.config.ui_port);
        let rpc_addr = format!("{}:{}", self.config.host, self.config.rpc_port);

        let ui_listener = tokio::net::TcpListener::bind(&ui_addr)
            .await
            .with_context(|| format!("Bind UI listener {}", ui_addr))?;
        let rpc_listener = tokio::net::TcpListener::bind(&rpc_addr)
            .await
            .with_context(|| format!("Bind RPC listener {}", rpc_addr))?;
        tracing::info!(ui = %ui_addr, rpc = %rpc_addr, "daemon listening");

        let ui = axum::serve(ui_listener, build_ui_router(self.state.clone()));
        let rpc = axum::serve(rpc_listener, build_rpc_router(self.state.clone()));
        tokio::try_join!(async { ui.await }, async { rpc.await })
            .context("Daemon server terminated")?;
        Ok(())
    }

    /// Background skill watcher: diff, install, register, publish. One pass
    /// every 30 seconds on a dedicated thread (the sync path is blocking
    /// I/O end to end).
    fn spawn_skill_sync(&self) {
        use crate::skill_sync::{sync_once, SocketSkillBackend};
        use agenshield_skills::analysis::StaticScanAnalyzer;
        use agenshield_skills::installer::Installer;
        use agenshield_skills::quarantine::Quarantine;
        use agenshield_skills::version_store::VersionStore;
        use agenshield_skills::SkillWatcher;

        const SYNC_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

        let state = self.state.clone();
        let config = self.config.clone();
        let state_dir = config
            .state_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| ".".into());

        std::thread::Builder::new()
            .name("skill-sync".into())
            .spawn(move || {
                let watcher = SkillWatcher::new(
                    &config.skills_dir,
                    VersionStore::new(state_dir.join("skill-versions.json")),
                );
                let installer = Installer::new(
                    VersionStore::new(state_dir.join("skill-versions.json")),
                    Quarantine::new(state_dir.join("quarantine")),
                    Box::new(StaticScanAnalyzer::new()),
                    Box::new(SocketSkillBackend::new(&config.broker_socket)),
                );
                loop {
                    match sync_once(&watcher, &installer, &config.agent_home, &state.store) {
                        Ok(events) => {
                            if !events.is_empty() {
                                // Policies may have changed with the skills.
                                if let Ok(doc) = state.store.load() {
                                    state.engine.replace(doc.policies.clone());
                                    if let Err(e) = state.push.push_policies(&doc.policies) {
                                        tracing::warn!(error = %e, "skill policy push failed");
                                    }
                                }
                            }
                            for event in events {
                                state.broadcaster.publish(event);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "skill sync pass failed");
                        }
                    }
                    std::thread::sleep(SYNC_INTERVAL);
                }
            })
            .ok();
    }
}
