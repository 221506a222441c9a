//! Loopback HTTP fallback.
//!
//! Accepts the same JSON-RPC bodies under `POST /rpc`, plus thin REST shims.
//! HTTP requests carry no peer credentials, and `secret_inject` is refused
//! on this channel by the handler layer.

use crate::context::HandlerContext;
use crate::handlers::{dispatch, Deps};
use crate::transport::decode_request_value;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn build_router(deps: Arc<Deps>) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/api/health", get(handle_health))
        .route("/api/policy/check", post(handle_policy_check))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(deps)
}

async fn handle_rpc(State(deps): State<Arc<Deps>>, Json(body): Json<Value>) -> Json<Value> {
    let ctx = HandlerContext::http();
    let response = match decode_request_value(body) {
        Ok(request) => {
            // Handlers run synchronously; move them off the async runtime.
            let deps = deps.clone();
            tokio::task::spawn_blocking(move || dispatch(&request, &ctx, &deps))
                .await
                .unwrap_or_else(|_| {
                    agenshield_core::protocol::RpcResponse::failure(
                        Value::Null,
                        agenshield_core::error::RPC_INTERNAL_ERROR,
                        "Handler panicked",
                    )
                })
        }
        Err(error_response) => error_response,
    };
    Json(serde_json::to_value(response).unwrap_or(Value::Null))
}

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "agenshield-broker",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_policy_check(
    State(deps): State<Arc<Deps>>,
    Json(params): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let request = agenshield_core::protocol::RpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Value::Null,
        method: "policy_check".to_string(),
        params,
    };
    let ctx = HandlerContext::http();
    let deps2 = deps.clone();
    let response = tokio::task::spawn_blocking(move || dispatch(&request, &ctx, &deps2))
        .await
        .ok();
    match response {
        Some(resp) if resp.error.is_none() => {
            (StatusCode::OK, Json(resp.result.unwrap_or(Value::Null)))
        }
        Some(resp) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::to_value(resp.error).unwrap_or(Value::Null)),
        ),
        None => (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null)),
    }
}

/// Serve the fallback until the process exits.
pub async fn serve(host: &str, port: u16, deps: Arc<Deps>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "broker HTTP fallback listening");
    axum::serve(listener, build_router(deps)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::secrets::SecretResolver;
    use agenshield_core::config::BrokerConfig;
    use agenshield_core::protocol::SecretsSyncPayload;
    use agenshield_policy::PolicyEngine;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_deps(tmp: &tempfile::TempDir) -> Arc<Deps> {
        Arc::new(Deps {
            config: BrokerConfig::from_env(),
            engine: Arc::new(PolicyEngine::new(vec![], true)),
            audit: Arc::new(AuditLog::new(tmp.path().join("audit.log"))),
            secrets: Arc::new(SecretResolver::new()),
            allowlist: None,
            daemon: None,
        })
    }

    async fn post_rpc(router: Router, body: Value) -> Value {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ping_over_http() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_deps(&tmp));
        let resp = post_rpc(
            router,
            json!({"jsonrpc":"2.0","id":1,"method":"ping","params":{}}),
        )
        .await;
        assert_eq!(resp["result"]["pong"], true);
    }

    #[tokio::test]
    async fn secret_inject_refused_over_http_with_1008() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = test_deps(&tmp);
        // Even with the secret present, HTTP must be refused.
        deps.secrets.replace(SecretsSyncPayload {
            version: 1,
            synced_at: chrono::Utc::now(),
            global_secrets: [("X".to_string(), "v".to_string())].into(),
            policy_bindings: vec![],
        });
        let router = build_router(deps);
        let resp = post_rpc(
            router,
            json!({"jsonrpc":"2.0","id":1,"method":"secret_inject","params":{"name":"X"}}),
        )
        .await;
        assert_eq!(resp["error"]["code"], 1008);
    }

    #[tokio::test]
    async fn health_shim() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_deps(&tmp));
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn policy_check_rest_shim() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_deps(&tmp));
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/policy/check")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"operation":"exec","target":"ls"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["allowed"], true);
    }
}
