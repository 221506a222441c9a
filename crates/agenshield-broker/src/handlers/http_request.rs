//! `http_request`: outbound HTTP on behalf of the agent.
//!
//! The full URL was already policy-checked by dispatch. The response body
//! is returned as text; the audit record carries the byte count.

use super::{parse_params, Deps, Reply};
use agenshield_core::error::ShieldError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct HttpParams {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

pub fn handle(params: &Value, deps: &Deps) -> Result<Reply, ShieldError> {
    let p: HttpParams = parse_params(params)?;
    let method = p.method.to_uppercase();
    if !ALLOWED_METHODS.contains(&method.as_str()) {
        return Err(ShieldError::validation(format!(
            "Unsupported HTTP method: {}",
            p.method
        )));
    }
    if !p.url.starts_with("http://") && !p.url.starts_with("https://") {
        return Err(ShieldError::validation(format!(
            "URL must be http(s): {}",
            p.url
        )));
    }

    let timeout = Duration::from_secs(p.timeout.unwrap_or(deps.config.op_timeout_secs));
    let mut request = ureq::request(&method, &p.url).timeout(timeout);
    for (name, value) in &p.headers {
        request = request.set(name, value);
    }

    let result = match p.body {
        Some(ref body) => request.send_string(body),
        None => request.call(),
    };

    // A non-2xx status is still a successful mediation; only transport
    // failures are errors.
    let response = match result {
        Ok(resp) => resp,
        Err(ureq::Error::Status(_, resp)) => resp,
        Err(ureq::Error::Transport(t)) => {
            return Err(ShieldError::internal(format!("HTTP request failed: {}", t)))
        }
    };

    let status = response.status();
    let mut headers = Map::new();
    for name in response.headers_names() {
        if let Some(value) = response.header(&name) {
            headers.insert(name, Value::String(value.to_string()));
        }
    }
    let body = response
        .into_string()
        .map_err(|e| ShieldError::internal(format!("Failed to read response body: {}", e)))?;
    let bytes = body.len();

    Ok(Reply::with_metadata(
        json!({
            "status": status,
            "headers": headers,
            "body": body,
        }),
        json!({ "bytes": bytes, "method": method }),
    ))
}
