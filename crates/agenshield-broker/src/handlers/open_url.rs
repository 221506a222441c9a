//! `open_url`: hand a policy-checked URL to the platform opener.

use super::{parse_params, Reply};
use agenshield_core::error::ShieldError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::{Command, Stdio};

#[derive(Debug, Deserialize)]
struct OpenParams {
    url: String,
}

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(not(target_os = "macos"))]
const OPENER: &str = "xdg-open";

pub fn handle(params: &Value) -> Result<Reply, ShieldError> {
    let p: OpenParams = parse_params(params)?;
    if !p.url.starts_with("http://") && !p.url.starts_with("https://") {
        return Err(ShieldError::validation(format!(
            "URL must be http(s): {}",
            p.url
        )));
    }
    Command::new(OPENER)
        .arg(&p.url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ShieldError::internal(format!("Failed to launch {}: {}", OPENER, e)))?;
    Ok(Reply::new(json!({ "opened": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            handle(&serde_json::json!({ "url": "file:///etc/passwd" })),
            Err(ShieldError::Validation(_))
        ));
        assert!(matches!(
            handle(&serde_json::json!({ "url": "javascript:alert(1)" })),
            Err(ShieldError::Validation(_))
        ));
    }
}
