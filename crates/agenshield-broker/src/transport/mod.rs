//! Broker transports: Unix socket (primary) and loopback HTTP (fallback).

pub mod http;
pub mod socket;

use agenshield_core::error::{RPC_INVALID_REQUEST, RPC_PARSE_ERROR};
use agenshield_core::protocol::{RpcRequest, RpcResponse};
use serde_json::Value;

/// Turn one raw frame into a request, or the matching transport error.
/// Parse failures are `-32700`; structurally invalid requests are `-32600`.
pub fn decode_request(raw: &str) -> Result<RpcRequest, RpcResponse> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        RpcResponse::failure(Value::Null, RPC_PARSE_ERROR, format!("Parse error: {}", e))
    })?;
    decode_request_value(value)
}

/// Same as [`decode_request`] for an already-parsed JSON value (HTTP path).
pub fn decode_request_value(value: Value) -> Result<RpcRequest, RpcResponse> {
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let Some(obj) = value.as_object() else {
        return Err(RpcResponse::failure(
            id,
            RPC_INVALID_REQUEST,
            "Invalid request: expected object",
        ));
    };
    let Some(method) = obj.get("method").and_then(|m| m.as_str()) else {
        return Err(RpcResponse::failure(
            id,
            RPC_INVALID_REQUEST,
            "Invalid request: missing method",
        ));
    };
    Ok(RpcRequest {
        jsonrpc: obj
            .get("jsonrpc")
            .and_then(|v| v.as_str())
            .unwrap_or("2.0")
            .to_string(),
        id,
        method: method.to_string(),
        params: obj.get("params").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_is_32700() {
        let err = decode_request("{not json").unwrap_err();
        assert_eq!(err.error.unwrap().code, -32700);
    }

    #[test]
    fn missing_method_is_32600() {
        let err = decode_request(r#"{"jsonrpc":"2.0","id":7,"params":{}}"#).unwrap_err();
        let e = err.error.unwrap();
        assert_eq!(e.code, -32600);
        assert_eq!(err.id, serde_json::json!(7));
    }

    #[test]
    fn well_formed_request_decodes() {
        let req =
            decode_request(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, serde_json::json!(1));
    }
}
