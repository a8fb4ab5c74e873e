//! Turning an HTTP request into an RPC call.
//!
//! # Responsibilities
//! - Forward selected HTTP headers as RPC metadata
//! - Append the client address to `x-forwarded-for`
//! - Merge path and query parameters into the JSON body

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

use crate::rpc::metadata::{
    ACCEPT_LANGUAGE, AUTHORIZATION, GATEWAY_ACCEPT_LANGUAGE, GATEWAY_AUTHORIZATION,
    X_FORWARDED_FOR, X_REQUEST_ID,
};

/// HTTP clients can send arbitrary metadata with this prefix.
pub const METADATA_PREFIX: &str = "rpc-metadata-";

/// Metadata for the proxied call.
pub fn forward_headers(incoming: &HeaderMap, peer: Option<SocketAddr>) -> HeaderMap {
    let mut outgoing = HeaderMap::new();

    for (from, to) in [
        (AUTHORIZATION, GATEWAY_AUTHORIZATION),
        (ACCEPT_LANGUAGE, GATEWAY_ACCEPT_LANGUAGE),
    ] {
        if let Some(value) = incoming.get(from) {
            outgoing.insert(to, value.clone());
        }
    }
    if let Some(value) = incoming.get(X_REQUEST_ID) {
        outgoing.insert(X_REQUEST_ID, value.clone());
    }

    for (name, value) in incoming {
        let Some(stripped) = name.as_str().strip_prefix(METADATA_PREFIX) else {
            continue;
        };
        if let Ok(name) = HeaderName::from_bytes(stripped.as_bytes()) {
            outgoing.append(name, value.clone());
        }
    }

    let forwarded = incoming
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let chain = match (forwarded, peer) {
        (Some(chain), Some(peer)) => Some(format!("{chain}, {}", peer.ip())),
        (Some(chain), None) => Some(chain),
        (None, Some(peer)) => Some(peer.ip().to_string()),
        (None, None) => None,
    };
    if let Some(value) = chain.and_then(|c| HeaderValue::from_str(&c).ok()) {
        outgoing.insert(X_FORWARDED_FOR, value);
    }

    outgoing
}

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("body must be a JSON object when the route has parameters")]
    NotAnObject,
}

/// Parse `body` and overlay query then path parameters onto it.
pub fn merge_body(
    body: &[u8],
    path: &HashMap<String, String>,
    query: &HashMap<String, String>,
) -> Result<Value, BodyError> {
    let mut value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(body)?
    };
    if path.is_empty() && query.is_empty() {
        return Ok(value);
    }
    let Value::Object(fields) = &mut value else {
        return Err(BodyError::NotAnObject);
    };
    for (key, raw) in query.iter().chain(path) {
        fields.insert(key.clone(), param_value(raw));
    }
    Ok(value)
}

/// Numbers and booleans keep their type, everything else is a string.
fn param_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn forwards_auth_and_language_under_gateway_names() {
        let mut incoming = HeaderMap::new();
        incoming.insert("authorization", HeaderValue::from_static("Bearer t"));
        incoming.insert("accept-language", HeaderValue::from_static("zh-TW"));
        incoming.insert("cookie", HeaderValue::from_static("secret"));
        incoming.insert("rpc-metadata-tenant", HeaderValue::from_static("acme"));

        let out = forward_headers(&incoming, Some("192.0.2.1:4000".parse().unwrap()));
        assert_eq!(out["gateway-authorization"], "Bearer t");
        assert_eq!(out["gateway-accept-language"], "zh-TW");
        assert_eq!(out["tenant"], "acme");
        assert_eq!(out["x-forwarded-for"], "192.0.2.1");
        assert!(out.get("cookie").is_none());
        assert!(out.get("authorization").is_none());
    }

    #[test]
    fn appends_peer_to_forwarded_chain() {
        let mut incoming = HeaderMap::new();
        incoming.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));
        let out = forward_headers(&incoming, Some("10.1.1.1:80".parse().unwrap()));
        assert_eq!(out["x-forwarded-for"], "203.0.113.5, 10.1.1.1");
    }

    #[test]
    fn path_params_override_query_and_body() {
        let path = HashMap::from([("id".to_string(), "42".to_string())]);
        let query = HashMap::from([
            ("id".to_string(), "7".to_string()),
            ("verbose".to_string(), "true".to_string()),
        ]);
        let merged = merge_body(br#"{"name":"x","id":1}"#, &path, &query).unwrap();
        assert_eq!(merged, json!({"name": "x", "id": 42, "verbose": true}));
    }

    #[test]
    fn empty_body_becomes_object() {
        let merged = merge_body(b"", &HashMap::new(), &HashMap::new()).unwrap();
        assert_eq!(merged, json!({}));
    }

    #[test]
    fn array_body_with_params_is_rejected() {
        let path = HashMap::from([("id".to_string(), "1".to_string())]);
        assert!(matches!(
            merge_body(b"[1]", &path, &HashMap::new()),
            Err(BodyError::NotAnObject)
        ));
    }
}
