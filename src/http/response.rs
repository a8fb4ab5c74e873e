//! Turning an RPC reply into an HTTP response.
//!
//! # Responsibilities
//! - Map `rpc-status` onto the HTTP status line
//! - Rename reply metadata: `http-foo` → `foo`, `bar` → `rpc-metadata-bar`
//! - Drop transport headers of the RPC hop

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::request::METADATA_PREFIX;
use crate::rpc::metadata::RPC_STATUS;
use crate::rpc::status::Code;

const HTTP_PREFIX: &str = "http-";

/// Headers owned by the RPC hop, never copied to the client.
const SKIPPED: [&str; 6] = [
    "content-length",
    "content-type",
    "connection",
    "transfer-encoding",
    "date",
    RPC_STATUS,
];

/// Status code carried by an RPC response. A missing or garbled header is Unknown.
pub fn rpc_code(headers: &HeaderMap) -> Code {
    headers
        .get(RPC_STATUS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u8>().ok())
        .and_then(Code::from_u8)
        .unwrap_or(Code::Unknown)
}

/// Client-facing headers for the reply metadata in `headers`.
pub fn match_outgoing(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if SKIPPED.contains(&name) {
            continue;
        }
        let renamed = match name.strip_prefix(HTTP_PREFIX) {
            Some(stripped) => HeaderName::from_bytes(stripped.as_bytes()),
            None => HeaderName::from_bytes(format!("{METADATA_PREFIX}{name}").as_bytes()),
        };
        if let Ok(renamed) = renamed {
            out.append(renamed, value.clone());
        }
    }
    out
}

/// Build the client response from the RPC response parts and body.
pub fn translate(headers: &HeaderMap, body: Body) -> Response {
    let code = rpc_code(headers);
    let mut response = Response::new(body);
    *response.status_mut() = code.http_status();
    *response.headers_mut() = match_outgoing(headers);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// A gateway-side failure in the same body shape as an RPC error.
pub fn error(code: Code, message: impl Into<String>) -> Response {
    let status = code.http_status();
    let body = json!({
        "code": code.as_str(),
        "status": u8::from(code),
        "message": message.into(),
    });
    (status, Json(body)).into_response()
}

/// Answer for paths no route claims.
pub async fn not_found() -> Response {
    error(Code::NotFound, "Not Found")
}
