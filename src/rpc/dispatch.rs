//! RPC endpoint: `POST /{package.Service}/{Method}` with a JSON body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::rpc::error::{Error, HandlerError, ERR_BAD_REQUEST};
use crate::rpc::handler::{Registry, Reply, RpcRequest};
use crate::rpc::interceptor::Interceptor;
use crate::rpc::metadata::RPC_STATUS;
use crate::rpc::status::Code;

/// Introspection service, registered on every server.
pub const REFLECTION_SERVICE: &str = "rpc.reflection.ServerReflection";
pub const REFLECTION_METHOD: &str = "/rpc.reflection.ServerReflection/ListServices";

/// Largest accepted request body.
const MAX_BODY: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct DispatchState {
    registry: Arc<Registry>,
    interceptor: Arc<Interceptor>,
}

/// Add the introspection method listing every registered service.
pub fn register_reflection(registry: &mut Registry) {
    let mut services = registry.services();
    services.push(REFLECTION_SERVICE.to_string());
    services.sort();
    services.dedup();
    registry.unary(REFLECTION_SERVICE, "ListServices", move |_req: RpcRequest| {
        let services = services.clone();
        async move { Ok::<_, HandlerError>(json!({ "services": services })) }
    });
}

/// Build the RPC router. Every call runs through `interceptor`.
pub fn router(registry: Arc<Registry>, interceptor: Arc<Interceptor>) -> Router {
    tracing::debug!(methods = registry.len(), "Building RPC dispatcher");
    Router::new()
        .route("/{service}/{method}", post(dispatch))
        .fallback(unknown_path)
        .with_state(DispatchState {
            registry,
            interceptor,
        })
}

async fn dispatch(
    State(state): State<DispatchState>,
    Path((service, method)): Path<(String, String)>,
    request: Request<Body>,
) -> Response {
    let name = format!("/{service}/{method}");
    let Some(handler) = state.registry.get(&name) else {
        tracing::debug!(method = %name, "Unknown RPC method");
        return status_response(Code::Unimplemented, &format!("unknown method {name}"));
    };

    let (parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let bytes = match axum::body::to_bytes(body, MAX_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => return decode_failure(&state, &parts.headers, e.to_string()),
    };
    let payload = match decode(&bytes) {
        Ok(payload) => payload,
        Err(e) => return decode_failure(&state, &parts.headers, e.to_string()),
    };

    let mut call = RpcRequest::new(name, payload);
    call.metadata = parts.headers;
    call.peer = peer;

    encode(state.interceptor.intercept(call, handler).await)
}

async fn unknown_path() -> Response {
    status_response(Code::Unimplemented, "not an rpc path")
}

fn decode(bytes: &Bytes) -> Result<Value, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
}

fn decode_failure(state: &DispatchState, headers: &HeaderMap, reason: String) -> Response {
    let locale = state.interceptor.resolve_locale(headers);
    let err = state
        .interceptor
        .localize(&ERR_BAD_REQUEST.with_info(reason), &locale);
    encode(Err(err))
}

/// Encode a call outcome. Transport status is always 200; the outcome
/// travels in the `rpc-status` header.
pub fn encode(result: Result<Reply, Error>) -> Response {
    match result {
        Ok(reply) => {
            let mut response = Json(reply.payload).into_response();
            response.headers_mut().extend(reply.metadata);
            set_status(response, Code::Ok)
        }
        Err(err) => set_status(Json(err.to_body()).into_response(), err.status()),
    }
}

/// A failure outside the interceptor, without a domain code.
pub fn status_response(code: Code, message: &str) -> Response {
    let body = json!({
        "code": code.as_str(),
        "status": u8::from(code),
        "message": message,
    });
    set_status(Json(body).into_response(), code)
}

fn set_status(mut response: Response, code: Code) -> Response {
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(RPC_STATUS, HeaderValue::from(u16::from(u8::from(code))));
    response
}
