//! HTTP → RPC gateway.
//!
//! # Responsibilities
//! - Map HTTP routes onto RPC methods
//! - Proxy each mapped request to the RPC listener over a pooled client
//! - Unwind in-flight proxy calls when the server cancels the gateway

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderValue, Method, Request, Uri},
    response::Response,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio_util::sync::CancellationToken;

use crate::http::{request, response};
use crate::rpc::status::Code;

/// Largest body the gateway buffers before forwarding.
const MAX_BODY: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct GatewayState {
    client: Client<HttpConnector, Body>,
    endpoint: Arc<str>,
    cancel: CancellationToken,
}

/// Collects HTTP routes, RPC-mapped and plain.
pub struct GatewayMux {
    state: GatewayState,
    mapped: Router<GatewayState>,
    plain: Router,
    routes: usize,
}

impl GatewayMux {
    /// `endpoint` is the dialable RPC base URL, e.g. `http://127.0.0.1:8080`.
    pub fn new(endpoint: impl Into<String>, cancel: CancellationToken) -> Self {
        let endpoint: String = endpoint.into();
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            state: GatewayState {
                client,
                endpoint: Arc::from(endpoint.trim_end_matches('/')),
                cancel,
            },
            mapped: Router::new(),
            plain: Router::new(),
            routes: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.state.endpoint
    }

    /// Proxy `method path` (axum path syntax, `/v1/users/{id}`) to the RPC
    /// method `rpc` (`/package.Service/Method`).
    pub fn route(&mut self, method: MethodFilter, path: &str, rpc: &str) -> &mut Self {
        let rpc: Arc<str> = Arc::from(rpc);
        tracing::debug!(path, rpc = %rpc, "Gateway route registered");
        let handler = move |State(state): State<GatewayState>,
                            params: Option<Path<HashMap<String, String>>>,
                            Query(query): Query<HashMap<String, String>>,
                            req: Request<Body>| {
            let rpc = rpc.clone();
            async move {
                let params = params.map(|Path(p)| p).unwrap_or_default();
                proxy(state, rpc, params, query, req).await
            }
        };
        let mapped = std::mem::take(&mut self.mapped);
        self.mapped = mapped.route(path, on(method, handler));
        self.routes += 1;
        self
    }

    /// Serve `path` directly over HTTP without an RPC hop.
    pub fn http_route(&mut self, path: &str, handler: MethodRouter) -> &mut Self {
        let plain = std::mem::take(&mut self.plain);
        self.plain = plain.route(path, handler);
        self.routes += 1;
        self
    }

    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    /// Finish into a router. Unclaimed paths answer 404.
    pub fn into_router(self) -> Router {
        self.mapped
            .with_state(self.state)
            .merge(self.plain)
            .fallback(response::not_found)
    }
}

async fn proxy(
    state: GatewayState,
    rpc: Arc<str>,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    req: Request<Body>,
) -> Response {
    let (parts, body) = req.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let bytes = match axum::body::to_bytes(body, MAX_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => return response::error(Code::InvalidArgument, e.to_string()),
    };
    let payload = match request::merge_body(&bytes, &params, &query) {
        Ok(payload) => payload,
        Err(e) => return response::error(Code::InvalidArgument, e.to_string()),
    };

    let uri = match format!("{}{}", state.endpoint, rpc).parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => return response::error(Code::Internal, e.to_string()),
    };
    let mut upstream = Request::new(Body::from(payload.to_string()));
    *upstream.method_mut() = Method::POST;
    *upstream.uri_mut() = uri;
    *upstream.headers_mut() = request::forward_headers(&parts.headers, peer);
    upstream.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    let result = tokio::select! {
        biased;
        _ = state.cancel.cancelled() => {
            tracing::debug!(rpc = %rpc, "Gateway call cancelled");
            return response::error(Code::Cancelled, "gateway is shutting down");
        }
        result = state.client.request(upstream) => result,
    };

    match result {
        Ok(reply) => {
            let (parts, body) = reply.into_parts();
            response::translate(&parts.headers, Body::new(body))
        }
        Err(e) => {
            tracing::error!(rpc = %rpc, error = %e, "Upstream RPC call failed");
            response::error(Code::Unavailable, "rpc endpoint unavailable")
        }
    }
}
