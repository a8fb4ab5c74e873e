//! The dual-protocol server: RPC listener plus HTTP gateway.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::GatewayMux;
use crate::net::{Listener, ListenerError};
use crate::rpc::dispatch;
use crate::rpc::{Interceptor, Registry};
use crate::server::options::ServerOptions;
use crate::server::serve::{DrainOutcome, ServeHandle};

const GATEWAY_BODY_LIMIT: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("Invalid {field}: {value:?}")]
    Address { field: &'static str, value: String },
    #[error("Server is {actual}, expected {expected}")]
    Phase { expected: Phase, actual: Phase },
}

/// Server lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::Started => "started",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of [`Server::stop`], one outcome per listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub rpc: DrainOutcome,
    pub http: DrainOutcome,
}

impl StopReport {
    pub fn is_graceful(&self) -> bool {
        self.rpc != DrainOutcome::Forced && self.http != DrainOutcome::Forced
    }
}

pub struct Server {
    phase: Phase,
    options: Option<ServerOptions>,
    interceptor: Arc<Interceptor>,
    rpc_listener: Option<Listener>,
    rpc_addr: SocketAddr,
    http_addr: Option<SocketAddr>,
    rpc: Option<ServeHandle>,
    http: Option<ServeHandle>,
    gateway_cancel: CancellationToken,
}

impl Server {
    /// Bind the RPC listener now. The HTTP listener is bound by `start`.
    pub async fn bind(options: ServerOptions, interceptor: Arc<Interceptor>) -> Result<Self, ServerError> {
        let listener = Listener::bind("rpc", options.rpc_address, options.max_connections).await?;
        let rpc_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            addr: options.rpc_address,
            source,
        })?;
        Ok(Self {
            phase: Phase::Created,
            options: Some(options),
            interceptor,
            rpc_listener: Some(listener),
            rpc_addr,
            http_addr: None,
            rpc: None,
            http: None,
            gateway_cancel: CancellationToken::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Bound RPC address.
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    /// Bound HTTP address, once started.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Base URL the gateway dials.
    pub fn rpc_endpoint(&self) -> String {
        let ip = match self.rpc_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!("http://{}", SocketAddr::new(ip, self.rpc_addr.port()))
    }

    /// Serve RPC and HTTP, each on its own task.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        let (Phase::Created, Some(options), Some(rpc_listener)) =
            (self.phase, self.options.take(), self.rpc_listener.take())
        else {
            return Err(ServerError::Phase {
                expected: Phase::Created,
                actual: self.phase,
            });
        };
        let ServerOptions {
            http_address,
            cors,
            max_connections,
            request_timeout,
            services,
            proxy,
            routing,
            ..
        } = options;

        let mut registry = Registry::new();
        if let Some(register) = services {
            register(&mut registry);
        }
        dispatch::register_reflection(&mut registry);
        let methods = registry.len();
        let rpc_router = dispatch::router(Arc::new(registry), self.interceptor.clone());

        let endpoint = self.rpc_endpoint();
        let mut mux = GatewayMux::new(endpoint.clone(), self.gateway_cancel.clone());
        if let Some(register) = proxy {
            register(&mut mux, &endpoint);
        }
        let gateway_routes = mux.len();
        let mut http_router = mux.into_router();
        if let Some(wrap) = routing {
            http_router = wrap(http_router);
        }
        let http_router = gateway_layers(http_router, request_timeout, cors || self.interceptor.debug());

        let http_listener = Listener::bind("http", http_address, max_connections).await?;
        self.http_addr = http_listener.local_addr().ok();

        self.rpc = Some(ServeHandle::spawn(rpc_listener, rpc_router));
        self.http = Some(ServeHandle::spawn(http_listener, http_router));
        self.phase = Phase::Started;

        tracing::info!(
            rpc = %self.rpc_addr,
            http = ?self.http_addr,
            methods,
            gateway_routes,
            "Server started"
        );
        Ok(())
    }

    /// Drain both listeners concurrently, each bounded by `timeout`.
    pub async fn stop(&mut self, timeout: Duration) -> StopReport {
        if self.phase != Phase::Started {
            tracing::debug!(phase = %self.phase, "Stop requested on a server that is not running");
            self.rpc_listener = None;
            self.phase = Phase::Stopped;
            return StopReport {
                rpc: DrainOutcome::NotRunning,
                http: DrainOutcome::NotRunning,
            };
        }
        self.phase = Phase::Stopping;
        tracing::info!(timeout = ?timeout, "Stopping server");

        let cancel = self.gateway_cancel.clone();
        let (rpc, http) = tokio::join!(
            drain(self.rpc.take(), timeout, || {}),
            drain(self.http.take(), timeout, move || cancel.cancel()),
        );

        self.phase = Phase::Stopped;
        let report = StopReport { rpc, http };
        tracing::info!(rpc = ?report.rpc, http = ?report.http, "Server stopped");
        report
    }
}

async fn drain(handle: Option<ServeHandle>, timeout: Duration, on_timeout: impl FnOnce()) -> DrainOutcome {
    match handle {
        Some(handle) => handle.drain(timeout, on_timeout).await,
        None => DrainOutcome::NotRunning,
    }
}

#[allow(deprecated)]
fn gateway_layers(router: Router, timeout: Duration, cors: bool) -> Router {
    let router = router
        .layer(TimeoutLayer::new(timeout))
        .layer(RequestBodyLimitLayer::new(GATEWAY_BODY_LIMIT))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
