//! Server construction options.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;

use crate::config::ServerConfig;
use crate::http::GatewayMux;
use crate::rpc::Registry;
use crate::server::ServerError;

/// Registers RPC services.
pub type ServicesFn = Box<dyn FnOnce(&mut Registry) + Send>;
/// Registers gateway routes. Receives the dialable RPC endpoint.
pub type ProxyFn = Box<dyn FnOnce(&mut GatewayMux, &str) + Send>;
/// Wraps the gateway router; routes added here are matched first.
pub type RoutingFn = Box<dyn FnOnce(Router) -> Router + Send>;

/// Everything `Server::bind` needs. Consumed by `start`.
pub struct ServerOptions {
    pub rpc_address: SocketAddr,
    pub http_address: SocketAddr,
    pub cors: bool,
    pub max_connections: usize,
    pub request_timeout: Duration,
    pub(crate) services: Option<ServicesFn>,
    pub(crate) proxy: Option<ProxyFn>,
    pub(crate) routing: Option<RoutingFn>,
}

impl ServerOptions {
    pub fn new(rpc_address: SocketAddr, http_address: SocketAddr) -> Self {
        Self {
            rpc_address,
            http_address,
            cors: false,
            max_connections: 10_000,
            request_timeout: Duration::from_secs(30),
            services: None,
            proxy: None,
            routing: None,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let parse = |field: &'static str, value: &str| {
            value
                .parse::<SocketAddr>()
                .map_err(|_| ServerError::Address {
                    field,
                    value: value.to_string(),
                })
        };
        let mut options = Self::new(
            parse("server.rpc_address", &config.rpc_address)?,
            parse("server.http_address", &config.http_address)?,
        );
        options.cors = config.cors;
        options.max_connections = config.max_connections;
        options.request_timeout = Duration::from_secs(config.request_timeout_secs);
        Ok(options)
    }

    pub fn services(mut self, f: impl FnOnce(&mut Registry) + Send + 'static) -> Self {
        self.services = Some(Box::new(f));
        self
    }

    pub fn proxy(mut self, f: impl FnOnce(&mut GatewayMux, &str) + Send + 'static) -> Self {
        self.proxy = Some(Box::new(f));
        self
    }

    pub fn routing(mut self, f: impl FnOnce(Router) -> Router + Send + 'static) -> Self {
        self.routing = Some(Box::new(f));
        self
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("rpc_address", &self.rpc_address)
            .field("http_address", &self.http_address)
            .field("cors", &self.cors)
            .field("max_connections", &self.max_connections)
            .field("request_timeout", &self.request_timeout)
            .field("services", &self.services.is_some())
            .field("proxy", &self.proxy.is_some())
            .field("routing", &self.routing.is_some())
            .finish()
    }
}
