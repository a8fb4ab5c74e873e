//! Unary handlers and the method registry.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::auth::Identity;
use crate::rpc::error::HandlerError;

/// A decoded unary call.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Full method name, `/package.Service/Method`.
    pub method: String,
    pub metadata: HeaderMap,
    pub peer: Option<SocketAddr>,
    pub payload: Value,
    /// Set by the interceptor.
    pub identity: Option<Identity>,
    /// Set by the interceptor.
    pub locale: String,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, payload: Value) -> Self {
        Self {
            method: method.into(),
            metadata: HeaderMap::new(),
            peer: None,
            payload,
            identity: None,
            locale: String::new(),
        }
    }

    /// Deserialize the payload into a typed message.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Reply payload plus metadata sent back as headers.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub payload: Value,
    pub metadata: HeaderMap,
}

impl Reply {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            metadata: HeaderMap::new(),
        }
    }
}

impl From<Value> for Reply {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

/// A unary RPC implementation.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: RpcRequest) -> BoxFuture<'static, Result<Reply, HandlerError>>;
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Into<Reply>,
    E: Into<HandlerError>,
{
    fn call(&self, request: RpcRequest) -> BoxFuture<'static, Result<Reply, HandlerError>> {
        let fut = (self)(request);
        Box::pin(async move { fut.await.map(Into::into).map_err(Into::into) })
    }
}

/// Registered methods, keyed by full method name.
#[derive(Default, Clone)]
pub struct Registry {
    methods: BTreeMap<String, Arc<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `/{service}/{method}`. A later registration replaces an earlier one.
    pub fn unary<H: Handler>(&mut self, service: &str, method: &str, handler: H) -> &mut Self {
        let name = format!("/{service}/{method}");
        if self.methods.insert(name.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(method = %name, "RPC method registered twice, keeping the last");
        }
        self
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.methods.get(method).cloned()
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Distinct service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self
            .methods()
            .filter_map(|m| m.trim_start_matches('/').split('/').next())
            .map(str::to_string)
            .collect();
        services.dedup();
        services
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::error::ERR_NOT_FOUND;
    use serde_json::json;

    #[tokio::test]
    async fn closures_are_handlers() {
        let mut registry = Registry::new();
        registry
            .unary("demo.Echo", "Say", |req: RpcRequest| async move {
                Ok::<_, HandlerError>(req.payload)
            })
            .unary("demo.Echo", "Missing", |_req: RpcRequest| async move {
                Err::<Value, _>(ERR_NOT_FOUND)
            });

        let echo = registry.get("/demo.Echo/Say").unwrap();
        let reply = echo.call(RpcRequest::new("/demo.Echo/Say", json!({"a": 1}))).await.unwrap();
        assert_eq!(reply.payload, json!({"a": 1}));

        let missing = registry.get("/demo.Echo/Missing").unwrap();
        let err = missing.call(RpcRequest::new("/demo.Echo/Missing", Value::Null)).await.unwrap_err();
        assert!(err.downcast_ref::<crate::rpc::Error>().is_some());
    }

    #[test]
    fn services_are_deduplicated() {
        let mut registry = Registry::new();
        let ok = |_req: RpcRequest| async move { Ok::<_, HandlerError>(Value::Null) };
        registry
            .unary("b.Svc", "One", ok)
            .unary("b.Svc", "Two", ok)
            .unary("a.Svc", "One", ok);
        assert_eq!(registry.services(), vec!["a.Svc".to_string(), "b.Svc".to_string()]);
        assert_eq!(registry.len(), 3);
    }
}
