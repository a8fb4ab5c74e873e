//! Runtime skeleton for a dual-protocol (RPC + HTTP gateway) service.

pub mod auth;
pub mod config;
pub mod events;
pub mod http;
pub mod i18n;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;
pub mod server;

pub use config::{AppConfig, ConfigStore};
pub use events::EventBus;
pub use lifecycle::{AppState, Application, LifecycleManager, Service, StateCell};
pub use rpc::{Error, Interceptor, Registry, Reply, RpcRequest};
pub use server::{Server, ServerOptions};
