//! HTTP gateway subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → routing callback (paths claimed before the gateway)
//!     → gateway.rs (route match → RPC method)
//!     → request.rs (metadata forwarding, path/query/body merge)
//!     → RPC listener (pooled hyper client)
//!     → response.rs (rpc-status → HTTP status, metadata → headers)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - The gateway dials the RPC listener like any other client, so every
//!   proxied call passes the interceptor
//! - Proxy calls select against a shared cancellation token that the server
//!   trips when an HTTP drain times out

pub mod gateway;
pub mod request;
pub mod response;

pub use gateway::GatewayMux;
