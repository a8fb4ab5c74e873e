//! Dual-protocol server.
//!
//! # Data Flow
//! ```text
//! bind:  RPC listener bound eagerly
//! start: services callback → Registry (+ reflection) → rpc::dispatch router
//!        proxy callback → GatewayMux → routing callback → gateway layers
//!        HTTP listener bound → both served by serve.rs on their own tasks
//! stop:  drain RPC ‖ drain HTTP, each bounded by the same timeout
//! ```
//!
//! # Design Decisions
//! - Our own accept loop instead of `axum::serve`, so a timed-out drain can
//!   abort every open connection with its worker
//! - HTTP drain timeout cancels the gateway token before aborting, so proxy
//!   calls waiting on the RPC hop unwind first

pub mod dual;
pub mod options;
pub mod serve;

pub use dual::{Phase, Server, ServerError, StopReport};
pub use options::ServerOptions;
pub use serve::DrainOutcome;
