//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Preparing → bind → Initializing (init) → Loading (load) → PreStart → serve → Started
//!
//! Reload:
//!     `reload` event (SIGHUP, config change, system.System/Reload) → Loading (load) → previous state
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → Terminating → stop server (drain) → delete services (bounded) → exit
//! ```
//!
//! # Design Decisions
//! - The state cell gates traffic; it is the only cross-cutting shared state
//! - Init is strict and ordered, delete is concurrent and abandoned at its deadline
//! - Shutdown has timeouts: a missed deadline exits non-zero

pub mod service;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use service::{BoxError, LifecycleManager, Service, Teardown, TeardownOutcome};
pub use shutdown::ShutdownOutcome;
pub use startup::{Application, Running, StartupError};
pub use state::{AppState, StateCell};
