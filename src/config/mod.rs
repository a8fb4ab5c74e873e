//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, APP_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → store.rs (ArcSwap<AppConfig>, shared by Arc)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → orchestrator swaps the store and emits `reload`
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener addresses are read once at startup; a reload only reaches services

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppConfig, AuthConfig, ObservabilityConfig, ReloadConfig, RuntimeConfig, ServerConfig,
    ShutdownConfig, TokenConfig,
};
pub use store::ConfigStore;
