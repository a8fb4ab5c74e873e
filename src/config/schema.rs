//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::auth::{Group, Identity};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// RPC and HTTP gateway listeners.
    pub server: ServerConfig,

    /// Run mode and locale settings.
    pub runtime: RuntimeConfig,

    /// Static bearer tokens and auto login.
    pub auth: AuthConfig,

    /// Grace periods for shutdown.
    pub shutdown: ShutdownConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Hot reload settings.
    pub reload: ReloadConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// RPC bind address (e.g., "127.0.0.1:8080").
    pub rpc_address: String,

    /// HTTP gateway bind address (e.g., "0.0.0.0:80").
    pub http_address: String,

    /// Allow cross-origin requests on the gateway.
    pub cors: bool,

    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,

    /// Gateway request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc_address: "127.0.0.1:8080".to_string(),
            http_address: "0.0.0.0:80".to_string(),
            cors: false,
            max_connections: 10_000,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Debug mode: verbose access records, permissive CORS.
    pub debug: bool,

    /// Locale used when the caller sends none.
    pub default_locale: String,

    /// Directory of custom message packs, reloaded on every load.
    pub messages_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_locale: "en".to_string(),
            messages_dir: None,
        }
    }
}

/// A static bearer token and the identity it resolves to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TokenConfig {
    pub token: String,
    pub username: String,
    #[serde(default)]
    pub group: Group,
    #[serde(default)]
    pub dept: String,
}

impl TokenConfig {
    pub fn identity(&self) -> Identity {
        Identity {
            username: self.username.clone(),
            group: self.group,
            dept: self.dept.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,

    /// When set, every request is identified as this user.
    pub auto_login: Option<TokenConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Drain deadline for each listener, in seconds.
    pub server_grace_secs: u64,

    /// Deadline for service teardown, in seconds.
    pub services_grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            server_grace_secs: 10,
            services_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format (text, json).
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    /// Watch the config file and reload services when it changes.
    pub watch_config: bool,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self { watch_config: true }
    }
}
