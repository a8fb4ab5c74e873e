//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rpc = check_addr(&mut errors, "server.rpc_address", &config.server.rpc_address);
    let http = check_addr(&mut errors, "server.http_address", &config.server.http_address);
    if let (Some(rpc), Some(http)) = (rpc, http) {
        if rpc == http && rpc.port() != 0 {
            errors.push(ValidationError::new(
                "server.http_address",
                "must differ from server.rpc_address",
            ));
        }
    }

    if config.server.max_connections == 0 {
        errors.push(ValidationError::new("server.max_connections", "must be > 0"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }
    if config.shutdown.server_grace_secs == 0 {
        errors.push(ValidationError::new("shutdown.server_grace_secs", "must be > 0"));
    }
    if config.shutdown.services_grace_secs == 0 {
        errors.push(ValidationError::new("shutdown.services_grace_secs", "must be > 0"));
    }
    if config.runtime.default_locale.is_empty() {
        errors.push(ValidationError::new("runtime.default_locale", "must not be empty"));
    }
    if !matches!(config.observability.log_format.as_str(), "text" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", config.observability.log_format),
        ));
    }
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    for token in &config.auth.tokens {
        if token.token.is_empty() {
            errors.push(ValidationError::new(
                "auth.tokens",
                format!("empty token for user '{}'", token.username),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
) -> Option<SocketAddr> {
    match value.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            errors.push(ValidationError::new(field, format!("'{value}': {e}")));
            None
        }
    }
}
