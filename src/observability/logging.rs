//! Structured logging.
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON format for production, text format for development
//! - Debug mode adds file and line to every record

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Error returned when a global subscriber is already installed.
#[derive(Debug, thiserror::Error)]
#[error("logging already initialized: {0}")]
pub struct LoggingError(String);

/// Install the global tracing subscriber.
pub fn init_logging(config: &ObservabilityConfig, debug: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level, debug)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_file(debug)
                    .with_line_number(debug),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(debug)
                    .with_line_number(debug),
            )
            .try_init()
    };

    result.map_err(|e| LoggingError(e.to_string()))
}

/// Filter directive for a configured level name.
fn default_directive(level: &str, debug: bool) -> String {
    let level = match level {
        "trace" | "debug" | "warn" | "error" => level,
        _ if debug => "debug",
        _ => "info",
    };
    format!("{level},hyper=warn,h2=warn")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(default_directive("loud", false), "info,hyper=warn,h2=warn");
        assert_eq!(default_directive("loud", true), "debug,hyper=warn,h2=warn");
        assert_eq!(default_directive("warn", true), "warn,hyper=warn,h2=warn");
    }
}
