//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "APP_";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    Env { key: String, value: String },
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: file (if given) → environment overrides → validation.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => AppConfig::default(),
    };
    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply `APP_*` overrides read through `lookup`.
pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(v) = var("RPC_ADDRESS") {
        config.server.rpc_address = v;
    }
    if let Some(v) = var("HTTP_ADDRESS") {
        config.server.http_address = v;
    }
    if let Some(v) = var("DEBUG") {
        config.runtime.debug = parse_bool(&format!("{ENV_PREFIX}DEBUG"), &v)?;
    }
    if let Some(v) = var("DEFAULT_LOCALE") {
        config.runtime.default_locale = v.to_lowercase();
    }
    if let Some(v) = var("MESSAGES_DIR") {
        config.runtime.messages_dir = Some(v);
    }
    if let Some(v) = var("LOG_LEVEL") {
        config.observability.log_level = v.to_lowercase();
    }
    if let Some(v) = var("LOG_FORMAT") {
        config.observability.log_format = v.to_lowercase();
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [server]
            rpc_address = "127.0.0.1:7000"

            [[auth.tokens]]
            token = "abc"
            username = "root"
            group = "admin"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.rpc_address, "127.0.0.1:7000");
        assert_eq!(config.server.http_address, "0.0.0.0:80");
        assert_eq!(config.shutdown.server_grace_secs, 10);
        assert_eq!(config.auth.tokens[0].group, crate::auth::Group::Admin);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("APP_HTTP_ADDRESS", "127.0.0.1:9999"),
            ("APP_DEBUG", "true"),
            ("APP_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        apply_env(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.server.http_address, "127.0.0.1:9999");
        assert!(config.runtime.debug);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn bad_bool_is_rejected() {
        let mut config = AppConfig::default();
        let err = apply_env(&mut config, |k| (k == "APP_DEBUG").then(|| "maybe".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }
}
