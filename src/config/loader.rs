//! Configuration loading from disk and the environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::observability::Granularity;

pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const ENV_ENDPOINT: &str = "OTEL_ENDPOINT";
pub const ENV_GRANULARITY: &str = "OTEL_TRACE_GRANULARITY";
pub const ENV_HEADERS: &str = "OTEL_HEADERS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid environment variable {name}: {reason}")]
    Environment { name: &'static str, reason: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Overlay `OTEL_*` variables onto `config`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(service_name) = var(ENV_SERVICE_NAME) {
        config.telemetry.service_name = service_name;
    }
    if let Some(endpoint) = var(ENV_ENDPOINT) {
        config.telemetry.endpoint = endpoint;
    }
    if let Some(granularity) = var(ENV_GRANULARITY) {
        config.telemetry.granularity =
            granularity
                .parse::<Granularity>()
                .map_err(|e| ConfigError::Environment {
                    name: ENV_GRANULARITY,
                    reason: e.to_string(),
                })?;
    }
    if let Some(headers) = var(ENV_HEADERS) {
        let parsed = parse_headers(&headers).map_err(|reason| ConfigError::Environment {
            name: ENV_HEADERS,
            reason,
        })?;
        config.telemetry.headers.extend(parsed);
    }

    Ok(())
}

/// Parse `key=value,key2=value2`. Values may contain `=`.
pub fn parse_headers(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let mut headers = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("'{}' is not a key=value pair", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("'{}' has an empty key", pair));
        }
        headers.insert(key.to_string(), value.trim().to_string());
    }
    Ok(headers)
}
