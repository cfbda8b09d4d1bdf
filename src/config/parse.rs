use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Loads `path` if given, otherwise returns the built-in defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

/// Parses and validates a YAML document after `$env{VAR}` expansion.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    // An empty document deserializes as unit, not as an empty mapping.
    let mut config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml)?
    };

    config.output.directory = expand_tilde(&config.output.directory);

    validate_config(&config)?;
    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         Set them (e.g. export RENDER_API_TOKEN=...) or replace them in the config file",
        unexpanded_vars.join(", ")
    )))
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if let Err(e) = reqwest::Url::parse(&config.api.endpoint) {
        errors.push(format!("api.endpoint '{}' is not a valid URL: {}", config.api.endpoint, e));
    }

    if config.api.timeout.is_zero() {
        errors.push("api.timeout must be greater than zero".to_string());
    }

    if let Some(token) = &config.api.auth_token {
        if token.trim().is_empty() {
            errors.push("api.auth_token must not be empty when set".to_string());
        }
    }

    if config.query.owner_id.trim().is_empty() {
        errors.push("query.owner_id must not be empty".to_string());
    }

    if config.query.region.trim().is_empty() {
        errors.push("query.region must not be empty".to_string());
    }

    if !(1..=100).contains(&config.query.page_size) {
        errors.push(format!(
            "query.page_size must be between 1 and 100, got {}",
            config.query.page_size
        ));
    }

    if config.query.log_types.is_empty() {
        errors.push("query.log_types must list at least one log type".to_string());
    }

    if config.pagination.max_pages == Some(0) {
        errors.push("pagination.max_pages must be greater than zero (use null to disable)".to_string());
    }

    if config.output.file_suffix.trim().is_empty() {
        errors.push("output.file_suffix must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
