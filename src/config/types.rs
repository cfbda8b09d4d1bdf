use crate::fetch::types::Direction;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Every section is optional; an empty document yields the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub query: QueryConfig,
    pub pagination: PaginationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    /// Overridden by `--auth-token` when given.
    pub auth_token: Option<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.render.com/graphql".to_string(),
            auth_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub owner_id: String,
    pub region: String,
    pub page_size: u32,
    pub direction: Direction,
    pub log_types: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            owner_id: "tea-cviu8aggjchc73c07or0".to_string(),
            region: "ohio".to_string(),
            page_size: 50,
            direction: Direction::Backward,
            log_types: vec!["app".to_string(), "request".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    #[serde(with = "humantime_serde")]
    pub page_delay: Duration,
    /// `null` disables the guard.
    pub max_pages: Option<usize>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(500),
            max_pages: Some(10_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Output files are named `<YYYYMMDD>_<file_suffix>`.
    pub file_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_suffix: "render_logs.txt".to_string(),
        }
    }
}
