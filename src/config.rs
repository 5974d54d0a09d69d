use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default cache freshness window in hours (24 hours)
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

/// Timeout for every outbound HTTP request in seconds
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// Delay between starting each fetch request to avoid rate limiting (10ms)
pub const FETCH_STAGGER_DELAY_MS: u64 = 10;

/// Default bound on concurrently resolved tools
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// User agent sent with every outbound request
pub const USER_AGENT: &str = concat!("toolver/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime configuration, loaded from a JSON file with every field
/// optional
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Root of the Docker Registry HTTP API V2
    pub registry_root: String,
    /// Registry namespace tools live under
    pub namespace: String,
    /// Environment variable carrying the tool's self-reported version
    pub version_variable: String,
    /// Name of the per-tool metadata descriptor inside the image
    pub metadata_filename: String,
    /// Cache freshness window in hours
    pub cache_ttl_hours: i64,
    /// Bound on concurrently resolved tools
    pub max_concurrent: usize,
    /// Per-provider API tokens (e.g. {"github": "..."})
    pub tokens: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_root: "https://registry.hub.docker.com".to_string(),
            namespace: "library".to_string(),
            version_variable: "TOOL_VERSION".to_string(),
            metadata_filename: "meta.json".to_string(),
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            tokens: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, the default location, or
    /// fall back to defaults when no file exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = config_path();
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Returns the path to the data directory for toolver.
/// Uses $XDG_DATA_HOME/toolver if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/toolver,
/// or ./toolver if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the cache database file.
pub fn db_path() -> PathBuf {
    data_dir().join("metadata.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("toolver.log")
}

/// Returns the default config file location under the user config dir.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolver")
        .join("config.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("toolver")
}
