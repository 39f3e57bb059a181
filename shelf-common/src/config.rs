//! Configuration file loading and data folder resolution
//!
//! The TOML file is optional. A missing file yields defaults (with a
//! warning); a malformed file is an error, since silently ignoring a typo in
//! a token or a rate limit would be worse than refusing to start.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name used under the platform config/data directories
pub const APP_DIR_NAME: &str = "shelf";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "shelf.toml";

/// Client-identifying header value sent with every remote request
pub fn user_agent() -> String {
    format!(
        "shelf/{} (+https://github.com/shelf-sync/shelf)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Configuration as written in `shelf.toml`
///
/// Every field is optional; resolution against environment variables and
/// built-in defaults happens in the service crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the SQLite cache database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<PathBuf>,

    /// HTTP bind address, e.g. "127.0.0.1:5740"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote catalog provider connection
    #[serde(default)]
    pub remote: RemoteSection,

    /// Outbound request throttling
    #[serde(default)]
    pub rate_limit: RateLimitSection,

    /// Retry/backoff policy
    #[serde(default)]
    pub retry: RetrySection,

    /// Pipeline tuning and cache TTL
    #[serde(default)]
    pub sync: SyncSection,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[remote]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Personal access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Collection owner; looked up through the identity endpoint when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// `[rate_limit]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
}

/// `[retry]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

/// `[sync]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_hours: Option<u64>,
}

/// Default location of `shelf.toml` for the platform
///
/// `~/.config/shelf/shelf.toml` on Linux, the equivalent application
/// config directory elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load `shelf.toml`
///
/// A missing file is not an error: defaults are returned and a warning is
/// logged.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Data folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_data_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_data_folder()
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./shelf_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version() {
        let ua = user_agent();
        assert!(ua.starts_with("shelf/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_empty_toml_parses_to_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_other_sections_default() {
        let config: TomlConfig = toml::from_str(
            r#"
            [remote]
            username = "digger"

            [sync]
            cache_ttl_hours = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.username.as_deref(), Some("digger"));
        assert_eq!(config.sync.cache_ttl_hours, Some(6));
        assert_eq!(config.rate_limit, RateLimitSection::default());
    }

    #[test]
    fn test_resolve_data_folder_cli_wins() {
        let resolved = resolve_data_folder(
            Some(Path::new("/from/cli")),
            "SHELF_TEST_UNSET_VARIABLE",
            Some(Path::new("/from/toml")),
        );
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_resolve_data_folder_toml_before_default() {
        let resolved = resolve_data_folder(
            None,
            "SHELF_TEST_UNSET_VARIABLE",
            Some(Path::new("/from/toml")),
        );
        assert_eq!(resolved, PathBuf::from("/from/toml"));
    }
}
