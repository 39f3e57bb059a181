//! Configuration resolution for shelf-sync
//!
//! Provides ENV → TOML → default resolution for the sync pipeline settings.
//! The environment is passed in as a lookup function so the library never
//! touches process state; the binary passes `std::env::var`.

use serde::{Deserialize, Serialize};
use shelf_common::config::TomlConfig;
use shelf_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::services::{RateLimitConfig, SyncOptions};
use crate::utils::RetryPolicy;

pub const ENV_TOKEN: &str = "SHELF_TOKEN";
pub const ENV_USERNAME: &str = "SHELF_USERNAME";
pub const ENV_BASE_URL: &str = "SHELF_BASE_URL";
pub const ENV_DATA_DIR: &str = "SHELF_DATA_DIR";
pub const ENV_BIND: &str = "SHELF_BIND";

pub const DEFAULT_BASE_URL: &str = "https://api.discogs.com";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

/// Remote provider connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub username: Option<String>,
    pub request_timeout: Duration,
}

/// Everything the sync pipeline needs, fully resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub remote: RemoteConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub page_size: u32,
    pub enrichment_batch_size: usize,
    pub cache_ttl: Duration,
}

impl SyncConfig {
    /// Resolve from the TOML file and an environment lookup
    ///
    /// **Priority:** ENV → TOML → default
    pub fn from_sources<F>(toml: &TomlConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |name: &str| env(name).filter(|v| is_valid_key(v));

        let token = resolve_token(toml, &env_value)?;

        let base_url = env_value(ENV_BASE_URL)
            .or_else(|| toml.remote.base_url.clone().filter(|v| is_valid_key(v)))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let username = env_value(ENV_USERNAME)
            .or_else(|| toml.remote.username.clone().filter(|v| is_valid_key(v)));

        let rate_defaults = RateLimitConfig::default();
        let retry_defaults = RetryPolicy::default();
        let option_defaults = SyncOptions::default();

        let config = Self {
            remote: RemoteConfig {
                base_url,
                token,
                username,
                request_timeout: Duration::from_secs(
                    toml.remote
                        .request_timeout_secs
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
                ),
            },
            rate_limit: RateLimitConfig {
                requests_per_interval: toml
                    .rate_limit
                    .requests_per_interval
                    .unwrap_or(rate_defaults.requests_per_interval),
                interval_ms: toml
                    .rate_limit
                    .interval_ms
                    .unwrap_or(rate_defaults.interval_ms),
                max_concurrent: toml
                    .rate_limit
                    .max_concurrent
                    .unwrap_or(rate_defaults.max_concurrent),
            },
            retry: RetryPolicy::new(
                toml.retry.max_retries.unwrap_or(retry_defaults.max_retries),
                toml.retry
                    .base_delay_ms
                    .unwrap_or(retry_defaults.base_delay_ms),
                toml.retry.max_delay_ms.unwrap_or(retry_defaults.max_delay_ms),
            ),
            page_size: toml.sync.page_size.unwrap_or(option_defaults.page_size),
            enrichment_batch_size: toml
                .sync
                .enrichment_batch_size
                .unwrap_or(option_defaults.enrichment_batch_size),
            cache_ttl: Duration::from_secs(
                toml.sync
                    .cache_ttl_hours
                    .unwrap_or(DEFAULT_CACHE_TTL_HOURS)
                    .saturating_mul(60 * 60),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests_per_interval == 0 {
            return Err(Error::Config(
                "rate_limit.requests_per_interval must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.max_concurrent == 0 {
            return Err(Error::Config(
                "rate_limit.max_concurrent must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.page_size) {
            return Err(Error::Config(format!(
                "sync.page_size must be between 1 and 100, got {}",
                self.page_size
            )));
        }
        if self.enrichment_batch_size == 0 {
            return Err(Error::Config(
                "sync.enrichment_batch_size must be at least 1".to_string(),
            ));
        }
        if !self.remote.base_url.starts_with("http://") && !self.remote.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "remote.base_url must be an http(s) URL, got {}",
                self.remote.base_url
            )));
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            username: self.remote.username.clone(),
            page_size: self.page_size,
            enrichment_batch_size: self.enrichment_batch_size,
        }
    }
}

/// Resolve the access token
///
/// **Priority:** ENV → TOML. Warns when both are set.
pub fn resolve_token<F>(toml: &TomlConfig, env: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let env_token = env(ENV_TOKEN).filter(|t| is_valid_key(t));
    let toml_token = toml.remote.token.as_ref().filter(|t| is_valid_key(t));

    if env_token.is_some() && toml_token.is_some() {
        warn!("Access token found in multiple sources: environment, TOML. Using environment (highest priority).");
    }

    if let Some(token) = env_token {
        info!("Access token loaded from environment variable");
        return Ok(token.trim().to_string());
    }

    if let Some(token) = toml_token {
        info!("Access token loaded from TOML config");
        return Ok(token.trim().to_string());
    }

    Err(Error::Config(format!(
        "Access token not configured. Please configure using one of:\n\
         1. Environment: {}=your-token-here\n\
         2. TOML config: ~/.config/shelf/shelf.toml ([remote] token = \"your-token\")",
        ENV_TOKEN
    )))
}

/// Resolve the HTTP bind address: CLI → ENV → TOML → default
pub fn resolve_bind_address<F>(cli: Option<&str>, toml: &TomlConfig, env: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    cli.map(str::to_string)
        .or_else(|| env(ENV_BIND).filter(|v| is_valid_key(v)))
        .or_else(|| toml.bind_address.clone())
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string())
}

/// Non-empty, non-whitespace value
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
