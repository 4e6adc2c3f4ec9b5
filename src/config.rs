// quarksave Configuration Module
// Client settings: built-in defaults, then QUARK_* environment overrides

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::providers::ProviderError;

pub const DEFAULT_API_BASE: &str = "https://drive-pc.quark.cn/1/clouddrive";

/// Settings shared by the gateway and every component built on it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// API base URL, endpoints are appended to it
    pub api_base: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Page size for share listings
    pub page_size: u32,
    /// Page size for own-drive listings
    pub dir_page_size: u32,
    /// Delay between two transfer status polls
    pub poll_interval_ms: u64,
    /// Give up waiting for a transfer after this long
    pub transfer_timeout_secs: u64,
    /// Cookie file override; `None` uses the per-user config dir
    #[serde(default)]
    pub cookies_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 30,
            page_size: 50,
            dir_page_size: 100,
            poll_interval_ms: 2000,
            transfer_timeout_secs: 300,
            cookies_path: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>, fallback: T) -> Result<T, ProviderError> {
    match raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(fallback),
        Some(v) => v
            .parse::<T>()
            .map_err(|_| ProviderError::InvalidConfig(format!("{} is not a valid number: {}", name, v))),
    }
}

impl ClientConfig {
    /// Defaults overridden by `QUARK_*` environment variables
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let config = Self {
            api_base: lookup("QUARK_API_BASE")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(d.api_base),
            request_timeout_secs: parse_var("QUARK_TIMEOUT_SECS", lookup("QUARK_TIMEOUT_SECS"), d.request_timeout_secs)?,
            page_size: parse_var("QUARK_PAGE_SIZE", lookup("QUARK_PAGE_SIZE"), d.page_size)?,
            dir_page_size: parse_var("QUARK_DIR_PAGE_SIZE", lookup("QUARK_DIR_PAGE_SIZE"), d.dir_page_size)?,
            poll_interval_ms: parse_var("QUARK_POLL_INTERVAL_MS", lookup("QUARK_POLL_INTERVAL_MS"), d.poll_interval_ms)?,
            transfer_timeout_secs: parse_var(
                "QUARK_TRANSFER_TIMEOUT_SECS",
                lookup("QUARK_TRANSFER_TIMEOUT_SECS"),
                d.transfer_timeout_secs,
            )?,
            cookies_path: lookup("QUARK_COOKIES_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(|v| crate::credential_store::expand_home(v.trim())),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if !(self.api_base.starts_with("https://") || self.api_base.starts_with("http://")) {
            return Err(ProviderError::InvalidConfig(format!(
                "API base must be an http(s) URL: {}",
                self.api_base
            )));
        }
        if self.page_size == 0 || self.dir_page_size == 0 {
            return Err(ProviderError::InvalidConfig("Page sizes must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 || self.transfer_timeout_secs == 0 {
            return Err(ProviderError::InvalidConfig("Timeouts must be at least 1 second".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}
