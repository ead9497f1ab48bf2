//! Client options and their normalized form.
//!
//! [`ClientOptions`] is what a configuration loader hands over: every field is
//! optional and may be out of range. [`ClientConfig`] is the immutable result of
//! applying defaults and clamps to it.
//!
//! | Option                      | Default                          | Clamp            |
//! |-----------------------------|----------------------------------|------------------|
//! | `base_url`                  | [`DEFAULT_BASE_URL`]             | must be http(s)  |
//! | `max_rps`                   | [`DEFAULT_MAX_RPS`]              | `>= 1`           |
//! | `max_retries`               | [`DEFAULT_MAX_RETRIES`]          | `>= 0`           |
//! | `timeout_ms`                | [`DEFAULT_TIMEOUT_MS`]           | `>= 1000`        |
//! | `enable_graceful_degradation` | `false`                        |                  |

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

pub const DEFAULT_BASE_URL: &str = "https://app.launchdarkly.com";
pub const DEFAULT_MAX_RPS: u32 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const MIN_MAX_RPS: u32 = 1;
pub const MIN_TIMEOUT_MS: u64 = 1_000;

/// Raw, unvalidated client options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientOptions {
    pub base_url: Option<String>,
    pub max_rps: Option<i64>,
    pub max_retries: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub enable_graceful_degradation: Option<bool>,
}

impl ClientOptions {
    /// All fields unset, so every default applies.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn max_rps(mut self, rps: i64) -> Self {
        self.max_rps = Some(rps);
        self
    }

    pub fn max_retries(mut self, retries: i64) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn timeout_ms(mut self, ms: i64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn graceful_degradation(mut self, enabled: bool) -> Self {
        self.enable_graceful_degradation = Some(enabled);
        self
    }
}

/// Normalized client configuration. Invariants: `max_rps >= 1`,
/// `timeout >= 1s`, `base_url` is an absolute http(s) URL with no trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
    base_url: String,
    max_rps: u32,
    max_retries: u32,
    timeout_ms: u64,
    enable_graceful_degradation: bool,
}

impl ClientConfig {
    /// Applies defaults and clamps. Only an unusable base URL is rejected.
    pub fn from_options(options: &ClientOptions) -> Result<Self, ConfigurationError> {
        let base_url = normalize_base_url(options.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let max_rps = options
            .max_rps
            .map(|v| v.clamp(MIN_MAX_RPS as i64, u32::MAX as i64) as u32)
            .unwrap_or(DEFAULT_MAX_RPS);

        let max_retries = options
            .max_retries
            .map(|v| v.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let timeout_ms = options
            .timeout_ms
            .map(|v| v.max(MIN_TIMEOUT_MS as i64) as u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Ok(Self {
            base_url,
            max_rps,
            max_retries,
            timeout_ms,
            enable_graceful_degradation: options.enable_graceful_degradation.unwrap_or(false),
        })
    }

    /// Absolute http(s) URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Calls issued per second, at least 1.
    pub fn max_rps(&self) -> u32 {
        self.max_rps
    }

    /// Additional attempts after a retryable failure.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Per-attempt timeout, at least 1000.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// [`timeout_ms`](Self::timeout_ms) as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether calls short-circuit while health is `UNHEALTHY`.
    pub fn graceful_degradation(&self) -> bool {
        self.enable_graceful_degradation
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_rps: DEFAULT_MAX_RPS,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            enable_graceful_degradation: false,
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed".to_string()));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}
