//! Rolling-window health tracking.
//!
//! A [`HealthMonitor`] records the outcome and latency of checked operations in a
//! bounded FIFO window and derives a [`HealthStatus`] from it on demand.
//!
//! # Status derivation
//!
//! - `UNKNOWN` until `min_checks_for_stats` checks have been recorded.
//! - `UNHEALTHY` if the window's success rate is below `unhealthy_success_rate`
//!   or its average response time reaches `unhealthy_threshold_ms`.
//! - `DEGRADED` if the same holds for the degraded thresholds.
//! - `HEALTHY` otherwise.
//!
//! Lifetime counters are never evicted and only drive `uptime_percent`.

mod monitor;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, Serializer};

pub use monitor::HealthMonitor;

pub const DEFAULT_WINDOW_SIZE: usize = 50;
pub const DEFAULT_MIN_CHECKS_FOR_STATS: u64 = 5;
pub const DEFAULT_DEGRADED_THRESHOLD_MS: u64 = 2_000;
pub const DEFAULT_UNHEALTHY_THRESHOLD_MS: u64 = 5_000;
pub const DEFAULT_DEGRADED_SUCCESS_RATE: f64 = 0.9;
pub const DEFAULT_UNHEALTHY_SUCCESS_RATE: f64 = 0.5;

/// Availability signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "UNKNOWN"),
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

/// One observation in the rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    /// Status of this single check; failures are always `Unhealthy`.
    pub status: HealthStatus,
    pub response_time_ms: u64,
    /// Serialized as milliseconds since the Unix epoch.
    #[serde(serialize_with = "serialize_epoch_millis")]
    pub timestamp: SystemTime,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_epoch_millis<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    serializer.serialize_u64(millis)
}

/// Thresholds and window capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthMonitorConfig {
    pub window_size: usize,
    pub min_checks_for_stats: u64,
    pub degraded_threshold_ms: u64,
    pub unhealthy_threshold_ms: u64,
    pub degraded_success_rate: f64,
    pub unhealthy_success_rate: f64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            min_checks_for_stats: DEFAULT_MIN_CHECKS_FOR_STATS,
            degraded_threshold_ms: DEFAULT_DEGRADED_THRESHOLD_MS,
            unhealthy_threshold_ms: DEFAULT_UNHEALTHY_THRESHOLD_MS,
            degraded_success_rate: DEFAULT_DEGRADED_SUCCESS_RATE,
            unhealthy_success_rate: DEFAULT_UNHEALTHY_SUCCESS_RATE,
        }
    }
}

impl HealthMonitorConfig {
    /// Window holds at least one entry, at least one check is required before
    /// stats apply, rates lie in `[0, 1]`, and unhealthy thresholds are never
    /// looser than degraded ones.
    pub fn normalized(mut self) -> Self {
        self.window_size = self.window_size.max(1);
        self.min_checks_for_stats = self.min_checks_for_stats.max(1);

        self.degraded_success_rate = clamp_rate(self.degraded_success_rate);
        self.unhealthy_success_rate =
            clamp_rate(self.unhealthy_success_rate).min(self.degraded_success_rate);

        self.unhealthy_threshold_ms = self.unhealthy_threshold_ms.max(self.degraded_threshold_ms);
        self
    }

    /// Status implied by the latency of one successful check.
    pub fn latency_status(&self, response_time_ms: u64) -> HealthStatus {
        if response_time_ms >= self.unhealthy_threshold_ms {
            HealthStatus::Unhealthy
        } else if response_time_ms >= self.degraded_threshold_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}

/// Snapshot derived from the window and lifetime counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStats {
    pub status: HealthStatus,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    /// Lifetime success percentage, 0 when nothing has been checked.
    pub uptime_percent: f64,
    /// Entries currently retained in the window.
    pub window_len: usize,
    pub window_success_rate: f64,
    pub average_response_time_ms: f64,
    pub last_check: Option<HealthCheckResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(HealthStatus::Unhealthy.to_string(), "UNHEALTHY");
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"DEGRADED\""
        );
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
    }

    #[test]
    fn test_check_result_timestamp_is_epoch_millis() {
        let result = HealthCheckResult {
            status: HealthStatus::Healthy,
            response_time_ms: 42,
            timestamp: UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_123),
            error: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000_123u64);
        assert_eq!(json["responseTimeMs"], 42);
        assert_eq!(json["status"], "HEALTHY");
    }

    #[test]
    fn test_latency_status() {
        let config = HealthMonitorConfig::default();
        assert_eq!(config.latency_status(0), HealthStatus::Healthy);
        assert_eq!(config.latency_status(1_999), HealthStatus::Healthy);
        assert_eq!(config.latency_status(2_000), HealthStatus::Degraded);
        assert_eq!(config.latency_status(5_000), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_normalized_config() {
        let config = HealthMonitorConfig {
            window_size: 0,
            min_checks_for_stats: 0,
            degraded_threshold_ms: 3_000,
            unhealthy_threshold_ms: 1_000,
            degraded_success_rate: 1.5,
            unhealthy_success_rate: f64::NAN,
        }
        .normalized();

        assert_eq!(config.window_size, 1);
        assert_eq!(config.min_checks_for_stats, 1);
        assert_eq!(config.unhealthy_threshold_ms, 3_000);
        assert_eq!(config.degraded_success_rate, 1.0);
        assert_eq!(config.unhealthy_success_rate, 0.0);
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: HealthMonitorConfig =
            serde_json::from_str(r#"{"windowSize": 10, "minChecksForStats": 2}"#).unwrap();
        assert_eq!(config.window_size, 10);
        assert_eq!(config.min_checks_for_stats, 2);
        assert_eq!(config.degraded_threshold_ms, DEFAULT_DEGRADED_THRESHOLD_MS);
    }
}
