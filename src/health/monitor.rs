use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, SystemTime};

use log::{debug, info};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{HealthCheckResult, HealthMonitorConfig, HealthStats, HealthStatus};

/// Tracks the reliability of a checked operation.
///
/// All state sits behind one lock, so an append with its eviction, and a reset,
/// are each observed as a single step.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    state: Mutex<HealthState>,
}

#[derive(Debug, Default)]
struct HealthState {
    window: VecDeque<HealthCheckResult>,
    total_checks: u64,
    successful_checks: u64,
    failed_checks: u64,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthMonitorConfig::default())
    }
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig) -> Self {
        let config = config.normalized();
        Self {
            state: Mutex::new(HealthState {
                window: VecDeque::with_capacity(config.window_size),
                ..HealthState::default()
            }),
            config,
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Runs `op`, times it, and records the outcome.
    ///
    /// A success is classified by latency alone; a failure is always
    /// `Unhealthy` and carries the error text.
    pub async fn perform_check<F, Fut, T, E>(&self, op: F) -> HealthCheckResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let started = Instant::now();
        let outcome = op().await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(_) => self.record_success(elapsed),
            Err(e) => self.record_failure(elapsed, e),
        }
    }

    pub fn record_success(&self, elapsed: Duration) -> HealthCheckResult {
        let response_time_ms = elapsed.as_millis() as u64;
        self.record(HealthCheckResult {
            status: self.config.latency_status(response_time_ms),
            response_time_ms,
            timestamp: SystemTime::now(),
            error: None,
        })
    }

    pub fn record_failure(&self, elapsed: Duration, error: impl Display) -> HealthCheckResult {
        self.record(HealthCheckResult {
            status: HealthStatus::Unhealthy,
            response_time_ms: elapsed.as_millis() as u64,
            timestamp: SystemTime::now(),
            error: Some(error.to_string()),
        })
    }

    /// Appends an observation, evicting the oldest entry when the window is full.
    pub fn record(&self, result: HealthCheckResult) -> HealthCheckResult {
        let (before, after) = {
            let mut state = self.state.lock();
            let before = derive_status(&self.config, &state);

            state.total_checks += 1;
            if result.is_success() {
                state.successful_checks += 1;
            } else {
                state.failed_checks += 1;
            }

            if state.window.len() >= self.config.window_size {
                state.window.pop_front();
            }
            state.window.push_back(result.clone());

            (before, derive_status(&self.config, &state))
        };

        if before != after {
            info!("API health changed: {} -> {}", before, after);
        } else {
            debug!(
                "Health check recorded: {} in {}ms",
                result.status, result.response_time_ms
            );
        }
        result
    }

    pub fn status(&self) -> HealthStatus {
        derive_status(&self.config, &self.state.lock())
    }

    pub fn is_unhealthy(&self) -> bool {
        self.status() == HealthStatus::Unhealthy
    }

    pub fn stats(&self) -> HealthStats {
        let state = self.state.lock();

        let uptime_percent = if state.total_checks == 0 {
            0.0
        } else {
            state.successful_checks as f64 / state.total_checks as f64 * 100.0
        };

        HealthStats {
            status: derive_status(&self.config, &state),
            total_checks: state.total_checks,
            successful_checks: state.successful_checks,
            failed_checks: state.failed_checks,
            uptime_percent,
            window_len: state.window.len(),
            window_success_rate: window_success_rate(&state.window),
            average_response_time_ms: window_average_ms(&state.window),
            last_check: state.window.back().cloned(),
        }
    }

    /// Window contents, oldest first.
    pub fn recent_checks(&self) -> Vec<HealthCheckResult> {
        self.state.lock().window.iter().cloned().collect()
    }

    /// Clears counters and window together.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.window.clear();
        state.total_checks = 0;
        state.successful_checks = 0;
        state.failed_checks = 0;
        debug!("Health monitor reset");
    }
}

fn derive_status(config: &HealthMonitorConfig, state: &HealthState) -> HealthStatus {
    if state.total_checks < config.min_checks_for_stats || state.window.is_empty() {
        return HealthStatus::Unknown;
    }

    let success_rate = window_success_rate(&state.window);
    let average_ms = window_average_ms(&state.window);

    if success_rate < config.unhealthy_success_rate
        || average_ms >= config.unhealthy_threshold_ms as f64
    {
        HealthStatus::Unhealthy
    } else if success_rate < config.degraded_success_rate
        || average_ms >= config.degraded_threshold_ms as f64
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn window_success_rate(window: &VecDeque<HealthCheckResult>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let successes = window.iter().filter(|r| r.is_success()).count();
    successes as f64 / window.len() as f64
}

fn window_average_ms(window: &VecDeque<HealthCheckResult>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let total: u64 = window.iter().map(|r| r.response_time_ms).sum();
    total as f64 / window.len() as f64
}
