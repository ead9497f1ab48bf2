//! HTTP implementation of [`FlagService`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{FeatureFlag, FlagList, FlagService, FlagStatus};
use crate::config::{ClientConfig, ClientOptions};
use crate::credentials::ApiToken;
use crate::env::{BASE_URL_ENV, Environment, resolve_token};
use crate::error::{ApiResult, ConfigurationError, RequestError};
use crate::health::{HealthCheckResult, HealthMonitor, HealthMonitorConfig, HealthStats, HealthStatus};
use crate::http::{
    ApiRequest, Backoff, CallMetadata, CallObserver, JsonObject, LogObserver, RequestExecutor,
};

/// Endpoint used by [`FlagClient::check_health`].
pub const HEALTH_PROBE_PATH: &str = "/api/v2";

/// Client for the feature-flag management API.
///
/// Cloning is cheap; clones share the rate limiter and health monitor. Two
/// clients built separately share nothing.
#[derive(Clone)]
pub struct FlagClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    executor: RequestExecutor,
    health: Arc<HealthMonitor>,
    recorder: HealthRecorder,
}

/// Forwards attempt metadata downstream and feeds it into the health window.
///
/// Attempts that got a definitive answer from the service count as successes,
/// even auth or client errors; retryable failures count as failures.
struct HealthRecorder {
    health: Arc<HealthMonitor>,
    downstream: Arc<dyn CallObserver>,
}

impl CallObserver for HealthRecorder {
    fn on_call(&self, metadata: &CallMetadata) {
        self.downstream.on_call(metadata);

        let elapsed = Duration::from_millis(metadata.timing_ms);
        match metadata.classification {
            Some(kind) if kind.is_retryable() => {
                self.health.record_failure(elapsed, kind);
            }
            _ => {
                self.health.record_success(elapsed);
            }
        }
    }
}

/// Builder for [`FlagClient`]. Validation happens in [`build`](Self::build).
pub struct FlagClientBuilder {
    token: Option<String>,
    options: ClientOptions,
    observer: Arc<dyn CallObserver>,
    health_config: HealthMonitorConfig,
    backoff: Backoff,
}

impl FlagClientBuilder {
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Receives per-attempt [`CallMetadata`]. Defaults to [`LogObserver`].
    pub fn observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn health_config(mut self, config: HealthMonitorConfig) -> Self {
        self.health_config = config;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> Result<FlagClient, ConfigurationError> {
        let token = ApiToken::parse(self.token.as_deref())?;
        let config = ClientConfig::from_options(&self.options)?;

        let executor = RequestExecutor::new(&config, &token)?
            .with_observer(Arc::clone(&self.observer))
            .with_backoff(self.backoff);
        let health = Arc::new(HealthMonitor::new(self.health_config));

        debug!(
            "Flag client ready: base_url={} max_rps={} max_retries={} timeout={}ms degradation={}",
            config.base_url(),
            config.max_rps(),
            config.max_retries(),
            config.timeout_ms(),
            config.graceful_degradation()
        );

        Ok(FlagClient {
            inner: Arc::new(ClientInner {
                config,
                executor,
                recorder: HealthRecorder {
                    health: Arc::clone(&health),
                    downstream: self.observer,
                },
                health,
            }),
        })
    }
}

impl FlagClient {
    /// Validates the token, normalizes the options, and builds the client.
    pub fn new(token: &str, options: ClientOptions) -> Result<Self, ConfigurationError> {
        Self::builder(Some(token)).options(options).build()
    }

    pub fn builder(token: Option<&str>) -> FlagClientBuilder {
        FlagClientBuilder {
            token: token.map(str::to_string),
            options: ClientOptions::default(),
            observer: Arc::new(LogObserver),
            health_config: HealthMonitorConfig::default(),
            backoff: Backoff::default(),
        }
    }

    /// Resolves the token and base URL from the environment, then validates
    /// exactly as [`new`](Self::new) does.
    ///
    /// The token comes from `FLAGSWEEP_API_TOKEN`, or else from the file named by
    /// `FLAGSWEEP_API_TOKEN_FILE`. `FLAGSWEEP_BASE_URL` applies only when the
    /// options do not set a base URL.
    pub async fn from_env<E>(env: &E, options: ClientOptions) -> Result<Self, ConfigurationError>
    where
        E: Environment + ?Sized,
    {
        let (token, options) = resolve_env(env, options).await?;
        Self::builder(token.as_deref()).options(options).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.inner.health
    }

    pub fn health_status(&self) -> HealthStatus {
        self.inner.health.status()
    }

    pub fn health_stats(&self) -> HealthStats {
        self.inner.health.stats()
    }

    /// Issues a request against an arbitrary API path.
    pub async fn request(&self, request: ApiRequest) -> ApiResult<JsonObject> {
        self.ensure_available()?;
        self.inner
            .executor
            .execute_with(&request, &self.inner.recorder)
            .await
    }

    /// Probes the API root through the health monitor. Runs even when the
    /// client is degraded so that a recovered service can be noticed.
    pub async fn check_health(&self) -> HealthCheckResult {
        let request = ApiRequest::get(HEALTH_PROBE_PATH);
        let executor = &self.inner.executor;
        self.inner
            .health
            .perform_check(|| executor.execute(&request))
            .await
    }

    fn ensure_available(&self) -> ApiResult<()> {
        if self.inner.config.graceful_degradation() && self.inner.health.is_unhealthy() {
            warn!("API health is UNHEALTHY, short-circuiting request");
            return Err(RequestError::degraded());
        }
        Ok(())
    }

    async fn request_as<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let object = self.request(request).await?;
        decode(object)
    }

    async fn set_archived(&self, project: &str, key: &str, archived: bool) -> ApiResult<FeatureFlag> {
        let path = format!(
            "/api/v2/flags/{}/{}",
            segment("project", project)?,
            segment("flag key", key)?
        );
        let patch = json!([{ "op": "replace", "path": "/archived", "value": archived }]);
        self.request_as(ApiRequest::patch(path).json(patch)).await
    }
}

#[async_trait]
impl FlagService for FlagClient {
    #[tracing::instrument(skip(self))]
    async fn list_flags(&self, project: &str) -> ApiResult<FlagList> {
        let path = format!("/api/v2/flags/{}", segment("project", project)?);
        self.request_as(ApiRequest::get(path)).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_flag(&self, project: &str, key: &str) -> ApiResult<FeatureFlag> {
        let path = format!(
            "/api/v2/flags/{}/{}",
            segment("project", project)?,
            segment("flag key", key)?
        );
        self.request_as(ApiRequest::get(path)).await
    }

    #[tracing::instrument(skip(self))]
    async fn archive_flag(&self, project: &str, key: &str) -> ApiResult<FeatureFlag> {
        self.set_archived(project, key, true).await
    }

    #[tracing::instrument(skip(self))]
    async fn restore_flag(&self, project: &str, key: &str) -> ApiResult<FeatureFlag> {
        self.set_archived(project, key, false).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_flag_status(
        &self,
        project: &str,
        environment: &str,
        key: &str,
    ) -> ApiResult<FlagStatus> {
        let path = format!(
            "/api/v2/flag-statuses/{}/{}/{}",
            segment("project", project)?,
            segment("environment", environment)?,
            segment("flag key", key)?
        );
        self.request_as(ApiRequest::get(path)).await
    }
}

/// A single path segment: non-empty, no separators, no whitespace.
fn segment<'a>(what: &str, value: &'a str) -> ApiResult<&'a str> {
    let invalid = value.is_empty()
        || value
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control());
    if invalid {
        return Err(RequestError::client(
            None,
            format!("Invalid {} '{}'", what, value),
        ));
    }
    Ok(value)
}

fn decode<T: DeserializeOwned>(object: JsonObject) -> ApiResult<T> {
    serde_json::from_value(Value::Object(object))
        .map_err(|e| RequestError::malformed(format!("Unexpected response shape: {}", e)))
}

async fn resolve_env<E>(
    env: &E,
    mut options: ClientOptions,
) -> Result<(Option<String>, ClientOptions), ConfigurationError>
where
    E: Environment + ?Sized,
{
    let token = resolve_token(env).await?;

    if options.base_url.is_none() {
        if let Ok(url) = env.var(BASE_URL_ENV) {
            options.base_url = Some(url);
        }
    }

    Ok((token, options))
}
