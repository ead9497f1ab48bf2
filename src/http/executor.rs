//! Dispatches one logical API call: headers, transport, classification, retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT as USER_AGENT_HEADER,
};
use reqwest::{Client, Method};
use serde_json::Value;

use super::limiter::RateLimiter;
use super::metadata::{CallMetadata, CallObserver, LogObserver};
use super::retry::{
    Backoff, JsonObject, classify_status, classify_transport, decode_object, parse_retry_after,
};
use crate::config::ClientConfig;
use crate::credentials::ApiToken;
use crate::error::{ApiResult, ConfigurationError, RequestError};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("flagsweep/", env!("FLAGSWEEP_VERSION"));

/// A request relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    /// `path` is appended to the base URL and must start with `/`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Adds a header. Later values for the same name replace earlier ones and
    /// every caller header replaces the client default of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON request body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Executes [`ApiRequest`]s against one base URL under a shared rate limit.
pub struct RequestExecutor {
    client: Client,
    base_url: String,
    default_headers: HeaderMap,
    limiter: RateLimiter,
    max_retries: u32,
    timeout: Duration,
    backoff: Backoff,
    observer: Arc<dyn CallObserver>,
}

impl RequestExecutor {
    /// Builds the HTTP client with the bearer token, JSON content type and
    /// user agent as default headers.
    pub fn new(config: &ClientConfig, token: &ApiToken) -> Result<Self, ConfigurationError> {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_| ConfigurationError::InvalidTokenCharacters)?;
        auth_value.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(AUTHORIZATION, auth_value);
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
        debug!("HTTP client configured with token {}", token.masked());

        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            default_headers,
            limiter: RateLimiter::new(config.max_rps()),
            max_retries: config.max_retries(),
            timeout: config.timeout(),
            backoff: Backoff::default(),
            observer: Arc::new(LogObserver),
        })
    }

    /// Replaces the default [`LogObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs the request, retrying retryable failures up to `max_retries`
    /// additional attempts. Never panics on remote failures.
    pub async fn execute(&self, request: &ApiRequest) -> ApiResult<JsonObject> {
        self.execute_with(request, self.observer.as_ref()).await
    }

    /// Like [`execute`](Self::execute), reporting attempts to `observer`
    /// instead of the executor's own observer.
    #[tracing::instrument(skip(self, request, observer), fields(method = %request.method, path = %request.path))]
    pub async fn execute_with(
        &self,
        request: &ApiRequest,
        observer: &dyn CallObserver,
    ) -> ApiResult<JsonObject> {
        validate_path(&request.path)?;
        let headers = self.merge_headers(&request.headers)?;
        let url = format!("{}{}", self.base_url, request.path);
        let max_attempts = self.max_retries.saturating_add(1);

        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.limiter.acquire().await;

            let (outcome, retry_hint) = self
                .attempt(request, &url, &headers, attempt, observer)
                .await;
            match outcome {
                Ok(object) => return Ok(object),
                Err(e) => {
                    if !e.is_retryable() {
                        debug!("{} {}: non-retryable error: {}", request.method, request.path, e);
                        return Err(e);
                    }

                    if attempt < max_attempts {
                        let delay = self.backoff.delay(attempt, retry_hint);
                        warn!(
                            "{} {}: attempt {}/{} failed ({}), retrying in {}ms...",
                            request.method,
                            request.path,
                            attempt,
                            max_attempts,
                            e,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RequestError::network(format!(
                "{} {}: failed after {} attempts",
                request.method, request.path, max_attempts
            ))
        }))
    }

    /// Single attempt without retry. Returns the outcome and any `Retry-After` hint.
    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &str,
        headers: &HeaderMap,
        attempt: u32,
        observer: &dyn CallObserver,
    ) -> (ApiResult<JsonObject>, Option<Duration>) {
        let started = Instant::now();

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers.clone())
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let (outcome, status, hint) = match builder.send().await {
            Err(e) => (Err(classify_transport(&e, self.timeout)), None, None),
            Ok(response) => {
                let status = response.status();
                let hint = parse_retry_after(response.headers());
                let outcome = match classify_status(status, &request.path) {
                    Some(err) => Err(err),
                    None => match response.bytes().await {
                        Ok(bytes) => decode_object(status, &bytes),
                        Err(e) => Err(classify_transport(&e, self.timeout)),
                    },
                };
                (outcome, Some(status.as_u16()), hint)
            }
        };

        observer.on_call(&CallMetadata {
            endpoint: request.path.clone(),
            method: request.method.to_string(),
            status_code: status,
            timing_ms: started.elapsed().as_millis() as u64,
            attempt,
            classification: outcome.as_ref().err().map(RequestError::kind),
        });

        (outcome, hint)
    }

    fn merge_headers(&self, overrides: &[(String, String)]) -> ApiResult<HeaderMap> {
        let mut headers = self.default_headers.clone();
        for (name, value) in overrides {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                RequestError::client(None, format!("Invalid header name '{}'", name))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                RequestError::client(None, format!("Invalid value for header '{}'", name))
            })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

fn validate_path(path: &str) -> ApiResult<()> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(RequestError::client(
            None,
            format!("Invalid request path '{}': must start with '/'", path),
        ));
    }
    Ok(())
}
