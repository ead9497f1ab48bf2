//! Error types for the two failure channels.
//!
//! [`ConfigurationError`] is raised while a client is being built and is fatal.
//! [`RequestError`] is returned from every call-issuing operation and carries an
//! [`ErrorKind`] that decides whether the executor retries it.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Outcome of a call-issuing operation: exactly one of data or error.
pub type ApiResult<T> = Result<T, RequestError>;

/// Construction-time failures. These are never retried or recovered internally.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("API token is required and must be a string")]
    MissingToken,

    #[error("API token contains invalid characters")]
    InvalidTokenCharacters,

    #[error("API token is too short (minimum {min} characters)")]
    TokenTooShort { min: usize },

    /// Rejected by the strict pre-flight format check.
    #[error("API token has an invalid format: {0}")]
    MalformedToken(String),

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Failed to read API token from {}: {source}", path.display())]
    TokenSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// HTTP 401/403.
    AuthError,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    Transient,
    /// Other 4xx, or a request rejected before it was sent.
    ClientError,
    /// A 2xx response whose body is not the expected object.
    MalformedResponse,
    /// Timeouts, connection failures, unreadable bodies.
    NetworkError,
    /// Short-circuited because the service is considered unhealthy.
    ServiceDegraded,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed on a later attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Transient | ErrorKind::NetworkError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AuthError => "AuthError",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Transient => "Transient",
            ErrorKind::ClientError => "ClientError",
            ErrorKind::MalformedResponse => "MalformedResponse",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::ServiceDegraded => "ServiceDegraded",
        };
        f.write_str(name)
    }
}

/// A classified per-call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct RequestError {
    kind: ErrorKind,
    status: Option<u16>,
    message: String,
}

impl RequestError {
    pub fn new(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn auth(status: u16) -> Self {
        Self::new(
            ErrorKind::AuthError,
            Some(status),
            "Authentication failed: Invalid or expired API token",
        )
    }

    pub fn rate_limited() -> Self {
        Self::new(
            ErrorKind::RateLimited,
            Some(429),
            "Rate limit exceeded: the API returned HTTP 429",
        )
    }

    pub fn transient(status: u16) -> Self {
        Self::new(
            ErrorKind::Transient,
            Some(status),
            format!("Server error: HTTP {}", status),
        )
    }

    pub fn client(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClientError, status, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, None, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, None, message)
    }

    pub fn degraded() -> Self {
        Self::new(
            ErrorKind::ServiceDegraded,
            None,
            "Service degraded: API health is UNHEALTHY, request was not sent",
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP status of the response that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
