//! Response classification and retry backoff.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::{Map, Value};

use crate::error::{ApiResult, RequestError};

/// A decoded top-level JSON object.
pub type JsonObject = Map<String, Value>;

/// Delay before the first retry.
pub const RETRY_BASE_DELAY_MS: u64 = 200;

/// Upper bound for any single retry delay, including `Retry-After` hints.
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Maps a non-success status to a classified error. Returns `None` for 2xx.
pub fn classify_status(status: StatusCode, endpoint: &str) -> Option<RequestError> {
    if status.is_success() {
        return None;
    }

    let code = status.as_u16();
    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RequestError::auth(code),
        StatusCode::TOO_MANY_REQUESTS => RequestError::rate_limited(),
        StatusCode::NOT_FOUND => {
            RequestError::client(Some(code), format!("Not found: {}", endpoint))
        }
        s if s.is_server_error() => RequestError::transient(code),
        s if s.is_client_error() => {
            RequestError::client(Some(code), format!("Request error: HTTP {}", code))
        }
        // Informational and unfollowed redirects
        _ => RequestError::client(Some(code), format!("Unexpected response: HTTP {}", code)),
    };
    Some(error)
}

/// Maps a transport failure (no usable response) to a classified error.
pub fn classify_transport(error: &reqwest::Error, timeout: Duration) -> RequestError {
    if error.is_timeout() {
        RequestError::network(format!(
            "Request timed out after {}ms",
            timeout.as_millis()
        ))
    } else if error.is_connect() {
        RequestError::network(format!("Connection failed: {}", error))
    } else {
        RequestError::network(format!("Network error: {}", error))
    }
}

/// Decodes a 2xx body, which must be a JSON object. Only 204 No Content and
/// 205 Reset Content may arrive without one; they decode to an empty object.
pub fn decode_object(status: StatusCode, body: &[u8]) -> ApiResult<JsonObject> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return match status {
            StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT => Ok(JsonObject::new()),
            _ => Err(RequestError::malformed(format!(
                "Empty response body with HTTP {}",
                status.as_u16()
            ))),
        };
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RequestError::malformed("Expected object response from API")),
        Err(e) => Err(RequestError::malformed(format!("Invalid JSON response: {}", e))),
    }
}

/// Reads a delay-seconds `Retry-After` header. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Exponential backoff with up to 50% additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RETRY_BASE_DELAY_MS),
            Duration::from_millis(RETRY_MAX_DELAY_MS),
        )
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay before retry number `retry` (1-based). A server hint raises the
    /// delay but never past the cap.
    pub fn delay(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let exp = self.base.saturating_mul(1 << exponent).min(self.max);

        let jitter_cap = (exp.as_millis() / 2) as u64;
        let jitter = Duration::from_millis(fastrand::u64(0..=jitter_cap));

        let delay = exp.saturating_add(jitter);
        let delay = match hint {
            Some(hint) if hint > delay => hint,
            _ => delay,
        };
        delay.min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_classify_success_is_none() {
        assert!(classify_status(StatusCode::OK, "/x").is_none());
        assert!(classify_status(StatusCode::NO_CONTENT, "/x").is_none());
    }

    #[test]
    fn test_classify_auth_errors() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = classify_status(status, "/x").unwrap();
            assert_eq!(err.kind(), ErrorKind::AuthError);
            assert_eq!(
                err.message(),
                "Authentication failed: Invalid or expired API token"
            );
        }
    }

    #[test]
    fn test_classify_rate_limited() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "/x").unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_client_errors() {
        let err = classify_status(StatusCode::NOT_FOUND, "/api/v2/flags/p/k").unwrap();
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert!(err.message().contains("/api/v2/flags/p/k"));

        let err = classify_status(StatusCode::BAD_REQUEST, "/x").unwrap();
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert_eq!(err.status(), Some(400));
        assert!(!err.is_retryable());

        let err = classify_status(StatusCode::NOT_MODIFIED, "/x").unwrap();
        assert_eq!(err.kind(), ErrorKind::ClientError);
    }

    #[test]
    fn test_classify_server_errors_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = classify_status(status, "/x").unwrap();
            assert_eq!(err.kind(), ErrorKind::Transient);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_decode_object() {
        let map = decode_object(StatusCode::OK, br#"{"key": "flag-a"}"#).unwrap();
        assert_eq!(map["key"], "flag-a");

        assert!(decode_object(StatusCode::NO_CONTENT, b"").unwrap().is_empty());
        assert!(decode_object(StatusCode::RESET_CONTENT, b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_decode_empty_body_needs_no_content_status() {
        for status in [StatusCode::OK, StatusCode::CREATED] {
            let err = decode_object(status, b"").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedResponse);
            assert!(err.message().contains("Empty response body"));
        }
        let err = decode_object(StatusCode::OK, b" \n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        let bodies: [&[u8]; 5] = [b"[1, 2]", b"\"text\"", b"42", b"null", b"true"];
        for body in bodies {
            let err = decode_object(StatusCode::OK, body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedResponse);
            assert!(err.message().contains("Expected object response"));
        }
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = decode_object(StatusCode::OK, b"{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(err.message().starts_with("Invalid JSON response"));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_backoff_grows_exponentially_within_jitter() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));

        for _ in 0..20 {
            let first = backoff.delay(1, None);
            assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));

            let third = backoff.delay(3, None);
            assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.delay(30, None), Duration::from_secs(1));
        assert_eq!(
            backoff.delay(1, Some(Duration::from_secs(60))),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_backoff_honors_larger_hint() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(
            backoff.delay(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }
}
