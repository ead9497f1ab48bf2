//! HTTP layer: rate limiting, request execution, failure classification and retry.

mod executor;
mod limiter;
mod metadata;
mod retry;

pub use executor::{ApiRequest, RequestExecutor, USER_AGENT};
pub use limiter::RateLimiter;
pub use metadata::{CallMetadata, CallObserver, LogObserver};
pub use retry::{
    Backoff, JsonObject, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS, classify_status,
    classify_transport, decode_object, parse_retry_after,
};

#[cfg(test)]
pub use metadata::MockCallObserver;
