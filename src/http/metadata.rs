//! Per-attempt call metadata for audit consumers.

use log::debug;
use serde::Serialize;

use crate::error::ErrorKind;

/// One dispatched attempt: what was called, how it ended, how long it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub endpoint: String,
    pub method: String,
    /// Absent when no response arrived (timeout, connection failure).
    pub status_code: Option<u16>,
    pub timing_ms: u64,
    /// 1-based attempt number within the logical call.
    pub attempt: u32,
    /// Classification of a failed attempt; absent on success.
    pub classification: Option<ErrorKind>,
}

/// Receives [`CallMetadata`] for every attempt the executor makes.
#[cfg_attr(test, mockall::automock)]
pub trait CallObserver: Send + Sync {
    fn on_call(&self, metadata: &CallMetadata);
}

/// Default observer: writes each attempt to the debug log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl CallObserver for LogObserver {
    fn on_call(&self, metadata: &CallMetadata) {
        debug!(
            "{} {} attempt={} status={} took {}ms{}",
            metadata.method,
            metadata.endpoint,
            metadata.attempt,
            metadata
                .status_code
                .map_or_else(|| "-".to_string(), |s| s.to_string()),
            metadata.timing_ms,
            metadata
                .classification
                .map(|k| format!(" ({})", k))
                .unwrap_or_default()
        );
    }
}
