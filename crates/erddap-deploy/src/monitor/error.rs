//! Errors reported by a monitoring service client.

use thiserror::Error;

/// Errors returned by a [`MonitorClient`](super::MonitorClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitor API request timed out: {0}")]
    Timeout(String),

    #[error("Monitor API transport error: {0}")]
    Transport(String),

    #[error("Monitor API rejected the request: {0}")]
    Api(String),

    #[error("Monitor not found: {0}")]
    NotFound(String),
}

impl MonitorError {
    /// Only timeouts are retried; everything else is structural.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MonitorError::Timeout(_))
    }
}
