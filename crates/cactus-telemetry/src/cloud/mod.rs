//! Best-effort forwarding of flushed completion records to a remote collector.
//!
//! The local log is always written first; everything in this module runs
//! after that and can only lose cloud copies, never local lines.
//!
//! No network transport ships with this crate. Hosts register one by
//! implementing [`CloudTransport`]:
//!
//! ```rust
//! use cactus_telemetry::cloud::{CloudTransport, TransportError};
//! use cactus_telemetry::CompletionRecord;
//!
//! struct StdoutTransport;
//!
//! impl CloudTransport for StdoutTransport {
//!     fn send_batch(&self, batch: &[CompletionRecord]) -> Result<(), TransportError> {
//!         for record in batch {
//!             println!("{}", record.to_json_line().map_err(|e| TransportError::Network(e.to_string()))?);
//!         }
//!         Ok(())
//!     }
//! }
//! ```

mod circuit_breaker;
mod forwarder;
mod retry;

use std::time::Duration;
use thiserror::Error;

use crate::event::CompletionRecord;

pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitState};
pub use forwarder::{CloudForwarder, ForwarderConfig, ForwarderStats, MAX_FAILED_QUEUE_SIZE};
pub use retry::{send_with_retry, RetryOutcome, RetryPolicy, RetryableError};

/// Uploads a batch of records to a collector.
///
/// Called from the forwarder's worker thread, never from the recording path.
pub trait CloudTransport: Send + Sync {
    fn send_batch(&self, batch: &[CompletionRecord]) -> Result<(), TransportError>;
}

/// Failures reported by a [`CloudTransport`]. Never surfaced to recorder callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, DNS or timeout failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Collector answered with a non-success status.
    #[error("Collector returned status {status}")]
    Status { status: u16 },

    /// Collector asked the client to back off.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Collector refused the payload; retrying will not help.
    #[error("Batch rejected: {0}")]
    Rejected(String),
}

impl RetryableError for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::RateLimited { .. } => true,
            TransportError::Status { status } => matches!(status, 429 | 500 | 502 | 503 | 504),
            TransportError::Rejected(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}
