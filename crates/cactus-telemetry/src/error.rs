//! Error types for local telemetry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers of the recorder.
///
/// Cloud transport failures are not represented here; they stay inside the
/// forwarder (see [`crate::cloud::TransportError`]).
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The environment does not describe a usable cache location.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The log file or its directory could not be created, opened or written.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded as a JSON line.
    #[error("Failed to serialize telemetry record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl TelemetryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TelemetryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
