//! # cactus-telemetry
//!
//! Local, append-only telemetry for model completions.
//!
//! A session is opened with [`init`], events are buffered with
//! [`record_completion`], and [`flush`] writes them to
//! `<cache dir>/completion.log`, one JSON object per line. [`shutdown`] flushes
//! and closes the session; `init` may be called again afterwards and continues
//! the same file.
//!
//! Flushed events can additionally be forwarded to a collector through a
//! host-provided [`cloud::CloudTransport`]. Upload is best-effort and runs on
//! a background thread; it never delays or undoes local writes.
//!
//! ## Process-wide API
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! cactus_telemetry::set_telemetry_environment("cpp", Some(PathBuf::from("/tmp/cactus")));
//! cactus_telemetry::set_cloud_disabled(true);
//! cactus_telemetry::init("my-project", "chat", None)?;
//!
//! cactus_telemetry::record_completion("qwen3-0.6b", true, 42.0, 18.5, 900.0, 64, "ok");
//! cactus_telemetry::flush()?;
//! cactus_telemetry::shutdown()?;
//! # Ok::<(), cactus_telemetry::TelemetryError>(())
//! ```
//!
//! ## Owned recorder
//!
//! ```rust,no_run
//! use cactus_telemetry::{CompletionEvent, TelemetryEnvironment, TelemetryRecorder};
//!
//! let env = TelemetryEnvironment::new("rust", "/tmp/cactus").with_cloud_disabled(true);
//! let mut recorder = TelemetryRecorder::new();
//! recorder.init(&env, "my-project", "batch", Some(r#"{"device":"ci"}"#))?;
//! recorder.record_completion(CompletionEvent::new("qwen3-0.6b", true, 42.0, 18.5, 900.0, 64, "ok"));
//! recorder.shutdown()?;
//! # Ok::<(), cactus_telemetry::TelemetryError>(())
//! ```

pub mod cloud;
pub mod environment;
pub mod error;
pub mod event;
pub mod log_file;
pub mod recorder;

mod global;

pub use environment::{TelemetryEnvironment, COMPLETION_LOG_FILE, DEFAULT_FRAMEWORK};
pub use error::{Result, TelemetryError};
pub use event::{CompletionEvent, CompletionRecord, SessionInfo};
pub use global::{
    dropped_events, environment, flush, init, is_initialized, record_completion,
    set_cloud_disabled, set_cloud_transport, set_telemetry_environment, shutdown,
};
pub use log_file::CompletionLog;
pub use recorder::{TelemetryRecorder, MAX_BUFFERED_EVENTS};

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
