//! Completion recorder and its session lifecycle.
//!
//! ```text
//! Uninitialized ──init──► Active ──shutdown──► Uninitialized
//!                          │  ▲
//!                          └──┘ record_completion / flush / init (replaces)
//! ```
//!
//! Events are buffered in memory and reach `completion.log` on `flush`,
//! `shutdown`, or when the buffer fills up. The log is opened in append mode,
//! so a new session on the same cache directory continues the existing file.

use std::path::Path;
use std::sync::Arc;

use crate::cloud::{CloudForwarder, CloudTransport, ForwarderConfig, ForwarderStats};
use crate::environment::TelemetryEnvironment;
use crate::error::Result;
use crate::event::{CompletionEvent, CompletionRecord, SessionInfo};
use crate::log_file::CompletionLog;

/// Buffered events that trigger a write without an explicit flush.
pub const MAX_BUFFERED_EVENTS: usize = 512;

#[derive(Debug)]
struct ActiveSession {
    info: SessionInfo,
    log: CompletionLog,
    pending: Vec<CompletionRecord>,
    forwarder: Option<CloudForwarder>,
}

/// Records completion events for one session at a time.
#[derive(Default)]
pub struct TelemetryRecorder {
    active: Option<ActiveSession>,
    transport: Option<Arc<dyn CloudTransport>>,
    forwarder_config: ForwarderConfig,
    dropped_events: u64,
    last_cloud_stats: ForwarderStats,
}

impl std::fmt::Debug for TelemetryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRecorder")
            .field("active", &self.active)
            .field("has_transport", &self.transport.is_some())
            .field("dropped_events", &self.dropped_events)
            .finish()
    }
}

impl TelemetryRecorder {
    /// Create an uninitialized recorder with no cloud transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the transport used for cloud upload.
    ///
    /// Takes effect for sessions started after this call.
    pub fn with_transport(mut self, transport: Arc<dyn CloudTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Tune retry, circuit breaker and queue limits for cloud upload.
    pub fn with_forwarder_config(mut self, config: ForwarderConfig) -> Self {
        self.forwarder_config = config;
        self
    }

    pub fn set_transport(&mut self, transport: Option<Arc<dyn CloudTransport>>) {
        self.transport = transport;
    }

    /// Start a session, opening `<cache dir>/completion.log` for append.
    ///
    /// An already active session is flushed and closed first. If that flush
    /// fails, the old session stays active with its events still buffered and
    /// the error is returned. Any later error leaves the recorder uninitialized.
    pub fn init(
        &mut self,
        env: &TelemetryEnvironment,
        project: &str,
        session: &str,
        metadata: Option<&str>,
    ) -> Result<()> {
        if let Some(active) = self.active.as_mut() {
            log::debug!(
                target: "cactus_telemetry",
                "init called with an active session, replacing it"
            );
            Self::write_pending(active)?;
            self.shutdown()?;
        }

        let log = CompletionLog::open(env.completion_log_path()?)?;
        let info = SessionInfo::new(project, session, env.framework.as_str(), metadata);

        let forwarder = match (&self.transport, env.cloud_disabled) {
            (Some(transport), false) => Some(CloudForwarder::start(
                Arc::clone(transport),
                self.forwarder_config.clone(),
            )),
            (None, false) => {
                log::debug!(
                    target: "cactus_telemetry",
                    "Cloud upload enabled but no transport registered, recording locally only"
                );
                None
            }
            (_, true) => None,
        };

        log::info!(
            target: "cactus_telemetry",
            "Telemetry session {} started ({}/{}) at {}",
            info.session_id,
            info.project,
            info.session,
            log.path().display()
        );

        self.active = Some(ActiveSession {
            info,
            log,
            pending: Vec::new(),
            forwarder,
        });
        Ok(())
    }

    /// Buffer one completion event.
    ///
    /// Without an active session the event is dropped and counted. A full
    /// buffer is written to the log immediately; a failure there keeps the
    /// events buffered for the next flush.
    pub fn record_completion(&mut self, event: CompletionEvent) {
        let active = match self.active.as_mut() {
            Some(active) => active,
            None => {
                self.dropped_events += 1;
                log::warn!(
                    target: "cactus_telemetry",
                    "Dropping completion event for {}: telemetry not initialized",
                    event.model
                );
                return;
            }
        };

        active.pending.push(CompletionRecord::new(&active.info, event));

        if active.pending.len() >= MAX_BUFFERED_EVENTS {
            if let Err(e) = Self::write_pending(active) {
                log::warn!(
                    target: "cactus_telemetry",
                    "Failed to spill telemetry buffer: {}",
                    e
                );
            }
        }
    }

    /// Write buffered events to the log and hand them to the cloud forwarder.
    ///
    /// Returns the number of lines written; zero when nothing was pending or
    /// no session is active.
    pub fn flush(&mut self) -> Result<usize> {
        match self.active.as_mut() {
            Some(active) => Self::write_pending(active),
            None => Ok(0),
        }
    }

    /// Flush, stop cloud upload, and close the log.
    ///
    /// Always leaves the recorder uninitialized; a flush failure is returned
    /// after the session has been released. A no-op without a session.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };

        let flushed = Self::write_pending(&mut active);
        if let Some(mut forwarder) = active.forwarder.take() {
            self.last_cloud_stats = forwarder.shutdown();
        }

        log::info!(
            target: "cactus_telemetry",
            "Telemetry session {} closed",
            active.info.session_id
        );

        flushed.map(|_| ())
    }

    fn write_pending(active: &mut ActiveSession) -> Result<usize> {
        if active.pending.is_empty() {
            return Ok(0);
        }

        let written = active.log.append(&active.pending)?;
        let batch = std::mem::take(&mut active.pending);

        if let Some(forwarder) = &active.forwarder {
            forwarder.submit(batch);
        }

        log::debug!(
            target: "cactus_telemetry",
            "Flushed {} telemetry events to {}",
            written,
            active.log.path().display()
        );
        Ok(written)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Identity of the active session, if any.
    pub fn session(&self) -> Option<&SessionInfo> {
        self.active.as_ref().map(|a| &a.info)
    }

    /// Events recorded but not yet written.
    pub fn pending(&self) -> usize {
        self.active.as_ref().map(|a| a.pending.len()).unwrap_or(0)
    }

    /// Events dropped because no session was active.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Path of the open completion log.
    pub fn log_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.log.path())
    }

    /// Cloud upload counters for the active session, or for the last one
    /// that shut down.
    pub fn cloud_stats(&self) -> ForwarderStats {
        self.active
            .as_ref()
            .and_then(|a| a.forwarder.as_ref())
            .map(CloudForwarder::stats)
            .unwrap_or(self.last_cloud_stats)
    }
}

impl Drop for TelemetryRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!(
                target: "cactus_telemetry",
                "Failed to flush telemetry on drop: {}",
                e
            );
        }
    }
}
