//! Process-wide telemetry state behind the free functions in the crate root.
//!
//! Hosts that cannot hold a [`TelemetryRecorder`] themselves (the C ABI,
//! mainly) configure the environment once and then drive one shared recorder.
//! Every call takes the same lock, so a `flush` or `shutdown` always includes
//! the events recorded before it on any thread.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::cloud::CloudTransport;
use crate::environment::TelemetryEnvironment;
use crate::error::Result;
use crate::event::CompletionEvent;
use crate::recorder::TelemetryRecorder;

struct GlobalTelemetry {
    env: TelemetryEnvironment,
    recorder: TelemetryRecorder,
}

static GLOBAL: OnceLock<Mutex<GlobalTelemetry>> = OnceLock::new();

fn global() -> MutexGuard<'static, GlobalTelemetry> {
    GLOBAL
        .get_or_init(|| {
            Mutex::new(GlobalTelemetry {
                env: TelemetryEnvironment::from_env(),
                recorder: TelemetryRecorder::new(),
            })
        })
        .lock()
        // A panic while holding the lock leaves the state usable; telemetry
        // must not take the host down with it.
        .unwrap_or_else(PoisonError::into_inner)
}

/// Set the framework name and cache directory used by the next `init`.
///
/// `None` (or an empty path) for the cache location falls back to the
/// platform cache directory. Does not affect an already active session.
pub fn set_telemetry_environment(framework: &str, cache_location: Option<PathBuf>) {
    let mut state = global();
    state.env.framework = framework.to_string();
    state.env.cache_location = cache_location.filter(|p| !p.as_os_str().is_empty());
}

/// Enable or disable cloud upload for sessions started afterwards.
pub fn set_cloud_disabled(disabled: bool) {
    global().env.cloud_disabled = disabled;
}

/// Register (or clear) the transport used for cloud upload.
pub fn set_cloud_transport(transport: Option<Arc<dyn CloudTransport>>) {
    global().recorder.set_transport(transport);
}

/// Snapshot of the current process-wide environment.
pub fn environment() -> TelemetryEnvironment {
    global().env.clone()
}

/// Start (or replace) the process-wide session.
pub fn init(project: &str, session: &str, metadata: Option<&str>) -> Result<()> {
    let mut state = global();
    let GlobalTelemetry { env, recorder } = &mut *state;
    recorder.init(env, project, session, metadata)
}

/// Record one completion event in the process-wide session.
pub fn record_completion(
    model: &str,
    success: bool,
    ttft_ms: f64,
    tokens_per_second: f64,
    total_time_ms: f64,
    tokens: i64,
    status: &str,
) {
    let event = CompletionEvent::new(
        model,
        success,
        ttft_ms,
        tokens_per_second,
        total_time_ms,
        tokens,
        status,
    );
    global().recorder.record_completion(event);
}

/// Write buffered events of the process-wide session.
pub fn flush() -> Result<usize> {
    global().recorder.flush()
}

/// Close the process-wide session. A no-op when none is active.
pub fn shutdown() -> Result<()> {
    global().recorder.shutdown()
}

pub fn is_initialized() -> bool {
    global().recorder.is_active()
}

/// Events dropped by the process-wide recorder because no session was active.
pub fn dropped_events() -> u64 {
    global().recorder.dropped_events()
}
