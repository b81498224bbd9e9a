//! Lifecycle tests for the process-wide telemetry API.
//!
//! All tests share one global recorder, so each holds `SERIAL` for its whole
//! body and leaves the recorder shut down.
//!
//! Run with: `cargo test -p cactus-telemetry --test lifecycle`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use cactus_telemetry::cloud::{CloudTransport, TransportError};
use cactus_telemetry::CompletionRecord;
use tempfile::TempDir;

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn count_lines(path: &Path) -> usize {
    fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
}

fn configure(cache_dir: &Path) -> PathBuf {
    cactus_telemetry::set_telemetry_environment("cpp-test", Some(cache_dir.to_path_buf()));
    cactus_telemetry::set_cloud_disabled(true);
    cache_dir.join("completion.log")
}

#[test]
fn test_record_many_then_flush() {
    let _guard = serial();
    let temp_dir = TempDir::new().unwrap();
    let completion_log = configure(temp_dir.path());

    cactus_telemetry::init("telemetry-test-project", "record-many", None).unwrap();

    const EVENT_COUNT: usize = 200;
    for _ in 0..EVENT_COUNT {
        cactus_telemetry::record_completion("test-model", true, 10.0, 25.0, 30.0, 32, "ok");
    }

    assert_eq!(cactus_telemetry::flush().unwrap(), EVENT_COUNT);
    assert_eq!(count_lines(&completion_log), EVENT_COUNT);

    cactus_telemetry::shutdown().unwrap();
    assert_eq!(count_lines(&completion_log), EVENT_COUNT);
}

#[test]
fn test_shutdown_then_reinit_then_record() {
    let _guard = serial();
    let temp_dir = TempDir::new().unwrap();
    let completion_log = configure(temp_dir.path());

    cactus_telemetry::init("telemetry-test-project", "shutdown-reinit", None).unwrap();
    cactus_telemetry::record_completion("test-model", true, 5.0, 20.0, 18.0, 16, "before-shutdown");
    cactus_telemetry::flush().unwrap();
    let lines_before_shutdown = count_lines(&completion_log);

    cactus_telemetry::shutdown().unwrap();

    cactus_telemetry::init("telemetry-test-project", "shutdown-reinit", None).unwrap();
    cactus_telemetry::record_completion("test-model", true, 6.0, 21.0, 19.0, 17, "after-reinit");
    cactus_telemetry::flush().unwrap();
    let lines_after_reinit = count_lines(&completion_log);

    cactus_telemetry::shutdown().unwrap();

    assert_eq!(lines_before_shutdown, 1);
    assert_eq!(lines_after_reinit, 2);

    let statuses: Vec<String> = fs::read_to_string(&completion_log)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<CompletionRecord>(l).unwrap().event.status)
        .collect();
    assert_eq!(statuses, vec!["before-shutdown", "after-reinit"]);
}

#[test]
fn test_shutdown_without_init_is_noop() {
    let _guard = serial();
    cactus_telemetry::shutdown().unwrap();
    cactus_telemetry::shutdown().unwrap();
    assert!(!cactus_telemetry::is_initialized());
}

#[test]
fn test_flush_with_nothing_pending_writes_nothing() {
    let _guard = serial();
    let temp_dir = TempDir::new().unwrap();
    let completion_log = configure(temp_dir.path());

    cactus_telemetry::init("telemetry-test-project", "empty-flush", None).unwrap();
    assert_eq!(cactus_telemetry::flush().unwrap(), 0);
    assert_eq!(cactus_telemetry::flush().unwrap(), 0);
    assert_eq!(count_lines(&completion_log), 0);

    cactus_telemetry::shutdown().unwrap();
    assert_eq!(count_lines(&completion_log), 0);
}

#[test]
fn test_record_without_session_is_dropped() {
    let _guard = serial();
    let temp_dir = TempDir::new().unwrap();
    let completion_log = configure(temp_dir.path());

    let dropped_before = cactus_telemetry::dropped_events();
    cactus_telemetry::record_completion("test-model", false, 0.0, 0.0, 0.0, 0, "orphan");
    assert_eq!(cactus_telemetry::dropped_events(), dropped_before + 1);
    assert_eq!(cactus_telemetry::flush().unwrap(), 0);
    assert!(!completion_log.exists());
}

#[test]
fn test_environment_change_applies_to_next_session() {
    let _guard = serial();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let first_log = configure(first.path());

    cactus_telemetry::init("telemetry-test-project", "env-change", None).unwrap();
    let second_log = configure(second.path());
    cactus_telemetry::record_completion("test-model", true, 1.0, 1.0, 1.0, 1, "first");
    cactus_telemetry::shutdown().unwrap();

    cactus_telemetry::init("telemetry-test-project", "env-change", None).unwrap();
    cactus_telemetry::record_completion("test-model", true, 1.0, 1.0, 1.0, 1, "second");
    cactus_telemetry::shutdown().unwrap();

    assert_eq!(count_lines(&first_log), 1);
    assert_eq!(count_lines(&second_log), 1);
}

#[test]
fn test_init_reports_unwritable_cache_dir() {
    let _guard = serial();
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    fs::write(&blocker, b"file, not a directory").unwrap();
    configure(&blocker.join("cache"));

    let result = cactus_telemetry::init("telemetry-test-project", "bad-dir", None);
    assert!(result.is_err());
    assert!(!cactus_telemetry::is_initialized());
}

#[derive(Default)]
struct CountingTransport {
    records: Mutex<usize>,
}

impl CloudTransport for CountingTransport {
    fn send_batch(&self, batch: &[CompletionRecord]) -> Result<(), TransportError> {
        *self.records.lock().unwrap() += batch.len();
        Ok(())
    }
}

#[test]
fn test_cloud_upload_is_additive_to_local_log() {
    let _guard = serial();
    let temp_dir = TempDir::new().unwrap();
    let completion_log = configure(temp_dir.path());
    let transport = Arc::new(CountingTransport::default());

    cactus_telemetry::set_cloud_transport(Some(transport.clone()));

    // Disabled: local only.
    cactus_telemetry::init("telemetry-test-project", "cloud", None).unwrap();
    cactus_telemetry::record_completion("test-model", true, 1.0, 2.0, 3.0, 4, "local");
    cactus_telemetry::shutdown().unwrap();
    assert_eq!(*transport.records.lock().unwrap(), 0);

    // Enabled: local and cloud.
    cactus_telemetry::set_cloud_disabled(false);
    cactus_telemetry::init("telemetry-test-project", "cloud", None).unwrap();
    cactus_telemetry::record_completion("test-model", true, 1.0, 2.0, 3.0, 4, "both");
    cactus_telemetry::record_completion("test-model", true, 1.0, 2.0, 3.0, 4, "both");
    cactus_telemetry::shutdown().unwrap();

    cactus_telemetry::set_cloud_transport(None);
    cactus_telemetry::set_cloud_disabled(true);

    assert_eq!(*transport.records.lock().unwrap(), 2);
    assert_eq!(count_lines(&completion_log), 3);
}
