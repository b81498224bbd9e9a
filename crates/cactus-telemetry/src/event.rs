//! Completion events and their persisted JSON Lines form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type tag written on every completion line.
pub const COMPLETION_EVENT_TYPE: &str = "completion";

/// Outcome of one model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// Model identifier (e.g. "qwen3-0.6b")
    pub model: String,
    /// Whether the completion succeeded
    pub success: bool,
    /// Time to first token in milliseconds
    pub ttft_ms: f64,
    /// Decode throughput in tokens per second
    pub tokens_per_second: f64,
    /// Wall-clock time of the whole completion in milliseconds
    pub total_time_ms: f64,
    /// Number of tokens produced
    pub tokens: i64,
    /// Free-form status label ("ok", error message, ...)
    pub status: String,
}

impl CompletionEvent {
    pub fn new(
        model: impl Into<String>,
        success: bool,
        ttft_ms: f64,
        tokens_per_second: f64,
        total_time_ms: f64,
        tokens: i64,
        status: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            success,
            ttft_ms,
            tokens_per_second,
            total_time_ms,
            tokens,
            status: status.into(),
        }
    }
}

/// Identity of an active recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Generated per `init`
    pub session_id: Uuid,
    pub project: String,
    pub session: String,
    pub framework: String,
    /// Metadata blob passed to `init`. Parsed as JSON when possible,
    /// otherwise kept as a string.
    pub metadata: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(
        project: impl Into<String>,
        session: impl Into<String>,
        framework: impl Into<String>,
        metadata: Option<&str>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            project: project.into(),
            session: session.into(),
            framework: framework.into(),
            metadata: metadata.map(parse_metadata),
            started_at: Utc::now(),
        }
    }
}

fn parse_metadata(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// One line of `completion.log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub event_type: String,
    pub session_id: Uuid,
    pub project: String,
    pub session: String,
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// RFC 3339 timestamp of when the event was recorded
    pub timestamp: String,
    #[serde(flatten)]
    pub event: CompletionEvent,
}

impl CompletionRecord {
    /// Stamp an event with the session identity and the current time.
    pub fn new(session: &SessionInfo, event: CompletionEvent) -> Self {
        Self {
            event_type: COMPLETION_EVENT_TYPE.to_string(),
            session_id: session.session_id,
            project: session.project.clone(),
            session: session.session.clone(),
            framework: session.framework.clone(),
            metadata: session.metadata.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        }
    }

    /// Encode as a single JSON line (without the trailing newline).
    ///
    /// `serde_json` escapes control characters inside strings, so the output
    /// never contains a raw newline.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
