use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Kind of a task event, sent as the SSE `event:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Task status changed
    Status,
    /// Processing progress update
    Progress,
    /// Processing failed
    Error,
    /// Processing finished with results
    Completion,
}

impl EventKind {
    /// Wire name of the kind
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Progress => "progress",
            Self::Error => "error",
            Self::Completion => "completion",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable notification about a task.
///
/// The payload is kept both as a JSON value and in serialized form, so
/// fan-out and history snapshots never re-encode it. Serializes as
/// `{id, event, data, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    /// `"{task_id}_{unix_seconds}"`
    pub id: String,
    /// Event kind
    #[serde(rename = "event")]
    pub kind: EventKind,
    /// Payload as structured data
    #[serde(skip)]
    pub payload: Value,
    /// Payload serialized as JSON
    pub data: String,
    /// Creation instant
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    /// Build an event for `task_id` stamped with the current time.
    pub fn new(task_id: &str, kind: EventKind, payload: Value) -> Self {
        let timestamp = Utc::now();
        // Value serialization cannot fail: keys are always strings
        let data = serde_json::to_string(&payload).unwrap_or_else(|_| "null".to_string());
        Self {
            id: format!("{}_{}", task_id, timestamp.timestamp()),
            kind,
            payload,
            data,
            timestamp,
        }
    }

    /// Timestamp as RFC 3339, the form used on the wire.
    #[must_use]
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339()
    }
}
