//! Event types for agent-execution monitoring
//!
//! Every event carries the common envelope (id, task correlation key,
//! timestamp, producer identity) plus a kind-specific payload drawn from a
//! closed set. The wire codec is strict: unknown kinds and unknown fields
//! are rejected at ingest, durations travel as integer microseconds, and
//! progress values clamp to [0.0, 1.0].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced when decoding an event from the wire
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event is not a JSON object")]
    NotAnObject,

    #[error("unknown event kind: {kind}")]
    UnknownKind { kind: String },

    #[error("unknown field `{field}` for kind `{kind}`")]
    UnknownField { kind: String, field: String },

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Identity of the emitting process: pid plus process start time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProducerId {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl ProducerId {
    /// Identity of the current process
    ///
    /// The start time is captured on first use and stable for the process
    /// lifetime.
    pub fn current() -> Self {
        static STARTED_AT: std::sync::OnceLock<DateTime<Utc>> = std::sync::OnceLock::new();
        Self {
            pid: std::process::id(),
            started_at: *STARTED_AT.get_or_init(Utc::now),
        }
    }
}

/// Closed set of event kinds, used for filtering and dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskStarted,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
    OrchestratorStarted,
    OrchestratorCompleted,
    OrchestratorFailed,
    AdapterValidation,
    AdapterPromptLoad,
    AdapterExecution,
}

impl EventKind {
    /// All kinds, in wire-tag order
    pub const ALL: [EventKind; 10] = [
        EventKind::TaskStarted,
        EventKind::TaskProgress,
        EventKind::TaskCompleted,
        EventKind::TaskFailed,
        EventKind::OrchestratorStarted,
        EventKind::OrchestratorCompleted,
        EventKind::OrchestratorFailed,
        EventKind::AdapterValidation,
        EventKind::AdapterPromptLoad,
        EventKind::AdapterExecution,
    ];

    /// Wire tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task_started",
            EventKind::TaskProgress => "task_progress",
            EventKind::TaskCompleted => "task_completed",
            EventKind::TaskFailed => "task_failed",
            EventKind::OrchestratorStarted => "orchestrator_started",
            EventKind::OrchestratorCompleted => "orchestrator_completed",
            EventKind::OrchestratorFailed => "orchestrator_failed",
            EventKind::AdapterValidation => "adapter_validation",
            EventKind::AdapterPromptLoad => "adapter_prompt_load",
            EventKind::AdapterExecution => "adapter_execution",
        }
    }

    /// Parse a wire tag
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }

    /// Payload field names permitted for this kind (envelope excluded)
    fn payload_fields(&self) -> &'static [&'static str] {
        match self {
            EventKind::TaskStarted => &["agent_type", "model_hint", "retry_count"],
            EventKind::TaskProgress => &["stage", "message", "progress", "duration"],
            EventKind::TaskCompleted => &["agent_type", "duration", "model", "output_digest"],
            EventKind::TaskFailed => &["agent_type", "duration", "stage", "error", "retry_count"],
            EventKind::OrchestratorStarted => &["parent_task_id"],
            EventKind::OrchestratorCompleted => &[],
            EventKind::OrchestratorFailed => &["error"],
            EventKind::AdapterValidation => &["agent_type", "valid", "error"],
            EventKind::AdapterPromptLoad => &["agent_type", "success", "error"],
            EventKind::AdapterExecution => &["agent_type", "phase", "duration", "model", "success", "error"],
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload, tagged by `kind` on the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A task was handed to an agent
    TaskStarted {
        agent_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_hint: Option<String>,
        retry_count: u32,
    },
    /// Periodic or milestone progress update
    TaskProgress {
        stage: String,
        message: String,
        #[serde(deserialize_with = "de_clamped_progress")]
        progress: f64,
        #[serde(with = "duration_micros")]
        duration: Duration,
    },
    /// Task ended successfully
    TaskCompleted {
        agent_type: String,
        #[serde(with = "duration_micros")]
        duration: Duration,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_digest: Option<String>,
    },
    /// Task ended in failure
    TaskFailed {
        agent_type: String,
        #[serde(with = "duration_micros")]
        duration: Duration,
        stage: String,
        error: String,
        retry_count: u32,
    },
    /// A batch/orchestration began
    OrchestratorStarted { parent_task_id: String },
    /// Batch finished
    OrchestratorCompleted,
    /// Batch aborted
    OrchestratorFailed { error: String },
    /// Pre-execution adapter check
    AdapterValidation {
        agent_type: String,
        valid: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Prompt template load result
    AdapterPromptLoad {
        agent_type: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Execution phase transition
    AdapterExecution {
        agent_type: String,
        phase: String,
        #[serde(with = "duration_micros")]
        duration: Duration,
        model: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl EventPayload {
    /// The kind tag for this payload
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TaskStarted { .. } => EventKind::TaskStarted,
            EventPayload::TaskProgress { .. } => EventKind::TaskProgress,
            EventPayload::TaskCompleted { .. } => EventKind::TaskCompleted,
            EventPayload::TaskFailed { .. } => EventKind::TaskFailed,
            EventPayload::OrchestratorStarted { .. } => EventKind::OrchestratorStarted,
            EventPayload::OrchestratorCompleted => EventKind::OrchestratorCompleted,
            EventPayload::OrchestratorFailed { .. } => EventKind::OrchestratorFailed,
            EventPayload::AdapterValidation { .. } => EventKind::AdapterValidation,
            EventPayload::AdapterPromptLoad { .. } => EventKind::AdapterPromptLoad,
            EventPayload::AdapterExecution { .. } => EventKind::AdapterExecution,
        }
    }
}

/// One monitoring event: envelope plus kind-specific payload
///
/// On the wire the payload fields sit at the same level as the envelope
/// (`#[serde(flatten)]`), so a frame payload reads as one flat object with a
/// `kind` tag. serde_json's map serialization keeps field order
/// deterministic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub event_id: String,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "producer_id")]
    pub producer: ProducerId,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Envelope field names (everything that is not kind-specific)
const ENVELOPE_FIELDS: [&str; 5] = ["event_id", "task_id", "timestamp", "producer_id", "kind"];

/// Generate a fresh event id
///
/// UUIDv7 against a shared counter context, so ids from one process are
/// strictly monotonic even within a single millisecond.
pub fn next_event_id() -> String {
    struct SharedContextV7(std::sync::Mutex<uuid::ContextV7>);

    impl uuid::ClockSequence for SharedContextV7 {
        type Output = u64;

        fn generate_sequence(&self, seconds: u64, subsec_nanos: u32) -> Self::Output {
            self.0.lock().unwrap().generate_sequence(seconds, subsec_nanos)
        }

        fn generate_timestamp_sequence(
            &self,
            seconds: u64,
            subsec_nanos: u32,
        ) -> (Self::Output, u64, u32) {
            self.0
                .lock()
                .unwrap()
                .generate_timestamp_sequence(seconds, subsec_nanos)
        }
    }

    static CONTEXT: std::sync::OnceLock<SharedContextV7> = std::sync::OnceLock::new();
    let ctx = CONTEXT.get_or_init(|| SharedContextV7(std::sync::Mutex::new(uuid::ContextV7::new())));
    uuid::Uuid::new_v7(uuid::Timestamp::now(ctx)).to_string()
}

impl MonitorEvent {
    /// Build an event for the current process with a fresh time-ordered id
    pub fn new(task_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: next_event_id(),
            task_id: task_id.into(),
            timestamp: Utc::now(),
            producer: ProducerId::current(),
            payload,
        }
    }

    /// Kind tag of this event
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Agent type, where the payload carries one
    pub fn agent_type(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::TaskStarted { agent_type, .. }
            | EventPayload::TaskCompleted { agent_type, .. }
            | EventPayload::TaskFailed { agent_type, .. }
            | EventPayload::AdapterValidation { agent_type, .. }
            | EventPayload::AdapterPromptLoad { agent_type, .. }
            | EventPayload::AdapterExecution { agent_type, .. } => Some(agent_type),
            _ => None,
        }
    }

    /// Stage or phase label, where the payload carries one
    pub fn stage(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::TaskProgress { stage, .. } | EventPayload::TaskFailed { stage, .. } => Some(stage),
            EventPayload::AdapterExecution { phase, .. } => Some(phase),
            _ => None,
        }
    }

    /// Error message, where the payload carries one
    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::TaskFailed { error, .. } | EventPayload::OrchestratorFailed { error } => Some(error),
            EventPayload::AdapterValidation { error, .. }
            | EventPayload::AdapterPromptLoad { error, .. }
            | EventPayload::AdapterExecution { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    /// Cumulative or final duration, where the payload carries one
    pub fn duration(&self) -> Option<Duration> {
        match &self.payload {
            EventPayload::TaskProgress { duration, .. }
            | EventPayload::TaskCompleted { duration, .. }
            | EventPayload::TaskFailed { duration, .. }
            | EventPayload::AdapterExecution { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    /// Whether this event terminates its task
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::TaskCompleted { .. } | EventPayload::TaskFailed { .. }
        )
    }

    /// Encode to a JSON value (one flat object)
    pub fn to_value(&self) -> serde_json::Value {
        // Serialization of a closed enum over plain data cannot fail
        serde_json::to_value(self).expect("event serialization is infallible")
    }

    /// Strictly decode an event from a JSON value
    ///
    /// Rejects unknown kinds, unknown fields, and missing required fields.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, IngestError> {
        let obj = value.as_object().ok_or(IngestError::NotAnObject)?;

        let kind_str = obj
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IngestError::MalformedEvent("missing `kind` tag".to_string()))?;
        let kind = EventKind::from_str(kind_str).ok_or_else(|| IngestError::UnknownKind {
            kind: kind_str.to_string(),
        })?;

        let allowed = kind.payload_fields();
        for field in obj.keys() {
            if !ENVELOPE_FIELDS.contains(&field.as_str()) && !allowed.contains(&field.as_str()) {
                return Err(IngestError::UnknownField {
                    kind: kind_str.to_string(),
                    field: field.clone(),
                });
            }
        }

        serde_json::from_value(value.clone()).map_err(|e| IngestError::MalformedEvent(e.to_string()))
    }
}

/// Clamp a progress value into [0.0, 1.0]
pub fn clamp_progress(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

fn de_clamped_progress<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_progress(raw))
}

/// Durations serialize as integer microseconds
pub mod duration_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}
