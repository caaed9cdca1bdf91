//! Log store - human-readable lines derived from the event stream
//!
//! Subscribes to the bus with the all-filter, projects each event into one
//! log entry, and keeps a bounded ordered list (FIFO eviction on overflow).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::events::{EventBus, EventPayload, KindFilter, MonitorEvent, SubscriptionId};

/// Default line cap
pub const DEFAULT_MAX_LOG_LINES: usize = 10_000;

/// Log severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Cycle order used by the TUI severity filter
    pub const ALL: [Severity; 4] = [Severity::Debug, Severity::Info, Severity::Warn, Severity::Error];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One projected log line
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub agent_type: String,
    pub stage: String,
    pub message: String,
    /// Id of the event this line was derived from
    pub event_id: String,
}

impl LogEntry {
    /// Project one event into its log line
    pub fn from_event(event: &MonitorEvent) -> Self {
        let (severity, message) = describe(event);
        Self {
            severity,
            timestamp: event.timestamp,
            task_id: event.task_id.clone(),
            agent_type: event.agent_type().unwrap_or("").to_string(),
            stage: event.stage().unwrap_or("").to_string(),
            message,
            event_id: event.event_id.clone(),
        }
    }
}

/// Severity and summary for an event
fn describe(event: &MonitorEvent) -> (Severity, String) {
    match &event.payload {
        EventPayload::TaskStarted { agent_type, .. } => (Severity::Info, format!("Task started: {agent_type}")),
        EventPayload::TaskProgress {
            stage,
            message,
            progress,
            ..
        } => (
            Severity::Debug,
            format!("Task progress [{stage}] {:.0}%: {message}", progress * 100.0),
        ),
        EventPayload::TaskCompleted {
            agent_type, duration, ..
        } => (
            Severity::Info,
            format!("Task completed: {agent_type} ({}ms)", duration.as_millis()),
        ),
        EventPayload::TaskFailed { error, .. } => (Severity::Error, format!("Task failed: {error}")),
        EventPayload::OrchestratorStarted { parent_task_id } => {
            (Severity::Info, format!("Orchestration started: {parent_task_id}"))
        }
        EventPayload::OrchestratorCompleted => (Severity::Info, "Orchestration completed".to_string()),
        EventPayload::OrchestratorFailed { error } => (Severity::Error, format!("Orchestration failed: {error}")),
        EventPayload::AdapterValidation {
            agent_type, valid, error, ..
        } => {
            if *valid {
                (Severity::Info, format!("Adapter validation passed: {agent_type}"))
            } else {
                let detail = error.as_deref().unwrap_or("invalid");
                (Severity::Error, format!("Adapter validation failed: {detail}"))
            }
        }
        EventPayload::AdapterPromptLoad {
            agent_type,
            success,
            error,
        } => {
            if *success {
                (Severity::Info, format!("Prompt loaded: {agent_type}"))
            } else {
                let detail = error.as_deref().unwrap_or("load failed");
                (Severity::Error, format!("Prompt load failed: {detail}"))
            }
        }
        EventPayload::AdapterExecution {
            agent_type,
            phase,
            success,
            error,
            ..
        } => {
            if *success {
                (Severity::Info, format!("Execution phase {phase}: {agent_type}"))
            } else {
                let detail = error.as_deref().unwrap_or("execution failed");
                (Severity::Error, format!("Execution phase {phase} failed: {detail}"))
            }
        }
    }
}

struct LogInner {
    entries: VecDeque<LogEntry>,
    cap: usize,
}

/// Bounded ordered store of projected log lines
pub struct LogStore {
    inner: Mutex<LogInner>,
}

impl LogStore {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                entries: VecDeque::new(),
                cap: cap.max(1),
            }),
        }
    }

    /// Subscribe this store to a bus (filter = all)
    pub fn attach(self: &Arc<Self>, bus: &EventBus, queue_capacity: usize) -> SubscriptionId {
        let store = Arc::clone(self);
        bus.subscribe(KindFilter::All, queue_capacity, move |event| {
            store.append_event(&event);
        })
    }

    /// Project and append one event, evicting the oldest line on overflow
    pub fn append_event(&self, event: &MonitorEvent) {
        let entry = LogEntry::from_event(event);
        let mut inner = self.inner.lock().expect("log lock poisoned");
        if inner.entries.len() == inner.cap {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("log lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered copy of all retained lines
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let inner = self.inner.lock().expect("log lock poisoned");
        inner.entries.iter().cloned().collect()
    }

    /// Read the retained lines in place, without copying the store
    pub fn visit<R>(&self, f: impl FnOnce(&VecDeque<LogEntry>) -> R) -> R {
        let inner = self.inner.lock().expect("log lock poisoned");
        f(&inner.entries)
    }

    /// Distinct agent types observed, sorted (drives the TUI filter cycle)
    pub fn agent_types(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("log lock poisoned");
        let mut set: Vec<String> = inner
            .entries
            .iter()
            .filter(|e| !e.agent_type.is_empty())
            .map(|e| e.agent_type.clone())
            .collect();
        set.sort();
        set.dedup();
        set
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn started(task_id: &str, agent: &str) -> MonitorEvent {
        MonitorEvent::new(
            task_id,
            EventPayload::TaskStarted {
                agent_type: agent.to_string(),
                model_hint: None,
                retry_count: 0,
            },
        )
    }

    #[test]
    fn test_severity_projection() {
        let cases = vec![
            (
                EventPayload::TaskStarted {
                    agent_type: "a".to_string(),
                    model_hint: None,
                    retry_count: 0,
                },
                Severity::Info,
            ),
            (
                EventPayload::TaskProgress {
                    stage: "s".to_string(),
                    message: "m".to_string(),
                    progress: 0.25,
                    duration: Duration::ZERO,
                },
                Severity::Debug,
            ),
            (
                EventPayload::TaskFailed {
                    agent_type: "a".to_string(),
                    duration: Duration::ZERO,
                    stage: "s".to_string(),
                    error: "E".to_string(),
                    retry_count: 0,
                },
                Severity::Error,
            ),
            (
                EventPayload::OrchestratorFailed {
                    error: "boom".to_string(),
                },
                Severity::Error,
            ),
            (
                EventPayload::AdapterValidation {
                    agent_type: "a".to_string(),
                    valid: false,
                    error: None,
                },
                Severity::Error,
            ),
            (
                EventPayload::AdapterValidation {
                    agent_type: "a".to_string(),
                    valid: true,
                    error: None,
                },
                Severity::Info,
            ),
            (EventPayload::OrchestratorCompleted, Severity::Info),
        ];

        for (payload, expected) in cases {
            let entry = LogEntry::from_event(&MonitorEvent::new("T1", payload));
            assert_eq!(entry.severity, expected, "message: {}", entry.message);
        }
    }

    #[test]
    fn test_messages_are_human_readable() {
        let entry = LogEntry::from_event(&started("T1", "code-implementer"));
        assert_eq!(entry.message, "Task started: code-implementer");
        assert_eq!(entry.agent_type, "code-implementer");

        let entry = LogEntry::from_event(&MonitorEvent::new(
            "T1",
            EventPayload::TaskFailed {
                agent_type: "a".to_string(),
                duration: Duration::ZERO,
                stage: "compile".to_string(),
                error: "E".to_string(),
                retry_count: 0,
            },
        ));
        assert_eq!(entry.message, "Task failed: E");
        assert_eq!(entry.stage, "compile");
    }

    #[test]
    fn test_missing_fields_project_to_empty() {
        let entry = LogEntry::from_event(&MonitorEvent::new(
            "T1",
            EventPayload::OrchestratorStarted {
                parent_task_id: "p".to_string(),
            },
        ));
        assert_eq!(entry.agent_type, "");
        assert_eq!(entry.stage, "");
    }

    #[test]
    fn test_store_appends_in_order() {
        let store = LogStore::new(100);
        for i in 0..5 {
            store.append_event(&started(&format!("T{i}"), "a"));
        }
        let lines = store.snapshot();
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line.task_id, format!("T{i}"));
        }
    }

    #[test]
    fn test_store_evicts_fifo_at_cap() {
        let store = LogStore::new(3);
        for i in 0..5 {
            store.append_event(&started(&format!("T{i}"), "a"));
        }
        let lines = store.snapshot();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].task_id, "T2");
        assert_eq!(lines[2].task_id, "T4");
    }

    #[test]
    fn test_agent_types_are_sorted_and_deduped() {
        let store = LogStore::new(100);
        store.append_event(&started("T1", "zeta"));
        store.append_event(&started("T2", "alpha"));
        store.append_event(&started("T3", "alpha"));
        store.append_event(&MonitorEvent::new(
            "T4",
            EventPayload::OrchestratorCompleted,
        ));
        assert_eq!(store.agent_types(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_duplicate_events_append_twice() {
        let store = LogStore::new(10);
        let event = started("T1", "a");
        store.append_event(&event);
        store.append_event(&event);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_attach_consumes_bus_events() {
        let bus = crate::events::create_event_bus();
        let store = Arc::new(LogStore::default());
        store.attach(&bus, 64);

        bus.publish(&started("T1", "a"));
        tokio::time::timeout(Duration::from_secs(1), async {
            while store.len() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(store.snapshot()[0].task_id, "T1");
    }
}
