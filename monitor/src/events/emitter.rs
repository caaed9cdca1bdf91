//! Task-scoped event construction for producers
//!
//! A `TaskEmitter` is bound to one task correlation key and stamps every
//! event with a fresh id, the current timestamp, and this process's
//! producer identity. Producers pair it with whatever sink they have - the
//! IPC client, or a bus directly in tests.

use std::time::Duration;

use super::types::{EventPayload, MonitorEvent, clamp_progress};

/// Factory for one task's events
#[derive(Clone, Debug)]
pub struct TaskEmitter {
    task_id: String,
}

impl TaskEmitter {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }

    /// The task correlation key this emitter is bound to
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    fn event(&self, payload: EventPayload) -> MonitorEvent {
        MonitorEvent::new(&self.task_id, payload)
    }

    /// The task was handed to an agent
    pub fn started(&self, agent_type: &str, model_hint: Option<&str>, retry_count: u32) -> MonitorEvent {
        self.event(EventPayload::TaskStarted {
            agent_type: agent_type.to_string(),
            model_hint: model_hint.map(str::to_string),
            retry_count,
        })
    }

    /// Periodic or milestone progress; out-of-range progress clamps
    pub fn progress(&self, stage: &str, message: &str, progress: f64, duration: Duration) -> MonitorEvent {
        self.event(EventPayload::TaskProgress {
            stage: stage.to_string(),
            message: message.to_string(),
            progress: clamp_progress(progress),
            duration,
        })
    }

    /// The task ended successfully
    pub fn completed(
        &self,
        agent_type: &str,
        duration: Duration,
        model: &str,
        output_digest: Option<&str>,
    ) -> MonitorEvent {
        self.event(EventPayload::TaskCompleted {
            agent_type: agent_type.to_string(),
            duration,
            model: model.to_string(),
            output_digest: output_digest.map(str::to_string),
        })
    }

    /// The task ended in failure
    pub fn failed(
        &self,
        agent_type: &str,
        duration: Duration,
        stage: &str,
        error: &str,
        retry_count: u32,
    ) -> MonitorEvent {
        self.event(EventPayload::TaskFailed {
            agent_type: agent_type.to_string(),
            duration,
            stage: stage.to_string(),
            error: error.to_string(),
            retry_count,
        })
    }

    /// A batch/orchestration began under the given parent
    pub fn orchestrator_started(&self, parent_task_id: &str) -> MonitorEvent {
        self.event(EventPayload::OrchestratorStarted {
            parent_task_id: parent_task_id.to_string(),
        })
    }

    /// Batch finished
    pub fn orchestrator_completed(&self) -> MonitorEvent {
        self.event(EventPayload::OrchestratorCompleted)
    }

    /// Batch aborted
    pub fn orchestrator_failed(&self, error: &str) -> MonitorEvent {
        self.event(EventPayload::OrchestratorFailed {
            error: error.to_string(),
        })
    }

    /// Pre-execution adapter check result
    pub fn adapter_validation(&self, agent_type: &str, valid: bool, error: Option<&str>) -> MonitorEvent {
        self.event(EventPayload::AdapterValidation {
            agent_type: agent_type.to_string(),
            valid,
            error: error.map(str::to_string),
        })
    }

    /// Prompt template load result
    pub fn adapter_prompt_load(&self, agent_type: &str, success: bool, error: Option<&str>) -> MonitorEvent {
        self.event(EventPayload::AdapterPromptLoad {
            agent_type: agent_type.to_string(),
            success,
            error: error.map(str::to_string),
        })
    }

    /// Execution phase transition
    pub fn adapter_execution(
        &self,
        agent_type: &str,
        phase: &str,
        duration: Duration,
        model: &str,
        success: bool,
        error: Option<&str>,
    ) -> MonitorEvent {
        self.event(EventPayload::AdapterExecution {
            agent_type: agent_type.to_string(),
            phase: phase.to_string(),
            duration,
            model: model.to_string(),
            success,
            error: error.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_emitter_stamps_envelope() {
        let emitter = TaskEmitter::new("T1");
        let event = emitter.started("code-implementer", Some("m-large"), 0);

        assert_eq!(event.task_id, "T1");
        assert!(!event.event_id.is_empty());
        assert_eq!(event.producer.pid, std::process::id());
        assert_eq!(event.kind(), EventKind::TaskStarted);
    }

    #[test]
    fn test_emitter_events_share_task_id() {
        let emitter = TaskEmitter::new("T2");
        let events = vec![
            emitter.started("a", None, 0),
            emitter.progress("compile", "halfway", 0.5, Duration::from_millis(10)),
            emitter.adapter_validation("a", true, None),
            emitter.adapter_prompt_load("a", false, Some("missing template")),
            emitter.adapter_execution("a", "invoke", Duration::from_millis(5), "m", true, None),
            emitter.completed("a", Duration::from_millis(100), "m", None),
        ];
        assert!(events.iter().all(|e| e.task_id == "T2"));
        // Ids stay monotonic within a producer
        assert!(events.windows(2).all(|w| w[0].event_id < w[1].event_id));
    }

    #[test]
    fn test_progress_clamps_at_construction() {
        let emitter = TaskEmitter::new("T3");
        let event = emitter.progress("s", "m", 4.2, Duration::ZERO);
        match event.payload {
            EventPayload::TaskProgress { progress, .. } => assert_eq!(progress, 1.0),
            other => panic!("expected task_progress, got {other:?}"),
        }
    }

    #[test]
    fn test_full_lifecycle_sequence() {
        // The emitter produces the grammar the projection expects
        let emitter = TaskEmitter::new("T4");
        let projection = crate::projection::TaskProjection::default();

        projection.apply(&emitter.started("agent", None, 0));
        projection.apply(&emitter.progress("run", "going", 0.4, Duration::from_millis(20)));
        projection.apply(&emitter.failed("agent", Duration::from_millis(50), "run", "boom", 0));
        projection.apply(&emitter.started("agent", None, 1));
        projection.apply(&emitter.completed("agent", Duration::from_millis(70), "m", Some("digest")));

        assert_eq!(projection.violation_count(), 0);
        let task = projection.get("T4").unwrap();
        assert_eq!(task.status, crate::projection::TaskStatus::Completed);
        assert_eq!(task.retry_count, 1);
    }

    #[test]
    fn test_orchestrator_events() {
        let emitter = TaskEmitter::new("batch-1");
        assert_eq!(
            emitter.orchestrator_started("root").kind(),
            EventKind::OrchestratorStarted
        );
        assert_eq!(
            emitter.orchestrator_completed().kind(),
            EventKind::OrchestratorCompleted
        );
        assert_eq!(
            emitter.orchestrator_failed("aborted").kind(),
            EventKind::OrchestratorFailed
        );
    }
}
