//! Task state projection
//!
//! Rebuilds per-task state purely from the event stream: created by
//! `task_started`, mutated by progress and adapter events, terminated by
//! `task_completed` / `task_failed`. An impossible transition is logged,
//! the affected task is defensively reset from the offending event, and a
//! warning surfaces to the TUI header. Terminal tasks linger for a grace
//! period for dashboard continuity, then evict least-recently-updated once
//! the map exceeds its cap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::events::{EventBus, EventPayload, KindFilter, MonitorEvent, SubscriptionId, clamp_progress};

/// Default retained-task cap
pub const DEFAULT_TASK_CAP: usize = 500;

/// Default grace period before a terminal task may be evicted
pub const DEFAULT_EVICT_GRACE: Duration = Duration::from_secs(60);

/// Task lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Seen only through a reset; no `task_started` observed
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Projected state of one task
#[derive(Clone, Debug, PartialEq)]
pub struct TaskState {
    pub task_id: String,
    pub status: TaskStatus,
    pub agent_type: String,
    pub stage: String,
    pub progress: f64,
    pub duration: Duration,
    pub last_message: String,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub model: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    fn new(task_id: &str, status: TaskStatus, at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            agent_type: String::new(),
            stage: String::new(),
            progress: 0.0,
            duration: Duration::ZERO,
            last_message: String::new(),
            last_error: None,
            retry_count: 0,
            model: None,
            started_at: at,
            updated_at: at,
        }
    }
}

struct ProjInner {
    tasks: HashMap<String, TaskState>,
    cap: usize,
    grace: chrono::Duration,
    violation_count: u64,
    last_violation: Option<String>,
}

/// The projection: a map from task_id to task state
pub struct TaskProjection {
    inner: Mutex<ProjInner>,
}

impl TaskProjection {
    pub fn new(cap: usize, grace: Duration) -> Self {
        Self {
            inner: Mutex::new(ProjInner {
                tasks: HashMap::new(),
                cap: cap.max(1),
                grace: chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero()),
                violation_count: 0,
                last_violation: None,
            }),
        }
    }

    /// Subscribe this projection to a bus (filter = all)
    pub fn attach(self: &Arc<Self>, bus: &EventBus, queue_capacity: usize) -> SubscriptionId {
        let projection = Arc::clone(self);
        bus.subscribe(KindFilter::All, queue_capacity, move |event| {
            projection.apply(&event);
        })
    }

    /// Apply one event to the projection
    pub fn apply(&self, event: &MonitorEvent) {
        let mut inner = self.inner.lock().expect("projection lock poisoned");
        let task_id = event.task_id.clone();
        let at = event.timestamp;

        match &event.payload {
            EventPayload::TaskStarted {
                agent_type,
                model_hint,
                retry_count,
            } => {
                if inner
                    .tasks
                    .get(&task_id)
                    .is_some_and(|t| t.status == TaskStatus::Running)
                {
                    record_violation(&mut inner, &task_id, "task_started while already running");
                }
                // A start after a terminal state is a retry and is legal
                let mut task = TaskState::new(&task_id, TaskStatus::Running, at);
                task.agent_type = agent_type.clone();
                task.model = model_hint.clone();
                task.retry_count = *retry_count;
                inner.tasks.insert(task_id, task);
            }
            EventPayload::TaskProgress {
                stage,
                message,
                progress,
                duration,
            } => {
                let task = require_running(&mut inner, &task_id, at, "task_progress");
                task.stage = stage.clone();
                task.last_message = message.clone();
                task.progress = clamp_progress(*progress);
                task.duration = *duration;
                task.updated_at = at;
            }
            EventPayload::TaskCompleted {
                agent_type,
                duration,
                model,
                ..
            } => {
                let task = require_running(&mut inner, &task_id, at, "task_completed");
                task.status = TaskStatus::Completed;
                task.agent_type = agent_type.clone();
                task.duration = *duration;
                task.model = Some(model.clone());
                task.progress = 1.0;
                task.updated_at = at;
            }
            EventPayload::TaskFailed {
                agent_type,
                duration,
                stage,
                error,
                retry_count,
            } => {
                let task = require_running(&mut inner, &task_id, at, "task_failed");
                task.status = TaskStatus::Failed;
                task.agent_type = agent_type.clone();
                task.duration = *duration;
                task.stage = stage.clone();
                task.last_error = Some(error.clone());
                task.retry_count = *retry_count;
                task.updated_at = at;
            }
            // Orchestration events do not belong to the task grammar; the
            // projection leaves them to the statistics and log consumers
            EventPayload::OrchestratorStarted { .. }
            | EventPayload::OrchestratorCompleted
            | EventPayload::OrchestratorFailed { .. } => return,
            EventPayload::AdapterValidation {
                agent_type, valid, error, ..
            } => {
                let task = require_running(&mut inner, &task_id, at, "adapter_validation");
                task.agent_type = agent_type.clone();
                if !valid {
                    task.last_error = error.clone().or(task.last_error.take());
                }
                task.updated_at = at;
            }
            EventPayload::AdapterPromptLoad {
                agent_type,
                success,
                error,
            } => {
                let task = require_running(&mut inner, &task_id, at, "adapter_prompt_load");
                task.agent_type = agent_type.clone();
                if !success {
                    task.last_error = error.clone().or(task.last_error.take());
                }
                task.updated_at = at;
            }
            EventPayload::AdapterExecution {
                agent_type,
                phase,
                model,
                success,
                error,
                ..
            } => {
                let task = require_running(&mut inner, &task_id, at, "adapter_execution");
                task.agent_type = agent_type.clone();
                task.stage = phase.clone();
                task.model = Some(model.clone());
                if !success {
                    task.last_error = error.clone().or(task.last_error.take());
                }
                task.updated_at = at;
            }
        }

        evict(&mut inner, at);
    }

    /// State of one task, if retained
    pub fn get(&self, task_id: &str) -> Option<TaskState> {
        let inner = self.inner.lock().expect("projection lock poisoned");
        inner.tasks.get(task_id).cloned()
    }

    /// All retained tasks, most recently updated first
    pub fn tasks(&self) -> Vec<TaskState> {
        let inner = self.inner.lock().expect("projection lock poisoned");
        let mut tasks: Vec<TaskState> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.task_id.cmp(&b.task_id)));
        tasks
    }

    /// Number of tasks currently running
    pub fn active_tasks(&self) -> usize {
        let inner = self.inner.lock().expect("projection lock poisoned");
        inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("projection lock poisoned").tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent invariant violation, for the TUI warning banner
    pub fn last_violation(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("projection lock poisoned")
            .last_violation
            .clone()
    }

    pub fn violation_count(&self) -> u64 {
        self.inner.lock().expect("projection lock poisoned").violation_count
    }
}

impl Default for TaskProjection {
    fn default() -> Self {
        Self::new(DEFAULT_TASK_CAP, DEFAULT_EVICT_GRACE)
    }
}

fn record_violation(inner: &mut ProjInner, task_id: &str, what: &str) {
    inner.violation_count += 1;
    let message = format!("{what} (task {task_id})");
    error!(%task_id, violation = what, "TaskProjection: impossible state transition");
    inner.last_violation = Some(message);
}

/// Fetch the running task for a mutation, defensively resetting on violation
///
/// A mutation event for a task that is unknown or already terminal is an
/// impossible transition: record the violation and restart the task's state
/// from this event so the projection stays usable.
fn require_running<'a>(
    inner: &'a mut ProjInner,
    task_id: &str,
    at: DateTime<Utc>,
    what: &str,
) -> &'a mut TaskState {
    let ok = inner
        .tasks
        .get(task_id)
        .is_some_and(|t| t.status == TaskStatus::Running);
    if !ok {
        let reason = if inner.tasks.contains_key(task_id) {
            format!("{what} after terminal state")
        } else {
            format!("{what} without task_started")
        };
        record_violation(inner, task_id, &reason);
        inner
            .tasks
            .insert(task_id.to_string(), TaskState::new(task_id, TaskStatus::Running, at));
    }
    inner.tasks.get_mut(task_id).expect("task just ensured")
}

/// Evict least-recently-updated terminal tasks past the grace period while
/// over the cap; live tasks are never evicted, so the cap is soft under a
/// burst of concurrent work
fn evict(inner: &mut ProjInner, now: DateTime<Utc>) {
    while inner.tasks.len() > inner.cap {
        let candidate = inner
            .tasks
            .values()
            .filter(|t| t.status.is_terminal() && now - t.updated_at >= inner.grace)
            .min_by_key(|t| t.updated_at)
            .map(|t| t.task_id.clone());
        match candidate {
            Some(task_id) => {
                warn!(%task_id, "TaskProjection: evicting terminal task over cap");
                inner.tasks.remove(&task_id);
            }
            None => break,
        }
    }
}
