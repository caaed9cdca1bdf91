//! Statistics aggregator
//!
//! Subscribes to the event bus and maintains per-agent counters, session
//! totals, and latency percentiles under one read/write lock (writer for
//! event ingest, readers for snapshots). Snapshots are pure functions of
//! aggregator state: every time-derived figure uses the event clock (last
//! event timestamp), so two back-to-back snapshots with no intervening
//! events are identical.
//!
//! Rates are floating-point percentages (0-100); durations are microseconds
//! internally and the UI rounds to milliseconds. Divisions guard against
//! zero denominators and return 0.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::types::duration_micros;
use crate::events::{EventBus, EventPayload, KindFilter, MonitorEvent, SubscriptionId};

/// Trailing execution outcomes kept per agent for the recent success rate
const RECENT_OUTCOME_WINDOW: usize = 10;

/// Completed-task durations kept for latency percentiles
const LATENCY_WINDOW: usize = 100;

/// Minimum samples before P95/P99 are reported (zero below this)
const PERCENTILE_MIN_SAMPLES: usize = 20;

/// Error messages group by their first 50 characters
const ERROR_PREFIX_LEN: usize = 50;

/// Rolling window for current throughput
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(5);

/// Retained snapshot history for trend display
pub const DEFAULT_SNAPSHOT_CAP: usize = 100;

/// Per-agent statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent_type: String,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub running: u64,
    #[serde(with = "duration_micros")]
    pub min_duration: Duration,
    #[serde(with = "duration_micros")]
    pub max_duration: Duration,
    #[serde(with = "duration_micros")]
    pub last_duration: Duration,
    #[serde(with = "duration_micros")]
    pub total_duration: Duration,
    /// Last N execution outcomes, oldest first (true = success)
    pub recent_outcomes: VecDeque<bool>,
    /// Stage/phase observation counts
    pub stages: BTreeMap<String, u64>,
    /// Failure counts grouped by error-message prefix
    pub common_errors: BTreeMap<String, u64>,
    /// Executions per model
    pub models: BTreeMap<String, u64>,
    /// Most-used model
    pub preferred_model: Option<String>,
}

impl AgentStats {
    fn new(agent_type: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            ..Default::default()
        }
    }

    /// Overall success rate as a percentage; 0 when nothing finished yet
    /// (the UI renders that case as N/A)
    pub fn success_rate(&self) -> f64 {
        percentage(self.successful, self.successful + self.failed)
    }

    /// Success rate over the trailing outcome window
    pub fn recent_success_rate(&self) -> f64 {
        let successes = self.recent_outcomes.iter().filter(|&&ok| ok).count() as u64;
        percentage(successes, self.recent_outcomes.len() as u64)
    }

    /// Average duration across finished executions
    pub fn avg_duration(&self) -> Duration {
        let finished = self.successful + self.failed;
        if finished == 0 {
            Duration::ZERO
        } else {
            self.total_duration / finished as u32
        }
    }

    fn record_finish(&mut self, duration: Duration, success: bool) {
        self.running = self.running.saturating_sub(1);
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.record_duration(duration);
        self.recent_outcomes.push_back(success);
        if self.recent_outcomes.len() > RECENT_OUTCOME_WINDOW {
            self.recent_outcomes.pop_front();
        }
    }

    fn record_duration(&mut self, duration: Duration) {
        if self.min_duration == Duration::ZERO || duration < self.min_duration {
            self.min_duration = duration;
        }
        if duration > self.max_duration {
            self.max_duration = duration;
        }
        self.last_duration = duration;
        self.total_duration += duration;
    }

    fn record_stage(&mut self, stage: &str) {
        *self.stages.entry(stage.to_string()).or_insert(0) += 1;
    }

    fn record_error(&mut self, error: &str) {
        let prefix: String = error.chars().take(ERROR_PREFIX_LEN).collect();
        *self.common_errors.entry(prefix).or_insert(0) += 1;
    }

    fn record_model(&mut self, model: &str) {
        *self.models.entry(model.to_string()).or_insert(0) += 1;
        // Recompute on every increment; ties break toward the earliest name
        self.preferred_model = self
            .models
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(model, _)| model.clone());
    }
}

/// Whole-session statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub started_at: Option<DateTime<Utc>>,
    /// Event-clock uptime: last event timestamp minus session start
    #[serde(with = "duration_micros")]
    pub uptime: Duration,
    pub total_events: u64,
    pub events_per_sec: f64,
    pub current_events_per_sec: f64,
    pub peak_events_per_sec: f64,
    pub active_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub success_rate: f64,
    #[serde(with = "duration_micros")]
    pub avg_task_duration: Duration,
}

/// Throughput and latency figures
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub current_throughput: f64,
    pub average_throughput: f64,
    pub peak_throughput: f64,
    #[serde(with = "duration_micros")]
    pub avg_latency: Duration,
    #[serde(with = "duration_micros")]
    pub p95_latency: Duration,
    #[serde(with = "duration_micros")]
    pub p99_latency: Duration,
    pub approx_memory_bytes: u64,
}

/// Point-in-time copy of session and per-agent state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Event-clock timestamp of the snapshot (last event observed)
    pub as_of: Option<DateTime<Utc>>,
    pub session: SessionStats,
    /// Sorted by agent type
    pub agents: Vec<AgentStats>,
    pub performance: PerformanceMetrics,
}

#[derive(Default)]
struct StatsInner {
    started_at: Option<DateTime<Utc>>,
    last_event_at: Option<DateTime<Utc>>,
    total_events: u64,
    started_tasks: u64,
    completed_tasks: u64,
    failed_tasks: u64,
    task_duration_total: Duration,
    peak_events_per_sec: f64,
    recent_event_times: VecDeque<DateTime<Utc>>,
    latencies: VecDeque<Duration>,
    agents: BTreeMap<String, AgentStats>,
    snapshots: VecDeque<StatsSnapshot>,
    snapshot_cap: usize,
}

/// The aggregator: one writer lock for ingest, shared readers for the UI
pub struct StatsAggregator {
    inner: RwLock<StatsInner>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::with_snapshot_cap(DEFAULT_SNAPSHOT_CAP)
    }

    pub fn with_snapshot_cap(snapshot_cap: usize) -> Self {
        Self {
            inner: RwLock::new(StatsInner {
                snapshot_cap: snapshot_cap.max(1),
                ..Default::default()
            }),
        }
    }

    /// Subscribe this aggregator to a bus (filter = all)
    pub fn attach(self: &Arc<Self>, bus: &EventBus, queue_capacity: usize) -> SubscriptionId {
        let aggregator = Arc::clone(self);
        bus.subscribe(KindFilter::All, queue_capacity, move |event| {
            aggregator.record_event(&event);
        })
    }

    /// Ingest one event
    pub fn record_event(&self, event: &MonitorEvent) {
        let mut inner = self.inner.write().expect("stats lock poisoned");

        if inner.started_at.is_none() {
            inner.started_at = Some(event.timestamp);
        }
        inner.last_event_at = Some(event.timestamp);
        inner.total_events += 1;

        // Rolling throughput window on the event clock
        inner.recent_event_times.push_back(event.timestamp);
        let cutoff = event.timestamp - chrono::Duration::seconds(THROUGHPUT_WINDOW.as_secs() as i64);
        while inner.recent_event_times.front().is_some_and(|t| *t < cutoff) {
            inner.recent_event_times.pop_front();
        }
        let current = inner.recent_event_times.len() as f64 / THROUGHPUT_WINDOW.as_secs_f64();
        if current > inner.peak_events_per_sec {
            inner.peak_events_per_sec = current;
        }

        match &event.payload {
            EventPayload::TaskStarted { agent_type, .. } => {
                inner.started_tasks += 1;
                let agent = agent_entry(&mut inner.agents, agent_type);
                agent.total += 1;
                agent.running += 1;
            }
            EventPayload::TaskProgress { stage, .. } => {
                // Stage counters attach to the owning agent via the task's
                // agent, which progress events do not carry; session-level
                // stage tracking happens on the terminal/adapter events
                let _ = stage;
            }
            EventPayload::TaskCompleted {
                agent_type,
                duration,
                model,
                ..
            } => {
                inner.completed_tasks += 1;
                inner.task_duration_total += *duration;
                push_latency(&mut inner.latencies, *duration);
                let agent = agent_entry(&mut inner.agents, agent_type);
                agent.record_finish(*duration, true);
                agent.record_model(model);
            }
            EventPayload::TaskFailed {
                agent_type,
                duration,
                stage,
                error,
                ..
            } => {
                inner.failed_tasks += 1;
                inner.task_duration_total += *duration;
                let agent = agent_entry(&mut inner.agents, agent_type);
                agent.record_finish(*duration, false);
                agent.record_stage(stage);
                agent.record_error(error);
            }
            EventPayload::OrchestratorStarted { .. }
            | EventPayload::OrchestratorCompleted
            | EventPayload::OrchestratorFailed { .. } => {}
            EventPayload::AdapterValidation {
                agent_type, valid, error, ..
            } => {
                if !valid {
                    let agent = agent_entry(&mut inner.agents, agent_type);
                    if let Some(error) = error {
                        agent.record_error(error);
                    }
                }
            }
            EventPayload::AdapterPromptLoad {
                agent_type,
                success,
                error,
            } => {
                if !success {
                    let agent = agent_entry(&mut inner.agents, agent_type);
                    if let Some(error) = error {
                        agent.record_error(error);
                    }
                }
            }
            EventPayload::AdapterExecution {
                agent_type,
                phase,
                model,
                success,
                error,
                ..
            } => {
                let agent = agent_entry(&mut inner.agents, agent_type);
                agent.record_stage(phase);
                agent.record_model(model);
                if !success {
                    if let Some(error) = error {
                        agent.record_error(error);
                    }
                }
            }
        }
    }

    /// Current state without touching the snapshot history
    pub fn current(&self) -> StatsSnapshot {
        let inner = self.inner.read().expect("stats lock poisoned");
        build_snapshot(&inner)
    }

    /// Point-in-time copy, appended to the bounded snapshot history
    pub fn take_snapshot(&self) -> StatsSnapshot {
        let mut inner = self.inner.write().expect("stats lock poisoned");
        let snapshot = build_snapshot(&inner);
        if inner.snapshots.len() == inner.snapshot_cap {
            inner.snapshots.pop_front();
        }
        inner.snapshots.push_back(snapshot.clone());
        debug!(history = inner.snapshots.len(), "StatsAggregator::take_snapshot");
        snapshot
    }

    /// Retained snapshot history, oldest first
    pub fn history(&self) -> Vec<StatsSnapshot> {
        let inner = self.inner.read().expect("stats lock poisoned");
        inner.snapshots.iter().cloned().collect()
    }

    /// Stats for one agent, if seen
    pub fn agent(&self, agent_type: &str) -> Option<AgentStats> {
        let inner = self.inner.read().expect("stats lock poisoned");
        inner.agents.get(agent_type).cloned()
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn agent_entry<'a>(agents: &'a mut BTreeMap<String, AgentStats>, agent_type: &str) -> &'a mut AgentStats {
    agents
        .entry(agent_type.to_string())
        .or_insert_with(|| AgentStats::new(agent_type))
}

fn push_latency(latencies: &mut VecDeque<Duration>, duration: Duration) {
    if latencies.len() == LATENCY_WINDOW {
        latencies.pop_front();
    }
    latencies.push_back(duration);
}

fn build_snapshot(inner: &StatsInner) -> StatsSnapshot {
    let uptime = match (inner.started_at, inner.last_event_at) {
        (Some(start), Some(last)) => (last - start).to_std().unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    };
    let uptime_secs = uptime.as_secs_f64();
    let events_per_sec = if uptime_secs > 0.0 {
        inner.total_events as f64 / uptime_secs
    } else {
        0.0
    };
    let current_events_per_sec = inner.recent_event_times.len() as f64 / THROUGHPUT_WINDOW.as_secs_f64();

    let finished = inner.completed_tasks + inner.failed_tasks;
    let avg_task_duration = if finished == 0 {
        Duration::ZERO
    } else {
        inner.task_duration_total / finished as u32
    };

    let session = SessionStats {
        started_at: inner.started_at,
        uptime,
        total_events: inner.total_events,
        events_per_sec,
        current_events_per_sec,
        peak_events_per_sec: inner.peak_events_per_sec,
        active_tasks: inner.started_tasks.saturating_sub(finished),
        completed_tasks: inner.completed_tasks,
        failed_tasks: inner.failed_tasks,
        success_rate: percentage(inner.completed_tasks, finished),
        avg_task_duration,
    };

    let (avg_latency, p95_latency, p99_latency) = latency_figures(&inner.latencies);
    let approx_memory_bytes = approx_memory(inner);
    let performance = PerformanceMetrics {
        current_throughput: current_events_per_sec,
        average_throughput: events_per_sec,
        peak_throughput: inner.peak_events_per_sec,
        avg_latency,
        p95_latency,
        p99_latency,
        approx_memory_bytes,
    };

    StatsSnapshot {
        as_of: inner.last_event_at,
        session,
        agents: inner.agents.values().cloned().collect(),
        performance,
    }
}

fn latency_figures(latencies: &VecDeque<Duration>) -> (Duration, Duration, Duration) {
    if latencies.is_empty() {
        return (Duration::ZERO, Duration::ZERO, Duration::ZERO);
    }
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;

    if latencies.len() < PERCENTILE_MIN_SAMPLES {
        return (avg, Duration::ZERO, Duration::ZERO);
    }
    let mut sorted: Vec<Duration> = latencies.iter().copied().collect();
    sorted.sort();
    (avg, nearest_rank(&sorted, 95.0), nearest_rank(&sorted, 99.0))
}

fn nearest_rank(sorted: &[Duration], percentile: f64) -> Duration {
    let n = sorted.len();
    let rank = ((percentile / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

fn approx_memory(inner: &StatsInner) -> u64 {
    let agents = inner.agents.len() as u64 * std::mem::size_of::<AgentStats>() as u64;
    let latencies = inner.latencies.len() as u64 * std::mem::size_of::<Duration>() as u64;
    let snapshots = inner.snapshots.len() as u64 * std::mem::size_of::<StatsSnapshot>() as u64;
    agents + latencies + snapshots
}

/// `numerator / denominator` as a percentage, 0 when the denominator is 0
fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}
