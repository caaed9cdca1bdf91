//! Morgana Monitor - agent execution monitoring daemon
//!
//! A single long-lived process accepts events from short-lived producers
//! over a Unix domain socket, fans them out on an in-process event bus, and
//! renders a real-time terminal dashboard. Recent history lives in a
//! bounded ring so late-joining viewers can replay before joining the live
//! stream.
//!
//! # Modules
//!
//! - [`events`] - event model, pub/sub bus, history ring
//! - [`ipc`] - socket framing, daemon server, producer client
//! - [`stats`] - per-agent and session statistics
//! - [`logs`] - bounded log-line projection
//! - [`projection`] - task state machine rebuilt from the event stream
//! - [`tui`] - the terminal dashboard
//! - [`daemon`] - pid file and process control
//! - [`config`] - file/env/flag configuration layering

pub mod cli;
pub mod config;
pub mod core;
pub mod daemon;
pub mod events;
pub mod ipc;
pub mod logfile;
pub mod logs;
pub mod projection;
pub mod stats;
pub mod tui;

// Re-export commonly used types
pub use config::{Config, Overrides, ThemeName};
pub use core::MonitorCore;
pub use daemon::{DaemonManager, DaemonStatus, PidRecord};
pub use events::{
    BusStats, EventBus, EventKind, EventPayload, EventRing, EventStream, IngestError, KindFilter, MonitorEvent,
    ProducerId, SubscriptionId, TaskEmitter, create_event_bus,
};
pub use ipc::{ClientError, Frame, FrameError, HistoryRequest, IpcServer, ProducerClient};
pub use logfile::{EventLogFile, spawn_event_tee, spawn_event_tee_on};
pub use logs::{LogEntry, LogStore, Severity};
pub use projection::{TaskProjection, TaskState, TaskStatus};
pub use stats::{AgentStats, PerformanceMetrics, SessionStats, StatsAggregator, StatsSnapshot};
