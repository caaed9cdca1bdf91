//! Optional per-event text tee
//!
//! When configured, every event is additionally formatted as a single line
//! and appended to `<log_dir>/daemon.log`. The file rotates by renaming
//! with a timestamp suffix once it exceeds the size cap. This is a
//! convenience tee for post-mortems, not durable event persistence.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use tracing::{debug, warn};

use crate::events::{EventBus, KindFilter, MonitorEvent, SubscriptionId};
use crate::logs::LogEntry;

/// Rotate once the file exceeds this size (10 MiB)
pub const DEFAULT_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

/// File name inside the log directory
pub const EVENT_LOG_NAME: &str = "daemon.log";

/// Append-only event tee with size-capped rotation
pub struct EventLogFile {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    rotate_bytes: u64,
}

impl EventLogFile {
    /// Open (or create) `<log_dir>/daemon.log`
    pub fn create(log_dir: &Path) -> Result<Self> {
        Self::with_rotate_bytes(log_dir, DEFAULT_ROTATE_BYTES)
    }

    pub fn with_rotate_bytes(log_dir: &Path, rotate_bytes: u64) -> Result<Self> {
        std::fs::create_dir_all(log_dir).context("failed to create event log directory")?;
        let path = log_dir.join(EVENT_LOG_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        let bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
        debug!(path = %path.display(), bytes_written, "EventLogFile::create");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            bytes_written,
            rotate_bytes: rotate_bytes.max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single formatted line
    pub fn append(&mut self, event: &MonitorEvent) -> Result<()> {
        let line = format_event_line(event);
        writeln!(self.writer, "{line}").context("failed to write event log line")?;
        self.writer.flush().context("failed to flush event log")?;
        self.bytes_written += line.len() as u64 + 1;

        if self.bytes_written > self.rotate_bytes {
            self.rotate();
        }
        Ok(())
    }

    /// Rename the full file with a timestamp suffix and start a fresh one
    ///
    /// Rotation failures log and continue; losing the tee must not take the
    /// daemon down.
    fn rotate(&mut self) {
        let _ = self.writer.flush();
        let suffix = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let rotated = self.path.with_file_name(format!("{EVENT_LOG_NAME}.{suffix}"));
        debug!(from = %self.path.display(), to = %rotated.display(), "EventLogFile::rotate");

        if let Err(e) = std::fs::rename(&self.path, &rotated) {
            warn!(error = %e, "event log rotation failed, continuing on current file");
            return;
        }
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => {
                self.writer = BufWriter::new(file);
                self.bytes_written = 0;
            }
            Err(e) => {
                warn!(error = %e, "failed to reopen event log after rotation");
            }
        }
    }

    /// Flush any buffered lines
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush event log")
    }
}

/// One-line text form of an event, derived from its log projection
fn format_event_line(event: &MonitorEvent) -> String {
    let entry = LogEntry::from_event(event);
    format!(
        "{} {:5} [{}] task={} agent={} {}",
        event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        entry.severity,
        event.kind(),
        event.task_id,
        if entry.agent_type.is_empty() { "-" } else { &entry.agent_type },
        entry.message,
    )
}

/// Subscribe a tee to the bus; the worker owns the file and flushes on exit
pub fn spawn_event_tee(bus: &EventBus, log_dir: &Path, queue_capacity: usize) -> Result<SubscriptionId> {
    let mut file = EventLogFile::create(log_dir)?;
    let id = bus.subscribe(KindFilter::All, queue_capacity, move |event| {
        if let Err(e) = file.append(&event) {
            warn!(error = %e, "event tee write failed");
        }
    });
    Ok(id)
}

/// Convenience wrapper taking an Arc'd bus
pub fn spawn_event_tee_on(bus: &Arc<EventBus>, log_dir: &Path, queue_capacity: usize) -> Result<SubscriptionId> {
    spawn_event_tee(bus.as_ref(), log_dir, queue_capacity)
}
