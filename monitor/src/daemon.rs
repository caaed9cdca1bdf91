//! Daemon process management
//!
//! Pid file handling and process control. The pid file holds one line,
//! `<pid> <rfc3339-start-time>`, and is exclusively owned by the daemon
//! along with the socket file.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use tracing::{debug, info, warn};

/// Default pid file location: `<runtime_dir>/morgana-monitor.pid`
fn default_pid_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("morgana-monitor.pid")
}

/// Contents of a pid file
#[derive(Clone, Debug, PartialEq)]
pub struct PidRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Daemon status information
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub pid_file: PathBuf,
}

/// Manages the daemon's pid file and process liveness
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    /// Manager with the default pid file location
    pub fn new() -> Self {
        Self {
            pid_file: default_pid_path(),
        }
    }

    /// Manager with a custom pid file path (for testing)
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    /// Whether a daemon is alive according to the pid file
    pub fn is_running(&self) -> bool {
        self.read_record().is_some_and(|r| is_process_running(r.pid))
    }

    /// The running daemon's pid, if any
    pub fn running_pid(&self) -> Option<u32> {
        self.read_record().map(|r| r.pid).filter(|&pid| is_process_running(pid))
    }

    /// Parse the pid file, if present and well-formed
    pub fn read_record(&self) -> Option<PidRecord> {
        let contents = fs::read_to_string(&self.pid_file).ok()?;
        let mut parts = contents.trim().splitn(2, ' ');
        let pid = parts.next()?.parse().ok()?;
        let started_at = parts.next()?.parse().ok()?;
        Some(PidRecord { pid, started_at })
    }

    /// Register the current process as the daemon
    ///
    /// Removes a stale pid file from a dead daemon with a warning; refuses
    /// to take over from a live one.
    pub fn register_self(&self) -> Result<PidRecord> {
        debug!(?self.pid_file, "DaemonManager::register_self");
        if let Some(record) = self.read_record() {
            if is_process_running(record.pid) {
                return Err(eyre::eyre!("monitor already running with PID {}", record.pid));
            }
            warn!(stale_pid = record.pid, "removing stale pid file");
            let _ = fs::remove_file(&self.pid_file);
        }

        let record = PidRecord {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("failed to create pid file directory")?;
        }
        fs::write(
            &self.pid_file,
            format!("{} {}\n", record.pid, record.started_at.to_rfc3339()),
        )
        .context("failed to write pid file")?;
        info!(pid = record.pid, path = ?self.pid_file, "pid file written");
        Ok(record)
    }

    /// Remove the pid file (clean exit path)
    pub fn remove_pid_file(&self) -> Result<()> {
        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file).context("failed to remove pid file")?;
            debug!(path = ?self.pid_file, "pid file removed");
        }
        Ok(())
    }

    /// Stop the daemon: SIGTERM, bounded wait, SIGKILL as a last resort
    pub fn stop(&self) -> Result<u32> {
        let pid = self
            .running_pid()
            .ok_or_else(|| eyre::eyre!("monitor is not running"))?;

        info!(pid, "stopping monitor");
        send_signal(pid, nix::sys::signal::Signal::SIGTERM)?;

        let mut attempts = 0;
        while is_process_running(pid) && attempts < 50 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            attempts += 1;
        }

        if is_process_running(pid) {
            warn!(pid, "monitor did not stop gracefully, sending SIGKILL");
            let _ = send_signal(pid, nix::sys::signal::Signal::SIGKILL);
        }
        Ok(pid)
    }

    /// Current daemon status
    pub fn status(&self) -> DaemonStatus {
        let record = self.read_record();
        let running = record.as_ref().is_some_and(|r| is_process_running(r.pid));
        DaemonStatus {
            running,
            pid: record.as_ref().map(|r| r.pid).filter(|_| running),
            started_at: record.as_ref().map(|r| r.started_at).filter(|_| running),
            pid_file: self.pid_file.clone(),
        }
    }
}

fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), signal).with_context(|| format!("failed to send {signal} to {pid}"))
}

/// Check process liveness by sending signal 0
fn is_process_running(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}
