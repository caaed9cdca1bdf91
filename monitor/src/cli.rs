//! CLI command definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Morgana Monitor - agent execution monitoring daemon
#[derive(Parser)]
#[command(
    name = "morgana-monitor",
    about = "Agent execution monitoring daemon with a real-time terminal dashboard",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Unix socket path (default /tmp/morgana.sock, env MORGANA_SOCKET)
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Ring buffer size for history replay
    #[arg(long, global = true)]
    pub history: Option<usize>,

    /// TUI tick period, e.g. 16ms (min 1ms, max 1s)
    #[arg(long, global = true)]
    pub refresh: Option<String>,

    /// Log store line cap
    #[arg(long = "max-log-lines", global = true)]
    pub max_log_lines: Option<usize>,

    /// Color theme (dark, light, custom)
    #[arg(long, global = true)]
    pub theme: Option<String>,

    /// Subcommand; `start` when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground (default)
    ///
    /// With a TTY attached and the TUI enabled, the dashboard runs
    /// in-process.
    Start,

    /// Connect to a running daemon as a viewer and open the dashboard
    Attach,

    /// Report whether a daemon is live (pid file + socket reachability)
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Send SIGTERM to the daemon in the pid file
    Stop,

    /// Check socket liveness with a ping frame
    Ping,

    /// Print the tail of the daemon's diagnostics log
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// Output format for status
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Diagnostics log location: `<data_local_dir>/morgana/logs/monitor.log`
pub fn diagnostics_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("morgana")
        .join("logs")
        .join("monitor.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_without_subcommand() {
        let cli = Cli::try_parse_from(["morgana-monitor"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "morgana-monitor",
            "--socket",
            "/tmp/x.sock",
            "--history",
            "200",
            "--refresh",
            "33ms",
            "--max-log-lines",
            "5000",
            "--theme",
            "light",
            "start",
        ])
        .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        assert_eq!(cli.history, Some(200));
        assert_eq!(cli.refresh.as_deref(), Some("33ms"));
        assert_eq!(cli.max_log_lines, Some(5000));
        assert_eq!(cli.theme.as_deref(), Some("light"));
        assert!(matches!(cli.command, Some(Command::Start)));
    }

    #[test]
    fn test_cli_parses_status_format() {
        let cli = Cli::try_parse_from(["morgana-monitor", "status", "--format", "json"]).unwrap();
        match cli.command {
            Some(Command::Status { format }) => assert_eq!(format, OutputFormat::Json),
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_logs_lines() {
        let cli = Cli::try_parse_from(["morgana-monitor", "logs", "-n", "10"]).unwrap();
        match cli.command {
            Some(Command::Logs { lines }) => assert_eq!(lines, 10),
            other => panic!("expected logs, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["morgana-monitor", "explode"]).is_err());
    }
}
