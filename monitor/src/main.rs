//! Morgana Monitor - CLI entry point
//!
//! `start` runs the daemon in the foreground (with the dashboard when a TTY
//! is attached), `attach` joins a running daemon as a viewer, and
//! `status`/`stop`/`ping`/`logs` manage it from the outside.

use std::fs;
use std::io::{BufRead, BufReader, IsTerminal};
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tokio::io::BufReader as AsyncBufReader;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use morgana_monitor::cli::{Cli, Command, OutputFormat, diagnostics_log_path};
use morgana_monitor::config::{Config, Overrides};
use morgana_monitor::core::MonitorCore;
use morgana_monitor::daemon::DaemonManager;
use morgana_monitor::events::MonitorEvent;
use morgana_monitor::ipc::server::{ServerError, bind_socket, cleanup_socket};
use morgana_monitor::ipc::{Frame, HistoryRequest, IpcServer, ProducerClient, read_frame, write_frame};
use morgana_monitor::logfile::spawn_event_tee_on;
use morgana_monitor::tui;

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_NOT_RUNNING: i32 = 1;
const EXIT_NO_SOCKET: i32 = 2;
const EXIT_SOCKET_IN_USE: i32 = 3;
const EXIT_INTERNAL: i32 = 64;

fn setup_logging(level_str: Option<&str>) -> Result<()> {
    let log_path = diagnostics_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }

    let level = match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            other => {
                eprintln!("Warning: unknown log-level '{other}', defaulting to INFO");
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("failed to create log file")?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let overrides = Overrides {
        socket: cli.socket.clone(),
        history: cli.history,
        refresh: cli.refresh.clone(),
        max_log_lines: cli.max_log_lines,
        theme: cli.theme.clone(),
    };
    let config = match Config::load(cli.config.as_ref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return EXIT_CONFIG;
        }
    };

    let level = cli.log_level.as_deref().or(config.log_level.as_deref());
    if let Err(e) = setup_logging(level) {
        eprintln!("failed to initialize logging: {e:#}");
        return EXIT_INTERNAL;
    }

    debug!(?config, "configuration resolved");
    match cli.command.unwrap_or(Command::Start) {
        Command::Start => cmd_start(&config).await,
        Command::Attach => cmd_attach(&config).await,
        Command::Status { format } => cmd_status(&config, format).await,
        Command::Stop => cmd_stop(),
        Command::Ping => cmd_ping(&config).await,
        Command::Logs { lines } => cmd_logs(lines),
    }
}

/// Run the daemon in the foreground
async fn cmd_start(config: &Config) -> i32 {
    let daemon = DaemonManager::new();

    let listener = match bind_socket(&config.socket_path, daemon.is_running()) {
        Ok(listener) => listener,
        Err(e @ ServerError::SocketInUse { .. }) => {
            eprintln!("{e}");
            return EXIT_SOCKET_IN_USE;
        }
        Err(e) => {
            eprintln!("failed to bind socket: {e}");
            return EXIT_INTERNAL;
        }
    };

    if let Err(e) = daemon.register_self() {
        eprintln!("{e:#}");
        cleanup_socket(&config.socket_path);
        return EXIT_SOCKET_IN_USE;
    }

    let core = MonitorCore::new(config);
    if let Some(dir) = &config.event_log_dir {
        // Losing the tee is not worth taking the daemon down
        if let Err(e) = spawn_event_tee_on(&core.bus, dir, config.buffer_size) {
            warn!(error = %e, "event tee disabled");
        }
    }

    let server = Arc::new(
        IpcServer::new(Arc::clone(&core.bus), Arc::clone(&core.ring))
            .with_viewer_queue_capacity(config.buffer_size),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let server_handle = tokio::spawn(Arc::clone(&server).run(listener, shutdown_rx.clone()));
    spawn_signal_task(Arc::clone(&shutdown_tx));

    info!(socket = %config.socket_path.display(), "monitor running");

    let with_tui = config.tui_enabled && std::io::stdout().is_terminal();
    if with_tui {
        debug!("cmd_start: running in-process dashboard");
        if let Err(e) = tui::run_dashboard_with_shutdown(&core, config, shutdown_rx.clone()).await {
            warn!(error = %e, "dashboard exited with error");
        }
        // Quitting the dashboard stops the daemon
        let _ = shutdown_tx.send(true);
    } else {
        debug!("cmd_start: headless, waiting for signals");
        let mut shutdown = shutdown_rx.clone();
        loop {
            if shutdown.changed().await.is_err() || *shutdown.borrow() {
                break;
            }
        }
    }

    info!("monitor shutting down");
    let _ = shutdown_tx.send(true);
    let _ = server_handle.await;
    core.shutdown();
    cleanup_socket(&config.socket_path);
    if let Err(e) = daemon.remove_pid_file() {
        warn!(error = %e, "failed to remove pid file");
    }
    info!("monitor stopped");
    EXIT_OK
}

/// SIGINT/SIGTERM stop the daemon; SIGHUP is a no-op
fn spawn_signal_task(shutdown: Arc<watch::Sender<bool>>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm, mut sighup) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(a), Ok(b), Ok(c)) => (a, b, c),
            _ => {
                warn!("failed to install signal handlers");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    warn!("SIGINT received");
                    let _ = shutdown.send(true);
                    break;
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received");
                    let _ = shutdown.send(true);
                    break;
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received - ignored");
                }
            }
        }
    });
}

/// Join a running daemon as a viewer
async fn cmd_attach(config: &Config) -> i32 {
    if !config.socket_path.exists() {
        eprintln!("no monitor socket at {}", config.socket_path.display());
        return EXIT_NO_SOCKET;
    }

    let stream = match UnixStream::connect(&config.socket_path).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("failed to connect to {}: {e}", config.socket_path.display());
            return EXIT_NO_SOCKET;
        }
    };
    let (read_half, mut write_half) = stream.into_split();

    // History first, then the live stream joins after history_end
    let request = Frame::HistoryRequest(HistoryRequest {
        since: None,
        limit: config.history,
    });
    if let Err(e) = write_frame(&mut write_half, &request).await {
        eprintln!("failed to request history: {e}");
        return EXIT_NO_SOCKET;
    }

    let core = Arc::new(MonitorCore::new(config));
    let pump = tokio::spawn(pump_socket(read_half, Arc::clone(&core)));

    let result = tui::run_dashboard(&core, config).await;
    pump.abort();
    drop(write_half);
    core.shutdown();

    match result {
        Ok(()) => EXIT_OK,
        Err(e) => {
            eprintln!("dashboard error: {e:#}");
            EXIT_INTERNAL
        }
    }
}

/// Feed frames from the daemon into the viewer's local core
async fn pump_socket(read_half: OwnedReadHalf, core: Arc<MonitorCore>) {
    let mut reader = AsyncBufReader::new(read_half);
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(Frame::Event(value))) => match MonitorEvent::from_value(&value) {
                Ok(event) => core.ingest(event),
                Err(e) => warn!(error = %e, "viewer received malformed event"),
            },
            // Replay delimiters and pings carry no data for the viewer
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("monitor connection closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "viewer read failed");
                break;
            }
        }
    }
}

/// Report whether a daemon is live
async fn cmd_status(config: &Config, format: OutputFormat) -> i32 {
    let daemon = DaemonManager::new();
    let status = daemon.status();
    let socket_reachable = probe_socket(config).await;
    let live = status.running && socket_reachable;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": live,
                "pid": status.pid,
                "started_at": status.started_at.map(|t| t.to_rfc3339()),
                "pid_file": status.pid_file.to_string_lossy(),
                "socket": config.socket_path.to_string_lossy(),
                "socket_reachable": socket_reachable,
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("Morgana Monitor");
            println!("---------------");
            if live {
                println!("Status: running");
                if let Some(pid) = status.pid {
                    println!("PID: {pid}");
                }
                if let Some(started_at) = status.started_at {
                    println!("Started: {}", started_at.to_rfc3339());
                }
            } else if status.running {
                println!("Status: pid alive but socket unreachable");
            } else {
                println!("Status: stopped");
            }
            println!("PID file: {}", status.pid_file.display());
            println!("Socket: {}", config.socket_path.display());
        }
    }

    if live { EXIT_OK } else { EXIT_NOT_RUNNING }
}

/// Reachability probe: connect and send one ping frame
async fn probe_socket(config: &Config) -> bool {
    if !config.socket_path.exists() {
        return false;
    }
    match tokio::time::timeout(std::time::Duration::from_secs(1), ProducerClient::connect(&config.socket_path)).await
    {
        Ok(Ok(client)) => client.ping().await.is_ok(),
        _ => false,
    }
}

/// Stop the daemon via the pid file
fn cmd_stop() -> i32 {
    let daemon = DaemonManager::new();
    if !daemon.is_running() {
        println!("monitor is not running");
        return EXIT_NOT_RUNNING;
    }
    match daemon.stop() {
        Ok(pid) => {
            println!("monitor stopped (was PID {pid})");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("failed to stop monitor: {e:#}");
            EXIT_INTERNAL
        }
    }
}

/// Socket liveness check with a ping frame
async fn cmd_ping(config: &Config) -> i32 {
    if !config.socket_path.exists() {
        eprintln!("no monitor socket at {}", config.socket_path.display());
        return EXIT_NO_SOCKET;
    }
    match ProducerClient::connect(&config.socket_path).await {
        Ok(client) => match client.ping().await {
            Ok(()) => {
                println!("monitor is alive");
                EXIT_OK
            }
            Err(e) => {
                eprintln!("socket present but not responding: {e}");
                EXIT_NO_SOCKET
            }
        },
        Err(e) => {
            eprintln!("failed to connect: {e}");
            EXIT_NO_SOCKET
        }
    }
}

/// Print the tail of the diagnostics log
fn cmd_logs(lines: usize) -> i32 {
    let log_path = diagnostics_log_path();
    if !log_path.exists() {
        println!("no log file found at {}", log_path.display());
        println!("the monitor may not have been started yet");
        return EXIT_NOT_RUNNING;
    }

    let file = match fs::File::open(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("failed to open log file: {e}");
            return EXIT_INTERNAL;
        }
    };
    let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{line}");
    }
    EXIT_OK
}
