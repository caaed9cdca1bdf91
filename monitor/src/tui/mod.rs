//! Terminal user interface
//!
//! A frame-rate-capped dashboard over the daemon's projections: per-task
//! cards, a filterable log pane, and a statistics view, in one of five
//! layouts. The same runloop serves the in-process daemon TUI and
//! attach-mode viewers.

mod app;
mod components;
mod events;
mod runner;
pub mod state;
mod theme;
mod views;

pub use app::App;
pub use components::{Component, DashboardPane, LogPane, MIN_BAR_WIDTH, RenderCtx, StatsPane, progress_bar};
pub use events::{EventPump, UiEvent};
pub use runner::TuiRunner;
pub use state::{FocusPane, LayoutMode, UiState};
pub use theme::Theme;
pub use views::HeaderInfo;

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use eyre::Result;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::config::Config;
use crate::core::MonitorCore;

/// Terminal type alias
pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Initialize the terminal for TUI mode
pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to normal mode
pub fn restore() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

/// Restore the terminal before the default panic report
///
/// Without this a panic leaves the user's shell in raw mode with no
/// visible backtrace.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore();
        default_hook(info);
    }));
}

/// Run the dashboard over an existing core until the user quits
pub async fn run_dashboard(core: &MonitorCore, config: &Config) -> Result<()> {
    run_dashboard_inner(core, config, None).await
}

/// Run the dashboard; also quit when `shutdown` flips true (daemon mode)
pub async fn run_dashboard_with_shutdown(
    core: &MonitorCore,
    config: &Config,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    run_dashboard_inner(core, config, Some(shutdown)).await
}

async fn run_dashboard_inner(
    core: &MonitorCore,
    config: &Config,
    shutdown: Option<tokio::sync::watch::Receiver<bool>>,
) -> Result<()> {
    install_panic_hook();
    let terminal = init()?;
    let mut runner = TuiRunner::new(terminal, core, config);
    if let Some(shutdown) = shutdown {
        runner = runner.with_shutdown(shutdown);
    }
    let result = runner.run().await;
    restore()?;
    result
}
