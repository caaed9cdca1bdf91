//! TUI runloop
//!
//! Single-threaded cooperative loop driven by three message sources: bus
//! events (through a bounded forwarding subscription), ticks at the
//! configured refresh rate, and terminal input. Frames render only when
//! data changed since the last frame or the dashboard is animating; slow
//! rendering is reported as a `render_overrun` once the 95th percentile
//! of recent frames exceeds the refresh period.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;
use tracing::{debug, warn};

use super::Tui;
use super::app::App;
use super::components::{DashboardPane, LogPane, RenderCtx, StatsPane};
use super::events::{EventPump, UiEvent};
use super::state::LayoutMode;
use super::theme::Theme;
use super::views::{self, HeaderInfo};
use crate::config::Config;
use crate::core::MonitorCore;
use crate::events::{EventBus, EventStream, KindFilter};
use crate::projection::TaskProjection;
use crate::stats::StatsAggregator;

/// Statistics snapshot cadence
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(10);

/// Grace period for draining pending bus messages on quit
const QUIT_DRAIN: Duration = Duration::from_millis(500);

/// Render samples kept for the overrun check
const RENDER_SAMPLES: usize = 100;

/// The runloop
pub struct TuiRunner {
    terminal: Tui,
    app: App,
    theme: Theme,
    refresh: Duration,
    bus: Arc<EventBus>,
    stats: Arc<StatsAggregator>,
    projection: Arc<TaskProjection>,
    stream: EventStream,
    pump: EventPump,
    started: Instant,
    render_durations: VecDeque<Duration>,
    last_overrun_log: Option<Instant>,
    last_snapshot: Instant,
    last_render: Instant,
    external_quit: Option<tokio::sync::watch::Receiver<bool>>,
}

impl TuiRunner {
    /// Wire a runner to an existing core
    pub fn new(terminal: Tui, core: &MonitorCore, config: &Config) -> Self {
        let stream = core.bus.subscribe_channel(KindFilter::All, config.buffer_size);
        let app = App::new(
            DashboardPane::new(Arc::clone(&core.projection)),
            LogPane::new(Arc::clone(&core.logs)),
            StatsPane::new(Arc::clone(&core.stats), Arc::clone(&core.bus)),
        );
        Self {
            terminal,
            app,
            theme: Theme::named(config.theme),
            refresh: config.refresh,
            bus: Arc::clone(&core.bus),
            stats: Arc::clone(&core.stats),
            projection: Arc::clone(&core.projection),
            stream,
            pump: EventPump::new(config.refresh),
            started: Instant::now(),
            render_durations: VecDeque::new(),
            last_overrun_log: None,
            last_snapshot: Instant::now(),
            last_render: Instant::now(),
            external_quit: None,
        }
    }

    /// Quit when the given signal flips true (daemon shutdown path)
    pub fn with_shutdown(mut self, shutdown: tokio::sync::watch::Receiver<bool>) -> Self {
        self.external_quit = Some(shutdown);
        self
    }

    /// Run until quit
    pub async fn run(&mut self) -> Result<()> {
        debug!("TuiRunner::run: entering runloop");
        let mut external_quit = self.external_quit.take();
        loop {
            tokio::select! {
                message = self.pump.next() => {
                    match message? {
                        UiEvent::Tick => self.on_tick()?,
                        UiEvent::Key(key) => {
                            self.app.handle_key(key);
                        }
                        UiEvent::Resize(width, height) => {
                            self.app.state.resize(width, height);
                        }
                    }
                }
                maybe_event = self.stream.rx.recv() => {
                    if maybe_event.is_some() {
                        // Coalesce whatever else is queued; the data lives
                        // in the projections, the message is just a wake-up
                        while self.stream.rx.try_recv().is_ok() {}
                        self.app.state.mark_dirty();
                    }
                }
                quit = wait_external_quit(&mut external_quit) => {
                    if quit {
                        debug!("TuiRunner::run: external shutdown");
                        self.app.state.should_quit = true;
                    }
                }
            }

            if self.app.state.should_quit {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn on_tick(&mut self) -> Result<()> {
        self.app.state.animation_tick = self.app.state.animation_tick.wrapping_add(1);

        // Projection invariant violations surface as a header banner
        self.app.state.set_warning(self.projection.last_violation());

        if self.last_snapshot.elapsed() >= SNAPSHOT_INTERVAL {
            self.stats.take_snapshot();
            self.last_snapshot = Instant::now();
        }

        let animating = self.dashboard_visible() && self.app.dashboard.is_animating();
        if self.app.state.dirty || animating {
            self.render()?;
        }
        Ok(())
    }

    fn dashboard_visible(&self) -> bool {
        matches!(self.app.state.layout, LayoutMode::Split | LayoutMode::Dashboard)
    }

    fn render(&mut self) -> Result<()> {
        let render_started = Instant::now();

        let session = self.stats.current().session;
        let header = HeaderInfo {
            uptime_secs: self.started.elapsed().as_secs(),
            total_events: session.total_events,
        };
        let ctx = RenderCtx {
            theme: &self.theme,
            tick: self.app.state.animation_tick,
        };
        self.terminal.draw(|frame| views::render(&mut self.app, frame, &ctx, &header))?;
        self.app.state.dirty = false;

        let elapsed = render_started.elapsed();
        self.app.state.fps = 1.0 / self.last_render.elapsed().as_secs_f64().max(1e-6);
        self.last_render = Instant::now();
        self.note_render_duration(elapsed);
        Ok(())
    }

    fn note_render_duration(&mut self, elapsed: Duration) {
        if self.render_durations.len() == RENDER_SAMPLES {
            self.render_durations.pop_front();
        }
        self.render_durations.push_back(elapsed);

        if self.render_durations.len() < 20 {
            return;
        }
        let mut sorted: Vec<Duration> = self.render_durations.iter().copied().collect();
        sorted.sort();
        let p95 = sorted[(sorted.len() * 95).div_ceil(100).saturating_sub(1)];
        if p95 > self.refresh {
            // Throttled to one report per second
            let due = self
                .last_overrun_log
                .is_none_or(|at| at.elapsed() >= Duration::from_secs(1));
            if due {
                warn!(p95 = ?p95, refresh = ?self.refresh, "render_overrun");
                self.last_overrun_log = Some(Instant::now());
            }
        }
    }

    /// Quit path: unsubscribe, then drain pending messages briefly
    async fn shutdown(&mut self) {
        debug!("TuiRunner::shutdown: unsubscribing");
        self.bus.unsubscribe(self.stream.id);
        let _ = tokio::time::timeout(QUIT_DRAIN, async {
            while self.stream.rx.recv().await.is_some() {}
        })
        .await;
        debug!("TuiRunner::shutdown: drained");
    }
}

/// Resolve true when the external shutdown signal flips; pend forever when
/// there is none (the user's quit keys are then the only exit)
async fn wait_external_quit(rx: &mut Option<tokio::sync::watch::Receiver<bool>>) -> bool {
    match rx {
        Some(rx) => {
            if *rx.borrow() {
                return true;
            }
            rx.changed().await.is_err() || *rx.borrow()
        }
        None => std::future::pending().await,
    }
}
