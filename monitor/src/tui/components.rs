//! Dashboard components
//!
//! Each pane implements the small `Component` capability set: render into a
//! rect, consume input, gain and lose focus. Per-component state (scroll,
//! filters, search, drill-down) stays inside the component.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, Wrap};

use super::theme::Theme;
use crate::events::{BusStats, EventBus};
use crate::logs::{LogEntry, LogStore, Severity};
use crate::projection::{TaskProjection, TaskState, TaskStatus};
use crate::stats::{AgentStats, StatsAggregator, StatsSnapshot};

/// Minimum columns for the bar portion of a progress bar
pub const MIN_BAR_WIDTH: usize = 10;

/// Trailing-edge animation frames for in-flight progress bars
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Shared render inputs
pub struct RenderCtx<'a> {
    pub theme: &'a Theme,
    /// Monotonic tick counter; drives the animated trailing edge
    pub tick: u64,
}

/// Capability set shared by all panes
pub trait Component {
    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &RenderCtx);
    /// Returns true when the key was consumed
    fn on_input(&mut self, key: KeyEvent) -> bool;
    fn focus(&mut self);
    fn blur(&mut self);
}

/// Render a progress bar: `[filled><empty] NN%`
///
/// The trailing edge animates while 0 < progress < 1 and is static at the
/// endpoints. `width` is the bar portion only and clamps up to the minimum.
pub fn progress_bar(progress: f64, width: usize, tick: u64) -> String {
    let width = width.max(MIN_BAR_WIDTH);
    let progress = crate::events::clamp_progress(progress);
    let percent = (progress * 100.0).round() as u32;

    let bar: String = if progress <= 0.0 {
        "░".repeat(width)
    } else if progress >= 1.0 {
        "█".repeat(width)
    } else {
        let filled = ((progress * width as f64) as usize).clamp(0, width - 1);
        let spinner = SPINNER[(tick % SPINNER.len() as u64) as usize];
        let mut bar = "█".repeat(filled);
        bar.push(spinner);
        bar.push_str(&"░".repeat(width - filled - 1));
        bar
    };
    format!("[{bar}] {percent:>3}%")
}

/// Truncate to `max` display columns, appending an ellipsis when cut
pub fn truncate_ellipsis(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let count = s.chars().count();
    if count <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Short display form of a task id (first 8 characters)
fn short_id(task_id: &str) -> String {
    task_id.chars().take(8).collect()
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running => "●",
        TaskStatus::Pending => "○",
        TaskStatus::Completed => "✓",
        TaskStatus::Failed => "✗",
    }
}

fn format_duration_ms(d: std::time::Duration) -> String {
    let ms = d.as_millis();
    if ms >= 60_000 {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

/// Rate display; N/A when nothing has finished yet
fn rate_str(finished: u64, rate: f64) -> String {
    if finished == 0 {
        "N/A".to_string()
    } else {
        format!("{rate:.1}%")
    }
}

// === Dashboard ===

const CARD_HEIGHT: u16 = 6;
/// Below this width the card grid collapses to a single column
const TWO_COLUMN_MIN_WIDTH: u16 = 60;

/// Grid of per-task cards
pub struct DashboardPane {
    projection: Arc<TaskProjection>,
    scroll: usize,
    focused: bool,
    last_visible_rows: usize,
    last_max_scroll: usize,
}

impl DashboardPane {
    pub fn new(projection: Arc<TaskProjection>) -> Self {
        Self {
            projection,
            scroll: 0,
            focused: false,
            last_visible_rows: 1,
            last_max_scroll: 0,
        }
    }

    /// Whether any visible card animates (running with partial progress)
    pub fn is_animating(&self) -> bool {
        self.projection
            .tasks()
            .iter()
            .any(|t| t.status == TaskStatus::Running && t.progress > 0.0 && t.progress < 1.0)
    }

    fn render_card(&self, frame: &mut Frame, area: Rect, task: &TaskState, ctx: &RenderCtx) {
        let theme = ctx.theme;
        let agent_color = theme.agent_color(&task.agent_type);
        let status_color = theme.status_color(task.status);

        let title = if task.agent_type.is_empty() {
            " ? ".to_string()
        } else {
            format!(" {} ", task.agent_type)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(title, Style::default().fg(agent_color).add_modifier(Modifier::BOLD)))
            .border_style(Style::default().fg(theme.border));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled(
                format!("{} {}", status_icon(task.status), task.status),
                Style::default().fg(status_color),
            ),
            Span::styled(format!("  {}", short_id(&task.task_id)), Style::default().fg(theme.dim)),
        ]));

        let stage = if task.stage.is_empty() { "-" } else { &task.stage };
        lines.push(Line::from(vec![
            Span::styled("stage ", Style::default().fg(theme.dim)),
            Span::styled(stage.to_string(), Style::default().fg(theme.text)),
        ]));

        if task.status == TaskStatus::Running {
            let bar_width = (inner.width as usize).saturating_sub(7).max(MIN_BAR_WIDTH);
            lines.push(Line::from(Span::styled(
                progress_bar(task.progress, bar_width, ctx.tick),
                Style::default().fg(theme.running),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                format_duration_ms(task.duration),
                Style::default().fg(theme.dim),
            )));
        }

        let detail_width = inner.width as usize;
        let detail = match (&task.last_error, task.status) {
            (Some(error), TaskStatus::Failed) => Span::styled(
                truncate_ellipsis(error, detail_width),
                Style::default().fg(theme.failed),
            ),
            _ => Span::styled(
                truncate_ellipsis(&task.last_message, detail_width),
                Style::default().fg(theme.dim),
            ),
        };
        lines.push(Line::from(detail));

        frame.render_widget(Paragraph::new(lines), inner);
    }
}

impl Component for DashboardPane {
    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &RenderCtx) {
        let theme = ctx.theme;
        let border = if self.focused { theme.border_focused } else { theme.border };
        let tasks = self.projection.tasks();

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Tasks ({}) ", tasks.len()))
            .border_style(Style::default().fg(border));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if tasks.is_empty() {
            let empty = Paragraph::new("No tasks yet. Waiting for producers...")
                .style(Style::default().fg(theme.dim))
                .alignment(ratatui::layout::Alignment::Center);
            frame.render_widget(empty, inner);
            return;
        }

        let columns: u16 = if area.width >= TWO_COLUMN_MIN_WIDTH { 2 } else { 1 };
        let visible_rows = (inner.height / CARD_HEIGHT).max(1) as usize;
        let total_rows = tasks.len().div_ceil(columns as usize);
        let max_scroll = total_rows.saturating_sub(visible_rows);
        self.scroll = self.scroll.min(max_scroll);
        self.last_visible_rows = visible_rows;
        self.last_max_scroll = max_scroll;

        let card_width = inner.width / columns;
        let first = self.scroll * columns as usize;
        for (i, task) in tasks.iter().skip(first).take(visible_rows * columns as usize).enumerate() {
            let row = (i / columns as usize) as u16;
            let col = (i % columns as usize) as u16;
            let card = Rect {
                x: inner.x + col * card_width,
                y: inner.y + row * CARD_HEIGHT,
                width: card_width,
                height: CARD_HEIGHT.min(inner.height.saturating_sub(row * CARD_HEIGHT)),
            };
            if card.height < 3 {
                continue;
            }
            self.render_card(frame, card, task, ctx);
        }
    }

    fn on_input(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.scroll = self.scroll.saturating_sub(1);
                true
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.scroll = (self.scroll + 1).min(self.last_max_scroll);
                true
            }
            KeyCode::PageUp => {
                self.scroll = self.scroll.saturating_sub(self.last_visible_rows);
                true
            }
            KeyCode::PageDown => {
                self.scroll = (self.scroll + self.last_visible_rows).min(self.last_max_scroll);
                true
            }
            KeyCode::Home => {
                self.scroll = 0;
                true
            }
            KeyCode::End => {
                self.scroll = self.last_max_scroll;
                true
            }
            _ => false,
        }
    }

    fn focus(&mut self) {
        self.focused = true;
    }

    fn blur(&mut self) {
        self.focused = false;
    }
}

// === Log pane ===

/// Severity-then-agent filter cycle driven by `f`
#[derive(Clone, Debug, PartialEq)]
enum LogFilterState {
    None,
    Severity(usize),
    Agent(usize),
}

/// Scrollable, filterable list of projected log lines
pub struct LogPane {
    store: Arc<LogStore>,
    /// None follows the tail
    scroll: Option<usize>,
    filter: LogFilterState,
    search: String,
    /// Some while the search prompt is capturing keystrokes
    search_input: Option<String>,
    show_timestamps: bool,
    focused: bool,
    last_page: usize,
    last_max_scroll: usize,
}

impl LogPane {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self {
            store,
            scroll: None,
            filter: LogFilterState::None,
            search: String::new(),
            search_input: None,
            show_timestamps: true,
            focused: false,
            last_page: 1,
            last_max_scroll: 0,
        }
    }

    /// True while the search prompt owns the keyboard
    pub fn is_capturing(&self) -> bool {
        self.search_input.is_some()
    }

    fn cycle_filter(&mut self) {
        let agents = self.store.agent_types();
        self.filter = match &self.filter {
            LogFilterState::None => LogFilterState::Severity(0),
            LogFilterState::Severity(i) if i + 1 < Severity::ALL.len() => LogFilterState::Severity(i + 1),
            LogFilterState::Severity(_) if !agents.is_empty() => LogFilterState::Agent(0),
            LogFilterState::Severity(_) => LogFilterState::None,
            LogFilterState::Agent(i) if i + 1 < agents.len() => LogFilterState::Agent(i + 1),
            LogFilterState::Agent(_) => LogFilterState::None,
        };
    }

    fn filter_label(&self, agents: &[String]) -> Option<String> {
        match &self.filter {
            LogFilterState::None => None,
            LogFilterState::Severity(i) => Some(format!("sev:{}", Severity::ALL[*i])),
            LogFilterState::Agent(i) => agents.get(*i).map(|a| format!("agent:{a}")),
        }
    }

    fn matches(&self, entry: &LogEntry, agents: &[String]) -> bool {
        match &self.filter {
            LogFilterState::None => true,
            LogFilterState::Severity(i) => entry.severity == Severity::ALL[*i],
            LogFilterState::Agent(i) => agents.get(*i).is_some_and(|a| &entry.agent_type == a),
        }
    }
}

impl Component for LogPane {
    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &RenderCtx) {
        let theme = ctx.theme;
        let border = if self.focused { theme.border_focused } else { theme.border };
        let agents = self.store.agent_types();

        let viewport = area.height.saturating_sub(2) as usize;
        self.last_page = viewport.max(1);

        // Count matches, then copy out only the visible window
        let (total, window) = {
            let filter_matches = |entry: &LogEntry| self.matches(entry, &agents);
            self.store.visit(|entries| {
                let matched: Vec<&LogEntry> = entries.iter().filter(|e| filter_matches(e)).collect();
                let total = matched.len();
                let max_scroll = total.saturating_sub(viewport);
                let start = self.scroll.unwrap_or(max_scroll).min(max_scroll);
                let window: Vec<LogEntry> = matched
                    .iter()
                    .skip(start)
                    .take(viewport)
                    .map(|e| (*e).clone())
                    .collect();
                (total, window)
            })
        };
        self.last_max_scroll = total.saturating_sub(viewport);

        let mut title = format!(" Logs ({total}) ");
        if let Some(label) = self.filter_label(&agents) {
            title.push_str(&format!("[{label}] "));
        }
        if !self.search.is_empty() {
            title.push_str(&format!("[/{}] ", self.search));
        }
        if self.scroll.is_some() {
            title.push_str("[scrolled] ");
        }

        let width = area.width.saturating_sub(2) as usize;
        let mut lines: Vec<Line> = window
            .iter()
            .map(|entry| self.render_line(entry, width, theme))
            .collect();

        // Search prompt takes over the last line while capturing
        if let Some(buffer) = &self.search_input {
            lines.push(Line::from(vec![
                Span::styled("/", Style::default().fg(theme.header)),
                Span::raw(buffer.clone()),
                Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
            ]));
        }

        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(border)),
        );
        frame.render_widget(paragraph, area);
    }

    fn on_input(&mut self, key: KeyEvent) -> bool {
        // Search prompt capture
        if let Some(buffer) = &mut self.search_input {
            match key.code {
                KeyCode::Enter => {
                    self.search = buffer.clone();
                    self.search_input = None;
                }
                KeyCode::Esc => {
                    self.search_input = None;
                }
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                }
                _ => {}
            }
            return true;
        }

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                let current = self.scroll.unwrap_or(self.last_max_scroll);
                self.scroll = Some(current.saturating_sub(1));
                true
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let next = self.scroll.unwrap_or(self.last_max_scroll) + 1;
                // Scrolling past the end re-enters follow mode
                self.scroll = if next >= self.last_max_scroll { None } else { Some(next) };
                true
            }
            KeyCode::PageUp => {
                let current = self.scroll.unwrap_or(self.last_max_scroll);
                self.scroll = Some(current.saturating_sub(self.last_page));
                true
            }
            KeyCode::PageDown => {
                let next = self.scroll.unwrap_or(self.last_max_scroll) + self.last_page;
                self.scroll = if next >= self.last_max_scroll { None } else { Some(next) };
                true
            }
            KeyCode::Home => {
                self.scroll = Some(0);
                true
            }
            KeyCode::End => {
                self.scroll = None;
                true
            }
            KeyCode::Char('f') => {
                self.cycle_filter();
                true
            }
            KeyCode::Char('c') => {
                self.filter = LogFilterState::None;
                self.search.clear();
                true
            }
            KeyCode::Char('/') => {
                self.search_input = Some(String::new());
                true
            }
            KeyCode::Char('t') => {
                self.show_timestamps = !self.show_timestamps;
                true
            }
            _ => false,
        }
    }

    fn focus(&mut self) {
        self.focused = true;
    }

    fn blur(&mut self) {
        self.focused = false;
        self.search_input = None;
    }
}

impl LogPane {
    fn render_line(&self, entry: &LogEntry, width: usize, theme: &Theme) -> Line<'static> {
        let mut spans: Vec<Span<'static>> = Vec::new();
        let mut used = 0usize;

        if self.show_timestamps {
            let ts = entry.timestamp.format("%H:%M:%S%.3f ").to_string();
            used += ts.chars().count();
            spans.push(Span::styled(ts, Style::default().fg(theme.dim)));
        }

        let sev = format!("{:5} ", entry.severity.as_str());
        used += sev.chars().count();
        spans.push(Span::styled(sev, Style::default().fg(theme.severity_color(entry.severity))));

        if !entry.agent_type.is_empty() {
            let tag = format!("[{}] ", entry.agent_type);
            used += tag.chars().count();
            spans.push(Span::styled(tag, Style::default().fg(theme.agent_color(&entry.agent_type))));
        }
        if !entry.stage.is_empty() {
            let tag = format!("[{}] ", entry.stage);
            used += tag.chars().count();
            spans.push(Span::styled(tag, Style::default().fg(theme.dim)));
        }

        let message = truncate_ellipsis(&entry.message, width.saturating_sub(used));
        if self.search.is_empty() {
            spans.push(Span::styled(message, Style::default().fg(theme.text)));
        } else {
            spans.extend(highlight_spans(&message, &self.search, theme));
        }
        Line::from(spans)
    }
}

/// Split `text` into spans, rendering each case-insensitive match of
/// `query` with an inverse background
fn highlight_spans(text: &str, query: &str, theme: &Theme) -> Vec<Span<'static>> {
    let base = Style::default().fg(theme.text);
    let highlight = Style::default().fg(theme.search_fg).bg(theme.search_bg);
    if query.is_empty() {
        return vec![Span::styled(text.to_string(), base)];
    }

    let lower_text = text.to_lowercase();
    let lower_query = query.to_lowercase();
    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(found) = lower_text[cursor..].find(&lower_query) {
        let start = cursor + found;
        let end = start + lower_query.len();
        // Byte offsets from the lowercased haystack can fall inside a
        // multi-byte character of the original; bail out to a plain span
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return vec![Span::styled(text.to_string(), base)];
        }
        if start > cursor {
            spans.push(Span::styled(text[cursor..start].to_string(), base));
        }
        spans.push(Span::styled(text[start..end].to_string(), highlight));
        cursor = end;
    }
    if cursor < text.len() {
        spans.push(Span::styled(text[cursor..].to_string(), base));
    }
    spans
}

// === Statistics pane ===

#[derive(Clone, Debug, PartialEq)]
enum StatsMode {
    Overview,
    Detail(String),
}

/// Session overview and per-agent drill-down
pub struct StatsPane {
    stats: Arc<StatsAggregator>,
    bus: Arc<EventBus>,
    mode: StatsMode,
    selected: usize,
    scroll: usize,
    focused: bool,
}

impl StatsPane {
    pub fn new(stats: Arc<StatsAggregator>, bus: Arc<EventBus>) -> Self {
        Self {
            stats,
            bus,
            mode: StatsMode::Overview,
            selected: 0,
            scroll: 0,
            focused: false,
        }
    }

    fn toggle_detail(&mut self) {
        match &self.mode {
            StatsMode::Overview => {
                let snapshot = self.stats.current();
                if let Some(agent) = snapshot.agents.get(self.selected) {
                    self.mode = StatsMode::Detail(agent.agent_type.clone());
                    self.scroll = 0;
                }
            }
            StatsMode::Detail(_) => self.mode = StatsMode::Overview,
        }
    }

    fn render_overview(&mut self, frame: &mut Frame, area: Rect, ctx: &RenderCtx) {
        let theme = ctx.theme;
        let snapshot = self.stats.current();
        let history = self.stats.history();
        let bus_stats = self.bus.stats();

        let mut lines = session_lines(&snapshot, &history, &bus_stats, theme);
        lines.push(Line::from(""));

        let header_height = lines.len() as u16;
        let border = if self.focused { theme.border_focused } else { theme.border };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Statistics ")
            .border_style(Style::default().fg(border));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let summary_area = Rect {
            height: header_height.min(inner.height),
            ..inner
        };
        frame.render_widget(Paragraph::new(lines), summary_area);

        // Agent table below the session summary
        if inner.height <= header_height {
            return;
        }
        let table_area = Rect {
            y: inner.y + header_height,
            height: inner.height - header_height,
            ..inner
        };

        if snapshot.agents.is_empty() {
            let empty = Paragraph::new("No agent activity yet.").style(Style::default().fg(theme.dim));
            frame.render_widget(empty, table_area);
            return;
        }

        self.selected = self.selected.min(snapshot.agents.len().saturating_sub(1));
        let rows: Vec<Row> = snapshot
            .agents
            .iter()
            .enumerate()
            .map(|(i, agent)| {
                let style = if self.focused && i == self.selected {
                    Style::default().bg(theme.selected_bg)
                } else {
                    Style::default()
                };
                let finished = agent.successful + agent.failed;
                Row::new(vec![
                    agent.agent_type.clone(),
                    agent.total.to_string(),
                    agent.successful.to_string(),
                    agent.failed.to_string(),
                    agent.running.to_string(),
                    rate_str(finished, agent.success_rate()),
                    rate_str(agent.recent_outcomes.len() as u64, agent.recent_success_rate()),
                    format_duration_ms(agent.avg_duration()),
                ])
                .style(style)
            })
            .collect();

        let widths = [
            ratatui::layout::Constraint::Min(16),
            ratatui::layout::Constraint::Length(6),
            ratatui::layout::Constraint::Length(5),
            ratatui::layout::Constraint::Length(5),
            ratatui::layout::Constraint::Length(4),
            ratatui::layout::Constraint::Length(7),
            ratatui::layout::Constraint::Length(7),
            ratatui::layout::Constraint::Length(9),
        ];
        let table = Table::new(rows, widths).header(
            Row::new(vec!["AGENT", "TOTAL", "OK", "FAIL", "RUN", "RATE", "LAST10", "AVG"])
                .style(Style::default().fg(theme.header).add_modifier(Modifier::BOLD)),
        );
        frame.render_widget(table, table_area);
    }

    fn render_detail(&mut self, frame: &mut Frame, area: Rect, agent_type: &str, ctx: &RenderCtx) {
        let theme = ctx.theme;
        let border = if self.focused { theme.border_focused } else { theme.border };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Agent: {agent_type} (b to go back) "))
            .border_style(Style::default().fg(border));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(agent) = self.stats.agent(agent_type) else {
            frame.render_widget(
                Paragraph::new("Agent has no recorded activity.").style(Style::default().fg(theme.dim)),
                inner,
            );
            return;
        };

        let lines = agent_detail_lines(&agent, theme);
        let max_scroll = lines.len().saturating_sub(inner.height as usize);
        self.scroll = self.scroll.min(max_scroll);
        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((self.scroll as u16, 0));
        frame.render_widget(paragraph, inner);
    }
}

impl Component for StatsPane {
    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &RenderCtx) {
        match self.mode.clone() {
            StatsMode::Overview => self.render_overview(frame, area, ctx),
            StatsMode::Detail(agent) => self.render_detail(frame, area, &agent, ctx),
        }
    }

    fn on_input(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                match self.mode {
                    StatsMode::Overview => self.selected = self.selected.saturating_sub(1),
                    StatsMode::Detail(_) => self.scroll = self.scroll.saturating_sub(1),
                }
                true
            }
            KeyCode::Down | KeyCode::Char('j') => {
                match self.mode {
                    StatsMode::Overview => self.selected += 1,
                    StatsMode::Detail(_) => self.scroll += 1,
                }
                true
            }
            KeyCode::Home => {
                self.scroll = 0;
                self.selected = 0;
                true
            }
            KeyCode::Char('s') => {
                self.toggle_detail();
                true
            }
            KeyCode::Char('b') => {
                self.mode = StatsMode::Overview;
                true
            }
            _ => false,
        }
    }

    fn focus(&mut self) {
        self.focused = true;
    }

    fn blur(&mut self) {
        self.focused = false;
    }
}

/// Trend arrow comparing the two most recent snapshots
fn trend_arrow(history: &[StatsSnapshot], value: impl Fn(&StatsSnapshot) -> f64) -> &'static str {
    if history.len() < 2 {
        return "→";
    }
    let prev = value(&history[history.len() - 2]);
    let curr = value(&history[history.len() - 1]);
    if curr > prev {
        "↑"
    } else if curr < prev {
        "↓"
    } else {
        "→"
    }
}

fn session_lines<'a>(
    snapshot: &StatsSnapshot,
    history: &[StatsSnapshot],
    bus_stats: &BusStats,
    theme: &Theme,
) -> Vec<Line<'a>> {
    let session = &snapshot.session;
    let perf = &snapshot.performance;
    let finished = session.completed_tasks + session.failed_tasks;
    let queued: usize = bus_stats.queues.iter().map(|q| q.queued).sum();

    let throughput_trend = trend_arrow(history, |s| s.session.current_events_per_sec);
    let rate_trend = trend_arrow(history, |s| s.session.success_rate);

    let latency = if perf.p95_latency == std::time::Duration::ZERO {
        format!("avg {} · p95 N/A · p99 N/A", format_duration_ms(perf.avg_latency))
    } else {
        format!(
            "avg {} · p95 {} · p99 {}",
            format_duration_ms(perf.avg_latency),
            format_duration_ms(perf.p95_latency),
            format_duration_ms(perf.p99_latency),
        )
    };

    vec![
        Line::from(vec![
            Span::styled("events    ", Style::default().fg(theme.dim)),
            Span::styled(session.total_events.to_string(), Style::default().fg(theme.text)),
            Span::styled(
                format!(
                    "  ({:.1}/s now {throughput_trend} · {:.1}/s avg · {:.1}/s peak)",
                    session.current_events_per_sec, session.events_per_sec, session.peak_events_per_sec
                ),
                Style::default().fg(theme.dim),
            ),
        ]),
        Line::from(vec![
            Span::styled("tasks     ", Style::default().fg(theme.dim)),
            Span::styled(
                format!("{} active", session.active_tasks),
                Style::default().fg(theme.running),
            ),
            Span::styled(" · ", Style::default().fg(theme.dim)),
            Span::styled(
                format!("{} done", session.completed_tasks),
                Style::default().fg(theme.completed),
            ),
            Span::styled(" · ", Style::default().fg(theme.dim)),
            Span::styled(
                format!("{} failed", session.failed_tasks),
                Style::default().fg(theme.failed),
            ),
            Span::styled(
                format!(
                    "  rate {} {rate_trend} · avg {}",
                    rate_str(finished, session.success_rate),
                    format_duration_ms(session.avg_task_duration)
                ),
                Style::default().fg(theme.dim),
            ),
        ]),
        Line::from(vec![
            Span::styled("latency   ", Style::default().fg(theme.dim)),
            Span::styled(latency, Style::default().fg(theme.text)),
        ]),
        Line::from(vec![
            Span::styled("bus       ", Style::default().fg(theme.dim)),
            Span::styled(
                format!(
                    "{} subscribers · {} queued · {} dropped",
                    bus_stats.subscribers, queued, bus_stats.total_dropped
                ),
                Style::default().fg(theme.text),
            ),
        ]),
    ]
}

fn agent_detail_lines<'a>(agent: &AgentStats, theme: &Theme) -> Vec<Line<'a>> {
    let finished = agent.successful + agent.failed;
    let mut lines = vec![
        Line::from(vec![
            Span::styled("executions  ", Style::default().fg(theme.dim)),
            Span::raw(format!(
                "{} total · {} ok · {} failed · {} running",
                agent.total, agent.successful, agent.failed, agent.running
            )),
        ]),
        Line::from(vec![
            Span::styled("success     ", Style::default().fg(theme.dim)),
            Span::raw(format!(
                "{} overall · {} last {}",
                rate_str(finished, agent.success_rate()),
                rate_str(agent.recent_outcomes.len() as u64, agent.recent_success_rate()),
                agent.recent_outcomes.len()
            )),
        ]),
        Line::from(vec![
            Span::styled("durations   ", Style::default().fg(theme.dim)),
            Span::raw(format!(
                "min {} · avg {} · max {} · last {}",
                format_duration_ms(agent.min_duration),
                format_duration_ms(agent.avg_duration()),
                format_duration_ms(agent.max_duration),
                format_duration_ms(agent.last_duration)
            )),
        ]),
        Line::from(""),
    ];

    lines.push(Line::from(Span::styled(
        "Models",
        Style::default().fg(theme.header).add_modifier(Modifier::BOLD),
    )));
    if agent.models.is_empty() {
        lines.push(Line::from(Span::styled("  (none)", Style::default().fg(theme.dim))));
    }
    for (model, count) in &agent.models {
        let marker = if agent.preferred_model.as_deref() == Some(model) {
            " *"
        } else {
            ""
        };
        lines.push(Line::from(format!("  {model}: {count}{marker}")));
    }
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Stages",
        Style::default().fg(theme.header).add_modifier(Modifier::BOLD),
    )));
    if agent.stages.is_empty() {
        lines.push(Line::from(Span::styled("  (none)", Style::default().fg(theme.dim))));
    }
    for (stage, count) in &agent.stages {
        lines.push(Line::from(format!("  {stage}: {count}")));
    }
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Errors",
        Style::default().fg(theme.header).add_modifier(Modifier::BOLD),
    )));
    if agent.common_errors.is_empty() {
        lines.push(Line::from(Span::styled("  (none)", Style::default().fg(theme.dim))));
    }
    let max_count = agent.common_errors.values().copied().max().unwrap_or(1);
    for (prefix, count) in &agent.common_errors {
        let bar_len = ((*count as f64 / max_count as f64) * 20.0).ceil() as usize;
        lines.push(Line::from(vec![
            Span::styled(format!("  {:>4} ", count), Style::default().fg(theme.failed)),
            Span::styled("█".repeat(bar_len), Style::default().fg(theme.failed)),
            Span::raw(format!(" {prefix}")),
        ]));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_static_at_endpoints() {
        // No spinner frame at 0 or 1, regardless of tick
        assert_eq!(progress_bar(0.0, 10, 0), progress_bar(0.0, 10, 3));
        assert_eq!(progress_bar(1.0, 10, 0), progress_bar(1.0, 10, 3));
        assert!(progress_bar(0.0, 10, 0).starts_with("[░░░░░░░░░░]"));
        assert!(progress_bar(1.0, 10, 0).starts_with("[██████████]"));
    }

    #[test]
    fn test_progress_bar_animates_in_flight() {
        let a = progress_bar(0.5, 10, 0);
        let b = progress_bar(0.5, 10, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_progress_bar_enforces_minimum_width() {
        let bar = progress_bar(0.5, 2, 0);
        // "[" + 10 glyphs + "]" plus percentage
        let inner = bar.split(']').next().unwrap();
        assert_eq!(inner.chars().count() - 1, MIN_BAR_WIDTH);
    }

    #[test]
    fn test_progress_bar_percentage() {
        assert!(progress_bar(0.45, 10, 0).ends_with("45%"));
        assert!(progress_bar(0.0, 10, 0).ends_with("0%"));
        assert!(progress_bar(1.0, 10, 0).ends_with("100%"));
        // Out-of-range input clamps
        assert!(progress_bar(3.0, 10, 0).ends_with("100%"));
    }

    #[test]
    fn test_truncate_ellipsis() {
        assert_eq!(truncate_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_ellipsis("hello world", 6), "hello…");
        assert_eq!(truncate_ellipsis("hello", 0), "");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("T1"), "T1");
    }

    #[test]
    fn test_rate_str_reports_na_for_zero_denominator() {
        assert_eq!(rate_str(0, 0.0), "N/A");
        assert_eq!(rate_str(4, 75.0), "75.0%");
    }

    #[test]
    fn test_highlight_spans_marks_matches() {
        let theme = Theme::dark();
        let spans = highlight_spans("task failed: timeout", "failed", &theme);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].content.as_ref(), "failed");
    }

    #[test]
    fn test_highlight_spans_is_case_insensitive() {
        let theme = Theme::dark();
        let spans = highlight_spans("Task Failed", "failed", &theme);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].content.as_ref(), "Failed");
    }

    #[test]
    fn test_highlight_spans_without_match() {
        let theme = Theme::dark();
        let spans = highlight_spans("all good", "failed", &theme);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_log_filter_cycles_severities_then_agents() {
        let store = Arc::new(LogStore::new(100));
        store.append_event(&crate::events::MonitorEvent::new(
            "T1",
            crate::events::EventPayload::TaskStarted {
                agent_type: "alpha".to_string(),
                model_hint: None,
                retry_count: 0,
            },
        ));
        let mut pane = LogPane::new(store);

        assert_eq!(pane.filter, LogFilterState::None);
        for i in 0..Severity::ALL.len() {
            pane.cycle_filter();
            assert_eq!(pane.filter, LogFilterState::Severity(i));
        }
        pane.cycle_filter();
        assert_eq!(pane.filter, LogFilterState::Agent(0));
        pane.cycle_filter();
        assert_eq!(pane.filter, LogFilterState::None);
    }

    #[test]
    fn test_log_filter_cycle_without_agents_wraps_to_none() {
        let mut pane = LogPane::new(Arc::new(LogStore::new(10)));
        for _ in 0..Severity::ALL.len() {
            pane.cycle_filter();
        }
        pane.cycle_filter();
        assert_eq!(pane.filter, LogFilterState::None);
    }

    #[test]
    fn test_log_pane_search_capture() {
        let mut pane = LogPane::new(Arc::new(LogStore::new(10)));
        assert!(!pane.is_capturing());

        pane.on_input(KeyEvent::from(KeyCode::Char('/')));
        assert!(pane.is_capturing());
        for c in "err".chars() {
            pane.on_input(KeyEvent::from(KeyCode::Char(c)));
        }
        pane.on_input(KeyEvent::from(KeyCode::Enter));
        assert!(!pane.is_capturing());
        assert_eq!(pane.search, "err");

        // Esc cancels without committing
        pane.on_input(KeyEvent::from(KeyCode::Char('/')));
        pane.on_input(KeyEvent::from(KeyCode::Char('x')));
        pane.on_input(KeyEvent::from(KeyCode::Esc));
        assert_eq!(pane.search, "err");
    }

    #[test]
    fn test_log_pane_clear_resets_filter_and_search() {
        let mut pane = LogPane::new(Arc::new(LogStore::new(10)));
        pane.search = "x".to_string();
        pane.cycle_filter();
        pane.on_input(KeyEvent::from(KeyCode::Char('c')));
        assert_eq!(pane.filter, LogFilterState::None);
        assert!(pane.search.is_empty());
    }

    #[test]
    fn test_dashboard_scroll_clamps() {
        let projection = Arc::new(TaskProjection::default());
        let mut pane = DashboardPane::new(projection);
        pane.last_max_scroll = 3;
        pane.on_input(KeyEvent::from(KeyCode::End));
        assert_eq!(pane.scroll, 3);
        pane.on_input(KeyEvent::from(KeyCode::Down));
        assert_eq!(pane.scroll, 3);
        pane.on_input(KeyEvent::from(KeyCode::Home));
        assert_eq!(pane.scroll, 0);
        pane.on_input(KeyEvent::from(KeyCode::Up));
        assert_eq!(pane.scroll, 0);
    }

    #[test]
    fn test_dashboard_animating_requires_partial_progress() {
        let projection = Arc::new(TaskProjection::default());
        let pane = DashboardPane::new(Arc::clone(&projection));
        assert!(!pane.is_animating());

        projection.apply(&crate::events::MonitorEvent::new(
            "T1",
            crate::events::EventPayload::TaskStarted {
                agent_type: "a".to_string(),
                model_hint: None,
                retry_count: 0,
            },
        ));
        // Progress 0: static
        assert!(!pane.is_animating());

        projection.apply(&crate::events::MonitorEvent::new(
            "T1",
            crate::events::EventPayload::TaskProgress {
                stage: "s".to_string(),
                message: "m".to_string(),
                progress: 0.5,
                duration: std::time::Duration::ZERO,
            },
        ));
        assert!(pane.is_animating());
    }

    #[test]
    fn test_stats_pane_detail_toggle() {
        let stats = Arc::new(StatsAggregator::new());
        let bus = crate::events::create_event_bus();
        stats.record_event(&crate::events::MonitorEvent::new(
            "T1",
            crate::events::EventPayload::TaskStarted {
                agent_type: "alpha".to_string(),
                model_hint: None,
                retry_count: 0,
            },
        ));

        let mut pane = StatsPane::new(stats, bus);
        assert_eq!(pane.mode, StatsMode::Overview);
        pane.on_input(KeyEvent::from(KeyCode::Char('s')));
        assert_eq!(pane.mode, StatsMode::Detail("alpha".to_string()));
        pane.on_input(KeyEvent::from(KeyCode::Char('b')));
        assert_eq!(pane.mode, StatsMode::Overview);
    }

    #[test]
    fn test_trend_arrow() {
        let mut up = StatsSnapshot::default();
        up.session.current_events_per_sec = 2.0;
        let mut down = StatsSnapshot::default();
        down.session.current_events_per_sec = 1.0;

        let history = vec![down.clone(), up.clone()];
        assert_eq!(trend_arrow(&history, |s| s.session.current_events_per_sec), "↑");
        let history = vec![up, down];
        assert_eq!(trend_arrow(&history, |s| s.session.current_events_per_sec), "↓");
        assert_eq!(trend_arrow(&[], |s| s.session.current_events_per_sec), "→");
    }
}
