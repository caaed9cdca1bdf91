//! Frame composition
//!
//! Lays out the header, the panes for the current layout, and the status
//! bar, then delegates pane content to the components. Render code never
//! mutates UI state beyond the components' own scroll bookkeeping.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::app::App;
use super::components::{Component, RenderCtx};
use super::state::LayoutMode;

/// Header contents computed by the runner each frame
#[derive(Clone, Debug, Default)]
pub struct HeaderInfo {
    pub uptime_secs: u64,
    pub total_events: u64,
}

/// Render one full frame
pub fn render(app: &mut App, frame: &mut Frame, ctx: &RenderCtx, header: &HeaderInfo) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(0),    // content
            Constraint::Length(1), // status bar
        ])
        .split(frame.area());

    render_header(app, frame, chunks[0], ctx);

    match app.state.layout {
        LayoutMode::Split => render_split(app, frame, chunks[1], ctx),
        LayoutMode::Dashboard => app.dashboard.render(frame, chunks[1], ctx),
        LayoutMode::Logs => app.logs.render(frame, chunks[1], ctx),
        LayoutMode::Statistics => app.stats.render(frame, chunks[1], ctx),
        LayoutMode::Help => render_help(frame, chunks[1], ctx),
    }

    render_status_bar(frame, chunks[2], ctx, header);
}

/// Split layout: dashboard and logs side by side, statistics strip below
fn render_split(app: &mut App, frame: &mut Frame, area: Rect, ctx: &RenderCtx) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(9)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[0]);

    app.dashboard.render(frame, columns[0], ctx);
    app.logs.render(frame, columns[1], ctx);
    app.stats.render(frame, rows[1], ctx);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect, ctx: &RenderCtx) {
    let theme = ctx.theme;
    let mut spans = vec![
        Span::styled(
            " morgana",
            Style::default().fg(theme.header).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" │ {} │ focus:{}", app.state.layout.title(), app.state.focus.title()),
            Style::default().fg(theme.dim),
        ),
    ];
    if app.state.show_fps {
        spans.push(Span::styled(
            format!(" │ {:.0} fps", app.state.fps),
            Style::default().fg(theme.dim),
        ));
    }
    if let Some(warning) = &app.state.warning {
        spans.push(Span::styled(
            format!("  ⚠ {warning}"),
            Style::default().fg(theme.warn).add_modifier(Modifier::BOLD),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_status_bar(frame: &mut Frame, area: Rect, ctx: &RenderCtx, header: &HeaderInfo) {
    let theme = ctx.theme;
    let uptime = format_uptime(header.uptime_secs);
    let line = Line::from(vec![
        Span::styled(
            format!(" up {uptime} │ {} events", header.total_events),
            Style::default().fg(theme.dim),
        ),
        Span::styled(
            "  [Tab] focus · [Space] layout · [h] help · [q] quit",
            Style::default().fg(theme.dim),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn format_uptime(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn render_help(frame: &mut Frame, area: Rect, ctx: &RenderCtx) {
    let theme = ctx.theme;
    let key_line = |key: &str, desc: &str| {
        Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<14}"), Style::default().fg(theme.header)),
            Span::raw(desc.to_string()),
        ])
    };

    let lines = vec![
        Line::from(Span::styled(
            "Keyboard",
            Style::default().fg(theme.header).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled("Global", Style::default().add_modifier(Modifier::BOLD))),
        key_line("q / Ctrl-C / Esc", "Quit"),
        key_line("Tab / Shift-Tab", "Switch focus"),
        key_line("Space / l", "Cycle layout (split, dashboard, logs, statistics)"),
        key_line("s", "Show statistics view"),
        key_line("h / ?", "Toggle this help"),
        key_line("F", "Toggle the FPS readout"),
        Line::from(""),
        Line::from(Span::styled("Scrolling", Style::default().add_modifier(Modifier::BOLD))),
        key_line("Up/k · Down/j", "Line up / down"),
        key_line("PgUp · PgDn", "Page up / down"),
        key_line("Home · End", "Jump to start / end (End follows the log tail)"),
        Line::from(""),
        Line::from(Span::styled("Logs", Style::default().add_modifier(Modifier::BOLD))),
        key_line("f", "Cycle filters: severities, then agent types"),
        key_line("c", "Clear filter and search"),
        key_line("/", "Search (Enter applies, Esc cancels)"),
        key_line("t", "Toggle timestamps"),
        Line::from(""),
        Line::from(Span::styled("Statistics", Style::default().add_modifier(Modifier::BOLD))),
        key_line("s", "Drill into the selected agent"),
        key_line("b", "Back to the overview"),
        Line::from(""),
        Line::from(Span::styled(
            "Press h or ? to close.",
            Style::default().fg(theme.dim),
        )),
    ];

    frame.render_widget(Paragraph::new(lines), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(65), "1m05s");
        assert_eq!(format_uptime(3700), "1h01m");
    }
}
