//! TUI application - keybinding dispatch
//!
//! Owns the UI state and the three panes. Global keys (quit, focus, layout,
//! help) are handled here; everything else goes to the focused component.
//! No rendering happens in this module.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use super::components::{Component, DashboardPane, LogPane, StatsPane};
use super::state::{FocusPane, LayoutMode, UiState};

/// The TUI application model
pub struct App {
    pub state: UiState,
    pub dashboard: DashboardPane,
    pub logs: LogPane,
    pub stats: StatsPane,
}

impl App {
    pub fn new(dashboard: DashboardPane, logs: LogPane, stats: StatsPane) -> Self {
        let mut app = Self {
            state: UiState::new(),
            dashboard,
            logs,
            stats,
        };
        app.sync_focus();
        app
    }

    fn focused_component(&mut self) -> &mut dyn Component {
        match self.state.focus {
            FocusPane::Dashboard => &mut self.dashboard,
            FocusPane::Logs => &mut self.logs,
            FocusPane::Statistics => &mut self.stats,
        }
    }

    /// Propagate the focus flag into the panes
    fn sync_focus(&mut self) {
        self.dashboard.blur();
        self.logs.blur();
        self.stats.blur();
        match self.state.focus {
            FocusPane::Dashboard => self.dashboard.focus(),
            FocusPane::Logs => self.logs.focus(),
            FocusPane::Statistics => self.stats.focus(),
        }
    }

    fn set_focus(&mut self, focus: FocusPane) {
        self.state.focus = focus;
        self.sync_focus();
        self.state.mark_dirty();
    }

    /// Single-pane layouts move focus to their pane
    fn sync_focus_to_layout(&mut self) {
        match self.state.layout {
            LayoutMode::Dashboard => self.set_focus(FocusPane::Dashboard),
            LayoutMode::Logs => self.set_focus(FocusPane::Logs),
            LayoutMode::Statistics => self.set_focus(FocusPane::Statistics),
            LayoutMode::Split | LayoutMode::Help => {}
        }
    }

    /// Handle one key event; returns true when the app should quit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        debug!(?key, "App::handle_key");

        // Ctrl-C always quits, even over the help screen or a prompt
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.state.should_quit = true;
            return true;
        }

        // Help overlay swallows everything; the usual keys close it
        if self.state.layout == LayoutMode::Help {
            match key.code {
                KeyCode::Char('h') | KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q') => {
                    self.state.toggle_help();
                }
                _ => {}
            }
            return false;
        }

        // A capturing component (log search prompt) owns the keyboard
        if self.state.focus == FocusPane::Logs && self.logs.is_capturing() {
            self.logs.on_input(key);
            self.state.mark_dirty();
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.state.should_quit = true;
                return true;
            }
            KeyCode::Tab => {
                self.state.cycle_focus(true);
                self.sync_focus();
            }
            KeyCode::BackTab => {
                self.state.cycle_focus(false);
                self.sync_focus();
            }
            KeyCode::Char(' ') | KeyCode::Char('l') => {
                self.state.cycle_layout();
                self.sync_focus_to_layout();
            }
            KeyCode::Char('h') | KeyCode::Char('?') => {
                self.state.toggle_help();
            }
            KeyCode::Char('F') => {
                self.state.show_fps = !self.state.show_fps;
                self.state.mark_dirty();
            }
            KeyCode::Char('s') => {
                // First press shows the statistics view; from there the
                // pane handles drill-down
                if self.state.layout == LayoutMode::Statistics || self.state.focus == FocusPane::Statistics {
                    if self.stats.on_input(key) {
                        self.state.mark_dirty();
                    }
                } else {
                    self.state.layout = LayoutMode::Statistics;
                    self.set_focus(FocusPane::Statistics);
                }
            }
            _ => {
                if self.focused_component().on_input(key) {
                    self.state.mark_dirty();
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::create_event_bus;
    use crate::logs::LogStore;
    use crate::projection::TaskProjection;
    use crate::stats::StatsAggregator;

    fn app() -> App {
        let projection = Arc::new(TaskProjection::default());
        let logs = Arc::new(LogStore::default());
        let stats = Arc::new(StatsAggregator::new());
        let bus = create_event_bus();
        App::new(
            DashboardPane::new(projection),
            LogPane::new(logs),
            StatsPane::new(stats, bus),
        )
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::from(code)
    }

    #[test]
    fn test_quit_keys() {
        for code in [KeyCode::Char('q'), KeyCode::Esc] {
            let mut app = app();
            assert!(app.handle_key(key(code)));
            assert!(app.state.should_quit);
        }

        let mut app = app();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.handle_key(ctrl_c));
    }

    #[test]
    fn test_tab_cycles_focus() {
        let mut app = app();
        assert_eq!(app.state.focus, FocusPane::Dashboard);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.state.focus, FocusPane::Logs);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.state.focus, FocusPane::Statistics);
        app.handle_key(key(KeyCode::BackTab));
        assert_eq!(app.state.focus, FocusPane::Logs);
    }

    #[test]
    fn test_space_and_l_cycle_layout() {
        let mut app = app();
        assert_eq!(app.state.layout, LayoutMode::Split);
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.state.layout, LayoutMode::Dashboard);
        app.handle_key(key(KeyCode::Char('l')));
        assert_eq!(app.state.layout, LayoutMode::Logs);
        // Single-pane layout pulled focus along
        assert_eq!(app.state.focus, FocusPane::Logs);
    }

    #[test]
    fn test_s_shows_statistics_view() {
        let mut app = app();
        app.handle_key(key(KeyCode::Char('s')));
        assert_eq!(app.state.layout, LayoutMode::Statistics);
        assert_eq!(app.state.focus, FocusPane::Statistics);
    }

    #[test]
    fn test_help_overlay_toggles_and_swallows_keys() {
        let mut app = app();
        app.handle_key(key(KeyCode::Char('?')));
        assert_eq!(app.state.layout, LayoutMode::Help);

        // q closes help instead of quitting
        assert!(!app.handle_key(key(KeyCode::Char('q'))));
        assert_eq!(app.state.layout, LayoutMode::Split);
        assert!(!app.state.should_quit);

        app.handle_key(key(KeyCode::Char('h')));
        assert_eq!(app.state.layout, LayoutMode::Help);
        // Unbound keys are swallowed while help is up
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.state.layout, LayoutMode::Help);
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.state.layout, LayoutMode::Split);
    }

    #[test]
    fn test_search_capture_blocks_quit() {
        let mut app = app();
        app.handle_key(key(KeyCode::Tab)); // focus logs
        app.handle_key(key(KeyCode::Char('/')));
        assert!(app.logs.is_capturing());

        // 'q' goes into the search buffer, not quit
        assert!(!app.handle_key(key(KeyCode::Char('q'))));
        assert!(!app.state.should_quit);

        app.handle_key(key(KeyCode::Esc));
        assert!(!app.logs.is_capturing());
        assert!(!app.state.should_quit);
    }

    #[test]
    fn test_scroll_keys_reach_focused_component() {
        let mut app = app();
        // Dashboard focused; scroll keys are consumed and dirty the frame
        app.state.dirty = false;
        app.handle_key(key(KeyCode::Down));
        assert!(app.state.dirty);
    }
}
