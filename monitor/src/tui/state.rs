//! UI state: layout, focus, and the render-dirty flag
//!
//! The model is the authoritative store of view state. Render code reads
//! it; input handling and the runner mutate it.

use tracing::debug;

/// Screen layouts, in `Space`/`l` cycle order (help is reached via `h`/`?`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutMode {
    /// Dashboard plus logs side by side, statistics strip below
    Split,
    Dashboard,
    Logs,
    Statistics,
    Help,
}

impl LayoutMode {
    /// Next layout in the cycle (help is skipped; it is an overlay state)
    pub fn next(self) -> Self {
        match self {
            LayoutMode::Split => LayoutMode::Dashboard,
            LayoutMode::Dashboard => LayoutMode::Logs,
            LayoutMode::Logs => LayoutMode::Statistics,
            LayoutMode::Statistics => LayoutMode::Split,
            LayoutMode::Help => LayoutMode::Split,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            LayoutMode::Split => "split",
            LayoutMode::Dashboard => "dashboard",
            LayoutMode::Logs => "logs",
            LayoutMode::Statistics => "statistics",
            LayoutMode::Help => "help",
        }
    }
}

/// Which pane receives input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusPane {
    Dashboard,
    Logs,
    Statistics,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Dashboard => FocusPane::Logs,
            FocusPane::Logs => FocusPane::Statistics,
            FocusPane::Statistics => FocusPane::Dashboard,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            FocusPane::Dashboard => FocusPane::Statistics,
            FocusPane::Logs => FocusPane::Dashboard,
            FocusPane::Statistics => FocusPane::Logs,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            FocusPane::Dashboard => "dashboard",
            FocusPane::Logs => "logs",
            FocusPane::Statistics => "statistics",
        }
    }
}

/// Authoritative UI state
#[derive(Debug)]
pub struct UiState {
    pub width: u16,
    pub height: u16,
    pub layout: LayoutMode,
    /// Layout to return to when the help overlay closes
    pub layout_before_help: LayoutMode,
    pub focus: FocusPane,
    pub should_quit: bool,
    /// Data changed since the last rendered frame
    pub dirty: bool,
    /// Invariant-violation banner for the header
    pub warning: Option<String>,
    pub show_fps: bool,
    pub fps: f64,
    /// Monotonic tick counter driving progress bar animation
    pub animation_tick: u64,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            width: 80,
            height: 24,
            layout: LayoutMode::Split,
            layout_before_help: LayoutMode::Split,
            focus: FocusPane::Dashboard,
            should_quit: false,
            dirty: true,
            warning: None,
            show_fps: false,
            fps: 0.0,
            animation_tick: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn cycle_layout(&mut self) {
        self.layout = self.layout.next();
        debug!(layout = self.layout.title(), "UiState::cycle_layout");
        self.mark_dirty();
    }

    pub fn cycle_focus(&mut self, forward: bool) {
        self.focus = if forward { self.focus.next() } else { self.focus.prev() };
        debug!(focus = self.focus.title(), "UiState::cycle_focus");
        self.mark_dirty();
    }

    pub fn toggle_help(&mut self) {
        if self.layout == LayoutMode::Help {
            self.layout = self.layout_before_help;
        } else {
            self.layout_before_help = self.layout;
            self.layout = LayoutMode::Help;
        }
        self.mark_dirty();
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.mark_dirty();
    }

    pub fn set_warning(&mut self, warning: Option<String>) {
        if self.warning != warning {
            self.warning = warning;
            self.mark_dirty();
        }
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}
