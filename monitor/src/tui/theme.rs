//! Color themes for the dashboard

use ratatui::style::Color;

use crate::config::ThemeName;
use crate::logs::Severity;
use crate::projection::TaskStatus;

/// Resolved palette used by all render code
#[derive(Clone, Copy, Debug)]
pub struct Theme {
    pub header: Color,
    pub border: Color,
    pub border_focused: Color,
    pub text: Color,
    pub dim: Color,
    pub selected_bg: Color,
    pub running: Color,
    pub pending: Color,
    pub completed: Color,
    pub failed: Color,
    pub warn: Color,
    pub accent: Color,
    pub search_fg: Color,
    pub search_bg: Color,
}

/// Palette for color-coding agent types on dashboard cards
const AGENT_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Magenta,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::LightRed,
];

impl Theme {
    pub fn named(name: ThemeName) -> Self {
        match name {
            ThemeName::Dark => Self::dark(),
            ThemeName::Light => Self::light(),
            ThemeName::Custom => Self::custom(),
        }
    }

    pub fn dark() -> Self {
        Self {
            header: Color::Rgb(0, 255, 255),
            border: Color::DarkGray,
            border_focused: Color::Rgb(0, 255, 255),
            text: Color::White,
            dim: Color::DarkGray,
            selected_bg: Color::Rgb(40, 40, 40),
            running: Color::Rgb(0, 255, 127),
            pending: Color::Rgb(255, 215, 0),
            completed: Color::Rgb(50, 205, 50),
            failed: Color::Rgb(220, 20, 60),
            warn: Color::Yellow,
            accent: Color::Rgb(100, 149, 237),
            search_fg: Color::Black,
            search_bg: Color::Rgb(255, 215, 0),
        }
    }

    pub fn light() -> Self {
        Self {
            header: Color::Rgb(0, 95, 135),
            border: Color::Gray,
            border_focused: Color::Rgb(0, 95, 135),
            text: Color::Black,
            dim: Color::Gray,
            selected_bg: Color::Rgb(215, 215, 215),
            running: Color::Rgb(0, 135, 95),
            pending: Color::Rgb(175, 135, 0),
            completed: Color::Rgb(0, 135, 0),
            failed: Color::Rgb(175, 0, 55),
            warn: Color::Rgb(175, 95, 0),
            accent: Color::Rgb(95, 95, 215),
            search_fg: Color::White,
            search_bg: Color::Rgb(95, 95, 215),
        }
    }

    /// High-contrast variant for unusual terminals
    pub fn custom() -> Self {
        Self {
            header: Color::White,
            border: Color::White,
            border_focused: Color::Yellow,
            text: Color::White,
            dim: Color::Gray,
            selected_bg: Color::Blue,
            running: Color::Green,
            pending: Color::Yellow,
            completed: Color::Green,
            failed: Color::Red,
            warn: Color::Yellow,
            accent: Color::Cyan,
            search_fg: Color::Black,
            search_bg: Color::Yellow,
        }
    }

    /// Color for a task status
    pub fn status_color(&self, status: TaskStatus) -> Color {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Running => self.running,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
        }
    }

    /// Color for a log severity
    pub fn severity_color(&self, severity: Severity) -> Color {
        match severity {
            Severity::Debug => self.dim,
            Severity::Info => self.text,
            Severity::Warn => self.warn,
            Severity::Error => self.failed,
        }
    }

    /// Stable color for an agent type, hashed into a small palette
    pub fn agent_color(&self, agent_type: &str) -> Color {
        let hash: u32 = agent_type.bytes().fold(2166136261u32, |acc, b| {
            (acc ^ b as u32).wrapping_mul(16777619)
        });
        AGENT_COLORS[hash as usize % AGENT_COLORS.len()]
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_themes_resolve() {
        let _ = Theme::named(ThemeName::Dark);
        let _ = Theme::named(ThemeName::Light);
        let _ = Theme::named(ThemeName::Custom);
    }

    #[test]
    fn test_agent_color_is_stable() {
        let theme = Theme::dark();
        assert_eq!(theme.agent_color("reviewer"), theme.agent_color("reviewer"));
    }

    #[test]
    fn test_status_colors_differ_for_terminal_states() {
        let theme = Theme::dark();
        assert_ne!(
            theme.status_color(TaskStatus::Completed),
            theme.status_color(TaskStatus::Failed)
        );
    }
}
