//! Monitor configuration
//!
//! Layering, lowest precedence first: built-in defaults, optional YAML file
//! (project-local `.morgana.yml`, then `~/.config/morgana/monitor.yml`),
//! environment variables, CLI flags. Validation failures here are fatal at
//! startup (exit code 1).

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

use crate::events::{DEFAULT_QUEUE_CAPACITY, DEFAULT_RING_CAPACITY};
use crate::ipc;
use crate::logs::DEFAULT_MAX_LOG_LINES;

/// Default TUI tick period
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(16);

/// Refresh rate bounds
pub const MIN_REFRESH: Duration = Duration::from_millis(1);
pub const MAX_REFRESH: Duration = Duration::from_secs(1);

/// Environment variable names
pub const ENV_TUI_ENABLED: &str = "MORGANA_TUI_ENABLED";
pub const ENV_REFRESH_RATE: &str = "MORGANA_TUI_REFRESH_RATE";
pub const ENV_MAX_LOG_LINES: &str = "MORGANA_TUI_MAX_LOG_LINES";
pub const ENV_BUFFER_SIZE: &str = "MORGANA_TUI_BUFFER_SIZE";
pub const ENV_THEME: &str = "MORGANA_TUI_THEME";

/// Color theme selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeName {
    #[default]
    Dark,
    Light,
    Custom,
}

impl ThemeName {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dark" => Ok(ThemeName::Dark),
            "light" => Ok(ThemeName::Light),
            "custom" => Ok(ThemeName::Custom),
            other => Err(eyre!("unknown theme: {other} (expected dark, light, or custom)")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeName::Dark => "dark",
            ThemeName::Light => "light",
            ThemeName::Custom => "custom",
        }
    }
}

/// Resolved monitor configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Unix socket path
    pub socket_path: PathBuf,
    /// Ring buffer capacity (events)
    pub history: usize,
    /// TUI tick period
    pub refresh: Duration,
    /// Log store line cap
    pub max_log_lines: usize,
    /// Per-subscriber event bus queue capacity
    pub buffer_size: usize,
    /// Color theme
    pub theme: ThemeName,
    /// Whether the in-process TUI may run on a TTY
    pub tui_enabled: bool,
    /// Directory for the optional per-event text tee; None disables it
    pub event_log_dir: Option<PathBuf>,
    /// Diagnostics log level (TRACE..ERROR)
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(ipc::DEFAULT_SOCKET_PATH),
            history: DEFAULT_RING_CAPACITY,
            refresh: DEFAULT_REFRESH,
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            buffer_size: DEFAULT_QUEUE_CAPACITY,
            theme: ThemeName::Dark,
            tui_enabled: true,
            event_log_dir: None,
            log_level: None,
        }
    }
}

/// CLI flag overrides, applied last
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub socket: Option<PathBuf>,
    pub history: Option<usize>,
    pub refresh: Option<String>,
    pub max_log_lines: Option<usize>,
    pub theme: Option<String>,
}

/// On-disk configuration file shape (kebab-case keys, all optional)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    #[serde(rename = "socket-path")]
    socket_path: Option<PathBuf>,
    history: Option<usize>,
    refresh: Option<String>,
    #[serde(rename = "max-log-lines")]
    max_log_lines: Option<usize>,
    #[serde(rename = "buffer-size")]
    buffer_size: Option<usize>,
    theme: Option<String>,
    #[serde(rename = "tui-enabled")]
    tui_enabled: Option<bool>,
    #[serde(rename = "event-log-dir")]
    event_log_dir: Option<PathBuf>,
    #[serde(rename = "log-level")]
    log_level: Option<String>,
}

impl Config {
    /// Load configuration: defaults, then file, then environment, then flags
    pub fn load(config_path: Option<&PathBuf>, overrides: &Overrides) -> Result<Self> {
        let mut config = Config::default();

        if let Some(file) = Self::read_file(config_path)? {
            config.apply_file(file)?;
        }
        config.apply_env()?;
        config.apply_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(config_path: Option<&PathBuf>) -> Result<Option<FileConfig>> {
        // An explicit path must exist and parse
        if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let file: FileConfig = serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            return Ok(Some(file));
        }

        // Fallback chain: project-local, then user config
        let mut candidates = vec![PathBuf::from(".morgana.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("morgana").join("monitor.yml"));
        }
        for path in candidates {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                let file: FileConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?;
                tracing::info!(path = %path.display(), "loaded config file");
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(path) = file.socket_path {
            self.socket_path = path;
        }
        if let Some(history) = file.history {
            self.history = history;
        }
        if let Some(refresh) = file.refresh {
            self.refresh = parse_duration(&refresh)?;
        }
        if let Some(lines) = file.max_log_lines {
            self.max_log_lines = lines;
        }
        if let Some(size) = file.buffer_size {
            self.buffer_size = size;
        }
        if let Some(theme) = file.theme {
            self.theme = ThemeName::parse(&theme)?;
        }
        if let Some(enabled) = file.tui_enabled {
            self.tui_enabled = enabled;
        }
        if let Some(dir) = file.event_log_dir {
            self.event_log_dir = Some(dir);
        }
        if let Some(level) = file.log_level {
            self.log_level = Some(level);
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(ipc::SOCKET_ENV) {
            if !path.is_empty() {
                self.socket_path = PathBuf::from(path);
            }
        }
        if let Some(raw) = env_var(ENV_TUI_ENABLED) {
            self.tui_enabled = match raw.to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => return Err(eyre!("{ENV_TUI_ENABLED} must be true or false, got {other}")),
            };
        }
        if let Some(raw) = env_var(ENV_REFRESH_RATE) {
            self.refresh = parse_duration(&raw).with_context(|| format!("invalid {ENV_REFRESH_RATE}"))?;
        }
        if let Some(raw) = env_var(ENV_MAX_LOG_LINES) {
            self.max_log_lines = raw
                .parse::<usize>()
                .map_err(|_| eyre!("{ENV_MAX_LOG_LINES} must be a positive integer, got {raw}"))?;
        }
        if let Some(raw) = env_var(ENV_BUFFER_SIZE) {
            self.buffer_size = raw
                .parse::<usize>()
                .map_err(|_| eyre!("{ENV_BUFFER_SIZE} must be a positive integer, got {raw}"))?;
        }
        if let Some(raw) = env_var(ENV_THEME) {
            self.theme = ThemeName::parse(&raw)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(socket) = &overrides.socket {
            self.socket_path = socket.clone();
        }
        if let Some(history) = overrides.history {
            self.history = history;
        }
        if let Some(refresh) = &overrides.refresh {
            self.refresh = parse_duration(refresh).context("invalid --refresh")?;
        }
        if let Some(lines) = overrides.max_log_lines {
            self.max_log_lines = lines;
        }
        if let Some(theme) = &overrides.theme {
            self.theme = ThemeName::parse(theme)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.refresh < MIN_REFRESH || self.refresh > MAX_REFRESH {
            return Err(eyre!(
                "refresh rate {:?} out of bounds ({:?}..{:?})",
                self.refresh,
                MIN_REFRESH,
                MAX_REFRESH
            ));
        }
        if self.history == 0 {
            return Err(eyre!("history must be positive"));
        }
        if self.max_log_lines == 0 {
            return Err(eyre!("max-log-lines must be positive"));
        }
        if self.buffer_size == 0 {
            return Err(eyre!("buffer-size must be positive"));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

/// Parse a duration string: `250us`, `33ms`, `2s`, `1m`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| eyre!("duration {s:?} is missing a unit (us, ms, s, m)"))?;
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().map_err(|_| eyre!("invalid duration value in {s:?}"))?;
    match unit {
        "us" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        other => Err(eyre!("unknown duration unit {other:?} in {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ipc::SOCKET_ENV,
            ENV_TUI_ENABLED,
            ENV_REFRESH_RATE,
            ENV_MAX_LOG_LINES,
            ENV_BUFFER_SIZE,
            ENV_THEME,
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("33ms").unwrap(), Duration::from_millis(33));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert!(parse_duration("33").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("33h").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!(ThemeName::parse("dark").unwrap(), ThemeName::Dark);
        assert_eq!(ThemeName::parse("LIGHT").unwrap(), ThemeName::Light);
        assert_eq!(ThemeName::parse("custom").unwrap(), ThemeName::Custom);
        assert!(ThemeName::parse("solarized").is_err());
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::load(None, &Overrides::default()).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/morgana.sock"));
        assert_eq!(config.history, 1000);
        assert_eq!(config.refresh, Duration::from_millis(16));
        assert_eq!(config.max_log_lines, 10_000);
        assert_eq!(config.theme, ThemeName::Dark);
        assert!(config.tui_enabled);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        unsafe {
            std::env::set_var(ipc::SOCKET_ENV, "/tmp/other.sock");
            std::env::set_var(ENV_TUI_ENABLED, "false");
            std::env::set_var(ENV_REFRESH_RATE, "33ms");
            std::env::set_var(ENV_MAX_LOG_LINES, "500");
            std::env::set_var(ENV_BUFFER_SIZE, "64");
            std::env::set_var(ENV_THEME, "light");
        }
        let config = Config::load(None, &Overrides::default()).unwrap();
        clear_env();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/other.sock"));
        assert!(!config.tui_enabled);
        assert_eq!(config.refresh, Duration::from_millis(33));
        assert_eq!(config.max_log_lines, 500);
        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.theme, ThemeName::Light);
    }

    #[test]
    #[serial]
    fn test_flags_beat_env() {
        clear_env();
        unsafe { std::env::set_var(ENV_REFRESH_RATE, "33ms") };
        let overrides = Overrides {
            refresh: Some("100ms".to_string()),
            history: Some(42),
            ..Default::default()
        };
        let config = Config::load(None, &overrides).unwrap();
        clear_env();

        assert_eq!(config.refresh, Duration::from_millis(100));
        assert_eq!(config.history, 42);
    }

    #[test]
    #[serial]
    fn test_bad_env_bool_is_fatal() {
        clear_env();
        unsafe { std::env::set_var(ENV_TUI_ENABLED, "maybe") };
        let result = Config::load(None, &Overrides::default());
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_refresh_bounds_are_enforced() {
        clear_env();
        for bad in ["0ms", "2s"] {
            let overrides = Overrides {
                refresh: Some(bad.to_string()),
                ..Default::default()
            };
            assert!(Config::load(None, &overrides).is_err(), "{bad} should be rejected");
        }
        for good in ["1ms", "1s"] {
            let overrides = Overrides {
                refresh: Some(good.to_string()),
                ..Default::default()
            };
            assert!(Config::load(None, &overrides).is_ok(), "{good} should be accepted");
        }
    }

    #[test]
    #[serial]
    fn test_unknown_theme_is_fatal() {
        clear_env();
        let overrides = Overrides {
            theme: Some("neon".to_string()),
            ..Default::default()
        };
        assert!(Config::load(None, &overrides).is_err());
    }

    #[test]
    #[serial]
    fn test_config_file_layering() {
        clear_env();
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("monitor.yml");
        std::fs::write(
            &path,
            "history: 250\ntheme: light\nmax-log-lines: 2000\ntui-enabled: false\n",
        )
        .unwrap();

        // Env still beats the file
        unsafe { std::env::set_var(ENV_THEME, "dark") };
        let config = Config::load(Some(&path), &Overrides::default()).unwrap();
        clear_env();

        assert_eq!(config.history, 250);
        assert_eq!(config.max_log_lines, 2000);
        assert!(!config.tui_enabled);
        assert_eq!(config.theme, ThemeName::Dark);
    }

    #[test]
    #[serial]
    fn test_explicit_config_file_must_exist() {
        clear_env();
        let missing = PathBuf::from("/nonexistent/morgana.yml");
        assert!(Config::load(Some(&missing), &Overrides::default()).is_err());
    }

    #[test]
    #[serial]
    fn test_zero_caps_are_rejected() {
        clear_env();
        let overrides = Overrides {
            history: Some(0),
            ..Default::default()
        };
        assert!(Config::load(None, &overrides).is_err());

        let overrides = Overrides {
            max_log_lines: Some(0),
            ..Default::default()
        };
        assert!(Config::load(None, &overrides).is_err());
    }
}
