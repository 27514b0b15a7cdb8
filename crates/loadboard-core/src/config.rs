//! Configuration management for the loadboard dashboard

use crate::tile::StatTile;
use crate::types::DateRange;
use crate::{Error, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Enabled tiles, in display order
    #[serde(default = "default_tiles")]
    pub tiles: Vec<StatTile>,

    /// Backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Refresh cadence and list sizes
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Dispatch-time range filter
    #[serde(default)]
    pub range: RangeConfig,

    /// Display formatting
    #[serde(default)]
    pub display: DisplayConfig,

    /// Realtime update channels
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend web server
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Session cookie value, when the backend requires an authenticated session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Periodic refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub interval_seconds: u64,

    /// Number of recent requests listed
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

/// Dispatch-time range configuration
///
/// With neither bound set the range defaults to the current day, unless
/// `unbounded` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeConfig {
    /// First day (`YYYY-MM-DD`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    /// Last day (`YYYY-MM-DD`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    /// Do not default to today when no bound is given
    #[serde(default)]
    pub unbounded: bool,
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Viewer UTC offset such as `+03:00`; the host's local zone when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,

    /// Date layout (chrono format string)
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Short time layout (chrono format string)
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

/// Which update channels feed the refresh loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeMode {
    /// Periodic refresh only
    #[default]
    Disabled,
    /// Bus subscriptions
    Bus,
    /// Legacy update endpoint polling
    Poll,
    /// Both, coalesced
    Both,
}

/// Realtime update configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Enabled channels
    #[serde(default)]
    pub mode: RealtimeMode,

    /// Update endpoint poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Window in milliseconds within which update signals coalesce
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Path of the legacy update endpoint
    #[serde(default = "default_updates_path")]
    pub updates_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_tiles() -> Vec<StatTile> {
    StatTile::ALL.to_vec()
}

fn default_backend_url() -> String {
    "http://localhost:8069".to_string()
}

const fn default_timeout() -> u64 {
    30
}

const fn default_refresh_interval() -> u64 {
    30
}

const fn default_recent_limit() -> usize {
    10
}

fn default_date_format() -> String {
    "%d/%m/%Y".to_string()
}

fn default_time_format() -> String {
    "%H:%M".to_string()
}

const fn default_poll_interval() -> u64 {
    10
}

const fn default_debounce() -> u64 {
    500
}

fn default_updates_path() -> String {
    "/ice_loading/api/updates".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            tiles: default_tiles(),
            backend: BackendConfig::default(),
            refresh: RefreshConfig::default(),
            range: RangeConfig::default(),
            display: DisplayConfig::default(),
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            session_id: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_refresh_interval(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset: None,
            date_format: default_date_format(),
            time_format: default_time_format(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            mode: RealtimeMode::default(),
            poll_interval_seconds: default_poll_interval(),
            debounce_ms: default_debounce(),
            updates_path: default_updates_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BackendConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl RefreshConfig {
    /// Get refresh interval as Duration
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl RealtimeConfig {
    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Get debounce window as Duration
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether bus subscriptions feed the refresh loop
    #[must_use]
    pub const fn uses_bus(&self) -> bool {
        matches!(self.mode, RealtimeMode::Bus | RealtimeMode::Both)
    }

    /// Whether the update endpoint is polled
    #[must_use]
    pub const fn uses_poll(&self) -> bool {
        matches!(self.mode, RealtimeMode::Poll | RealtimeMode::Both)
    }
}

impl RangeConfig {
    /// Resolve into a [`DateRange`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDate`] when a bound is not a `YYYY-MM-DD` day.
    pub fn resolve(&self) -> Result<DateRange> {
        let start = self.start_date.as_deref().map(DateRange::parse_day).transpose()?;
        let end = self.end_date.as_deref().map(DateRange::parse_day).transpose()?;

        if start.is_none() && end.is_none() && !self.unbounded {
            return Ok(DateRange::today());
        }
        Ok(DateRange::new(start, end))
    }
}

impl DisplayConfig {
    /// Viewer offset, `None` meaning the host's local zone
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the offset is not `+HH:MM` / `-HH:MM`.
    pub fn offset(&self) -> Result<Option<FixedOffset>> {
        let Some(raw) = self.utc_offset.as_deref() else {
            return Ok(None);
        };
        parse_offset(raw)
            .map(Some)
            .ok_or_else(|| Error::validation("display.utc_offset", format!("invalid offset '{raw}'")))
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, raw.get(1..)?),
        b'-' => (-1, raw.get(1..)?),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl DashboardConfig {
    /// Load configuration from environment and files
    ///
    /// Sources, lowest precedence first: an optional `loadboard.{toml,json,yaml}`
    /// in the working directory, then `LOADBOARD__SECTION__KEY` variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a source is malformed or a value
    /// fails validation.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("loadboard").required(false))
            .add_source(
                config::Environment::with_prefix("LOADBOARD")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("tiles")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit TOML file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read, parsed or
    /// validated.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.backend.url.starts_with("http://") || self.backend.url.starts_with("https://")) {
            return Err(Error::validation(
                "backend.url",
                "must be an http:// or https:// URL",
            ));
        }
        if self.refresh.interval_seconds == 0 {
            return Err(Error::validation("refresh.interval_seconds", "must be at least 1"));
        }
        if self.refresh.recent_limit == 0 {
            return Err(Error::validation("refresh.recent_limit", "must be at least 1"));
        }
        if self.realtime.uses_poll() && self.realtime.poll_interval_seconds == 0 {
            return Err(Error::validation(
                "realtime.poll_interval_seconds",
                "must be at least 1",
            ));
        }
        self.range.resolve()?;
        self.display.offset()?;
        Ok(())
    }
}
