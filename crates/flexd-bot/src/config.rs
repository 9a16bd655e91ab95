//! Configuration for Flex Daemon
//!
//! Two layers live here:
//! - `Settings` - daemon-level knobs loaded from `config.toml` (server
//!   endpoint, device, reconnect policy, poll cadence, offer filters)
//! - `BotConfig` - the per-run working window and rate floor accepted
//!   from a start request, validated before the bot ever sees it

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use flexd_core::prelude::*;
use flexd_driver::RetryPolicy;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = "flex-daemon";

// ─────────────────────────────────────────────────────────────────────────────
// Daemon Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Daemon settings (config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub cadence: CadenceSettings,

    #[serde(default)]
    pub filter: FilterSettings,

    #[serde(default)]
    pub api: ApiSettings,
}

/// Automation server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Base URL of the UiAutomator2 server
    #[serde(default = "default_server_url")]
    pub url: String,

    /// TCP connect deadline, seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Per-request deadline, seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_server_url() -> String {
    flexd_driver::DEFAULT_SERVER_URL.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    flexd_driver::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    flexd_driver::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl ServerSettings {
    /// TCP connect deadline for the transport.
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-request deadline for the transport.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

/// Target device settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceSettings {
    /// Device name the session attaches to
    #[serde(default = "default_device_name")]
    pub name: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

fn default_device_name() -> String {
    "emulator-5554".to_string()
}

/// Session recovery settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Delay before the first reconnection attempt, seconds
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    /// Ceiling on the delay between attempts, seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Consecutive failed attempts tolerated before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_initial_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

impl SessionSettings {
    /// Retry policy for the session manager.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: std::time::Duration::from_secs(self.initial_backoff_secs),
            max_backoff: std::time::Duration::from_secs(self.max_backoff_secs),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Poll cadence settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CadenceSettings {
    /// Fastest poll interval while offers are flowing, milliseconds
    #[serde(default = "default_poll_min_ms")]
    pub poll_min_ms: u64,

    /// Slowest poll interval after a long idle stretch, milliseconds
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    /// Slow-down added per idle poll, milliseconds
    #[serde(default = "default_poll_step_ms")]
    pub poll_step_ms: u64,

    /// Swipe-refresh the offer list every N polls (0 disables)
    #[serde(default = "default_refresh_every")]
    pub refresh_every: u32,

    /// Pause between tapping an offer and looking for its confirmation,
    /// milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Nap while outside the configured working window, milliseconds
    #[serde(default = "default_window_nap_ms")]
    pub window_nap_ms: u64,
}

impl Default for CadenceSettings {
    fn default() -> Self {
        Self {
            poll_min_ms: default_poll_min_ms(),
            poll_max_ms: default_poll_max_ms(),
            poll_step_ms: default_poll_step_ms(),
            refresh_every: default_refresh_every(),
            settle_ms: default_settle_ms(),
            window_nap_ms: default_window_nap_ms(),
        }
    }
}

fn default_poll_min_ms() -> u64 {
    100
}

fn default_poll_max_ms() -> u64 {
    1200
}

fn default_poll_step_ms() -> u64 {
    100
}

fn default_refresh_every() -> u32 {
    5
}

fn default_settle_ms() -> u64 {
    500
}

fn default_window_nap_ms() -> u64 {
    30_000
}

/// Offer filter settings not carried in a start request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterSettings {
    /// Shortest acceptable block, minutes (0 = no lower bound)
    #[serde(default)]
    pub min_duration_mins: u32,

    /// Longest acceptable block, minutes (0 = no upper bound)
    #[serde(default)]
    pub max_duration_mins: u32,

    /// Most grab records retained in metrics history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_duration_mins: 0,
            max_duration_mins: 0,
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    365
}

impl FilterSettings {
    /// Whether a block of `duration_mins` falls inside the duration band.
    ///
    /// Unknown durations pass: the rate filter is the one that matters,
    /// and a missing duration should not discard an otherwise good offer.
    pub fn duration_ok(&self, duration_mins: Option<u32>) -> bool {
        let Some(mins) = duration_mins else {
            return true;
        };
        if self.min_duration_mins > 0 && mins < self.min_duration_mins {
            return false;
        }
        if self.max_duration_mins > 0 && mins > self.max_duration_mins {
            return false;
        }
        true
    }
}

/// Status API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSettings {
    /// Socket address the status API listens on
    #[serde(default = "default_bind_addr")]
    pub bind: String,

    /// Most log lines retained for `/status`
    #[serde(default = "default_log_limit")]
    pub log_limit: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: default_bind_addr(),
            log_limit: default_log_limit(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_log_limit() -> usize {
    crate::state::DEFAULT_LOG_LIMIT
}

/// Default location of config.toml: `<config dir>/flex-daemon/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILENAME)
}

/// Load settings from the given config file
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bot Run Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Daily working window, wall-clock.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HoursWindow {
    /// Inclusive start, `"HH:MM"` (a bare hour like `"8"` is accepted)
    pub start: String,
    /// Exclusive end, same format
    pub end: String,
}

/// Working window and filter parameters for one bot run.
///
/// Arrives as the JSON body of a start request:
/// `{"days":["Monday","Tue"],"hours":{"start":"08:00","end":"18:00"},"min_rate":22.5,"warehouse":"DSD8"}`
///
/// Immutable once accepted: a running bot keeps the config it started
/// with until it is stopped and started again.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BotConfig {
    /// Weekday names the bot may work
    pub days: Vec<String>,
    /// Daily working window
    pub hours: HoursWindow,
    /// Lowest per-block rate worth grabbing, in dollars
    pub min_rate: f64,
    /// Warehouse / service area the run targets
    pub warehouse: String,
}

impl BotConfig {
    /// Validates a start request.
    ///
    /// The config is stored as received; parsed forms are derived on use.
    pub fn validate(&self) -> Result<()> {
        if self.days.is_empty() {
            return Err(Error::validation("days must not be empty"));
        }
        for day in &self.days {
            if parse_weekday(day).is_none() {
                return Err(Error::validation(format!("unknown day {day:?}")));
            }
        }
        let start = parse_clock(&self.hours.start).ok_or_else(|| {
            Error::validation(format!("bad start time {:?}", self.hours.start))
        })?;
        let end = parse_clock(&self.hours.end)
            .ok_or_else(|| Error::validation(format!("bad end time {:?}", self.hours.end)))?;
        if start >= end {
            return Err(Error::validation("hours.start must be before hours.end"));
        }
        if !self.min_rate.is_finite() || self.min_rate <= 0.0 {
            return Err(Error::validation("min_rate must be greater than zero"));
        }
        if self.warehouse.trim().is_empty() {
            return Err(Error::validation("warehouse must not be empty"));
        }
        Ok(())
    }

    /// Days parsed to weekdays. Unknown names are dropped, so call
    /// [`validate`](Self::validate) first.
    pub fn weekdays(&self) -> Vec<Weekday> {
        self.days.iter().filter_map(|d| parse_weekday(d)).collect()
    }

    /// Working window parsed to clock times.
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((parse_clock(&self.hours.start)?, parse_clock(&self.hours.end)?))
    }

    /// Whether the bot may work at the given local time: the weekday is
    /// selected and the clock falls in `[start, end)`.
    pub fn in_working_window(&self, now: DateTime<Local>) -> bool {
        let Some((start, end)) = self.window() else {
            return false;
        };
        if !self.weekdays().contains(&now.weekday()) {
            return false;
        }
        let time = now.time();
        start <= time && time < end
    }
}

/// Parses a weekday name: full (`"Monday"`) or three-letter (`"mon"`),
/// case-insensitive.
pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parses a clock time: `"HH:MM"`, or a bare hour like `"8"`.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    if let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M") {
        return Some(time);
    }
    trimmed
        .parse::<u32>()
        .ok()
        .and_then(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
}
