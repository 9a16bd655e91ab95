//! Shared domain types for Flex Daemon
//!
//! Defines:
//! - `SessionState` / `BotPhase` - lifecycle enums for the automation session
//!   and the control loop
//! - `AuthStatus` - authentication state surfaced by the Status API
//! - `OfferDetails`, `GrabRecord`, `MetricsSnapshot` - the offer/metrics model

use serde::{Deserialize, Serialize};

/// Lifecycle of the remote automation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session exists (startup or after a clean close).
    #[default]
    Disconnected,

    /// A session open is in flight.
    Connecting,

    /// Session established and responding.
    Active,

    /// Session stopped responding and a reconnect is retrying.
    ///
    /// `attempt` is 1-based (first retry = 1).
    Degraded {
        /// Current attempt number (1-based).
        attempt: u32,
        /// Maximum number of retry attempts.
        max_attempts: u32,
    },

    /// Session torn down after a stop or reconnect exhaustion.
    Closed,
}

impl SessionState {
    /// Short human-readable label used in `/status` payloads.
    ///
    /// Examples:
    /// - `"active"`
    /// - `"degraded (2/10)"`
    pub fn label(&self) -> String {
        match self {
            SessionState::Disconnected => "disconnected".to_string(),
            SessionState::Connecting => "connecting".to_string(),
            SessionState::Active => "active".to_string(),
            SessionState::Degraded {
                attempt,
                max_attempts,
            } => format!("degraded ({attempt}/{max_attempts})"),
            SessionState::Closed => "closed".to_string(),
        }
    }

    /// Returns `true` while a session exists in some form (opening,
    /// established, or mid-reconnect).
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Active | SessionState::Degraded { .. }
        )
    }
}

/// Control-loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BotPhase {
    /// Not running; the initial and terminal phase.
    #[default]
    Stopped,

    /// Start accepted, session open in flight.
    Starting,

    /// Scanning UI snapshots on the poll cadence.
    Polling,

    /// Dispatching an accept sequence for a qualifying offer.
    Acting,

    /// Transport failed; the session manager is retrying.
    Reconnecting,

    /// Teardown in progress (stop request, logout, or retry exhaustion).
    Stopping,
}

impl BotPhase {
    pub fn label(&self) -> &'static str {
        match self {
            BotPhase::Stopped => "stopped",
            BotPhase::Starting => "starting",
            BotPhase::Polling => "polling",
            BotPhase::Acting => "acting",
            BotPhase::Reconnecting => "reconnecting",
            BotPhase::Stopping => "stopping",
        }
    }

    /// The run flag: everything except `Stopped` counts as running.
    pub fn is_running(&self) -> bool {
        !matches!(self, BotPhase::Stopped)
    }
}

/// Authentication state as served by `GET /auth_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub message: String,
}

impl Default for AuthStatus {
    fn default() -> Self {
        Self {
            authenticated: false,
            message: "Bot has not started yet".to_string(),
        }
    }
}

impl AuthStatus {
    pub fn signed_in(message: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            message: message.into(),
        }
    }

    pub fn signed_out(message: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            message: message.into(),
        }
    }
}

/// A screen coordinate in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Details extracted from an on-screen block offer.
///
/// Extraction is best-effort: any field that could not be read from the
/// snapshot is `None`, and the offer still surfaces so the loop can log it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OfferDetails {
    /// Pay rate in dollars, parsed from text like `"$27.50"`.
    pub rate: Option<f64>,

    /// Block length in minutes, parsed from text like `"120 min"`.
    pub duration_mins: Option<u32>,

    /// Pickup location text, when the row carries one.
    pub location: Option<String>,

    /// Tap target for the offer row (center of its bounds).
    pub tap: Option<Point>,
}

/// One accepted block, as it appears in the metrics history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrabRecord {
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Pay for the block in dollars.
    pub earnings: f64,
}

/// Copy of the accumulated metrics served by `GET /metrics`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub blocks_grabbed: u64,
    pub earnings: f64,
    pub history: Vec<GrabRecord>,
}
