//! WebDriver wire format for the UiAutomator2 automation server
//!
//! This module provides:
//! - Session capability types serialized in the W3C `alwaysMatch` envelope
//! - Free functions that parse response bodies (session id, page source,
//!   server status) without panicking on unexpected shapes
//! - W3C pointer-action builders for taps and swipes

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use flexd_core::Point;

/// Android package name of the Amazon Flex app.
pub const FLEX_APP_PACKAGE: &str = "com.amazon.flex.rabbit";

/// Launch activity the session opens on.
pub const FLEX_APP_ACTIVITY: &str = "com.amazon.rabbit.android.presentation.login.LoginActivity";

/// Idle timeout (seconds) the server applies before discarding a session.
///
/// The bot can sit in a slow polling cadence for a long time, so this is
/// generous. One hour matches what the server accepts without complaint.
pub const NEW_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// Desired capabilities for a UiAutomator2 session.
///
/// Serialized with the vendor-prefixed keys the server expects
/// (`appium:deviceName`, etc.). `platformName` is the only bare W3C key.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    #[serde(rename = "platformName")]
    pub platform_name: String,
    #[serde(rename = "appium:automationName")]
    pub automation_name: String,
    #[serde(rename = "appium:deviceName")]
    pub device_name: String,
    #[serde(rename = "appium:appPackage")]
    pub app_package: String,
    #[serde(rename = "appium:appActivity")]
    pub app_activity: String,
    #[serde(rename = "appium:noReset")]
    pub no_reset: bool,
    #[serde(rename = "appium:newCommandTimeout")]
    pub new_command_timeout: u64,
}

impl Capabilities {
    /// Capabilities that attach to the Flex app on the given device.
    ///
    /// `noReset` stays on so a signed-in app survives session churn.
    pub fn for_flex_app(device_name: impl Into<String>) -> Self {
        Self {
            platform_name: "Android".to_string(),
            automation_name: "UiAutomator2".to_string(),
            device_name: device_name.into(),
            app_package: FLEX_APP_PACKAGE.to_string(),
            app_activity: FLEX_APP_ACTIVITY.to_string(),
            no_reset: true,
            new_command_timeout: NEW_COMMAND_TIMEOUT_SECS,
        }
    }

    /// Wrap these capabilities in the W3C new-session envelope.
    pub fn into_new_session_body(self) -> Value {
        json!({ "capabilities": { "alwaysMatch": self } })
    }
}

/// Error payload the server embeds in a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    /// Machine-readable error code, e.g. `"invalid session id"`.
    pub error: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

impl WireError {
    /// One-line summary for logs and error messages.
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            self.error.clone()
        } else {
            format!("{}: {}", self.error, self.message)
        }
    }

    /// Whether the server no longer recognizes the session id.
    pub fn is_invalid_session(&self) -> bool {
        self.error == "invalid session id"
    }
}

// ─────────────────────────────────────────────────────────
// Response Body Parsing (Free Functions)
// ─────────────────────────────────────────────────────────

/// Extracts the session id from a new-session response body.
///
/// Accepts the W3C shape (`{"value":{"sessionId":...}}`) and falls back
/// to the legacy top-level `sessionId` some servers still emit.
///
/// # Returns
/// * `Some(String)` if a session id is present
/// * `None` for anything else (error bodies, malformed JSON)
pub fn parse_session_id(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let id = parsed
        .get("value")
        .and_then(|v| v.get("sessionId"))
        .or_else(|| parsed.get("sessionId"))?;
    id.as_str().map(|s| s.to_string())
}

/// Extracts the XML page source from a `GET .../source` response body.
pub fn parse_page_source(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("value")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Reads the `ready` flag from a `GET /status` response body.
///
/// A body without the flag is treated as ready: the server answered, and
/// older builds omit the field.
pub fn parse_server_ready(body: &str) -> bool {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    parsed
        .get("value")
        .and_then(|v| v.get("ready"))
        .and_then(|r| r.as_bool())
        .unwrap_or(true)
}

/// Extracts the error payload from a failed response body, if present.
pub fn parse_wire_error(body: &str) -> Option<WireError> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let value = parsed.get("value")?;
    serde_json::from_value(value.clone()).ok()
}

// ─────────────────────────────────────────────────────────
// W3C Pointer Actions
// ─────────────────────────────────────────────────────────

/// How long a tap holds the pointer down, in milliseconds.
const TAP_HOLD_MS: u64 = 100;

/// Builds a single-finger tap at the given point.
pub fn tap_actions(at: Point) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "x": at.x, "y": at.y },
                { "type": "pointerDown", "button": 0 },
                { "type": "pause", "duration": TAP_HOLD_MS },
                { "type": "pointerUp", "button": 0 },
            ],
        }]
    })
}

/// Builds a single-finger swipe between two points.
pub fn swipe_actions(from: Point, to: Point, duration_ms: u64) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "x": from.x, "y": from.y },
                { "type": "pointerDown", "button": 0 },
                { "type": "pointerMove", "duration": duration_ms, "x": to.x, "y": to.y },
                { "type": "pointerUp", "button": 0 },
            ],
        }]
    })
}
