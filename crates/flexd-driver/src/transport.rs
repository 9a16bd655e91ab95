//! HTTP transport to the UiAutomator2 automation server
//!
//! `Transport` is the seam the session layer and control loop are generic
//! over; `WebDriverTransport` is the production implementation speaking
//! the WebDriver wire protocol over HTTP. Tests substitute a scripted
//! transport (see `test_utils`).

use std::time::Duration;

use serde_json::Value;
use url::Url;

use flexd_core::prelude::*;
use flexd_core::Point;

use crate::protocol::{self, Capabilities};
use crate::source::{parse_ui_tree, UiElement};

/// Server-issued session identifier.
pub type SessionId = String;

/// Default endpoint of the automation server.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:4723";

/// Default TCP connect deadline before the server is declared unreachable.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-request deadline. Opening a session installs the device
/// agent and can take tens of seconds on a cold emulator.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A gesture dispatched into the foreground app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    /// Single tap at a point.
    Tap(Point),
    /// Straight-line swipe between two points.
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u64,
    },
}

impl UiAction {
    /// W3C pointer-action payload for this gesture.
    pub fn into_wire_body(self) -> Value {
        match self {
            UiAction::Tap(at) => protocol::tap_actions(at),
            UiAction::Swipe {
                from,
                to,
                duration_ms,
            } => protocol::swipe_actions(from, to, duration_ms),
        }
    }
}

/// Async surface of the automation server.
///
/// Session-scoped failures surface as [`Error::SessionLost`] (the caller
/// decides whether to reconnect); failures reaching the server at all
/// surface as [`Error::Connect`]. Request timeouts are reported the same
/// way as any other transport failure.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Opens a new automation session and returns its id.
    async fn open_session(&self, capabilities: Capabilities) -> Result<SessionId>;

    /// Captures the foreground screen as elements in document order.
    async fn ui_tree(&self, session: &SessionId) -> Result<Vec<UiElement>>;

    /// Performs a gesture on the current screen.
    async fn dispatch(&self, session: &SessionId, action: UiAction) -> Result<()>;

    /// Releases the session on the server.
    async fn close_session(&self, session: &SessionId) -> Result<()>;

    /// Checks that the server is up and ready, without touching a session.
    async fn server_status(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Production implementation
// ---------------------------------------------------------------------------

/// WebDriver-over-HTTP transport. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WebDriverTransport {
    client: reqwest::Client,
    base: Url,
}

impl WebDriverTransport {
    /// Builds a transport against `server_url` with the default timeouts,
    /// e.g. `http://127.0.0.1:4723`.
    ///
    /// Prefix paths (`http://host:4723/wd/hub`) are preserved.
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_timeouts(server_url, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Builds a transport with explicit connect and per-request deadlines.
    pub fn with_timeouts(
        server_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(server_url)
            .map_err(|e| Error::config(format!("invalid automation server URL {server_url:?}: {e}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
    }

    /// Reads a session-scoped response, mapping error bodies onto the
    /// error taxonomy: a rejected session id means the session is lost,
    /// anything else unexpected is a protocol error.
    async fn read_session_response(context: &str, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::session_lost(format!("{context}: failed reading response: {e}")))?;
        if status.is_success() {
            return Ok(body);
        }
        match protocol::parse_wire_error(&body) {
            Some(wire) if wire.is_invalid_session() => {
                Err(Error::session_lost(format!("{context}: {}", wire.summary())))
            }
            Some(wire) => Err(Error::protocol(format!("{context}: {}", wire.summary()))),
            None => Err(Error::protocol(format!("{context}: HTTP {status}"))),
        }
    }
}

impl Transport for WebDriverTransport {
    async fn open_session(&self, capabilities: Capabilities) -> Result<SessionId> {
        let url = self.endpoint("session");
        debug!(%url, device = %capabilities.device_name, "opening automation session");
        let response = self
            .client
            .post(&url)
            .json(&capabilities.into_new_session_body())
            .send()
            .await
            .map_err(|e| Error::connect(format!("POST /session: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::connect(format!("POST /session: failed reading response: {e}")))?;
        if !status.is_success() {
            let detail = protocol::parse_wire_error(&body)
                .map(|w| w.summary())
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(Error::connect(format!("session not created: {detail}")));
        }
        match protocol::parse_session_id(&body) {
            Some(id) => {
                info!(session = %id, "automation session open");
                Ok(id)
            }
            None => Err(Error::protocol("new-session response carried no session id")),
        }
    }

    async fn ui_tree(&self, session: &SessionId) -> Result<Vec<UiElement>> {
        let url = self.endpoint(&format!("session/{session}/source"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::session_lost(format!("GET page source: {e}")))?;
        let body = Self::read_session_response("GET page source", response).await?;
        let xml = protocol::parse_page_source(&body)
            .ok_or_else(|| Error::protocol("page-source response carried no XML document"))?;
        Ok(parse_ui_tree(&xml))
    }

    async fn dispatch(&self, session: &SessionId, action: UiAction) -> Result<()> {
        let url = self.endpoint(&format!("session/{session}/actions"));
        trace!(?action, "dispatching gesture");
        let response = self
            .client
            .post(&url)
            .json(&action.into_wire_body())
            .send()
            .await
            .map_err(|e| Error::session_lost(format!("POST actions: {e}")))?;
        Self::read_session_response("POST actions", response).await?;
        Ok(())
    }

    async fn close_session(&self, session: &SessionId) -> Result<()> {
        let url = self.endpoint(&format!("session/{session}"));
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::session_lost(format!("DELETE session: {e}")))?;
        Self::read_session_response("DELETE session", response).await?;
        info!(session = %session, "automation session closed");
        Ok(())
    }

    async fn server_status(&self) -> Result<()> {
        let url = self.endpoint("status");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::connect(format!("GET /status: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::connect(format!("GET /status: failed reading response: {e}")))?;
        if !status.is_success() {
            return Err(Error::connect(format!("automation server not ready: HTTP {status}")));
        }
        if !protocol::parse_server_ready(&body) {
            return Err(Error::connect("automation server reports not ready"));
        }
        Ok(())
    }
}
