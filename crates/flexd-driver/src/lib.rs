//! # flexd-driver - Device Automation Transport
//!
//! Talks to a UiAutomator2 automation server over the WebDriver wire
//! protocol: session lifecycle, page-source snapshots, and pointer
//! gestures against the Amazon Flex app.
//!
//! Depends on [`flexd_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Transport
//! - [`Transport`] - Async seam the bot is generic over
//! - [`WebDriverTransport`] - Production HTTP implementation
//! - [`UiAction`] - Tap and swipe gestures
//!
//! ### Session Lifecycle
//! - [`SessionManager`] - Owns the session, recovers it with backoff
//! - [`RetryPolicy`] - Backoff base, ceiling, and attempt budget
//! - [`SessionStateHandle`] - Read-only view of connection state
//!
//! ### Screen Snapshots
//! - [`parse_ui_tree()`] - Flatten page-source XML into elements
//! - [`UiElement`] - One view node with id, text, and bounds
//!
//! ### Wire Format
//! - [`Capabilities`] - Session capabilities for the Flex app
//! - [`protocol`] - Response parsing and W3C action payloads

pub mod protocol;
pub mod session;
pub mod source;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod transport;

// Public API re-exports
pub use protocol::Capabilities;
pub use session::{RetryPolicy, SessionManager, SessionStateHandle};
pub use source::{parse_bounds, parse_ui_tree, Bounds, UiElement};
pub use transport::{
    SessionId, Transport, UiAction, WebDriverTransport, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_URL,
};
