//! # flexd-core - Core Domain Types
//!
//! Foundation crate for Flex Daemon. Provides the shared domain types, error
//! handling, and logging setup used by every other crate in the workspace.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`SessionState`] - Automation session lifecycle (Disconnected, Active, Degraded, ...)
//! - [`BotPhase`] - Control-loop phase (Stopped, Polling, Acting, ...)
//! - [`AuthStatus`] - Authentication state served by `/auth_status`
//! - [`OfferDetails`] - Best-effort fields extracted from an on-screen offer
//! - [`GrabRecord`], [`MetricsSnapshot`] - Accepted-block history and its `/metrics` copy
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum with `recoverable` vs `fatal` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use flexd_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Flex Daemon crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use types::{
    AuthStatus, BotPhase, GrabRecord, MetricsSnapshot, OfferDetails, Point, SessionState,
};
