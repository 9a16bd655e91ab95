//! # flexd-bot - Control Loop and Bot State
//!
//! The bot itself: screen interpretation, the offer-grabbing control loop,
//! run configuration, and the shared state the Status API serves.
//!
//! Depends on [`flexd_core`] for domain types and error handling and on
//! [`flexd_driver`] for the automation session.
//!
//! ## Public API
//!
//! ### Control Loop (`runner`)
//! - [`spawn_bot()`] - Spawn the bot task, get its handles
//! - [`BotHandle`] - Start/stop/shutdown commands with replies
//!
//! ### Bot State (`state`)
//! - [`StateHandle`] - Shared phase, config, auth, metrics, and logs
//! - [`BotState`] - The snapshot those reads return
//!
//! ### Screen Interpretation (`screen`)
//! - [`interpret()`] - Classify a snapshot into a [`ScreenState`]
//! - [`offer_qualifies()`] - Rate floor and duration band check
//!
//! ### Configuration (`config`)
//! - [`Settings`] - Daemon knobs from `config.toml`
//! - [`BotConfig`] - Validated per-run working window and rate floor

pub mod config;
pub mod runner;
pub mod screen;
pub mod state;

// Public API re-exports
pub use config::{default_config_path, load_settings, BotConfig, HoursWindow, Settings};
pub use runner::{spawn_bot, BotCommand, BotHandle};
pub use screen::{confirm_target, interpret, offer_qualifies, ScreenState};
pub use state::{BotState, StateHandle, DEFAULT_LOG_LIMIT};
