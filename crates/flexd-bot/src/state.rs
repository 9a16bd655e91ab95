//! Shared bot state behind a read/write handle
//!
//! One `BotState` cell holds everything the Status API serves: control-loop
//! phase, the accepted run config, auth status, metrics, and a ring of recent
//! log lines. The bot task is the only writer; API handlers read snapshots.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use flexd_core::prelude::*;
use flexd_core::{AuthStatus, BotPhase, GrabRecord, MetricsSnapshot};

use crate::config::BotConfig;

/// Log lines retained for `/status` when no limit is configured.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Everything the daemon publishes about the bot.
#[derive(Debug, Clone, Default)]
pub struct BotState {
    /// Control-loop phase. `is_running()` on this is the run flag.
    pub phase: BotPhase,

    /// Config of the current (or last) run. Published together with the
    /// phase change to `Starting`, so a running bot always has one.
    pub config: Option<BotConfig>,

    /// Authentication state of the driven app.
    pub auth: AuthStatus,

    /// Accumulated grab metrics.
    pub metrics: MetricsSnapshot,

    /// Recent activity lines, oldest first.
    pub recent_logs: VecDeque<String>,
}

/// Cloneable handle to the shared [`BotState`].
#[derive(Debug, Clone)]
pub struct StateHandle {
    inner: Arc<RwLock<BotState>>,
    log_limit: usize,
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::with_log_limit(DEFAULT_LOG_LIMIT)
    }
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle whose recent-log ring holds at most `log_limit` lines.
    /// A limit of zero keeps one line so `/status` is never silent.
    pub fn with_log_limit(log_limit: usize) -> Self {
        Self {
            inner: Arc::default(),
            log_limit: log_limit.max(1),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BotState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BotState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Reads ───────────────────────────────────────────────

    /// Full copy of the current state.
    pub fn snapshot(&self) -> BotState {
        self.read().clone()
    }

    pub fn phase(&self) -> BotPhase {
        self.read().phase
    }

    pub fn auth(&self) -> AuthStatus {
        self.read().auth.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.read().metrics.clone()
    }

    // ── Writes (bot task only) ──────────────────────────────

    pub fn set_phase(&self, phase: BotPhase) {
        let mut state = self.write();
        if state.phase != phase {
            debug!("Bot phase: {} -> {}", state.phase.label(), phase.label());
            state.phase = phase;
        }
    }

    /// Publishes an accepted start: config and run flag land in one write,
    /// so no reader can observe a running bot without its config.
    pub fn publish_start(&self, config: BotConfig) {
        let mut state = self.write();
        debug!("Bot phase: {} -> starting", state.phase.label());
        state.config = Some(config);
        state.phase = BotPhase::Starting;
    }

    /// Marks the bot stopped. The last run's config is retained for
    /// inspection until the next start replaces it.
    pub fn publish_stopped(&self) {
        self.set_phase(BotPhase::Stopped);
    }

    pub fn set_auth(&self, auth: AuthStatus) {
        let mut state = self.write();
        if state.auth != auth {
            debug!(
                "Auth status: authenticated={} ({})",
                auth.authenticated, auth.message
            );
            state.auth = auth;
        }
    }

    /// Appends a line to the recent-log ring.
    pub fn push_log(&self, line: impl Into<String>) {
        let mut state = self.write();
        if state.recent_logs.len() == self.log_limit {
            state.recent_logs.pop_front();
        }
        state.recent_logs.push_back(line.into());
    }

    /// Records an accepted block.
    ///
    /// History is trimmed to `history_limit` oldest-first, and the grab
    /// counter is kept equal to the history length so the two never
    /// disagree in a `/metrics` response. Earnings accumulate across the
    /// full run regardless of trimming.
    pub fn record_grab(&self, record: GrabRecord, history_limit: usize) {
        let mut state = self.write();
        state.metrics.earnings += record.earnings;
        state.metrics.history.push(record);
        if history_limit > 0 && state.metrics.history.len() > history_limit {
            let excess = state.metrics.history.len() - history_limit;
            state.metrics.history.drain(..excess);
        }
        state.metrics.blocks_grabbed = state.metrics.history.len() as u64;
    }
}
