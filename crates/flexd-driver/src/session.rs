//! Session lifecycle: acquisition, recovery, and backoff
//!
//! [`SessionManager`] owns the one automation session the bot drives. It
//! acquires the session, funnels screen reads and gestures through it, and
//! when the transport fails it recycles the session under a bounded retry
//! budget with exponentially backed-off, jittered delays.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;

use flexd_core::prelude::*;
use flexd_core::SessionState;

use crate::protocol::Capabilities;
use crate::source::UiElement;
use crate::transport::{SessionId, Transport, UiAction};

/// Delay before the first reconnection attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling for the delay between reconnection attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Consecutive failed attempts tolerated before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Reconnection timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling the exponential delay saturates at.
    pub max_backoff: Duration,
    /// Attempt budget before the manager gives up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given attempt (1-based).
    ///
    /// Attempt 1 waits the initial delay, attempt 2 twice that, and so on,
    /// capped at `max_backoff`: 1s, 2s, 4s, 8s, 16s, 30s, 30s...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier: u64 = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let secs = self.initial_backoff.as_secs().saturating_mul(multiplier);
        Duration::from_secs(secs.min(self.max_backoff.as_secs()))
    }

    /// Backoff with full jitter: uniform in `[0, backoff(attempt)]`.
    ///
    /// Spreads simultaneous reconnect storms instead of synchronizing them.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

/// Clonable read handle onto the manager's connection state.
///
/// The status API reads this without going through the bot task.
#[derive(Debug, Clone)]
pub struct SessionStateHandle {
    state: Arc<RwLock<SessionState>>,
}

impl SessionStateHandle {
    /// Current connection state.
    pub fn current(&self) -> SessionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns the automation session and its recovery loop.
///
/// All session-scoped operations go through the manager so there is one
/// place that knows whether a session is open.
pub struct SessionManager<T> {
    transport: T,
    capabilities: Capabilities,
    policy: RetryPolicy,
    state: Arc<RwLock<SessionState>>,
    session: Option<SessionId>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, capabilities: Capabilities, policy: RetryPolicy) -> Self {
        Self {
            transport,
            capabilities,
            policy,
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            session: None,
        }
    }

    /// Handle for reading connection state from other tasks.
    pub fn state_handle(&self) -> SessionStateHandle {
        SessionStateHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Current connection state.
    pub fn current_state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Id of the open session, if any.
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    fn set_state(&self, next: SessionState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *guard != next {
            debug!(from = %guard.label(), to = %next.label(), "session state changed");
            *guard = next;
        }
    }

    /// One acquisition attempt: server liveness check, then a new session.
    async fn acquire(&mut self) -> Result<()> {
        self.set_state(SessionState::Connecting);
        self.transport.server_status().await?;
        let id = self.transport.open_session(self.capabilities.clone()).await?;
        self.session = Some(id);
        self.set_state(SessionState::Active);
        Ok(())
    }

    /// Acquires the initial session.
    ///
    /// Single-shot: the control loop decides whether a failure here goes
    /// through the reconnect path or aborts the start.
    pub async fn start(&mut self) -> Result<()> {
        match self.acquire().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.set_state(SessionState::Disconnected);
                Err(err)
            }
        }
    }

    /// Recovers a working session after a transport failure.
    ///
    /// The old session is abandoned (closed best-effort, the server may
    /// already have discarded it) and a fresh one is acquired: jittered
    /// exponential backoff between attempts, bounded by the policy's
    /// attempt budget, then give-up with the manager disconnected.
    pub async fn ensure_healthy(&mut self) -> Result<()> {
        if let Some(stale) = self.session.take() {
            if let Err(err) = self.transport.close_session(&stale).await {
                debug!(error = %err, "discarding stale session");
            }
        }

        let mut attempt: u32 = 1;
        loop {
            if attempt > self.policy.max_attempts {
                error!(
                    attempts = self.policy.max_attempts,
                    "giving up on automation server"
                );
                self.set_state(SessionState::Disconnected);
                return Err(Error::session_lost(format!(
                    "gave up after {} reconnection attempts",
                    self.policy.max_attempts
                )));
            }

            self.set_state(SessionState::Degraded {
                attempt,
                max_attempts: self.policy.max_attempts,
            });
            let delay = self.policy.jittered_backoff(attempt);
            info!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnecting after backoff"
            );
            tokio::time::sleep(delay).await;

            match self.acquire().await {
                Ok(()) => {
                    info!(attempt, "session recovered");
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, error = %err, "reconnection attempt failed");
                    attempt += 1;
                }
            }
        }
    }

    /// Closes the session and marks the manager stopped.
    ///
    /// A close failure is logged, not surfaced: by the time this runs the
    /// bot is shutting down and has nothing left to do about it.
    pub async fn stop(&mut self) {
        if let Some(id) = self.session.take() {
            if let Err(err) = self.transport.close_session(&id).await {
                warn!(error = %err, "session close failed");
            }
        }
        self.set_state(SessionState::Closed);
    }

    /// Captures the current screen through the open session.
    pub async fn ui_tree(&self) -> Result<Vec<UiElement>> {
        let id = self
            .session
            .as_ref()
            .ok_or_else(|| Error::session_lost("no open session"))?;
        self.transport.ui_tree(id).await
    }

    /// Dispatches a gesture through the open session.
    pub async fn dispatch(&self, action: UiAction) -> Result<()> {
        let id = self
            .session
            .as_ref()
            .ok_or_else(|| Error::session_lost("no open session"))?;
        self.transport.dispatch(id, action).await
    }
}
