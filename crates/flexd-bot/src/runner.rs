//! The bot task: control loop and its command handle
//!
//! One spawned task owns the session manager and is the only writer of the
//! shared [`StateHandle`]. It parks until a start command arrives, then
//! cycles through polling, acting on qualifying offers, and reconnecting
//! after transport failures, until stopped by a command, a logout screen,
//! or reconnect exhaustion.

use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, oneshot};

use flexd_core::prelude::*;
use flexd_core::{AuthStatus, BotPhase, GrabRecord, OfferDetails, Point};
use flexd_driver::{Capabilities, SessionManager, SessionStateHandle, Transport, UiAction};

use crate::config::{BotConfig, CadenceSettings, FilterSettings, Settings};
use crate::screen::{confirm_target, interpret, offer_qualifies, ScreenState};
use crate::state::StateHandle;

/// Control commands the handle can queue before senders wait.
const COMMAND_BUFFER: usize = 8;

/// Start of the offer-list refresh swipe, device pixels.
const REFRESH_SWIPE_FROM: Point = Point { x: 500, y: 1200 };

/// End of the offer-list refresh swipe.
const REFRESH_SWIPE_TO: Point = Point { x: 500, y: 400 };

/// Duration of the refresh swipe.
const REFRESH_SWIPE_MS: u64 = 300;

/// Refusal message for a start while a run is active.
const ALREADY_RUNNING: &str = "Bot is already running";

/// Auth message while the session is driving the app.
const SIGNED_IN: &str = "Signed in";

// ---------------------------------------------------------------------------
// Command handle
// ---------------------------------------------------------------------------

/// Control commands delivered to the bot task.
#[derive(Debug)]
pub enum BotCommand {
    /// Begin a run with the given config.
    Start {
        config: BotConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    /// End the current run. Answered once the session is torn down.
    Stop { reply: oneshot::Sender<()> },
    /// Tear down and exit the task.
    Shutdown,
}

/// Cloneable handle that sends control commands to the bot task.
#[derive(Debug, Clone)]
pub struct BotHandle {
    cmd_tx: mpsc::Sender<BotCommand>,
}

impl BotHandle {
    /// Requests a start and waits for the accept/refuse decision.
    ///
    /// `Ok` means the config was validated and published and the run flag
    /// is up; session acquisition continues in the background. Refusals
    /// are `Validation` for a bad config and `Conflict` while running.
    pub async fn start(&self, config: BotConfig) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(BotCommand::Start {
                config,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Requests a stop and waits until the session is torn down.
    ///
    /// Stopping a stopped bot resolves immediately.
    pub async fn stop(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(BotCommand::Stop { reply: reply_tx })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Tells the bot task to tear down and exit.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(BotCommand::Shutdown).await;
    }
}

/// Spawns the bot task.
///
/// The task owns the transport session for its whole life; everything else
/// talks to it through the returned handle or reads the shared state. The
/// session-state handle reads connection state without a round-trip to the
/// task.
pub fn spawn_bot<T>(
    transport: T,
    settings: &Settings,
    store: StateHandle,
) -> (BotHandle, SessionStateHandle)
where
    T: Transport + Sync + 'static,
{
    let capabilities = Capabilities::for_flex_app(settings.device.name.clone());
    let mgr = SessionManager::new(transport, capabilities, settings.session.retry_policy());
    let session_state = mgr.state_handle();
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let runner = BotRunner {
        mgr,
        store,
        cadence: settings.cadence.clone(),
        filter: settings.filter.clone(),
        cmd_rx,
        stop_replies: Vec::new(),
        idle_polls: 0,
        polls_since_refresh: 0,
    };
    tokio::spawn(runner.run());

    (BotHandle { cmd_tx }, session_state)
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

/// What a loop step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopSignal {
    /// Keep polling.
    Continue,
    /// End the run and park.
    Stop,
    /// End the run and exit the task.
    Shutdown,
}

/// How a run ended.
enum RunEnd {
    /// Park and wait for the next start.
    Parked,
    /// Process shutdown: exit the task.
    Shutdown,
}

/// How the recovery race resolved.
enum Recovery {
    /// The session manager finished its reconnect loop.
    Finished(Result<()>),
    /// A command cut the recovery short.
    Interrupted(LoopSignal),
}

struct BotRunner<T> {
    mgr: SessionManager<T>,
    store: StateHandle,
    cadence: CadenceSettings,
    filter: FilterSettings,
    cmd_rx: mpsc::Receiver<BotCommand>,
    /// Stop requesters waiting for teardown to finish.
    stop_replies: Vec<oneshot::Sender<()>>,
    /// Consecutive polls without a grab, drives the slow-down.
    idle_polls: u32,
    polls_since_refresh: u32,
}

impl<T: Transport> BotRunner<T> {
    /// Task body: park on the command channel, run sessions as starts come in.
    async fn run(mut self) {
        debug!("bot task running");
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                BotCommand::Start { config, reply } => match self.accept_start(config) {
                    Ok(config) => {
                        let _ = reply.send(Ok(()));
                        if let RunEnd::Shutdown = self.run_session(config).await {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                },
                BotCommand::Stop { reply } => {
                    // Nothing is running; a stop is a successful no-op
                    let _ = reply.send(());
                }
                BotCommand::Shutdown => break,
            }
        }

        self.mgr.stop().await;
        self.store.publish_stopped();
        debug!("bot task exited");
    }

    /// Validates a start request and publishes the accepted run.
    ///
    /// The config and the run flag land in one state write before the
    /// caller gets its answer, so a successful start response is never
    /// ahead of what `/status` reports.
    fn accept_start(&mut self, config: BotConfig) -> Result<BotConfig> {
        if self.store.phase().is_running() {
            return Err(Error::conflict(ALREADY_RUNNING));
        }
        config.validate()?;
        info!(
            warehouse = %config.warehouse,
            min_rate = config.min_rate,
            "start accepted"
        );
        self.store.publish_start(config.clone());
        self.store
            .push_log(format!("Start accepted for {}", config.warehouse));
        Ok(config)
    }

    /// One full run: session acquisition, the polling loop, teardown.
    async fn run_session(&mut self, config: BotConfig) -> RunEnd {
        if let Err(err) = self.mgr.start().await {
            warn!(error = %err, "could not open automation session");
            let message = format!("Start failed: {err}");
            self.store.push_log(message.clone());
            self.store.set_auth(AuthStatus::signed_out(message));
            self.store.publish_stopped();
            return RunEnd::Parked;
        }

        self.store.set_phase(BotPhase::Polling);
        self.store.push_log("Session opened, scanning for offers");
        self.idle_polls = 0;
        self.polls_since_refresh = 0;

        let end = loop {
            match self.poll_once(&config).await {
                LoopSignal::Continue => {}
                LoopSignal::Stop => break RunEnd::Parked,
                LoopSignal::Shutdown => break RunEnd::Shutdown,
            }
        };

        // Teardown order matters: once the run flag drops, the session is
        // already closed and stop requesters can be answered.
        self.store.set_phase(BotPhase::Stopping);
        self.mgr.stop().await;
        self.store.publish_stopped();
        self.store.push_log("Bot stopped");
        for reply in self.stop_replies.drain(..) {
            let _ = reply.send(());
        }
        end
    }

    /// One poll cycle: commands, working window, refresh, snapshot, react.
    async fn poll_once(&mut self, config: &BotConfig) -> LoopSignal {
        // Commands first: a stop is observed here, at the poll boundary
        let signal = self.drain_commands();
        if signal != LoopSignal::Continue {
            return signal;
        }

        if !config.in_working_window(Local::now()) {
            trace!("outside working window");
            return self
                .nap(Duration::from_millis(self.cadence.window_nap_ms))
                .await;
        }

        // Periodic swipe keeps the offer list fresh
        if self.cadence.refresh_every > 0 && self.polls_since_refresh >= self.cadence.refresh_every
        {
            self.polls_since_refresh = 0;
            let swipe = UiAction::Swipe {
                from: REFRESH_SWIPE_FROM,
                to: REFRESH_SWIPE_TO,
                duration_ms: REFRESH_SWIPE_MS,
            };
            if let Err(err) = self.mgr.dispatch(swipe).await {
                return self.reconnect(&err).await;
            }
        }
        self.polls_since_refresh += 1;

        let elements = match self.mgr.ui_tree().await {
            Ok(elements) => elements,
            Err(err) => return self.reconnect(&err).await,
        };

        match interpret(&elements) {
            ScreenState::LoggedOut => {
                info!("login screen detected, stopping");
                self.store
                    .set_auth(AuthStatus::signed_out("Login screen detected"));
                self.store.push_log("Logged out of the Flex app, stopping");
                return LoopSignal::Stop;
            }
            ScreenState::Offer(offer) => {
                self.store.set_auth(AuthStatus::signed_in(SIGNED_IN));
                if offer_qualifies(&offer, config, &self.filter) {
                    if let Some(tap) = offer.tap {
                        match self.accept_offer(&offer, tap).await {
                            Ok(()) => {
                                self.store.set_phase(BotPhase::Polling);
                                self.idle_polls = 0;
                            }
                            Err(err) => return self.reconnect(&err).await,
                        }
                    } else {
                        debug!("qualifying offer has no tap target");
                        self.idle_polls = self.idle_polls.saturating_add(1);
                    }
                } else {
                    debug!(
                        rate = ?offer.rate,
                        duration = ?offer.duration_mins,
                        "offer does not qualify"
                    );
                    self.idle_polls = self.idle_polls.saturating_add(1);
                }
            }
            ScreenState::Idle => {
                self.store.set_auth(AuthStatus::signed_in(SIGNED_IN));
                self.idle_polls = self.idle_polls.saturating_add(1);
            }
            ScreenState::UnknownDialog(summary) => {
                debug!(%summary, "unrecognized screen");
                self.idle_polls = self.idle_polls.saturating_add(1);
            }
        }

        self.nap(idle_interval(&self.cadence, self.idle_polls)).await
    }

    /// Runs the accept sequence for a qualifying offer.
    ///
    /// The grab is recorded as soon as the offer tap is acknowledged; the
    /// confirmation step after it is best-effort, matching an app flow
    /// where some offers confirm without a dialog.
    async fn accept_offer(&mut self, offer: &OfferDetails, tap: Point) -> Result<()> {
        self.store.set_phase(BotPhase::Acting);
        info!(
            rate = ?offer.rate,
            duration = ?offer.duration_mins,
            "accepting offer"
        );

        self.mgr.dispatch(UiAction::Tap(tap)).await?;

        let earnings = offer.rate.unwrap_or_default();
        let record = GrabRecord {
            date: Local::now().format("%Y-%m-%d").to_string(),
            earnings,
        };
        self.store.record_grab(record, self.filter.history_limit);
        let duration = offer
            .duration_mins
            .map_or_else(|| "?".to_string(), |m| m.to_string());
        self.store
            .push_log(format!("Grabbed block: ${earnings:.2} for {duration} min"));

        tokio::time::sleep(Duration::from_millis(self.cadence.settle_ms)).await;
        let elements = self.mgr.ui_tree().await?;
        match confirm_target(&elements) {
            Some(point) => self.mgr.dispatch(UiAction::Tap(point)).await?,
            None => debug!("no confirmation dialog after tap"),
        }
        Ok(())
    }

    /// Recovers the session after a transport failure.
    ///
    /// Races the manager's reconnect loop against the command channel so a
    /// stop lands immediately instead of waiting out the backoff schedule.
    /// A refused start does not disturb the attempt count.
    async fn reconnect(&mut self, cause: &Error) -> LoopSignal {
        warn!(error = %cause, "transport failure, reconnecting");
        self.store.set_phase(BotPhase::Reconnecting);
        self.store
            .push_log(format!("Session trouble, reconnecting: {cause}"));

        let outcome = {
            let recovery = self.mgr.ensure_healthy();
            tokio::pin!(recovery);
            loop {
                tokio::select! {
                    outcome = recovery.as_mut() => break Recovery::Finished(outcome),
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(BotCommand::Start { reply, .. }) => {
                            let _ = reply.send(Err(Error::conflict(ALREADY_RUNNING)));
                        }
                        Some(BotCommand::Stop { reply }) => {
                            self.stop_replies.push(reply);
                            break Recovery::Interrupted(LoopSignal::Stop);
                        }
                        Some(BotCommand::Shutdown) | None => {
                            break Recovery::Interrupted(LoopSignal::Shutdown);
                        }
                    },
                }
            }
        };

        match outcome {
            Recovery::Finished(Ok(())) => {
                self.store.set_phase(BotPhase::Polling);
                self.store.push_log("Session recovered");
                self.idle_polls = 0;
                self.polls_since_refresh = 0;
                LoopSignal::Continue
            }
            Recovery::Finished(Err(err)) => {
                error!(error = %err, "session recovery failed, stopping");
                self.store.set_auth(AuthStatus::signed_out(err.to_string()));
                self.store.push_log(format!("Stopping: {err}"));
                LoopSignal::Stop
            }
            Recovery::Interrupted(signal) => signal,
        }
    }

    /// Sleeps between polls, waking early for a command.
    async fn nap(&mut self, duration: Duration) -> LoopSignal {
        let received = tokio::select! {
            _ = tokio::time::sleep(duration) => None,
            cmd = self.cmd_rx.recv() => Some(cmd),
        };
        match received {
            None => LoopSignal::Continue,
            Some(cmd) => self.handle_inflight(cmd),
        }
    }

    /// Empties the command queue without blocking.
    fn drain_commands(&mut self) -> LoopSignal {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(cmd) => match self.handle_inflight(Some(cmd)) {
                    LoopSignal::Continue => {}
                    signal => return signal,
                },
                Err(mpsc::error::TryRecvError::Empty) => return LoopSignal::Continue,
                Err(mpsc::error::TryRecvError::Disconnected) => return LoopSignal::Shutdown,
            }
        }
    }

    /// Handles a command that arrived mid-run.
    fn handle_inflight(&mut self, cmd: Option<BotCommand>) -> LoopSignal {
        match cmd {
            Some(BotCommand::Start { reply, .. }) => {
                let _ = reply.send(Err(Error::conflict(ALREADY_RUNNING)));
                LoopSignal::Continue
            }
            Some(BotCommand::Stop { reply }) => {
                self.stop_replies.push(reply);
                LoopSignal::Stop
            }
            Some(BotCommand::Shutdown) | None => LoopSignal::Shutdown,
        }
    }
}

/// Poll delay for the given idle streak: starts at the fast interval and
/// slows by one step per idle poll up to the slow ceiling.
fn idle_interval(cadence: &CadenceSettings, idle_polls: u32) -> Duration {
    let slowdown = cadence.poll_step_ms.saturating_mul(u64::from(idle_polls));
    Duration::from_millis(
        cadence
            .poll_min_ms
            .saturating_add(slowdown)
            .min(cadence.poll_max_ms),
    )
}
