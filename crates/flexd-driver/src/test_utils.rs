//! Test doubles for session and control-loop tests
//!
//! [`ScriptedTransport`] answers transport calls from pre-loaded queues so
//! tests can walk a bot through an exact sequence of screens and failures
//! without a device attached.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use flexd_core::error::Result;

use crate::protocol::Capabilities;
use crate::source::{parse_ui_tree, UiElement};
use crate::transport::{SessionId, Transport, UiAction};

/// Session id handed out when no open result is scripted.
pub const DEFAULT_SESSION_ID: &str = "scripted-session";

/// Counts and payloads of the calls a test observed.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub opens: usize,
    pub status_checks: usize,
    pub trees: usize,
    pub closes: usize,
    /// Every gesture dispatched, in order.
    pub dispatches: Vec<UiAction>,
}

#[derive(Debug, Default)]
struct Inner {
    open_results: VecDeque<Result<SessionId>>,
    status_results: VecDeque<Result<()>>,
    tree_results: VecDeque<Result<Vec<UiElement>>>,
    dispatch_results: VecDeque<Result<()>>,
    close_results: VecDeque<Result<()>>,
    last_tree: Vec<UiElement>,
    calls: CallLog,
}

/// Transport double that replays scripted results.
///
/// Each method pops its own queue. An exhausted queue falls back to a
/// benign default — gestures succeed, `ui_tree` repeats the last screen —
/// so loop tests only script the polls that matter.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Scripts the next `open_session` result.
    pub fn push_open(&self, result: Result<SessionId>) {
        self.lock().open_results.push_back(result);
    }

    /// Scripts the next `server_status` result.
    pub fn push_status(&self, result: Result<()>) {
        self.lock().status_results.push_back(result);
    }

    /// Scripts the next `ui_tree` result from page-source XML.
    pub fn push_screen(&self, xml: &str) {
        self.lock().tree_results.push_back(Ok(parse_ui_tree(xml)));
    }

    /// Scripts the next `ui_tree` result from raw elements.
    pub fn push_tree(&self, result: Result<Vec<UiElement>>) {
        self.lock().tree_results.push_back(result);
    }

    /// Scripts the next `dispatch` result.
    pub fn push_dispatch(&self, result: Result<()>) {
        self.lock().dispatch_results.push_back(result);
    }

    /// Scripts the next `close_session` result.
    pub fn push_close(&self, result: Result<()>) {
        self.lock().close_results.push_back(result);
    }

    /// Snapshot of everything called so far.
    pub fn calls(&self) -> CallLog {
        self.lock().calls.clone()
    }
}

impl Transport for ScriptedTransport {
    async fn open_session(&self, _capabilities: Capabilities) -> Result<SessionId> {
        let mut inner = self.lock();
        inner.calls.opens += 1;
        inner
            .open_results
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_SESSION_ID.to_string()))
    }

    async fn ui_tree(&self, _session: &SessionId) -> Result<Vec<UiElement>> {
        let mut inner = self.lock();
        inner.calls.trees += 1;
        match inner.tree_results.pop_front() {
            Some(Ok(tree)) => {
                inner.last_tree = tree.clone();
                Ok(tree)
            }
            Some(Err(err)) => Err(err),
            None => Ok(inner.last_tree.clone()),
        }
    }

    async fn dispatch(&self, _session: &SessionId, action: UiAction) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.dispatches.push(action);
        inner.dispatch_results.pop_front().unwrap_or(Ok(()))
    }

    async fn close_session(&self, _session: &SessionId) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.closes += 1;
        inner.close_results.pop_front().unwrap_or(Ok(()))
    }

    async fn server_status(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.status_checks += 1;
        inner.status_results.pop_front().unwrap_or(Ok(()))
    }
}
