//! Handles onto in-flight operations
//!
//! A handle correlates to exactly one operation. It transitions to exactly
//! one terminal state; polling after termination is side-effect free and
//! keeps returning that state. Clones share the same underlying operation,
//! and concurrent polls/waits all observe the same terminal outcome.

use crate::operation::CancelToken;
use parking_lot::{Condvar, Mutex};
use shadowset_core::FailureKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Observable state of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    /// Queued or running
    Pending,
    /// Finished; the external call completed
    Succeeded,
    /// Finished; the external call failed with a classified kind
    Failed(FailureKind),
    /// Finished; the operation honored a cancellation request
    Cancelled,
}

impl OperationState {
    /// Whether this state is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Pending)
    }
}

pub(crate) struct HandleInner {
    pub(crate) state: Mutex<OperationState>,
    pub(crate) done: Condvar,
    pub(crate) token: CancelToken,
}

/// Pollable, waitable, cancellable view of one in-flight operation
///
/// Cheap to clone; all clones observe the same operation.
#[derive(Clone)]
pub struct OperationHandle {
    inner: Arc<HandleInner>,
}

impl OperationHandle {
    pub(crate) fn new() -> Self {
        OperationHandle {
            inner: Arc::new(HandleInner {
                state: Mutex::new(OperationState::Pending),
                done: Condvar::new(),
                token: CancelToken::new(),
            }),
        }
    }

    /// Current state, without blocking
    pub fn poll(&self) -> OperationState {
        self.inner.state.lock().clone()
    }

    /// Block until the operation reaches a terminal state or `timeout`
    /// elapses.
    ///
    /// Returns `None` on timeout. Timing out does NOT cancel the
    /// operation — that decision stays with the caller.
    pub fn wait(&self, timeout: Duration) -> Option<OperationState> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if state.is_terminal() {
                return Some(state.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            self.inner.done.wait_for(&mut state, deadline - now);
        }
    }

    /// Request cancellation, best-effort.
    ///
    /// Returns false — cancellation refused — if the operation is already
    /// terminal or has passed its point of no return. Returning true means
    /// the request was delivered; a cooperative operation will finish as
    /// `Cancelled`.
    pub fn cancel(&self) -> bool {
        let state = self.inner.state.lock();
        if state.is_terminal() {
            return false;
        }
        if self.inner.token.past_point_of_no_return() {
            return false;
        }
        self.inner.token.request();
        true
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancelToken {
        &self.inner.token
    }

    /// Record the terminal state.
    ///
    /// Exactly-once: if a terminal state is already recorded the call is
    /// ignored, so late completions cannot overwrite the first outcome.
    pub(crate) fn complete(&self, terminal: OperationState) {
        debug_assert!(terminal.is_terminal());
        let mut state = self.inner.state.lock();
        if state.is_terminal() {
            return;
        }
        *state = terminal;
        // Notify while holding the lock so a waiter between its terminal
        // check and wait_for cannot miss the wakeup.
        self.inner.done.notify_all();
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("state", &self.poll())
            .finish()
    }
}
