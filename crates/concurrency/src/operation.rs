//! Operation descriptions and cooperative cancellation
//!
//! An operation is handed to the coordinator as an opaque closure — a
//! description of the external call to make, not its name. The closure
//! receives a [`CancelToken`] and is expected to check it at safe points;
//! once the underlying call can no longer be backed out, the operation
//! declares its point of no return and cancellation requests are refused
//! from then on.

use shadowset_core::FailureKind;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a finished operation reports itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The external call ran to completion
    Completed,
    /// The operation observed a cancellation request and stopped early
    Cancelled,
}

/// Closure type the coordinator executes on a worker thread
pub(crate) type OperationFn =
    Box<dyn FnOnce(&CancelToken) -> Result<OperationOutcome, FailureKind> + Send>;

/// Cooperative cancellation flag shared between a handle and its operation
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    no_return: AtomicBool,
}

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Declare that the underlying call can no longer be backed out.
    ///
    /// Cancellation requests arriving after this point are refused.
    pub fn point_of_no_return(&self) {
        self.no_return.store(true, Ordering::Release);
    }

    /// Whether the operation has passed its point of no return
    pub fn past_point_of_no_return(&self) -> bool {
        self.no_return.load(Ordering::Acquire)
    }

    pub(crate) fn request(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
