//! Coordinator for long-running collaborator calls
//!
//! Every writer or provider call that may take real time runs here: the
//! caller hands the coordinator an opaque operation and gets back a handle
//! it can poll, wait on, or cancel. A fixed pool of worker threads executes
//! operations in submission order.
//!
//! Guarantees:
//! - each handle reaches exactly one terminal state
//! - a panicking operation terminates its handle as `Failed` and never
//!   kills the worker
//! - a cancellation request that lands while the operation is still queued
//!   resolves the handle as `Cancelled` without running it

use crate::handle::{OperationHandle, OperationState};
use crate::operation::{CancelToken, OperationFn, OperationOutcome};
use parking_lot::{Condvar, Mutex};
use shadowset_core::FailureKind;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

struct Job {
    work: OperationFn,
    handle: OperationHandle,
}

struct CoordinatorInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

/// Executes opaque operations on a fixed pool of worker threads
///
/// Workers are named `shadowset-op-0`, `shadowset-op-1`, etc.
pub struct OperationCoordinator {
    inner: Arc<CoordinatorInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl OperationCoordinator {
    /// Create a coordinator with the given number of worker threads
    pub fn new(num_threads: usize) -> Self {
        let inner = Arc::new(CoordinatorInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(num_threads.max(1));
        for i in 0..num_threads.max(1) {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("shadowset-op-{}", i))
                .spawn(move || worker_loop(&inner_clone))
                .expect("failed to spawn operation worker thread");
            workers.push(handle);
        }

        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Start an operation and return its handle.
    ///
    /// The operation is a description of the external call to make; the
    /// coordinator never inspects it. After `shutdown`, new operations are
    /// refused with a terminal `Failed` handle.
    pub fn start(
        &self,
        op: impl FnOnce(&CancelToken) -> Result<OperationOutcome, FailureKind> + Send + 'static,
    ) -> OperationHandle {
        let handle = OperationHandle::new();

        if self.inner.shutdown.load(Ordering::Acquire) {
            handle.complete(OperationState::Failed(FailureKind::Unexpected {
                reason: "operation coordinator is shut down".to_string(),
            }));
            return handle;
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Job {
                work: Box::new(op),
                handle: handle.clone(),
            });
        }
        self.inner.work_ready.notify_one();

        handle
    }

    /// Shut down the coordinator: signal workers to exit and join them.
    ///
    /// Workers drain queued operations before exiting, so every
    /// already-started handle still reaches a terminal state. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Lock the queue before notifying to prevent lost-wakeup: a worker
        // between its shutdown check and condvar wait holds this lock, so
        // acquiring it guarantees the worker either sees the notification
        // or re-checks the flag.
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for OperationCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &CoordinatorInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let Job { work, handle } = job;

        // A cancellation that landed while the job was queued wins without
        // running the operation at all.
        if handle.cancel_requested() {
            handle.complete(OperationState::Cancelled);
            continue;
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| work(handle.token())));

        let terminal = match result {
            Ok(Ok(OperationOutcome::Completed)) => OperationState::Succeeded,
            Ok(Ok(OperationOutcome::Cancelled)) => OperationState::Cancelled,
            Ok(Err(kind)) => OperationState::Failed(kind),
            Err(panic) => {
                let what = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .unwrap_or("(non-string panic)");
                error!(target: "shadowset::ops", "operation panicked: {}", what);
                OperationState::Failed(FailureKind::Unexpected {
                    reason: format!("operation panicked: {}", what),
                })
            }
        };

        handle.complete(terminal);
    }
}
