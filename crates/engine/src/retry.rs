//! Bounded retry of writer freezes
//!
//! Freezing writers is the one place the engine retries: a stalled writer
//! may answer on the next attempt, so retryable failures are retried up to
//! the policy bound with exponential backoff. Anything non-retryable stops
//! the round immediately; the remaining in-flight freezes are cancelled and
//! driven to a terminal state before the caller sees the failure.

use shadowset_concurrency::{OperationCoordinator, OperationHandle, OperationOutcome, OperationState};
use shadowset_core::classify;
use shadowset_core::config::RetryPolicy;
use shadowset_core::error::FailureKind;
use shadowset_core::set_types::Phase;
use shadowset_core::traits::Writer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of the freeze fan-out
pub(crate) struct FreezeReport {
    /// Indices of writers whose freeze succeeded (they must be thawed)
    pub frozen: Vec<usize>,
    /// First fatal failure, if the fan-out did not fully succeed
    pub failure: Option<FailureKind>,
}

/// Block until `handle` is terminal, logging while it drags on.
///
/// A single `wait` never blocks longer than the policy's timeout; the set
/// may not abort until every outstanding handle is terminal, so this loops.
pub(crate) fn wait_until_terminal(
    handle: &OperationHandle,
    interval: Duration,
    what: &str,
) -> OperationState {
    loop {
        if let Some(state) = handle.wait(interval) {
            return state;
        }
        warn!(
            target: "shadowset::engine",
            what,
            "operation has not reached a terminal state yet"
        );
    }
}

/// Freeze every writer concurrently, retrying stalls up to the policy
/// bound.
///
/// Retry is round-based: all still-unfrozen writers are re-attempted
/// together after the backoff for that round. A wait timeout counts as a
/// retryable writer timeout; the stalled handle is cancelled before the
/// round ends so a late freeze cannot race its replacement.
pub(crate) fn freeze_writers(
    coordinator: &OperationCoordinator,
    writers: &[Arc<dyn Writer>],
    policy: &RetryPolicy,
) -> FreezeReport {
    let mut frozen = vec![false; writers.len()];
    let mut pending: Vec<usize> = (0..writers.len()).collect();
    let mut attempt = 1u32;

    loop {
        let handles: Vec<(usize, OperationHandle)> = pending
            .iter()
            .map(|&i| {
                let writer = Arc::clone(&writers[i]);
                let handle = coordinator.start(move |cancel| {
                    if cancel.is_cancelled() {
                        return Ok(OperationOutcome::Cancelled);
                    }
                    writer
                        .freeze()
                        .map_err(|status| classify(status, Phase::PrepareStarted))?;
                    Ok(OperationOutcome::Completed)
                });
                (i, handle)
            })
            .collect();

        let mut retry_next: Vec<usize> = Vec::new();
        let mut fatal: Option<FailureKind> = None;

        for (i, handle) in &handles {
            if fatal.is_some() {
                // A sibling already failed fatally; stop this one too, but
                // still drive it to a terminal state.
                handle.cancel();
            }
            let state = match handle.wait(policy.wait_timeout) {
                Some(state) => state,
                None => {
                    handle.cancel();
                    wait_until_terminal(handle, policy.wait_timeout, "freeze writer")
                }
            };
            match state {
                OperationState::Succeeded => frozen[*i] = true,
                OperationState::Cancelled => {
                    if fatal.is_none() {
                        let kind = FailureKind::WriterTimeout {
                            reason: format!(
                                "writer {} did not acknowledge freeze within {:?}",
                                i, policy.wait_timeout
                            ),
                        };
                        if attempt < policy.max_freeze_attempts {
                            retry_next.push(*i);
                        } else {
                            fatal = Some(kind);
                        }
                    }
                }
                OperationState::Failed(kind) => {
                    if fatal.is_none() {
                        if kind.retryable() && attempt < policy.max_freeze_attempts {
                            debug!(
                                target: "shadowset::engine",
                                writer = i,
                                attempt,
                                error = %kind,
                                "freeze failed, will retry"
                            );
                            retry_next.push(*i);
                        } else {
                            fatal = Some(kind);
                        }
                    }
                }
                OperationState::Pending => {
                    // wait_until_terminal only returns terminal states
                    unreachable!("pending state after terminal wait")
                }
            }
        }

        if fatal.is_some() || retry_next.is_empty() {
            let frozen_indices = frozen
                .iter()
                .enumerate()
                .filter_map(|(i, f)| f.then_some(i))
                .collect();
            return FreezeReport {
                frozen: frozen_indices,
                failure: fatal,
            };
        }

        let backoff = policy.backoff_for(attempt);
        debug!(
            target: "shadowset::engine",
            attempt,
            writers = retry_next.len(),
            backoff_ms = backoff.as_millis() as u64,
            "backing off before freeze retry"
        );
        std::thread::sleep(backoff);
        attempt += 1;
        pending = retry_next;
    }
}
