//! Configuration for a backup run
//!
//! Context flags mirror the attribute combinations a requestor chooses when
//! opening a backup session; the retry policy bounds how patient the engine
//! is with stalled writers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Context flags for a snapshot set
///
/// `no_writers` skips writer involvement entirely: no metadata gathering,
/// no freeze/thaw, no completion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotContext {
    /// Snapshot survives the requestor's session instead of being released
    pub persistent: bool,
    /// Take the snapshot without involving writers
    pub no_writers: bool,
    /// Release the snapshot automatically when the requestor is done
    pub auto_release: bool,
}

impl SnapshotContext {
    /// Standard backup context: transient, writer-involved, auto-released
    pub fn backup() -> Self {
        SnapshotContext {
            persistent: false,
            no_writers: false,
            auto_release: true,
        }
    }

    /// Persistent snapshot kept after the session ends
    pub fn persistent() -> Self {
        SnapshotContext {
            persistent: true,
            no_writers: false,
            auto_release: false,
        }
    }

    /// Crash-consistent snapshot with no writer involvement
    pub fn no_writers() -> Self {
        SnapshotContext {
            no_writers: true,
            ..Self::backup()
        }
    }
}

impl Default for SnapshotContext {
    fn default() -> Self {
        Self::backup()
    }
}

/// Bounds on retrying stalled writers and waiting on in-flight operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum freeze attempts per writer (first try included)
    pub max_freeze_attempts: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Backoff growth factor between attempts
    pub backoff_multiplier: u32,
    /// How long a single wait on an in-flight operation may block
    pub wait_timeout: Duration,
}

impl RetryPolicy {
    /// Backoff to sleep after a failed attempt (1-based)
    ///
    /// Grows exponentially: `initial * multiplier^(attempt - 1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Tight bounds for tests that exercise the retry path
    pub fn fast_for_tests() -> Self {
        RetryPolicy {
            max_freeze_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2,
            wait_timeout: Duration::from_millis(250),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_freeze_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2,
            wait_timeout: Duration::from_secs(60),
        }
    }
}

/// Full configuration for one backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Context flags for the snapshot set
    pub context: SnapshotContext,
    /// Writer retry bounds and wait timeouts
    pub retry: RetryPolicy,
    /// Worker threads available to the operation coordinator
    pub operation_workers: usize,
    /// Estimated diff-area bytes to reserve per member
    pub diff_area_size_hint: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            context: SnapshotContext::default(),
            retry: RetryPolicy::default(),
            operation_workers: 4,
            diff_area_size_hint: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}
