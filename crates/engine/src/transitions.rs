//! Ordered log of phase transitions
//!
//! Every phase change is recorded with a timestamp, the states on either
//! side, and the call that triggered it. The log is append-only and exposed
//! read-only for diagnostics; it is the one observability surface the core
//! owns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shadowset_core::set_types::Phase;
use tracing::debug;

/// One recorded phase change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    /// When the transition committed
    pub at: DateTime<Utc>,
    /// Phase before
    pub from: Phase,
    /// Phase after
    pub to: Phase,
    /// The call that triggered the transition
    pub trigger: &'static str,
}

/// Append-only record of a set's phase changes, in commit order
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransitionLog {
    entries: Vec<PhaseTransition>,
}

impl TransitionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed transition
    pub fn record(&mut self, from: Phase, to: Phase, trigger: &'static str) {
        debug!(
            target: "shadowset::set",
            from = %from,
            to = %to,
            trigger,
            "phase transition"
        );
        self.entries.push(PhaseTransition {
            at: Utc::now(),
            from,
            to,
            trigger,
        });
    }

    /// The transitions recorded so far, in order
    pub fn entries(&self) -> &[PhaseTransition] {
        &self.entries
    }

    /// Number of recorded transitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent transition, if any
    pub fn last(&self) -> Option<&PhaseTransition> {
        self.entries.last()
    }
}
