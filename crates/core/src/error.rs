//! Failure taxonomy for snapshot-set orchestration
//!
//! The sprawling native error surface of providers and writers is reduced to
//! the closed [`FailureKind`] union. Callers match on the tag rather than on
//! type identity; extending support for a new native code means adding a
//! classification table row (see `classify`), not a new error type.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.

use crate::set_types::{Phase, SnapshotId};
use std::fmt;
use thiserror::Error;

/// Result type alias for snapshot-set operations
pub type Result<T> = std::result::Result<T, SetFailure>;

/// Classified failure from a provider, writer, or the state machine itself
///
/// Every variant carries a human-readable reason. The set is closed: each of
/// the dozens of distinct native codes maps onto exactly one of these tags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    /// The requested identifier does not correspond to a registered provider
    #[error("provider not registered: {reason}")]
    ProviderNotRegistered {
        /// Human-readable description of the failure
        reason: String,
    },

    /// A writer failed to respond within its deadline
    #[error("writer timeout: {reason}")]
    WriterTimeout {
        /// Human-readable description of the failure
        reason: String,
    },

    /// The writer infrastructure itself failed (not a transient stall)
    #[error("writer infrastructure failure: {reason}")]
    WriterInfrastructureFailure {
        /// Human-readable description of the failure
        reason: String,
    },

    /// A storage-area volume lacks the space to host a diff area
    #[error("insufficient storage: {reason}")]
    InsufficientStorage {
        /// Human-readable description of the failure
        reason: String,
    },

    /// The object being created already exists
    #[error("object already exists: {reason}")]
    ObjectAlreadyExists {
        /// Human-readable description of the failure
        reason: String,
    },

    /// An operation was attempted in a phase where it is not legal
    #[error("invalid sequence: {reason}")]
    InvalidSequence {
        /// Human-readable description of the failure
        reason: String,
    },

    /// Anything the classification table has no better answer for
    #[error("unexpected failure: {reason}")]
    Unexpected {
        /// Human-readable description of the failure
        reason: String,
    },
}

impl FailureKind {
    /// Whether a bounded retry of the same operation is worthwhile.
    ///
    /// Only writer timeouts qualify: a stalled writer may respond on the
    /// next attempt. Storage shortfalls are recovered by *reassignment* to
    /// another volume, and everything else aborts the set.
    pub fn retryable(&self) -> bool {
        matches!(self, FailureKind::WriterTimeout { .. })
    }

    /// The human-readable reason carried by this failure
    pub fn reason(&self) -> &str {
        match self {
            FailureKind::ProviderNotRegistered { reason }
            | FailureKind::WriterTimeout { reason }
            | FailureKind::WriterInfrastructureFailure { reason }
            | FailureKind::InsufficientStorage { reason }
            | FailureKind::ObjectAlreadyExists { reason }
            | FailureKind::InvalidSequence { reason }
            | FailureKind::Unexpected { reason } => reason,
        }
    }
}

/// Terminal failure surfaced for a snapshot set
///
/// Always carries the classified kind, the phase in which the failure
/// occurred, and the member that triggered it when one is attributable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFailure {
    /// Classified failure
    pub kind: FailureKind,
    /// Phase the set was in when the failure occurred
    pub phase: Phase,
    /// Member that triggered the failure, if attributable
    pub member: Option<SnapshotId>,
}

impl SetFailure {
    /// Create a failure with no attributable member
    pub fn new(kind: FailureKind, phase: Phase) -> Self {
        Self {
            kind,
            phase,
            member: None,
        }
    }

    /// Attach the member that triggered the failure
    pub fn with_member(mut self, member: SnapshotId) -> Self {
        self.member = Some(member);
        self
    }
}

impl fmt::Display for SetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (phase {}", self.kind, self.phase)?;
        if let Some(member) = &self.member {
            write!(f, ", member {}", member)?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for SetFailure {}
