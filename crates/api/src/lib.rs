//! Public API layer for Shadowset
//!
//! This crate provides the surface a backup application drives:
//! - **Session**: one sequential API over the whole snapshot-set lifecycle
//! - **BackupReport / BackupOutcome**: the terminal result plus the ordered
//!   phase-transition log
//!
//! Internal layering (storage, concurrency, engine) stays behind the
//! session; the facade holds no state of its own.

pub mod facade;

pub use facade::{BackupOutcome, BackupReport, Session};

// Re-export the types a caller needs to drive a session
pub use shadowset_core::{
    classify, BackupConfig, BackupOutcomeKind, DiffVolumeDescriptor, FailureKind, MemberStatus,
    NativeResult, NativeStatus, Phase, Provider, RetryPolicy, SetFailure, SnapshotContext,
    SnapshotId, SnapshotRequest, SnapshotSetId, VolumeName, Writer, WriterMetadata,
};
pub use shadowset_engine::{BackupEngine, PhaseTransition};
