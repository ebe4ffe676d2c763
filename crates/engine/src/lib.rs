//! Snapshot-set engine for Shadowset
//!
//! This crate orchestrates the lower layers:
//! - SnapshotSet: the set's data and its legal phase transitions
//! - BackupEngine: the phase operations (gather, start, add, assign,
//!   prepare, commit, complete, abort)
//! - TransitionLog: the ordered observability record of phase changes

pub mod backup;
mod retry;
pub mod set;
pub mod transitions;

pub use backup::BackupEngine;
pub use set::SnapshotSet;
pub use transitions::{PhaseTransition, TransitionLog};
