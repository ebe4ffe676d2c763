//! Diff-area storage tracking for Shadowset
//!
//! This crate implements the registry of shadow copy storage-area volumes:
//! - DiffAreaRegistry: fresh capacity queries plus per-member reservations
//! - AssignError: the registry's local failure surface

pub mod registry;

pub use registry::{AssignError, Assignment, DiffAreaRegistry};
