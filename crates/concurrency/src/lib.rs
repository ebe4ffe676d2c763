//! Concurrency layer for Shadowset
//!
//! This crate implements the coordinator for long-running collaborator
//! calls:
//! - OperationCoordinator: fixed worker pool executing opaque operations
//! - OperationHandle: pollable, waitable, cancellable view of one operation
//! - CancelToken: cooperative cancellation with a point of no return

pub mod coordinator;
pub mod handle;
pub mod operation;

pub use coordinator::OperationCoordinator;
pub use handle::{OperationHandle, OperationState};
pub use operation::{CancelToken, OperationOutcome};
