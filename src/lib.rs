//! Shadowset — snapshot-set orchestration over writer/provider collaborators
//!
//! Shadowset coordinates point-in-time snapshot ("shadow copy") creation
//! across one or more volumes. It mediates between a backup requestor, the
//! writers that must flush and freeze application state, and the storage
//! provider that allocates differential storage areas.
//!
//! # Quick Start
//!
//! ```ignore
//! use shadowset::{BackupConfig, Session, VolumeName};
//!
//! // Collaborators are explicit: a provider and the writers to involve.
//! let mut session = Session::begin_backup(BackupConfig::default(), provider, writers)?;
//!
//! session.add_volume(VolumeName::from(r"\\?\Volume{aa86}\"))?;
//! session.add_volume(VolumeName::from(r"\\?\Volume{bb21}\"))?;
//!
//! let report = session.run_to_completion();
//! match report.outcome {
//!     shadowset::BackupOutcome::Committed { set_id } => println!("committed {set_id}"),
//!     shadowset::BackupOutcome::Aborted { failure } => eprintln!("aborted: {failure}"),
//! }
//! ```
//!
//! # Architecture
//!
//! The [`Session`] facade sequences the snapshot-set state machine; every
//! long-running collaborator call runs through the operation coordinator,
//! and every native failure is classified into the closed [`FailureKind`]
//! taxonomy before a decision is made. Internal layers (registry,
//! coordinator, engine) are not exposed — only the session API is public.

// Re-export the public API from shadowset-api
pub use shadowset_api::*;
