//! Collaborator traits for snapshot-set orchestration
//!
//! The orchestrator never talks to a native API directly: writers and
//! providers are explicit collaborators passed into the session at
//! construction and addressed through these narrow surfaces. Failures come
//! back as raw [`NativeStatus`] codes and are classified by the caller, so
//! implementations stay free of taxonomy knowledge.

use crate::classify::NativeStatus;
use crate::set_types::{BackupOutcomeKind, DiffVolumeDescriptor, SnapshotRequest, WriterMetadata};

/// Result of a collaborator call: either success or a raw native code
pub type NativeResult<T> = std::result::Result<T, NativeStatus>;

/// An application that must flush and freeze its state before a snapshot
///
/// Long-running calls (`freeze` in particular) are invoked exclusively
/// through the operation coordinator, never inline.
pub trait Writer: Send + Sync {
    /// Report this writer's identity during metadata gathering
    fn metadata(&self) -> NativeResult<WriterMetadata>;

    /// Flush application state and hold writes until `thaw`
    fn freeze(&self) -> NativeResult<()>;

    /// Release held writes
    fn thaw(&self) -> NativeResult<()>;

    /// Tell the writer how the backup run ended
    fn notify_backup_complete(&self, outcome: BackupOutcomeKind) -> NativeResult<()>;
}

/// The component that implements the actual snapshot mechanism
pub trait Provider: Send + Sync {
    /// Enumerate volumes usable as shadow copy storage areas.
    ///
    /// Called freshly on every registry query; results are never cached
    /// because free space changes underneath the orchestrator.
    fn query_volumes(&self) -> NativeResult<Vec<DiffVolumeDescriptor>>;

    /// Reserve a diff area of roughly `size_hint` bytes on `volume`
    fn create_diff_area(
        &self,
        volume: &crate::set_types::VolumeName,
        size_hint: u64,
    ) -> NativeResult<()>;

    /// Create the snapshot for one member
    fn commit_snapshot(&self, request: &SnapshotRequest) -> NativeResult<()>;
}
