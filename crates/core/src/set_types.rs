//! Core types for snapshot-set orchestration
//!
//! This module defines the foundational types:
//! - SnapshotSetId / SnapshotId: identifiers for a set and its members
//! - VolumeName: stable volume identifier
//! - Phase: the snapshot-set lifecycle phase
//! - SnapshotMember / MemberStatus: per-volume membership state
//! - DiffVolumeDescriptor: query-time view of a storage-area volume
//! - WriterMetadata: identity reported by a writer during metadata gathering

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum number of members (source volumes) in a single snapshot set.
pub const MAX_SET_MEMBERS: usize = 64;

/// Unique identifier for a snapshot set
///
/// A SnapshotSetId is a wrapper around a UUID v4. Every backup run operates
/// on exactly one snapshot set, and the id is the handle a requestor keeps
/// once the set has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotSetId(Uuid);

impl SnapshotSetId {
    /// Create a new random SnapshotSetId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a SnapshotSetId from a string representation
    ///
    /// Accepts standard UUID format (with or without hyphens).
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SnapshotSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a single snapshot (one member of a set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Create a new random SnapshotId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a SnapshotId from a string representation
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for a volume
///
/// Providers report volumes in `\\?\Volume{GUID}\` form; the registry and
/// the set treat the name as an opaque, stable key. Human-facing names
/// (such as `C:\`) travel separately in [`DiffVolumeDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeName(String);

impl VolumeName {
    /// Create a volume name from its stable identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VolumeName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle phase of a snapshot set
///
/// Phases advance monotonically along the main sequence; the only regression
/// allowed is into the terminal `Aborted` state, and only before `Committed`.
///
/// ```text
/// Created → MetadataGathered → SetStarted → MembersAdded
///         → PrepareStarted → Prepared → CommitStarted → Committed → PostCommit
/// ```
///
/// The lifecycle ends at `PostCommit` or `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Set object exists; nothing has been asked of collaborators yet
    Created,
    /// Writer metadata has been collected
    MetadataGathered,
    /// The set id has been issued; members may be added
    SetStarted,
    /// At least one member has been added
    MembersAdded,
    /// Writer freezes are in flight
    PrepareStarted,
    /// Every writer acknowledged its freeze
    Prepared,
    /// Per-member snapshot creation is in flight
    CommitStarted,
    /// Every member's snapshot was created
    Committed,
    /// Writers have been notified of completion; lifecycle over
    PostCommit,
    /// The set was torn down; lifecycle over
    Aborted,
}

impl Phase {
    /// Position along the main lifecycle sequence.
    ///
    /// `Aborted` sits outside the sequence and reports `u8::MAX`.
    fn ordinal(&self) -> u8 {
        match self {
            Phase::Created => 0,
            Phase::MetadataGathered => 1,
            Phase::SetStarted => 2,
            Phase::MembersAdded => 3,
            Phase::PrepareStarted => 4,
            Phase::Prepared => 5,
            Phase::CommitStarted => 6,
            Phase::Committed => 7,
            Phase::PostCommit => 8,
            Phase::Aborted => u8::MAX,
        }
    }

    /// True once the lifecycle is over (`PostCommit` or `Aborted`)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::PostCommit | Phase::Aborted)
    }

    /// True if this phase is at or past `other` on the main sequence.
    ///
    /// `Aborted` has reached nothing; it is off the sequence.
    pub fn has_reached(&self, other: Phase) -> bool {
        *self != Phase::Aborted && self.ordinal() >= other.ordinal()
    }

    /// Whether a transition from this phase to `next` is legal.
    ///
    /// The main sequence only steps forward one phase at a time. `Aborted`
    /// is reachable from every phase before `Committed`; a committed set is
    /// never regressed.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        if next == Phase::Aborted {
            return !self.is_terminal() && !self.has_reached(Phase::Committed);
        }
        match (self, next) {
            (Phase::Created, Phase::MetadataGathered) => true,
            (Phase::MetadataGathered, Phase::SetStarted) => true,
            (Phase::SetStarted, Phase::MembersAdded) => true,
            (Phase::MembersAdded, Phase::PrepareStarted) => true,
            (Phase::PrepareStarted, Phase::Prepared) => true,
            (Phase::Prepared, Phase::CommitStarted) => true,
            (Phase::CommitStarted, Phase::Committed) => true,
            (Phase::Committed, Phase::PostCommit) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "Created",
            Phase::MetadataGathered => "MetadataGathered",
            Phase::SetStarted => "SetStarted",
            Phase::MembersAdded => "MembersAdded",
            Phase::PrepareStarted => "PrepareStarted",
            Phase::Prepared => "Prepared",
            Phase::CommitStarted => "CommitStarted",
            Phase::Committed => "Committed",
            Phase::PostCommit => "PostCommit",
            Phase::Aborted => "Aborted",
        };
        write!(f, "{}", name)
    }
}

/// Status of a single member within its snapshot set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Added to the set; no snapshot work done yet
    Pending,
    /// Its writers froze successfully
    Prepared,
    /// Its snapshot was created
    Committed,
    /// The set aborted before this member committed
    Failed,
}

/// One source volume participating in a snapshot set
///
/// Members are owned by their set, appended in call order and never shared
/// across sets. The diff-area assignment is write-once: once a storage-area
/// volume has been chosen for a member it stays chosen for the set's
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMember {
    /// Identifier of this member's snapshot
    pub id: SnapshotId,
    /// The volume being snapshotted
    pub source_volume: VolumeName,
    /// Storage-area volume backing this member's differential blocks
    diff_area: Option<VolumeName>,
    /// Current status
    pub status: MemberStatus,
}

impl SnapshotMember {
    /// Create a pending member for `source_volume`
    pub fn new(source_volume: VolumeName) -> Self {
        Self {
            id: SnapshotId::new(),
            source_volume,
            diff_area: None,
            status: MemberStatus::Pending,
        }
    }

    /// The assigned diff-area volume, if one has been chosen
    pub fn diff_area(&self) -> Option<&VolumeName> {
        self.diff_area.as_ref()
    }

    /// Record the diff-area assignment.
    ///
    /// Returns false (and changes nothing) if an assignment already exists;
    /// assignments are immutable for the set's lifetime.
    pub fn assign_diff_area(&mut self, volume: VolumeName) -> bool {
        if self.diff_area.is_some() {
            return false;
        }
        self.diff_area = Some(volume);
        true
    }
}

/// Query-time view of a shadow copy storage-area volume
///
/// An immutable value captured from the provider at query time. It carries
/// no back-reference to the registry; free space may have changed by the
/// time the caller acts on it, which is why assignment re-checks capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffVolumeDescriptor {
    /// Stable volume identifier
    pub volume: VolumeName,
    /// Name suitable for display, for example `C:\`
    pub display_name: String,
    /// Free space on the volume, in bytes
    pub free_space: u64,
    /// Total space on the volume, in bytes
    pub total_space: u64,
}

impl DiffVolumeDescriptor {
    /// Create a descriptor
    pub fn new(
        volume: VolumeName,
        display_name: impl Into<String>,
        free_space: u64,
        total_space: u64,
    ) -> Self {
        Self {
            volume,
            display_name: display_name.into(),
            free_space,
            total_space,
        }
    }

    /// Whether the reported free space covers `estimated_bytes`
    pub fn has_capacity_for(&self, estimated_bytes: u64) -> bool {
        self.free_space >= estimated_bytes
    }
}

/// Identity a writer reports during metadata gathering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterMetadata {
    /// Unique id of this writer instance
    pub instance_id: Uuid,
    /// Human-readable writer name
    pub name: String,
}

impl WriterMetadata {
    /// Create writer metadata with a fresh instance id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Terminal outcome reported to writers after a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupOutcomeKind {
    /// The snapshot set committed
    Succeeded,
    /// The snapshot set aborted
    Aborted,
}

/// Everything a provider needs to create one member's snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Member snapshot id
    pub member: SnapshotId,
    /// Volume being snapshotted
    pub source_volume: VolumeName,
    /// Storage-area volume for the member's differential blocks
    pub diff_area: VolumeName,
}
