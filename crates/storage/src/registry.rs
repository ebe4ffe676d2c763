//! Registry of shadow copy storage-area volumes
//!
//! The registry answers two questions for the engine: which volumes can
//! host a diff area right now, and which volume each member has been
//! assigned. Capacity is never cached — free space changes underneath the
//! orchestrator, so every query goes back to the provider — but the
//! registry deducts its own live reservations from what the provider
//! reports, so a descriptor's free space reflects what is actually
//! claimable.
//!
//! Assignments are kept per member id and are immutable once made. The
//! registry mutates nothing beyond its own reservation records; the
//! underlying storage is the provider's business.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shadowset_core::classify::NativeStatus;
use shadowset_core::set_types::{DiffVolumeDescriptor, SnapshotId, VolumeName};
use shadowset_core::traits::{NativeResult, Provider};
use shadowset_core::FailureKind;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure of a single assignment attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    /// The named volume is not among the provider's storage-area volumes
    #[error("volume {0} is not a known storage-area volume")]
    VolumeNotFound(VolumeName),

    /// The volume cannot cover the requested reservation
    #[error("volume {volume} has {available} bytes claimable, {requested} requested")]
    InsufficientSpace {
        /// Volume that was tried
        volume: VolumeName,
        /// Bytes the caller asked for
        requested: u64,
        /// Bytes actually claimable at check time
        available: u64,
    },

    /// The member already holds an assignment; assignments are immutable
    #[error("member {0} already has a diff-area assignment")]
    AlreadyAssigned(SnapshotId),

    /// The provider could not be queried for its volumes
    #[error("provider query failed with status {0}")]
    ProviderUnavailable(NativeStatus),
}

impl AssignError {
    /// Map onto the shared failure taxonomy.
    ///
    /// `InsufficientSpace` is the one recoverable case — the caller may
    /// pick another volume. The rest are fatal for the attempt.
    pub fn into_failure(self) -> FailureKind {
        match self {
            AssignError::InsufficientSpace { .. } => FailureKind::InsufficientStorage {
                reason: self.to_string(),
            },
            AssignError::AlreadyAssigned(_) => FailureKind::ObjectAlreadyExists {
                reason: self.to_string(),
            },
            AssignError::VolumeNotFound(_) | AssignError::ProviderUnavailable(_) => {
                FailureKind::Unexpected {
                    reason: self.to_string(),
                }
            }
        }
    }
}

/// A member's recorded diff-area reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Storage-area volume backing the member
    pub volume: VolumeName,
    /// Bytes reserved on that volume
    pub bytes: u64,
}

/// Tracks storage-area volumes and per-member diff-area assignments
///
/// Reservation counters are only touched by `assign`/`release`, each under
/// that volume's ledger entry, so two concurrent assignments to the same
/// volume serialize and re-check capacity.
pub struct DiffAreaRegistry {
    provider: Arc<dyn Provider>,
    /// Bytes reserved per storage-area volume
    ledgers: DashMap<VolumeName, u64>,
    /// Member id → reservation
    assignments: DashMap<SnapshotId, Assignment>,
}

impl DiffAreaRegistry {
    /// Create a registry over the given provider
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        DiffAreaRegistry {
            provider,
            ledgers: DashMap::new(),
            assignments: DashMap::new(),
        }
    }

    /// List storage-area volumes with claimable free space.
    ///
    /// Queries the provider freshly every call, then deducts this
    /// registry's live reservations. Free space never goes negative and
    /// never exceeds total space.
    pub fn list_volumes(&self) -> NativeResult<Vec<DiffVolumeDescriptor>> {
        let mut descriptors = self.provider.query_volumes()?;
        for descriptor in &mut descriptors {
            let reserved = self
                .ledgers
                .get(&descriptor.volume)
                .map(|entry| *entry)
                .unwrap_or(0);
            descriptor.free_space = descriptor
                .free_space
                .saturating_sub(reserved)
                .min(descriptor.total_space);
        }
        Ok(descriptors)
    }

    /// Whether `volume` can currently cover `estimated_bytes`.
    ///
    /// Unknown volumes report `false`.
    pub fn capacity_check(&self, volume: &VolumeName, estimated_bytes: u64) -> NativeResult<bool> {
        let descriptors = self.list_volumes()?;
        Ok(descriptors
            .iter()
            .find(|d| &d.volume == volume)
            .map(|d| d.has_capacity_for(estimated_bytes))
            .unwrap_or(false))
    }

    /// Reserve `estimated_bytes` on `volume` for `member`.
    ///
    /// Capacity is re-checked under the volume's ledger entry, so two
    /// racing assignments cannot both claim the last bytes. The assignment
    /// is immutable: a second call for the same member fails with
    /// `AlreadyAssigned` regardless of the volume named.
    pub fn assign(
        &self,
        member: SnapshotId,
        volume: &VolumeName,
        estimated_bytes: u64,
    ) -> Result<(), AssignError> {
        let descriptors = self
            .provider
            .query_volumes()
            .map_err(AssignError::ProviderUnavailable)?;
        let descriptor = descriptors
            .into_iter()
            .find(|d| &d.volume == volume)
            .ok_or_else(|| AssignError::VolumeNotFound(volume.clone()))?;

        match self.assignments.entry(member) {
            Entry::Occupied(_) => Err(AssignError::AlreadyAssigned(member)),
            Entry::Vacant(slot) => {
                // Per-volume exclusivity: the ledger entry is held across
                // the capacity re-check and the reservation update.
                let mut reserved = self.ledgers.entry(volume.clone()).or_insert(0);
                let available = descriptor.free_space.saturating_sub(*reserved);
                if available < estimated_bytes {
                    return Err(AssignError::InsufficientSpace {
                        volume: volume.clone(),
                        requested: estimated_bytes,
                        available,
                    });
                }
                *reserved += estimated_bytes;
                drop(reserved);

                debug!(
                    target: "shadowset::registry",
                    member = %member,
                    volume = %volume,
                    bytes = estimated_bytes,
                    "diff area reserved"
                );
                slot.insert(Assignment {
                    volume: volume.clone(),
                    bytes: estimated_bytes,
                });
                Ok(())
            }
        }
    }

    /// Release `member`'s reservation, returning whether one existed.
    ///
    /// Idempotent: releasing an unassigned member is a no-op.
    pub fn release(&self, member: SnapshotId) -> bool {
        match self.assignments.remove(&member) {
            Some((_, assignment)) => {
                if let Some(mut reserved) = self.ledgers.get_mut(&assignment.volume) {
                    *reserved = reserved.saturating_sub(assignment.bytes);
                }
                debug!(
                    target: "shadowset::registry",
                    member = %member,
                    volume = %assignment.volume,
                    "diff area released"
                );
                true
            }
            None => false,
        }
    }

    /// Release every reservation, returning how many were released
    pub fn release_all(&self) -> usize {
        let members: Vec<SnapshotId> = self.assignments.iter().map(|e| *e.key()).collect();
        members.into_iter().filter(|m| self.release(*m)).count()
    }

    /// The reservation recorded for `member`, if any
    pub fn assignment(&self, member: SnapshotId) -> Option<Assignment> {
        self.assignments.get(&member).map(|e| e.value().clone())
    }

    /// Number of members holding reservations
    pub fn assigned_count(&self) -> usize {
        self.assignments.len()
    }
}

impl std::fmt::Debug for DiffAreaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffAreaRegistry")
            .field("assigned_count", &self.assignments.len())
            .field("volumes_with_reservations", &self.ledgers.len())
            .finish()
    }
}
