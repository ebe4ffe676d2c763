//! Backup engine: the snapshot-set state machine's operations
//!
//! Owns one snapshot set and drives it through the lifecycle. Every caller
//! action is validated against the current phase before anything is asked
//! of a collaborator, and every collaborator failure is routed through the
//! classifier before a decision is made.
//!
//! ## Protocol sequence
//!
//! ```text
//! 1. gather_metadata()    Created → MetadataGathered
//! 2. start_set()          MetadataGathered → SetStarted
//! 3. add_member(volume)   SetStarted/MembersAdded → MembersAdded (per call)
//! 4. assign_diff_areas()  picks a storage-area volume per member
//! 5. prepare()            MembersAdded → PrepareStarted → Prepared
//! 6. commit()             Prepared → CommitStarted → Committed
//! 7. complete_backup()    Committed → PostCommit
//! ```
//!
//! Any fatal failure before `Committed` aborts the whole set: outstanding
//! operations are driven to a terminal state, frozen writers are thawed,
//! reservations are released, and the set lands in `Aborted` exactly once.
//! Commit is all-or-nothing — a set is never left partially committed.

use crate::retry;
use crate::set::SnapshotSet;
use crate::transitions::PhaseTransition;
use parking_lot::Mutex;
use shadowset_concurrency::{OperationCoordinator, OperationHandle, OperationOutcome, OperationState};
use shadowset_core::classify;
use shadowset_core::config::BackupConfig;
use shadowset_core::error::{FailureKind, Result, SetFailure};
use shadowset_core::set_types::{
    BackupOutcomeKind, MemberStatus, Phase, SnapshotId, SnapshotRequest, SnapshotSetId, VolumeName,
    WriterMetadata,
};
use shadowset_core::traits::{Provider, Writer};
use shadowset_storage::{AssignError, DiffAreaRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one snapshot set through its lifecycle
///
/// Operations against the set are caller-sequential (`&mut self`); within a
/// phase the engine fans collaborator calls out through the coordinator.
pub struct BackupEngine {
    set: SnapshotSet,
    provider: Arc<dyn Provider>,
    writers: Vec<Arc<dyn Writer>>,
    registry: DiffAreaRegistry,
    coordinator: OperationCoordinator,
    config: BackupConfig,
    writer_metadata: Vec<WriterMetadata>,
    /// Indices of writers currently holding a freeze
    frozen: Vec<usize>,
}

impl BackupEngine {
    /// Create an engine for one backup run.
    ///
    /// Collaborators are explicit: there is no ambient registry of
    /// providers or writers.
    pub fn new(
        config: BackupConfig,
        provider: Arc<dyn Provider>,
        writers: Vec<Arc<dyn Writer>>,
    ) -> Self {
        let registry = DiffAreaRegistry::new(Arc::clone(&provider));
        let coordinator = OperationCoordinator::new(config.operation_workers);
        let set = SnapshotSet::new(config.context);
        BackupEngine {
            set,
            provider,
            writers,
            registry,
            coordinator,
            config,
            writer_metadata: Vec::new(),
            frozen: Vec::new(),
        }
    }

    /// The set this engine drives
    pub fn set(&self) -> &SnapshotSet {
        &self.set
    }

    /// The set's identifier
    pub fn id(&self) -> SnapshotSetId {
        self.set.id()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.set.phase()
    }

    /// Ordered phase-transition log, read-only
    pub fn transitions(&self) -> &[PhaseTransition] {
        self.set.transitions()
    }

    /// Metadata gathered from writers, in completion order
    pub fn writer_metadata(&self) -> &[WriterMetadata] {
        &self.writer_metadata
    }

    /// Collect each writer's identity. Legal only in `Created`.
    ///
    /// The gathered identities are available through `writer_metadata`.
    /// Skipped entirely in a `no_writers` context.
    pub fn gather_metadata(&mut self) -> Result<()> {
        self.set.ensure_phase(&[Phase::Created], "gather_metadata")?;

        if self.config.context.no_writers || self.writers.is_empty() {
            self.set
                .advance(Phase::MetadataGathered, "gather_metadata")?;
            return Ok(());
        }

        let collected = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<OperationHandle> = self
            .writers
            .iter()
            .map(|writer| {
                let writer = Arc::clone(writer);
                let collected = Arc::clone(&collected);
                self.coordinator.start(move |cancel| {
                    if cancel.is_cancelled() {
                        return Ok(OperationOutcome::Cancelled);
                    }
                    let metadata = writer
                        .metadata()
                        .map_err(|status| classify(status, Phase::Created))?;
                    collected.lock().push(metadata);
                    Ok(OperationOutcome::Completed)
                })
            })
            .collect();

        if let Some((_, kind)) = self.settle(&handles, "gather writer metadata", |reason| {
            FailureKind::WriterTimeout { reason }
        }) {
            return Err(self.abort_with(kind, None));
        }

        self.writer_metadata = std::mem::take(&mut *collected.lock());
        self.set
            .advance(Phase::MetadataGathered, "gather_metadata")?;
        Ok(())
    }

    /// Issue the set id and open the set for members.
    /// Legal only in `MetadataGathered`.
    pub fn start_set(&mut self) -> Result<SnapshotSetId> {
        self.set.ensure_phase(&[Phase::MetadataGathered], "start_set")?;
        self.set.advance(Phase::SetStarted, "start_set")?;
        info!(
            target: "shadowset::engine",
            set_id = %self.set.id(),
            "snapshot set started"
        );
        Ok(self.set.id())
    }

    /// Add one source volume to the set.
    /// Legal in `SetStarted` and `MembersAdded`.
    pub fn add_member(&mut self, volume: VolumeName) -> Result<SnapshotId> {
        self.set.add_member(volume)
    }

    /// Choose a storage-area volume for every unassigned member.
    ///
    /// Candidates come from the registry's fresh capacity view. A volume
    /// that turns out short is skipped and the next candidate is tried;
    /// running out of candidates aborts the set with
    /// `InsufficientStorage`. Does not change the phase.
    pub fn assign_diff_areas(&mut self) -> Result<()> {
        self.set
            .ensure_phase(&[Phase::MembersAdded], "assign_diff_areas")?;
        let size_hint = self.config.diff_area_size_hint;

        let unassigned: Vec<SnapshotId> = self
            .set
            .members()
            .iter()
            .filter(|m| m.diff_area().is_none())
            .map(|m| m.id)
            .collect();

        for member_id in unassigned {
            let candidates = match self.registry.list_volumes() {
                Ok(candidates) => candidates,
                Err(status) => {
                    let kind = classify(status, self.set.phase());
                    return Err(self.abort_with(kind, Some(member_id)));
                }
            };

            let mut chosen: Option<VolumeName> = None;
            for candidate in &candidates {
                match self.registry.assign(member_id, &candidate.volume, size_hint) {
                    Ok(()) => match self.provider.create_diff_area(&candidate.volume, size_hint) {
                        Ok(()) => {
                            chosen = Some(candidate.volume.clone());
                            break;
                        }
                        Err(status) => {
                            self.registry.release(member_id);
                            let kind = classify(status, self.set.phase());
                            if matches!(kind, FailureKind::InsufficientStorage { .. }) {
                                // The provider knows better than our estimate;
                                // try the next candidate.
                                continue;
                            }
                            return Err(self.abort_with(kind, Some(member_id)));
                        }
                    },
                    Err(AssignError::InsufficientSpace { .. }) => continue,
                    // The candidate list is a moment-in-time view; a volume
                    // that vanished is just not a candidate anymore.
                    Err(AssignError::VolumeNotFound(_)) => continue,
                    Err(err) => {
                        return Err(self.abort_with(err.into_failure(), Some(member_id)));
                    }
                }
            }

            match chosen {
                Some(volume) => {
                    debug!(
                        target: "shadowset::engine",
                        member = %member_id,
                        volume = %volume,
                        "diff area assigned"
                    );
                    if let Some(member) = self.set.member_mut(member_id) {
                        member.assign_diff_area(volume);
                    }
                }
                None => {
                    let kind = FailureKind::InsufficientStorage {
                        reason: format!(
                            "no storage-area volume can host a {} byte diff area",
                            size_hint
                        ),
                    };
                    return Err(self.abort_with(kind, Some(member_id)));
                }
            }
        }
        Ok(())
    }

    /// Freeze every writer and mark the set prepared.
    ///
    /// Legal only in `MembersAdded`, and only once every member has a
    /// diff-area assignment. Retryable freeze failures are retried within
    /// the policy bound; a non-retryable failure (or exhausted retries)
    /// cancels the remaining freezes, thaws what froze, and aborts.
    pub fn prepare(&mut self) -> Result<()> {
        self.set.ensure_phase(&[Phase::MembersAdded], "prepare")?;
        if !self.set.all_assigned() {
            return Err(SetFailure::new(
                FailureKind::InvalidSequence {
                    reason: "prepare requires every member to have a diff-area assignment".into(),
                },
                self.set.phase(),
            ));
        }

        self.set.advance(Phase::PrepareStarted, "prepare")?;

        if !self.config.context.no_writers && !self.writers.is_empty() {
            let report =
                retry::freeze_writers(&self.coordinator, &self.writers, &self.config.retry);
            self.frozen = report.frozen;
            if let Some(kind) = report.failure {
                return Err(self.abort_with(kind, None));
            }
        }

        self.set.set_all_member_status(MemberStatus::Prepared);
        self.set.advance(Phase::Prepared, "prepare")?;
        debug!(
            target: "shadowset::engine",
            set_id = %self.set.id(),
            writers_frozen = self.frozen.len(),
            "snapshot set prepared"
        );
        Ok(())
    }

    /// Create every member's snapshot. Legal only in `Prepared`.
    ///
    /// All-or-nothing: the first member failure cancels the remaining
    /// creations and aborts the whole set. Snapshots already created for
    /// other members are discarded with the set; none is reported
    /// committed.
    pub fn commit(&mut self) -> Result<SnapshotSetId> {
        self.set.ensure_phase(&[Phase::Prepared], "commit")?;
        self.set.advance(Phase::CommitStarted, "commit")?;

        let mut requests = Vec::with_capacity(self.set.members().len());
        let mut unassigned: Option<SnapshotId> = None;
        for member in self.set.members() {
            match member.diff_area() {
                Some(volume) => requests.push(SnapshotRequest {
                    member: member.id,
                    source_volume: member.source_volume.clone(),
                    diff_area: volume.clone(),
                }),
                None => {
                    unassigned = Some(member.id);
                    break;
                }
            }
        }
        if let Some(member_id) = unassigned {
            let kind = FailureKind::InvalidSequence {
                reason: format!("member {} has no diff-area assignment", member_id),
            };
            return Err(self.abort_with(kind, Some(member_id)));
        }

        let handles: Vec<OperationHandle> = requests
            .iter()
            .cloned()
            .map(|request| {
                let provider = Arc::clone(&self.provider);
                self.coordinator.start(move |cancel| {
                    if cancel.is_cancelled() {
                        return Ok(OperationOutcome::Cancelled);
                    }
                    // Once the provider is asked to create the snapshot
                    // there is no backing out of this operation.
                    cancel.point_of_no_return();
                    provider
                        .commit_snapshot(&request)
                        .map_err(|status| classify(status, Phase::CommitStarted))?;
                    Ok(OperationOutcome::Completed)
                })
            })
            .collect();

        if let Some((index, kind)) = self.settle(&handles, "commit snapshot", |reason| {
            FailureKind::Unexpected { reason }
        }) {
            let member = requests.get(index).map(|r| r.member);
            return Err(self.abort_with(kind, member));
        }

        for request in &requests {
            if let Some(member) = self.set.member_mut(request.member) {
                member.status = MemberStatus::Committed;
            }
        }
        self.set.advance(Phase::Committed, "commit")?;
        info!(
            target: "shadowset::engine",
            set_id = %self.set.id(),
            members = requests.len(),
            "snapshot set committed"
        );
        Ok(self.set.id())
    }

    /// Thaw writers and notify them of the outcome. Legal only in
    /// `Committed`.
    ///
    /// The snapshot is already committed, so writer failures here are
    /// logged and swallowed; the set still ends at `PostCommit`.
    pub fn complete_backup(&mut self) -> Result<()> {
        self.set
            .ensure_phase(&[Phase::Committed], "complete_backup")?;

        self.thaw_frozen_writers();
        self.notify_writers(BackupOutcomeKind::Succeeded);

        self.set.advance(Phase::PostCommit, "complete_backup")?;
        Ok(())
    }

    /// Tear the set down. Legal from any state before `Committed`.
    ///
    /// Idempotent: aborting an already-aborted set is a no-op. Aborting a
    /// committed set is refused with `InvalidSequence` — a committed
    /// snapshot set is never regressed.
    pub fn abort(&mut self) -> Result<()> {
        if self.set.phase() == Phase::Aborted {
            return Ok(());
        }
        if self.set.phase().has_reached(Phase::Committed) {
            return Err(SetFailure::new(
                FailureKind::InvalidSequence {
                    reason: "cannot abort a committed snapshot set".into(),
                },
                self.set.phase(),
            ));
        }
        self.abort_with(
            FailureKind::Unexpected {
                reason: "backup aborted by requestor".into(),
            },
            None,
        );
        Ok(())
    }

    /// Abort the set: thaw frozen writers, notify writers of the failure,
    /// release every diff-area reservation, fail non-committed members and
    /// record the transition. Returns the failure for the caller to
    /// surface.
    fn abort_with(&mut self, kind: FailureKind, member: Option<SnapshotId>) -> SetFailure {
        let mut failure = SetFailure::new(kind, self.set.phase());
        if let Some(member) = member {
            failure = failure.with_member(member);
        }
        warn!(
            target: "shadowset::engine",
            set_id = %self.set.id(),
            error = %failure,
            "aborting snapshot set"
        );

        self.thaw_frozen_writers();
        self.notify_writers(BackupOutcomeKind::Aborted);

        let released = self.registry.release_all();
        if released > 0 {
            debug!(
                target: "shadowset::engine",
                released,
                "diff-area reservations released"
            );
        }

        self.set.fail_uncommitted_members();
        // Legal from every phase this path runs in: abort_with is only
        // reachable before Committed.
        let _ = self.set.advance(Phase::Aborted, "abort");
        self.set.record_failure(failure.clone());
        failure
    }

    /// Thaw every writer still holding a freeze; failures are logged only.
    fn thaw_frozen_writers(&mut self) {
        let frozen = std::mem::take(&mut self.frozen);
        if frozen.is_empty() {
            return;
        }
        let phase = self.set.phase();
        let handles: Vec<OperationHandle> = frozen
            .iter()
            .map(|&i| {
                let writer = Arc::clone(&self.writers[i]);
                self.coordinator.start(move |cancel| {
                    if cancel.is_cancelled() {
                        return Ok(OperationOutcome::Cancelled);
                    }
                    writer
                        .thaw()
                        .map_err(|status| classify(status, phase))?;
                    Ok(OperationOutcome::Completed)
                })
            })
            .collect();
        self.settle_lenient(&handles, "thaw writer");
    }

    /// Tell every writer how the run ended; failures are logged only.
    fn notify_writers(&self, outcome: BackupOutcomeKind) {
        if self.config.context.no_writers || self.writers.is_empty() {
            return;
        }
        let phase = self.set.phase();
        let handles: Vec<OperationHandle> = self
            .writers
            .iter()
            .map(|writer| {
                let writer = Arc::clone(writer);
                self.coordinator.start(move |cancel| {
                    if cancel.is_cancelled() {
                        return Ok(OperationOutcome::Cancelled);
                    }
                    writer
                        .notify_backup_complete(outcome)
                        .map_err(|status| classify(status, phase))?;
                    Ok(OperationOutcome::Completed)
                })
            })
            .collect();
        self.settle_lenient(&handles, "notify backup complete");
    }

    /// Wait for every handle; on the first failure cancel the remainder
    /// and drive them to a terminal state anyway. Returns the index and
    /// kind of the first failure.
    ///
    /// A wait timeout cancels the stalled handle, waits it out, and
    /// reports it through `timeout_kind`.
    fn settle<F>(
        &self,
        handles: &[OperationHandle],
        what: &str,
        timeout_kind: F,
    ) -> Option<(usize, FailureKind)>
    where
        F: Fn(String) -> FailureKind,
    {
        let wait_timeout = self.config.retry.wait_timeout;
        let mut first: Option<(usize, FailureKind)> = None;

        for (index, handle) in handles.iter().enumerate() {
            if first.is_some() {
                handle.cancel();
            }
            let (state, timed_out) = match handle.wait(wait_timeout) {
                Some(state) => (state, false),
                None => {
                    handle.cancel();
                    (
                        retry::wait_until_terminal(handle, wait_timeout, what),
                        true,
                    )
                }
            };
            if first.is_some() {
                continue;
            }
            match state {
                OperationState::Succeeded => {}
                OperationState::Failed(kind) => first = Some((index, kind)),
                OperationState::Cancelled => {
                    let reason = if timed_out {
                        format!("{} did not finish within {:?}", what, wait_timeout)
                    } else {
                        format!("{} was cancelled", what)
                    };
                    first = Some((index, timeout_kind(reason)));
                }
                OperationState::Pending => {}
            }
        }
        first
    }

    /// Wait for every handle and log non-successes; nothing is fatal.
    fn settle_lenient(&self, handles: &[OperationHandle], what: &str) {
        let wait_timeout = self.config.retry.wait_timeout;
        for (index, handle) in handles.iter().enumerate() {
            let state = match handle.wait(wait_timeout) {
                Some(state) => state,
                None => {
                    handle.cancel();
                    retry::wait_until_terminal(handle, wait_timeout, what)
                }
            };
            if state != OperationState::Succeeded {
                warn!(
                    target: "shadowset::engine",
                    what,
                    index,
                    state = ?state,
                    "post-phase writer call did not succeed"
                );
            }
        }
    }
}

impl std::fmt::Debug for BackupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupEngine")
            .field("set_id", &self.set.id())
            .field("phase", &self.set.phase())
            .field("members", &self.set.members().len())
            .finish()
    }
}
