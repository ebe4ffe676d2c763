//! Snapshot set data and its legal phase transitions
//!
//! The set owns its members and its phase. `advance` is the single mutator
//! for the phase: it validates the transition against the legal-successor
//! table and records it in the transition log, so the phase can only move
//! the way the lifecycle allows. Illegal requests fail with
//! `InvalidSequence` and change nothing.

use crate::transitions::{PhaseTransition, TransitionLog};
use chrono::{DateTime, Utc};
use shadowset_core::error::{FailureKind, SetFailure};
use shadowset_core::set_types::{
    MemberStatus, Phase, SnapshotId, SnapshotMember, SnapshotSetId, VolumeName, MAX_SET_MEMBERS,
};
use shadowset_core::{classify, NativeStatus, SnapshotContext};

/// A snapshot set: identity, members, phase, and transition history
///
/// Exclusively owned by one session for its lifetime and never shared
/// across sessions.
#[derive(Debug)]
pub struct SnapshotSet {
    id: SnapshotSetId,
    members: Vec<SnapshotMember>,
    phase: Phase,
    created_at: DateTime<Utc>,
    context: SnapshotContext,
    log: TransitionLog,
    /// Set once, when the set aborts
    failure: Option<SetFailure>,
}

impl SnapshotSet {
    /// Create a set in the `Created` phase
    pub fn new(context: SnapshotContext) -> Self {
        SnapshotSet {
            id: SnapshotSetId::new(),
            members: Vec::new(),
            phase: Phase::Created,
            created_at: Utc::now(),
            context,
            log: TransitionLog::new(),
            failure: None,
        }
    }

    /// The set's identifier
    pub fn id(&self) -> SnapshotSetId {
        self.id
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Context flags the set was created with
    pub fn context(&self) -> SnapshotContext {
        self.context
    }

    /// When the set was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Members in the order they were added
    pub fn members(&self) -> &[SnapshotMember] {
        &self.members
    }

    /// The recorded phase transitions, in order
    pub fn transitions(&self) -> &[PhaseTransition] {
        self.log.entries()
    }

    /// The failure that aborted the set, if it aborted
    pub fn failure(&self) -> Option<&SetFailure> {
        self.failure.as_ref()
    }

    /// Fail with `InvalidSequence` unless the current phase is one of
    /// `allowed`.
    pub fn ensure_phase(&self, allowed: &[Phase], operation: &str) -> Result<(), SetFailure> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SetFailure::new(
                FailureKind::InvalidSequence {
                    reason: format!("{} is not legal in phase {}", operation, self.phase),
                },
                self.phase,
            ))
        }
    }

    /// Commit a phase transition.
    ///
    /// Validates against the legal-successor table; on success the change
    /// is recorded in the transition log. An illegal transition fails with
    /// `InvalidSequence` and leaves the phase untouched.
    pub fn advance(&mut self, to: Phase, trigger: &'static str) -> Result<(), SetFailure> {
        if !self.phase.can_transition_to(to) {
            return Err(SetFailure::new(
                FailureKind::InvalidSequence {
                    reason: format!("transition {} -> {} is not legal", self.phase, to),
                },
                self.phase,
            ));
        }
        self.log.record(self.phase, to, trigger);
        self.phase = to;
        Ok(())
    }

    /// Append one member for `volume`.
    ///
    /// Legal only in `SetStarted` or `MembersAdded`. Each call appends
    /// exactly one member, in call order, and leaves the set in
    /// `MembersAdded`. A volume already in the set is rejected with
    /// `ObjectAlreadyExists`; exceeding the per-set cap is rejected with
    /// the classified cap failure.
    pub fn add_member(&mut self, volume: VolumeName) -> Result<SnapshotId, SetFailure> {
        self.ensure_phase(&[Phase::SetStarted, Phase::MembersAdded], "add_member")?;

        if self.members.iter().any(|m| m.source_volume == volume) {
            return Err(SetFailure::new(
                FailureKind::ObjectAlreadyExists {
                    reason: format!("volume {} is already in the set", volume),
                },
                self.phase,
            ));
        }
        if self.members.len() >= MAX_SET_MEMBERS {
            return Err(SetFailure::new(
                classify(NativeStatus::MAX_VOLUMES_REACHED, self.phase),
                self.phase,
            ));
        }

        let member = SnapshotMember::new(volume);
        let id = member.id;
        self.members.push(member);

        if self.phase == Phase::SetStarted {
            self.advance(Phase::MembersAdded, "add_member")?;
        }
        Ok(id)
    }

    /// Whether every member has a diff-area assignment
    pub fn all_assigned(&self) -> bool {
        self.members.iter().all(|m| m.diff_area().is_some())
    }

    /// Mutable access to one member
    pub(crate) fn member_mut(&mut self, id: SnapshotId) -> Option<&mut SnapshotMember> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Set the status of every member that has not committed
    pub(crate) fn fail_uncommitted_members(&mut self) {
        for member in &mut self.members {
            if member.status != MemberStatus::Committed {
                member.status = MemberStatus::Failed;
            }
        }
    }

    /// Set the status of every member
    pub(crate) fn set_all_member_status(&mut self, status: MemberStatus) {
        for member in &mut self.members {
            member.status = status;
        }
    }

    /// Record the failure that aborted the set
    pub(crate) fn record_failure(&mut self, failure: SetFailure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}
