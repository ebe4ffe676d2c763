//! Session facade over the backup engine
//!
//! The facade is the one sequential API a backup application drives. Every
//! call desugars to engine calls in the order the lifecycle demands:
//!
//! | Facade call           | Engine equivalent                                |
//! |-----------------------|--------------------------------------------------|
//! | `begin_backup(..)`    | `gather_metadata()` then `start_set()`           |
//! | `add_volume(v)`       | `add_member(v)`                                  |
//! | `run_to_completion()` | `assign_diff_areas` → `prepare` → `commit` → `complete_backup` |
//! | `abort()`             | `abort()`                                        |
//!
//! Recoverable failures (a short candidate volume, a retryable writer
//! stall) are absorbed inside the engine; the caller sees only the terminal
//! outcome and the ordered phase-transition log.

use shadowset_core::config::BackupConfig;
use shadowset_core::error::{FailureKind, SetFailure};
use shadowset_core::set_types::{SnapshotId, SnapshotSetId, VolumeName};
use shadowset_core::traits::{Provider, Writer};
use shadowset_engine::{BackupEngine, PhaseTransition};
use std::sync::Arc;
use tracing::info;

/// Terminal result of a backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Every member committed; the set is identified by `set_id`
    Committed {
        /// Identifier of the committed snapshot set
        set_id: SnapshotSetId,
    },
    /// The set aborted with the given classified failure
    Aborted {
        /// The failure that aborted the set
        failure: SetFailure,
    },
}

impl BackupOutcome {
    /// Whether the run committed
    pub fn is_committed(&self) -> bool {
        matches!(self, BackupOutcome::Committed { .. })
    }

    /// The committed set id, if the run committed
    pub fn set_id(&self) -> Option<SnapshotSetId> {
        match self {
            BackupOutcome::Committed { set_id } => Some(*set_id),
            BackupOutcome::Aborted { .. } => None,
        }
    }
}

/// Terminal outcome plus the ordered observability log
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// How the run ended
    pub outcome: BackupOutcome,
    /// Every phase transition the set went through, in order
    pub transitions: Vec<PhaseTransition>,
}

/// One backup run, driven sequentially by the caller
///
/// Holds no state beyond the engine it delegates to. The snapshot set is
/// exclusively owned by this session and is destroyed when the session is
/// consumed by `run_to_completion` or `abort`.
pub struct Session {
    engine: BackupEngine,
}

impl Session {
    /// Open a backup session against explicit collaborators.
    ///
    /// Gathers writer metadata and starts the snapshot set, so the session
    /// is immediately ready for `add_volume`. A failure during either step
    /// aborts the nascent set and surfaces here.
    pub fn begin_backup(
        config: BackupConfig,
        provider: Arc<dyn Provider>,
        writers: Vec<Arc<dyn Writer>>,
    ) -> Result<Session, SetFailure> {
        let mut engine = BackupEngine::new(config, provider, writers);
        engine.gather_metadata()?;
        engine.start_set()?;
        Ok(Session { engine })
    }

    /// The snapshot set's identifier
    pub fn set_id(&self) -> SnapshotSetId {
        self.engine.id()
    }

    /// Add one source volume to the set
    pub fn add_volume(&mut self, volume: VolumeName) -> Result<SnapshotId, SetFailure> {
        self.engine.add_member(volume)
    }

    /// The ordered phase-transition log so far, read-only
    pub fn transitions(&self) -> &[PhaseTransition] {
        self.engine.transitions()
    }

    /// Drive the set to its terminal state.
    ///
    /// Sequences diff-area assignment, prepare, commit and completion.
    /// Only the terminal outcome surfaces; recoverable failures were
    /// handled on the way.
    pub fn run_to_completion(mut self) -> BackupReport {
        let result = self.drive();
        let transitions = self.engine.transitions().to_vec();
        let outcome = match result {
            Ok(set_id) => {
                info!(
                    target: "shadowset::session",
                    set_id = %set_id,
                    "backup run committed"
                );
                BackupOutcome::Committed { set_id }
            }
            Err(failure) => BackupOutcome::Aborted { failure },
        };
        BackupReport {
            outcome,
            transitions,
        }
    }

    /// Abandon the run and tear the set down.
    pub fn abort(mut self) -> BackupReport {
        // The session is consumed by run_to_completion, so this path only
        // runs before commit and the engine-level abort cannot be refused.
        let failure = match self.engine.abort() {
            Ok(()) => self.engine.set().failure().cloned(),
            Err(failure) => Some(failure),
        }
        .unwrap_or_else(|| {
            SetFailure::new(
                FailureKind::Unexpected {
                    reason: "backup aborted by requestor".into(),
                },
                self.engine.phase(),
            )
        });
        BackupReport {
            outcome: BackupOutcome::Aborted { failure },
            transitions: self.engine.transitions().to_vec(),
        }
    }

    fn drive(&mut self) -> Result<SnapshotSetId, SetFailure> {
        self.engine.assign_diff_areas()?;
        self.engine.prepare()?;
        let set_id = self.engine.commit()?;
        self.engine.complete_backup()?;
        Ok(set_id)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("set_id", &self.engine.id())
            .field("phase", &self.engine.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowset_core::config::RetryPolicy;
    use shadowset_core::set_types::{
        BackupOutcomeKind, DiffVolumeDescriptor, Phase, SnapshotRequest, WriterMetadata,
    };
    use shadowset_core::traits::NativeResult;

    struct StubProvider {
        volumes: Vec<DiffVolumeDescriptor>,
    }

    impl Provider for StubProvider {
        fn query_volumes(&self) -> NativeResult<Vec<DiffVolumeDescriptor>> {
            Ok(self.volumes.clone())
        }

        fn create_diff_area(&self, _volume: &VolumeName, _size_hint: u64) -> NativeResult<()> {
            Ok(())
        }

        fn commit_snapshot(&self, _request: &SnapshotRequest) -> NativeResult<()> {
            Ok(())
        }
    }

    struct StubWriter;

    impl Writer for StubWriter {
        fn metadata(&self) -> NativeResult<WriterMetadata> {
            Ok(WriterMetadata::new("stub"))
        }

        fn freeze(&self) -> NativeResult<()> {
            Ok(())
        }

        fn thaw(&self) -> NativeResult<()> {
            Ok(())
        }

        fn notify_backup_complete(&self, _outcome: BackupOutcomeKind) -> NativeResult<()> {
            Ok(())
        }
    }

    fn provider_with_space(free: u64) -> Arc<dyn Provider> {
        Arc::new(StubProvider {
            volumes: vec![DiffVolumeDescriptor::new(
                VolumeName::from("diff-a"),
                "D:\\",
                free,
                free.max(1),
            )],
        })
    }

    fn test_config() -> BackupConfig {
        BackupConfig {
            retry: RetryPolicy::fast_for_tests(),
            diff_area_size_hint: 100,
            operation_workers: 2,
            ..BackupConfig::default()
        }
    }

    #[test]
    fn test_two_volume_backup_commits() {
        let mut session = Session::begin_backup(
            test_config(),
            provider_with_space(1000),
            vec![Arc::new(StubWriter)],
        )
        .unwrap();

        session.add_volume(VolumeName::from("src-1")).unwrap();
        session.add_volume(VolumeName::from("src-2")).unwrap();
        let expected_id = session.set_id();

        let report = session.run_to_completion();
        assert!(report.outcome.is_committed());
        assert_eq!(report.outcome.set_id(), Some(expected_id));
        assert_eq!(report.transitions.last().unwrap().to, Phase::PostCommit);
    }

    #[test]
    fn test_insufficient_space_aborts_with_classified_kind() {
        let mut session =
            Session::begin_backup(test_config(), provider_with_space(10), vec![]).unwrap();
        session.add_volume(VolumeName::from("src-1")).unwrap();

        let report = session.run_to_completion();
        match report.outcome {
            BackupOutcome::Aborted { failure } => {
                assert!(matches!(
                    failure.kind,
                    FailureKind::InsufficientStorage { .. }
                ));
                assert!(failure.member.is_some());
            }
            other => panic!("expected Aborted, got {other:?}"),
        }
        assert_eq!(report.transitions.last().unwrap().to, Phase::Aborted);
    }

    #[test]
    fn test_duplicate_volume_surfaces_before_run() {
        let mut session =
            Session::begin_backup(test_config(), provider_with_space(1000), vec![]).unwrap();
        session.add_volume(VolumeName::from("src-1")).unwrap();

        let err = session.add_volume(VolumeName::from("src-1")).unwrap_err();
        assert!(matches!(err.kind, FailureKind::ObjectAlreadyExists { .. }));
    }

    #[test]
    fn test_abort_reports_aborted_outcome() {
        let mut session =
            Session::begin_backup(test_config(), provider_with_space(1000), vec![]).unwrap();
        session.add_volume(VolumeName::from("src-1")).unwrap();

        let report = session.abort();
        assert!(!report.outcome.is_committed());
        assert_eq!(report.transitions.last().unwrap().to, Phase::Aborted);
    }

    #[test]
    fn test_transitions_visible_mid_session() {
        let session =
            Session::begin_backup(test_config(), provider_with_space(1000), vec![]).unwrap();
        let phases: Vec<Phase> = session.transitions().iter().map(|t| t.to).collect();
        assert_eq!(phases, vec![Phase::MetadataGathered, Phase::SetStarted]);
    }
}
