//! End-to-end backup lifecycle scenarios against mock collaborators
//!
//! These tests drive the public session API the way a backup application
//! would, and check the terminal outcomes and observability log the
//! system promises.

mod mocks;

use mocks::{MockProvider, MockWriter};
use shadowset::{
    BackupConfig, BackupOutcome, BackupOutcomeKind, FailureKind, NativeStatus, Phase, RetryPolicy,
    Session, SnapshotContext, VolumeName,
};
use std::sync::Arc;

fn init_logging() {
    // Ignore the error when a previous test already installed a subscriber
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> BackupConfig {
    BackupConfig {
        retry: RetryPolicy::fast_for_tests(),
        diff_area_size_hint: 1000,
        operation_workers: 2,
        ..BackupConfig::default()
    }
}

#[test]
fn two_volume_backup_commits_both_members() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    let writer = MockWriter::healthy("sql-writer");

    let mut session = Session::begin_backup(
        test_config(),
        Arc::clone(&provider) as Arc<dyn shadowset::Provider>,
        vec![Arc::clone(&writer) as Arc<dyn shadowset::Writer>],
    )
    .unwrap();

    session.add_volume(VolumeName::from("src-1")).unwrap();
    session.add_volume(VolumeName::from("src-2")).unwrap();
    let expected_id = session.set_id();

    let report = session.run_to_completion();

    match report.outcome {
        BackupOutcome::Committed { set_id } => assert_eq!(set_id, expected_id),
        BackupOutcome::Aborted { failure } => panic!("unexpected abort: {failure}"),
    }
    // Both members' snapshots were created
    assert_eq!(provider.committed_members(), 2);
    // The writer was frozen, thawed, and told the run succeeded
    assert_eq!(writer.freeze_calls(), 1);
    assert_eq!(writer.thaw_calls(), 1);
    assert_eq!(writer.last_outcome(), Some(BackupOutcomeKind::Succeeded));
}

#[test]
fn insufficient_space_with_no_alternate_volume_aborts() {
    init_logging();
    // 500 bytes free against a 1000-byte hint, no other candidate
    let provider = MockProvider::with_volumes(vec![("diff-small", 500, 500)]);

    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
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
        BackupOutcome::Committed { .. } => panic!("must not commit without diff space"),
    }
    assert_eq!(report.transitions.last().unwrap().to, Phase::Aborted);
}

#[test]
fn assignment_falls_back_to_a_volume_with_space() {
    init_logging();
    let provider =
        MockProvider::with_volumes(vec![("diff-small", 500, 500), ("diff-big", 50_000, 50_000)]);

    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();

    let report = session.run_to_completion();
    assert!(report.outcome.is_committed());
}

#[test]
fn writer_with_transient_stall_still_commits() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    // One failed freeze, then healthy — inside the retry bound
    let writer = MockWriter::flaky("flaky-writer", 1, NativeStatus::WRITER_TIMED_OUT);

    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![Arc::clone(&writer) as Arc<dyn shadowset::Writer>],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();

    let report = session.run_to_completion();
    assert!(report.outcome.is_committed());
    assert_eq!(writer.freeze_calls(), 2);
}

#[test]
fn broken_writer_aborts_and_every_member_fails() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    let broken = MockWriter::flaky("broken-writer", 99, NativeStatus::WRITER_NONRETRYABLE);

    let mut session = Session::begin_backup(
        test_config(),
        Arc::clone(&provider) as Arc<dyn shadowset::Provider>,
        vec![Arc::clone(&broken) as Arc<dyn shadowset::Writer>],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();
    session.add_volume(VolumeName::from("src-2")).unwrap();

    let report = session.run_to_completion();
    match report.outcome {
        BackupOutcome::Aborted { failure } => {
            assert!(matches!(
                failure.kind,
                FailureKind::WriterInfrastructureFailure { .. }
            ));
        }
        BackupOutcome::Committed { .. } => panic!("must not commit past a broken writer"),
    }
    // Nothing was committed and the writer heard about the failure
    assert_eq!(provider.committed_members(), 0);
    assert_eq!(broken.last_outcome(), Some(BackupOutcomeKind::Aborted));
}

#[test]
fn commit_failure_on_one_member_leaves_no_partial_set() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    provider.fail_commit_for("src-2", NativeStatus::UNEXPECTED_PROVIDER_ERROR);

    let mut session = Session::begin_backup(
        test_config(),
        Arc::clone(&provider) as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();
    session.add_volume(VolumeName::from("src-2")).unwrap();

    let report = session.run_to_completion();
    match &report.outcome {
        BackupOutcome::Aborted { failure } => {
            assert!(matches!(failure.kind, FailureKind::Unexpected { .. }));
            assert_eq!(failure.phase, Phase::CommitStarted);
        }
        BackupOutcome::Committed { .. } => panic!("partial success must never be reported"),
    }
    assert_eq!(report.transitions.last().unwrap().to, Phase::Aborted);
}

#[test]
fn no_writers_context_completes_without_writer_calls() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    let writer = MockWriter::healthy("should-not-be-called");
    let config = BackupConfig {
        context: SnapshotContext::no_writers(),
        ..test_config()
    };

    let mut session = Session::begin_backup(
        config,
        provider as Arc<dyn shadowset::Provider>,
        vec![Arc::clone(&writer) as Arc<dyn shadowset::Writer>],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();

    let report = session.run_to_completion();
    assert!(report.outcome.is_committed());
    assert_eq!(writer.freeze_calls(), 0);
    assert_eq!(writer.thaw_calls(), 0);
    assert_eq!(writer.last_outcome(), None);
}

#[test]
fn failing_completion_notification_does_not_unwind_a_commit() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    let writer = MockWriter::healthy("deaf-writer");
    writer.fail_notify_with(NativeStatus::WRITER_NOT_RESPONDING);

    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![Arc::clone(&writer) as Arc<dyn shadowset::Writer>],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();

    let report = session.run_to_completion();
    // The snapshot is already committed; a deaf writer cannot undo it
    assert!(report.outcome.is_committed());
    assert_eq!(report.transitions.last().unwrap().to, Phase::PostCommit);
}

#[test]
fn transition_log_records_the_whole_walk_in_order() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);

    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();

    let report = session.run_to_completion();
    let phases: Vec<Phase> = report.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        phases,
        vec![
            Phase::MetadataGathered,
            Phase::SetStarted,
            Phase::MembersAdded,
            Phase::PrepareStarted,
            Phase::Prepared,
            Phase::CommitStarted,
            Phase::Committed,
            Phase::PostCommit,
        ]
    );
    // Each entry chains from the previous one
    for pair in report.transitions.windows(2) {
        assert_eq!(pair[0].to, pair[1].from);
        assert!(pair[0].at <= pair[1].at);
    }
}

#[test]
fn transition_log_exports_as_json() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);

    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();

    let report = session.run_to_completion();
    let json = serde_json::to_string(&report.transitions).unwrap();
    assert!(json.contains("PostCommit"));
    assert!(json.contains("complete_backup"));
}

#[test]
fn aborting_a_session_tears_the_set_down() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    let writer = MockWriter::healthy("writer");

    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![writer as Arc<dyn shadowset::Writer>],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();

    let report = session.abort();
    assert!(!report.outcome.is_committed());
    assert_eq!(report.transitions.last().unwrap().to, Phase::Aborted);
}

#[test]
fn out_of_order_calls_fail_without_state_change() {
    init_logging();
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);

    // add_volume twice for the same volume: second fails, first stands
    let mut session = Session::begin_backup(
        test_config(),
        provider as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();
    let err = session.add_volume(VolumeName::from("src-1")).unwrap_err();
    assert!(matches!(err.kind, FailureKind::ObjectAlreadyExists { .. }));

    // The session still works after the rejected call
    let report = session.run_to_completion();
    assert!(report.outcome.is_committed());
}

#[test]
fn member_statuses_follow_the_outcome() {
    init_logging();

    // Committed run: the provider saw every member
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    let mut session = Session::begin_backup(
        test_config(),
        Arc::clone(&provider) as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();
    session.add_volume(VolumeName::from("src-2")).unwrap();
    assert!(session.run_to_completion().outcome.is_committed());
    assert_eq!(provider.committed_members(), 2);

    // Aborted run: no member committed
    let provider = MockProvider::with_volumes(vec![("diff-a", 10_000, 10_000)]);
    provider.fail_commit_for("src-1", NativeStatus::UNEXPECTED_PROVIDER_ERROR);
    let mut session = Session::begin_backup(
        test_config(),
        Arc::clone(&provider) as Arc<dyn shadowset::Provider>,
        vec![],
    )
    .unwrap();
    session.add_volume(VolumeName::from("src-1")).unwrap();
    let report = session.run_to_completion();
    assert!(!report.outcome.is_committed());
    assert_eq!(provider.committed_members(), 0);
}
