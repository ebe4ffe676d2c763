//! Mock writer/provider collaborators for lifecycle tests

use shadowset::{
    BackupOutcomeKind, DiffVolumeDescriptor, NativeResult, NativeStatus, Provider,
    SnapshotRequest, VolumeName, Writer, WriterMetadata,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Writer with scripted freeze failures and call counters
pub struct MockWriter {
    name: &'static str,
    freeze_failures: AtomicU32,
    freeze_status: NativeStatus,
    notify_fails_with: Mutex<Option<NativeStatus>>,
    freeze_calls: AtomicU32,
    thaw_calls: AtomicU32,
    last_outcome: Mutex<Option<BackupOutcomeKind>>,
}

impl MockWriter {
    pub fn healthy(name: &'static str) -> Arc<Self> {
        Self::flaky(name, 0, NativeStatus::WRITER_TIMED_OUT)
    }

    /// A writer whose first `failures` freeze calls fail with `status`
    pub fn flaky(name: &'static str, failures: u32, status: NativeStatus) -> Arc<Self> {
        Arc::new(MockWriter {
            name,
            freeze_failures: AtomicU32::new(failures),
            freeze_status: status,
            notify_fails_with: Mutex::new(None),
            freeze_calls: AtomicU32::new(0),
            thaw_calls: AtomicU32::new(0),
            last_outcome: Mutex::new(None),
        })
    }

    pub fn fail_notify_with(&self, status: NativeStatus) {
        *self.notify_fails_with.lock().unwrap() = Some(status);
    }

    pub fn freeze_calls(&self) -> u32 {
        self.freeze_calls.load(Ordering::Relaxed)
    }

    pub fn thaw_calls(&self) -> u32 {
        self.thaw_calls.load(Ordering::Relaxed)
    }

    pub fn last_outcome(&self) -> Option<BackupOutcomeKind> {
        *self.last_outcome.lock().unwrap()
    }
}

impl Writer for MockWriter {
    fn metadata(&self) -> NativeResult<WriterMetadata> {
        Ok(WriterMetadata::new(self.name))
    }

    fn freeze(&self) -> NativeResult<()> {
        self.freeze_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.freeze_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.freeze_failures.store(remaining - 1, Ordering::Relaxed);
            Err(self.freeze_status)
        } else {
            Ok(())
        }
    }

    fn thaw(&self) -> NativeResult<()> {
        self.thaw_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn notify_backup_complete(&self, outcome: BackupOutcomeKind) -> NativeResult<()> {
        *self.last_outcome.lock().unwrap() = Some(outcome);
        match *self.notify_fails_with.lock().unwrap() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

/// Provider with a fixed volume list and scripted per-volume commit failures
pub struct MockProvider {
    volumes: Vec<DiffVolumeDescriptor>,
    commit_fails_for: Mutex<Option<(VolumeName, NativeStatus)>>,
    commit_successes: AtomicU32,
}

impl MockProvider {
    pub fn with_volumes(volumes: Vec<(&str, u64, u64)>) -> Arc<Self> {
        Arc::new(MockProvider {
            volumes: volumes
                .into_iter()
                .map(|(name, free, total)| {
                    DiffVolumeDescriptor::new(VolumeName::from(name), name, free, total)
                })
                .collect(),
            commit_fails_for: Mutex::new(None),
            commit_successes: AtomicU32::new(0),
        })
    }

    /// Make the snapshot of `source_volume` fail with `status`
    pub fn fail_commit_for(&self, source_volume: &str, status: NativeStatus) {
        *self.commit_fails_for.lock().unwrap() = Some((VolumeName::from(source_volume), status));
    }

    /// Number of member snapshots successfully created
    pub fn committed_members(&self) -> u32 {
        self.commit_successes.load(Ordering::Relaxed)
    }
}

impl Provider for MockProvider {
    fn query_volumes(&self) -> NativeResult<Vec<DiffVolumeDescriptor>> {
        Ok(self.volumes.clone())
    }

    fn create_diff_area(&self, _volume: &VolumeName, _size_hint: u64) -> NativeResult<()> {
        Ok(())
    }

    fn commit_snapshot(&self, request: &SnapshotRequest) -> NativeResult<()> {
        if let Some((volume, status)) = &*self.commit_fails_for.lock().unwrap() {
            if &request.source_volume == volume {
                return Err(*status);
            }
        }
        self.commit_successes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
