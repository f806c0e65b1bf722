mod logic; // execute_job: dump, per-destination upload, records, notifications
pub(crate) mod db_dump; // Engine-specific dump command construction and execution

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::live_log::LiveLog;
use crate::models::BackupRecord;
use crate::notification::Notifier;
use crate::repository::BackupRepository;
use crate::storage::Storage;

pub use logic::UploadOutcome;

/// Coordinates one job invocation (and restores) across the dump adapter,
/// the storage backends, the repository and the notifier.
pub struct BackupEngine {
    pub(crate) repository: Arc<dyn BackupRepository>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) notifier: Notifier,
    pub(crate) live_log: LiveLog,
    pub(crate) scratch_dir: PathBuf,
}

impl BackupEngine {
    pub fn new(
        repository: Arc<dyn BackupRepository>,
        storage: Arc<dyn Storage>,
        notifier: Notifier,
        live_log: LiveLog,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            repository,
            storage,
            notifier,
            live_log,
            scratch_dir,
        }
    }

    pub fn repository(&self) -> &Arc<dyn BackupRepository> {
        &self.repository
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn live_log(&self) -> &LiveLog {
        &self.live_log
    }
}

/// What one `execute_job` call produced.
#[derive(Debug)]
pub struct JobRun {
    pub job_id: Uuid,
    pub filename: String,
    pub size_bytes: u64,
    /// One entry per destination, in the job's destination order.
    pub outcomes: Vec<(Uuid, UploadOutcome)>,
    pub records: Vec<BackupRecord>,
}

impl JobRun {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, UploadOutcome::Success { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}
