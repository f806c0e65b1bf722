//! Persistence boundary consumed by the engine, the scheduler and the notifier.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{BackupRecord, BackupStatus, Destination, EmailConfig, Job, Source};

#[async_trait]
pub trait BackupRepository: Send + Sync {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    /// Active jobs whose schedule is not `Manual`.
    async fn find_active_scheduled_jobs(&self) -> Result<Vec<Job>>;

    async fn find_active_jobs(&self) -> Result<Vec<Job>>;

    async fn find_source_by_id(&self, id: Uuid) -> Result<Option<Source>>;

    async fn find_destination_by_id(&self, id: Uuid) -> Result<Option<Destination>>;

    async fn find_email_config_by_id(&self, id: Uuid) -> Result<Option<EmailConfig>>;

    async fn find_record_by_id(&self, id: Uuid) -> Result<Option<BackupRecord>>;

    /// Records of `job_id` in `status` with a timestamp strictly before `cutoff`.
    async fn find_records_older_than(
        &self,
        job_id: Uuid,
        cutoff: NaiveDateTime,
        status: BackupStatus,
    ) -> Result<Vec<BackupRecord>>;

    /// All records of a job, newest first.
    async fn list_records(&self, job_id: Uuid) -> Result<Vec<BackupRecord>>;

    /// Inserts or replaces the record with the same id.
    async fn save_record(&self, record: &BackupRecord) -> Result<()>;

    async fn delete_record(&self, id: Uuid) -> Result<()>;
}
