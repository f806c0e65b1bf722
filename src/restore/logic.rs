use tracing::info;
use uuid::Uuid;

use super::db_restore;
use crate::backup::BackupEngine;
use crate::errors::{AppError, Result};
use crate::models::BackupStatus;

impl BackupEngine {
    /// Restores the database of a record's job from the object the record points at.
    ///
    /// Only SUCCESS records are restorable; anything else is refused before any
    /// download or process spawn. The downloaded copy is removed on every path.
    pub async fn restore_backup(&self, record_id: Uuid) -> Result<()> {
        let record = self
            .repository
            .find_record_by_id(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("backup record {record_id}")))?;
        if record.status != BackupStatus::Success {
            return Err(AppError::Conflict(format!(
                "only SUCCESS backups can be restored, record {} is {}",
                record.id, record.status
            )));
        }

        let destination_id = record.destination_id.ok_or_else(|| {
            AppError::InvalidInput(format!("backup record {} has no destination", record.id))
        })?;
        let destination = self
            .repository
            .find_destination_by_id(destination_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("destination {destination_id}")))?;
        let job = self
            .repository
            .find_job_by_id(record.job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", record.job_id)))?;

        let command = db_restore::build_restore_command(&job.source)?;

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(&self.scratch_dir)?;

        info!(
            "🔄 Restoring '{}' from {} on '{}'",
            job.source.name,
            record.filename.as_deref().unwrap_or("-"),
            destination.name
        );
        let dump_file = self
            .storage
            .download(&record, &destination, scratch.path())
            .await?;
        let log = self.live_log.publisher(job.id);
        db_restore::restore_from_file(&command, &dump_file, &log).await?;

        info!("✅ Restore of '{}' finished", job.source.name);
        Ok(())
    }
}
