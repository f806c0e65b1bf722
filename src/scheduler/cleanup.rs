// Retention sweep: expired SUCCESS records lose their remote object, then the record.
use chrono::{NaiveDateTime, TimeDelta};
use tracing::{error, info, warn};

use crate::errors::{AppError, Result};
use crate::models::{BackupRecord, BackupStatus};
use crate::repository::BackupRepository;
use crate::storage::Storage;

/// Sweeps every active job once, returning the number of records removed.
pub async fn run_cleanup(
    repository: &dyn BackupRepository,
    storage: &dyn Storage,
    now: NaiveDateTime,
) -> usize {
    let jobs = match repository.find_active_jobs().await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("Retention cleanup could not load jobs: {}", e);
            return 0;
        }
    };

    let mut removed = 0;
    for job in jobs {
        let Some(cutoff) = TimeDelta::try_days(i64::from(job.retention_days))
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            error!(
                "Retention of job '{}' ({} days) is out of range, skipping",
                job.name, job.retention_days
            );
            continue;
        };
        let expired = match repository
            .find_records_older_than(job.id, cutoff, BackupStatus::Success)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!("Retention cleanup could not list records of job '{}': {}", job.name, e);
                continue;
            }
        };

        for record in expired {
            let name = record.filename.clone().unwrap_or_else(|| record.id.to_string());
            match expire_record(repository, storage, &record).await {
                Ok(()) => {
                    removed += 1;
                    info!("Expired backup {} of job '{}' removed", name, job.name);
                }
                Err(e) => error!("Failed to expire backup {}: {}", name, e),
            }
        }
    }
    removed
}

async fn expire_record(
    repository: &dyn BackupRepository,
    storage: &dyn Storage,
    record: &BackupRecord,
) -> Result<()> {
    let destination_id = record.destination_id.ok_or_else(|| {
        AppError::InvalidInput(format!("record {} has no destination", record.id))
    })?;
    let destination = repository
        .find_destination_by_id(destination_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("destination {destination_id}")))?;

    storage.delete(record, &destination).await?;
    if let Err(e) = repository.delete_record(record.id).await {
        warn!("Remote copy of record {} is gone but the record remains", record.id);
        return Err(e);
    }
    Ok(())
}
