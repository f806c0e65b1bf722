use chrono::Local;
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{BackupEngine, JobRun, db_dump};
use crate::errors::{AppError, Result};
use crate::live_log::LogPublisher;
use crate::models::{BackupRecord, Destination, Job};
use crate::utils::naming;

/// Result of landing the dump on one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success { remote_path: String },
    Failure { reason: String },
}

impl BackupEngine {
    /// Dumps the job's source once and ships the file to every destination.
    ///
    /// A dump failure records a single FAILED record without destination and
    /// aborts. Upload failures are recorded per destination and never stop the
    /// remaining destinations. The scratch dump is removed on every path.
    pub async fn execute_job(&self, job_id: Uuid) -> Result<JobRun> {
        let job = self
            .repository
            .find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;
        if job.destinations.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "job '{}' has no destinations configured",
                job.name
            )));
        }

        tokio::fs::create_dir_all(&self.scratch_dir).await.map_err(|e| {
            AppError::Backup(format!(
                "failed to create scratch directory {}: {e}",
                self.scratch_dir.display()
            ))
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("backup-")
            .tempdir_in(&self.scratch_dir)?;
        let filename = naming::dump_filename(&job.source.name, Local::now().naive_local());
        let dump_path = scratch.path().join(&filename);
        let log = self.live_log.publisher(job.id);

        info!("🚀 Starting backup of job '{}' ({})", job.name, job.source.name);
        let size_bytes = match db_dump::dump_to_file(&job.source, &dump_path, &log).await {
            Ok(size) => size,
            Err(e) => {
                error!("Dump for job '{}' failed: {}", job.name, e);
                let mut record = BackupRecord::begin(job.id, None, None);
                record.mark_failed(format!("CRITICAL DUMP FAILURE: {e}"));
                self.store(&record).await;
                self.notifier.notify(&job, &record);
                return Err(e);
            }
        };

        let mut run = JobRun {
            job_id: job.id,
            filename: filename.clone(),
            size_bytes,
            outcomes: Vec::with_capacity(job.destinations.len()),
            records: Vec::with_capacity(job.destinations.len()),
        };
        for destination in &job.destinations {
            let (record, outcome) = self
                .ship_to(&job, destination, &dump_path, (&filename, size_bytes), &log)
                .await;
            run.outcomes.push((destination.id, outcome));
            run.records.push(record);
        }

        info!(
            "✅ Backup of job '{}' done: {} succeeded, {} failed",
            job.name,
            run.succeeded(),
            run.failed()
        );
        Ok(run)
    }

    async fn ship_to(
        &self,
        job: &Job,
        destination: &Destination,
        dump_path: &Path,
        file: (&str, u64),
        log: &LogPublisher,
    ) -> (BackupRecord, UploadOutcome) {
        let mut record = BackupRecord::begin(job.id, Some(destination.id), Some(file));
        self.store(&record).await;
        log.line(format!(
            "Sending to destination: {} ({})",
            destination.name, destination.destination_type
        ));

        let outcome = match self.storage.upload(dump_path, &job.source, destination).await {
            Ok(remote_path) => {
                log.line(format!("Upload completed: {remote_path}"));
                record.mark_success(remote_path.clone());
                UploadOutcome::Success { remote_path }
            }
            Err(e) => {
                warn!("Upload of job '{}' to '{}' failed: {}", job.name, destination.name, e);
                log.line(format!("Upload to {} failed: {e}", destination.name));
                let reason = format!("CRITICAL UPLOAD FAILURE: {e}");
                record.mark_failed(reason.clone());
                UploadOutcome::Failure { reason }
            }
        };

        self.store(&record).await;
        self.notifier.notify(job, &record);
        (record, outcome)
    }

    async fn store(&self, record: &BackupRecord) {
        if let Err(e) = self.repository.save_record(record).await {
            error!("Failed to persist backup record {}: {}", record.id, e);
        }
    }
}
