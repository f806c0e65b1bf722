// Catalogue-backed repository. Records live in memory and, when a file is
// configured, are rewritten to it as JSON after every change.
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::BackupRepository;
use crate::config::Catalogue;
use crate::errors::Result;
use crate::models::{BackupRecord, BackupStatus, Destination, EmailConfig, Job, ScheduleType, Source};

pub struct MemoryRepository {
    catalogue: Catalogue,
    records: Mutex<Vec<BackupRecord>>,
    records_file: Option<PathBuf>,
}

impl MemoryRepository {
    pub fn new(catalogue: Catalogue) -> Self {
        Self {
            catalogue,
            records: Mutex::new(Vec::new()),
            records_file: None,
        }
    }

    /// Loads previously persisted records from `records_file` if it exists.
    pub async fn open(catalogue: Catalogue, records_file: Option<PathBuf>) -> Result<Self> {
        let mut records = Vec::new();
        if let Some(path) = &records_file {
            if tokio::fs::try_exists(path).await? {
                let content = tokio::fs::read(path).await?;
                records = serde_json::from_slice(&content)?;
                info!("Loaded {} backup records from {}", records.len(), path.display());
            }
        }
        Ok(Self {
            catalogue,
            records: Mutex::new(records),
            records_file,
        })
    }

    async fn persist(&self, records: &[BackupRecord]) -> Result<()> {
        let Some(path) = &self.records_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl BackupRepository for MemoryRepository {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.catalogue.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn find_active_scheduled_jobs(&self) -> Result<Vec<Job>> {
        Ok(self
            .catalogue
            .jobs
            .iter()
            .filter(|j| j.active && j.schedule_type != ScheduleType::Manual)
            .cloned()
            .collect())
    }

    async fn find_active_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.catalogue.jobs.iter().filter(|j| j.active).cloned().collect())
    }

    async fn find_source_by_id(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(self.catalogue.sources.iter().find(|s| s.id == id).cloned())
    }

    async fn find_destination_by_id(&self, id: Uuid) -> Result<Option<Destination>> {
        Ok(self.catalogue.destinations.iter().find(|d| d.id == id).cloned())
    }

    async fn find_email_config_by_id(&self, id: Uuid) -> Result<Option<EmailConfig>> {
        Ok(self.catalogue.email_configs.iter().find(|c| c.id == id).cloned())
    }

    async fn find_record_by_id(&self, id: Uuid) -> Result<Option<BackupRecord>> {
        Ok(self.records.lock().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_records_older_than(
        &self,
        job_id: Uuid,
        cutoff: NaiveDateTime,
        status: BackupStatus,
    ) -> Result<Vec<BackupRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.job_id == job_id && r.status == status && r.timestamp < cutoff)
            .cloned()
            .collect())
    }

    async fn list_records(&self, job_id: Uuid) -> Result<Vec<BackupRecord>> {
        let mut records: Vec<BackupRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn save_record(&self, record: &BackupRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.persist(&records).await
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.lock().await;
        records.retain(|r| r.id != id);
        self.persist(&records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;
    use crate::test_support::{job_with, local_destination, source_with};
    use chrono::TimeDelta;

    fn record_at(job_id: Uuid, timestamp: NaiveDateTime, status: BackupStatus) -> BackupRecord {
        let mut record = BackupRecord::begin(job_id, Some(Uuid::new_v4()), Some(("a.sql", 1)));
        record.timestamp = timestamp;
        match status {
            BackupStatus::Success => record.mark_success("a.sql".into()),
            BackupStatus::Failed => record.mark_failed("boom"),
            BackupStatus::InProgress => {}
        }
        record
    }

    #[tokio::test]
    async fn manual_and_inactive_jobs_are_not_scheduled() -> anyhow::Result<()> {
        let source = source_with(DatabaseType::Postgres, "pg_dump");
        let destination = local_destination(std::path::Path::new("/backups"));
        let daily = job_with(source.clone(), vec![destination.clone()]);
        let mut manual = job_with(source.clone(), vec![destination.clone()]);
        manual.schedule_type = ScheduleType::Manual;
        let mut inactive = job_with(source, vec![destination]);
        inactive.active = false;

        let repository = MemoryRepository::new(Catalogue {
            jobs: vec![daily.clone(), manual.clone(), inactive],
            ..Catalogue::default()
        });
        let scheduled = repository.find_active_scheduled_jobs().await?;
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id, daily.id);
        assert_eq!(repository.find_active_jobs().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn older_than_filters_on_status_and_cutoff() -> anyhow::Result<()> {
        let repository = MemoryRepository::new(Catalogue::default());
        let job_id = Uuid::new_v4();
        let now = chrono::Local::now().naive_local();
        let old = record_at(job_id, now - TimeDelta::days(10), BackupStatus::Success);
        let old_failed = record_at(job_id, now - TimeDelta::days(10), BackupStatus::Failed);
        let fresh = record_at(job_id, now, BackupStatus::Success);
        for record in [&old, &old_failed, &fresh] {
            repository.save_record(record).await?;
        }

        let expired = repository
            .find_records_older_than(job_id, now - TimeDelta::days(7), BackupStatus::Success)
            .await?;
        assert_eq!(expired, vec![old.clone()]);

        let history = repository.list_records(job_id).await?;
        assert_eq!(history[0].id, fresh.id);
        assert_eq!(history.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn records_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("state/records.json");
        let job_id = Uuid::new_v4();

        let repository = MemoryRepository::open(Catalogue::default(), Some(file.clone())).await?;
        let mut record = BackupRecord::begin(job_id, None, None);
        repository.save_record(&record).await?;
        record.mark_failed("CRITICAL DUMP FAILURE: exit 1");
        repository.save_record(&record).await?;

        let reopened = MemoryRepository::open(Catalogue::default(), Some(file)).await?;
        let records = reopened.list_records(job_id).await?;
        assert_eq!(records, vec![record.clone()]);

        reopened.delete_record(record.id).await?;
        assert!(reopened.find_record_by_id(record.id).await?.is_none());
        Ok(())
    }
}
