// Fixtures and fakes shared by the unit tests.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Local, NaiveTime};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backup::BackupEngine;
use crate::config::Catalogue;
use crate::errors::{AppError, Result};
use crate::live_log::LiveLog;
use crate::models::{
    BackupRecord, DatabaseType, Destination, DestinationType, EmailConfig, Job, NotificationPolicy,
    ScheduleType, Source,
};
use crate::notification::{Mailer, Notifier, OutgoingMail};
use crate::repository::memory::MemoryRepository;
use crate::storage::Storage;
use crate::utils::naming;

/// Writes an executable shell script standing in for an external tool.
#[cfg(unix)]
pub fn write_tool(dir: &Path, name: &str, body: &str) -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

pub fn source_with(database_type: DatabaseType, dump_tool_path: &str) -> Source {
    Source {
        id: Uuid::new_v4(),
        name: "app-db".into(),
        database_type,
        db_host: "db.internal".into(),
        db_port: None,
        db_name: "app".into(),
        db_user: "backup".into(),
        db_password: "secret".into(),
        dump_tool_path: dump_tool_path.into(),
    }
}

pub fn local_destination(root: &Path) -> Destination {
    Destination {
        id: Uuid::new_v4(),
        name: "disk".into(),
        destination_type: DestinationType::LocalDisk,
        endpoint: root.to_string_lossy().into_owned(),
        region: None,
        endpoint_url: None,
        access_key: None,
        secret_key: None,
    }
}

pub fn email_config() -> EmailConfig {
    EmailConfig {
        id: Uuid::new_v4(),
        name: "ops mail".into(),
        host: "smtp.acme.io".into(),
        port: 587,
        username: "backup@acme.io".into(),
        password: "app-password".into(),
    }
}

/// Active daily job at 02:00, seven days of retention, no notifications.
pub fn job_with(source: Source, destinations: Vec<Destination>) -> Job {
    Job {
        id: Uuid::new_v4(),
        name: "nightly".into(),
        source,
        destinations,
        schedule_type: ScheduleType::Daily,
        backup_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        weekly_day: None,
        retention_days: 7,
        active: true,
        notification_policy: NotificationPolicy::Never,
        notification_recipients: None,
        email_config_id: None,
    }
}

/// Storage fake that records calls and fails every operation on chosen destination types.
#[derive(Default)]
pub struct RecordingStorage {
    failing: HashSet<DestinationType>,
    uploads: Mutex<Vec<Uuid>>,
    downloads: Mutex<Vec<Uuid>>,
    deletes: Mutex<Vec<Uuid>>,
}

impl RecordingStorage {
    pub const DOWNLOAD_CONTENT: &'static str = "SELECT 1;\n";

    pub fn failing_on(destination_type: DestinationType) -> Self {
        Self {
            failing: HashSet::from([destination_type]),
            ..Self::default()
        }
    }

    fn check(&self, destination: &Destination) -> Result<()> {
        if self.failing.contains(&destination.destination_type) {
            return Err(AppError::Storage(format!(
                "network unreachable for {}",
                destination.name
            )));
        }
        Ok(())
    }

    /// Destination ids uploads were attempted against.
    pub fn uploads(&self) -> Vec<Uuid> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<Uuid> {
        self.downloads.lock().unwrap().clone()
    }

    /// Record ids whose remote object was deleted.
    pub fn deleted(&self) -> Vec<Uuid> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn upload(&self, file: &Path, source: &Source, destination: &Destination) -> Result<String> {
        self.uploads.lock().unwrap().push(destination.id);
        self.check(destination)?;
        let name = file.file_name().unwrap().to_string_lossy();
        Ok(naming::remote_path(&source.name, &name, Local::now().date_naive()))
    }

    async fn download(
        &self,
        record: &BackupRecord,
        destination: &Destination,
        scratch_dir: &Path,
    ) -> Result<PathBuf> {
        self.downloads.lock().unwrap().push(record.id);
        self.check(destination)?;
        let target = scratch_dir.join(record.filename.clone().unwrap_or_else(|| "dump.sql".into()));
        tokio::fs::write(&target, Self::DOWNLOAD_CONTENT).await?;
        Ok(target)
    }

    async fn delete(&self, record: &BackupRecord, destination: &Destination) -> Result<()> {
        self.check(destination)?;
        self.deletes.lock().unwrap().push(record.id);
        Ok(())
    }

    async fn test_connection(&self, destination: &Destination) -> Result<()> {
        self.check(destination)
    }
}

/// Mailer fake keeping every message it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    fail: bool,
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, _config: &EmailConfig, mail: &OutgoingMail) -> Result<()> {
        if self.fail {
            return Err(AppError::Mail("relay refused".into()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// An engine wired to a memory repository, a recording storage and a recording mailer.
pub struct Harness {
    pub engine: Arc<BackupEngine>,
    pub storage: Arc<RecordingStorage>,
    pub mailer: Arc<RecordingMailer>,
    pub scratch: TempDir,
    worker: JoinHandle<()>,
}

impl Harness {
    pub fn new(
        jobs: Vec<Job>,
        email_configs: Vec<EmailConfig>,
        storage: RecordingStorage,
    ) -> anyhow::Result<Self> {
        let catalogue = Catalogue {
            sources: jobs.iter().map(|j| j.source.clone()).collect(),
            destinations: jobs.iter().flat_map(|j| j.destinations.clone()).collect(),
            email_configs,
            jobs,
        };
        let repository = Arc::new(MemoryRepository::new(catalogue));
        let storage = Arc::new(storage);
        let mailer = Arc::new(RecordingMailer::default());
        let (notifier, worker) = Notifier::start(repository.clone(), mailer.clone());
        let scratch = tempfile::tempdir()?;

        let engine = Arc::new(BackupEngine::new(
            repository,
            storage.clone(),
            notifier,
            LiveLog::new(64),
            scratch.path().to_path_buf(),
        ));
        Ok(Self {
            engine,
            storage,
            mailer,
            scratch,
            worker,
        })
    }

    /// Drops the engine, waits for queued notifications and returns what was sent.
    pub async fn finish(self) -> anyhow::Result<Vec<OutgoingMail>> {
        let Harness {
            engine,
            mailer,
            worker,
            ..
        } = self;
        drop(engine);
        worker.await?;
        Ok(mailer.sent())
    }
}
