//! Domain types shared by the scheduler, the execution engine and the storage layer.

use chrono::{Local, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    #[serde(rename = "POSTGRES")]
    Postgres,
    #[serde(rename = "MYSQL")]
    MySql,
    #[serde(rename = "MARIADB")]
    MariaDb,
    #[serde(rename = "ORACLE")]
    Oracle,
    #[serde(rename = "SQLSERVER")]
    SqlServer,
    #[serde(rename = "MONGODB")]
    MongoDb,
    #[serde(rename = "H2")]
    H2,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseType::Postgres => "POSTGRES",
            DatabaseType::MySql => "MYSQL",
            DatabaseType::MariaDb => "MARIADB",
            DatabaseType::Oracle => "ORACLE",
            DatabaseType::SqlServer => "SQLSERVER",
            DatabaseType::MongoDb => "MONGODB",
            DatabaseType::H2 => "H2",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationType {
    LocalDisk,
    AmazonS3,
    GoogleCloudStorage,
    Ftp,
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DestinationType::LocalDisk => "LOCAL_DISK",
            DestinationType::AmazonS3 => "AMAZON_S3",
            DestinationType::GoogleCloudStorage => "GOOGLE_CLOUD_STORAGE",
            DestinationType::Ftp => "FTP",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    Daily,
    Weekly,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPolicy {
    #[default]
    Never,
    Always,
    OnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    InProgress,
    Success,
    Failed,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupStatus::InProgress => "IN_PROGRESS",
            BackupStatus::Success => "SUCCESS",
            BackupStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A logical database to back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub database_type: DatabaseType,
    pub db_host: String,
    #[serde(default)]
    pub db_port: Option<u16>,
    pub db_name: String,
    pub db_user: String,
    #[serde(default)]
    pub db_password: String,
    pub dump_tool_path: String,
}

impl Source {
    /// Port to pass on the command line, if one was configured.
    pub fn explicit_port(&self) -> Option<u16> {
        self.db_port.filter(|p| *p > 0)
    }
}

/// A storage target a dump gets shipped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub destination_type: DestinationType,
    /// Bucket name, directory root or FTP host depending on the type.
    pub endpoint: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for S3-compatible stores (MinIO, Spaces, ...).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl Destination {
    pub fn requires_credentials(&self) -> bool {
        self.destination_type != DestinationType::LocalDisk
    }

    /// Access/secret pair, rejecting blanks.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let access = self.access_key.as_deref().filter(|s| !s.trim().is_empty());
        let secret = self.secret_key.as_deref().filter(|s| !s.trim().is_empty());
        match (access, secret) {
            (Some(access), Some(secret)) => Ok((access, secret)),
            _ => Err(AppError::InvalidInput(format!(
                "destination '{}' ({}) requires an access key and a secret key",
                self.name, self.destination_type
            ))),
        }
    }
}

/// SMTP account used to send job notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// One source bound to its destinations, with a trigger and a retention window.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub source: Source,
    pub destinations: Vec<Destination>,
    pub schedule_type: ScheduleType,
    pub backup_time: NaiveTime,
    /// Restricts `Weekly` jobs to one weekday. `None` keeps them firing every day.
    pub weekly_day: Option<Weekday>,
    pub retention_days: u32,
    pub active: bool,
    pub notification_policy: NotificationPolicy,
    pub notification_recipients: Option<String>,
    pub email_config_id: Option<Uuid>,
}

/// Outcome of landing one dump on one destination.
///
/// A dump-stage failure produces a single record without a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub destination_id: Option<Uuid>,
    pub filename: Option<String>,
    pub remote_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub timestamp: NaiveDateTime,
    pub status: BackupStatus,
    pub log_summary: Option<String>,
}

impl BackupRecord {
    /// Opens a record in `IN_PROGRESS`, stamped with the current local time.
    pub fn begin(job_id: Uuid, destination_id: Option<Uuid>, file: Option<(&str, u64)>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            destination_id,
            filename: file.map(|(name, _)| name.to_string()),
            remote_path: None,
            size_bytes: file.map(|(_, size)| size),
            timestamp: Local::now().naive_local(),
            status: BackupStatus::InProgress,
            log_summary: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != BackupStatus::InProgress
    }

    pub fn mark_success(&mut self, remote_path: String) {
        debug_assert!(!self.is_terminal(), "record {} already terminal", self.id);
        self.log_summary = Some(format!("Backup finished successfully. Path: {remote_path}"));
        self.remote_path = Some(remote_path);
        self.status = BackupStatus::Success;
    }

    pub fn mark_failed(&mut self, summary: impl Into<String>) {
        debug_assert!(!self.is_terminal(), "record {} already terminal", self.id);
        self.log_summary = Some(summary.into());
        self.status = BackupStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_moves_from_in_progress_to_terminal() {
        let mut record = BackupRecord::begin(Uuid::new_v4(), Some(Uuid::new_v4()), Some(("a.sql", 42)));
        assert_eq!(record.status, BackupStatus::InProgress);
        assert_eq!(record.size_bytes, Some(42));
        assert!(!record.is_terminal());

        record.mark_success("src/2025-11-01/a.sql".into());
        assert!(record.is_terminal());
        assert_eq!(record.remote_path.as_deref(), Some("src/2025-11-01/a.sql"));
        assert!(record.log_summary.unwrap().contains("src/2025-11-01/a.sql"));
    }

    #[test]
    fn credentials_reject_blank_values() {
        let mut destination: Destination = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "bucket",
            "type": "AMAZON_S3",
            "endpoint": "my-bucket",
            "access_key": "AKIA",
            "secret_key": "  "
        }))
        .unwrap();
        assert!(destination.requires_credentials());
        assert!(destination.credentials().is_err());

        destination.secret_key = Some("s3cr3t".into());
        assert_eq!(destination.credentials().unwrap(), ("AKIA", "s3cr3t"));
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(serde_json::to_value(BackupStatus::InProgress).unwrap(), json!("IN_PROGRESS"));
        assert_eq!(serde_json::to_value(NotificationPolicy::OnFailure).unwrap(), json!("ON_FAILURE"));
        let engine: DatabaseType = serde_json::from_value(json!("MARIADB")).unwrap();
        assert_eq!(engine, DatabaseType::MariaDb);
        assert_eq!(DestinationType::GoogleCloudStorage.to_string(), "GOOGLE_CLOUD_STORAGE");
    }
}
