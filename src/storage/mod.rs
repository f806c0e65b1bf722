//! Storage backends.
//!
//! [`Storage`] is the uniform upload/download/delete surface the execution engine
//! and the retention sweep talk to. [`StorageManager`] dispatches it onto local
//! disk, S3-compatible object storage or FTP depending on the destination type.

pub mod ftp;
pub mod local;
pub mod s3;

use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{AppError, Result};
use crate::models::{BackupRecord, Destination, DestinationType, Source};
use crate::utils::naming;

/// Storage backend trait
#[async_trait]
pub trait Storage: Send + Sync {
    /// Ship `file` to `destination`, returning the remote path it landed under.
    async fn upload(&self, file: &Path, source: &Source, destination: &Destination) -> Result<String>;

    /// Fetch the object behind `record` into `scratch_dir`, returning the local file.
    async fn download(
        &self,
        record: &BackupRecord,
        destination: &Destination,
        scratch_dir: &Path,
    ) -> Result<PathBuf>;

    /// Remove the object behind `record`.
    async fn delete(&self, record: &BackupRecord, destination: &Destination) -> Result<()>;

    /// Validate that the destination is usable with its current settings.
    async fn test_connection(&self, destination: &Destination) -> Result<()>;
}

/// Default [`Storage`] implementation dispatching on [`DestinationType`].
#[derive(Debug, Default, Clone)]
pub struct StorageManager;

impl StorageManager {
    pub fn new() -> Self {
        Self
    }
}

fn remote_path_of(record: &BackupRecord) -> Result<&str> {
    record.remote_path.as_deref().ok_or_else(|| {
        AppError::InvalidInput(format!("backup record {} has no remote path", record.id))
    })
}

#[async_trait]
impl Storage for StorageManager {
    async fn upload(&self, file: &Path, source: &Source, destination: &Destination) -> Result<String> {
        let size = tokio::fs::metadata(file).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(AppError::InvalidInput(format!(
                "dump file {} is missing or empty, refusing to upload",
                file.display()
            )));
        }
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::InvalidInput(format!("{} has no file name", file.display())))?;
        let remote = naming::remote_path(&source.name, &file_name, Local::now().date_naive());

        info!(
            "Uploading {} to {} destination '{}' as {}",
            file.display(),
            destination.destination_type,
            destination.name,
            remote
        );
        match destination.destination_type {
            DestinationType::LocalDisk => local::upload(&destination.endpoint, file, &remote).await,
            DestinationType::AmazonS3 | DestinationType::GoogleCloudStorage => {
                let backend = s3::S3Backend::connect(destination).await?;
                backend.put_file(file, &remote).await?;
                Ok(remote)
            }
            DestinationType::Ftp => ftp::upload(destination, file, &remote).await,
        }
    }

    async fn download(
        &self,
        record: &BackupRecord,
        destination: &Destination,
        scratch_dir: &Path,
    ) -> Result<PathBuf> {
        let remote = remote_path_of(record)?;
        let file_name = record
            .filename
            .clone()
            .unwrap_or_else(|| format!("{}.sql", record.id));
        tokio::fs::create_dir_all(scratch_dir).await?;
        let target = scratch_dir.join(file_name);

        match destination.destination_type {
            DestinationType::LocalDisk => local::download(&destination.endpoint, remote, &target).await?,
            DestinationType::AmazonS3 | DestinationType::GoogleCloudStorage => {
                let backend = s3::S3Backend::connect(destination).await?;
                backend.get_file(remote, &target).await?;
            }
            DestinationType::Ftp => ftp::download(destination, remote, &target).await?,
        }

        let actual = tokio::fs::metadata(&target).await.map(|m| m.len()).ok();
        match (actual, record.size_bytes) {
            (None, _) => Err(AppError::Storage(format!(
                "download from {} produced no file",
                destination.name
            ))),
            (Some(actual), Some(expected)) if actual != expected => Err(AppError::Storage(format!(
                "downloaded file is corrupted: expected {expected} bytes, got {actual}"
            ))),
            _ => Ok(target),
        }
    }

    async fn delete(&self, record: &BackupRecord, destination: &Destination) -> Result<()> {
        let remote = remote_path_of(record)?;
        info!(
            "Deleting {} from {} destination '{}'",
            remote, destination.destination_type, destination.name
        );
        match destination.destination_type {
            DestinationType::LocalDisk => local::delete(&destination.endpoint, remote).await,
            DestinationType::AmazonS3 | DestinationType::GoogleCloudStorage => {
                s3::S3Backend::connect(destination).await?.delete_object(remote).await
            }
            DestinationType::Ftp => ftp::delete(destination, remote).await,
        }
    }

    async fn test_connection(&self, destination: &Destination) -> Result<()> {
        match destination.destination_type {
            DestinationType::LocalDisk => local::test_connection(&destination.endpoint).await,
            DestinationType::AmazonS3 | DestinationType::GoogleCloudStorage => {
                s3::S3Backend::connect(destination).await?.check_bucket().await
            }
            DestinationType::Ftp => ftp::test_connection(destination).await,
        }
    }
}
