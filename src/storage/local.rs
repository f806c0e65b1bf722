//! Local disk backend.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{AppError, Result};

/// Absolute remote paths are used as stored; relative ones live under `endpoint`.
fn resolve(endpoint: &str, remote_path: &str) -> PathBuf {
    let path = Path::new(remote_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new(endpoint).join(path)
    }
}

/// Copies `file` to `<endpoint>/<remote_path>`, returning the full destination path.
pub async fn upload(endpoint: &str, file: &Path, remote_path: &str) -> Result<String> {
    let target = Path::new(endpoint).join(remote_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            AppError::Storage(format!("failed to create directory {}: {e}", parent.display()))
        })?;
    }
    fs::copy(file, &target).await.map_err(|e| {
        AppError::Storage(format!("failed to copy dump to {}: {e}", target.display()))
    })?;
    Ok(target.to_string_lossy().into_owned())
}

pub async fn download(endpoint: &str, remote_path: &str, target: &Path) -> Result<()> {
    let stored = resolve(endpoint, remote_path);
    if !fs::try_exists(&stored).await.unwrap_or(false) {
        return Err(AppError::NotFound(format!(
            "file not found on local disk: {}",
            stored.display()
        )));
    }
    fs::copy(&stored, target).await.map_err(|e| {
        AppError::Storage(format!("failed to copy {}: {e}", stored.display()))
    })?;
    Ok(())
}

/// Removing a file that is already gone is not an error.
pub async fn delete(endpoint: &str, remote_path: &str) -> Result<()> {
    let stored = resolve(endpoint, remote_path);
    match fs::remove_file(&stored).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} was already removed", stored.display());
            Ok(())
        }
        Err(e) => Err(AppError::Storage(format!(
            "failed to delete {}: {e}",
            stored.display()
        ))),
    }
}

/// The directory must be creatable and writable; a probe file is written then removed.
pub async fn test_connection(endpoint: &str) -> Result<()> {
    let dir = Path::new(endpoint);
    fs::create_dir_all(dir).await.map_err(|e| {
        AppError::InvalidInput(format!("failed to create local directory {endpoint}: {e}"))
    })?;
    let probe = dir.join(format!(".backupctl-probe-{}", Uuid::new_v4()));
    fs::write(&probe, b"probe").await.map_err(|e| {
        AppError::InvalidInput(format!("no write permission on directory {endpoint}: {e}"))
    })?;
    fs::remove_file(&probe).await?;
    Ok(())
}
