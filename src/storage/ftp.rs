// FTP backend. suppaftp is blocking, so every transfer runs on the blocking pool
// inside a session that logs out when dropped.
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};
use tracing::{debug, info};
use url::Url;

use crate::errors::{AppError, Result};
use crate::models::Destination;

const DEFAULT_FTP_PORT: u16 = 21;

/// `host`, `host:port` or `ftp://host[:port]` into a connectable address.
pub fn endpoint_address(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.contains("://") {
        let url = Url::parse(endpoint)
            .map_err(|e| AppError::InvalidInput(format!("invalid FTP endpoint {endpoint}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| AppError::InvalidInput(format!("FTP endpoint {endpoint} has no host")))?;
        return Ok(format!("{}:{}", host, url.port().unwrap_or(DEFAULT_FTP_PORT)));
    }
    if endpoint.is_empty() {
        return Err(AppError::InvalidInput("FTP endpoint is empty".into()));
    }
    if endpoint.contains(':') {
        Ok(endpoint.to_string())
    } else {
        Ok(format!("{endpoint}:{DEFAULT_FTP_PORT}"))
    }
}

/// Splits `a/b/file` into the directories to walk and the file name to store.
pub fn split_remote_path(remote_path: &str) -> (Vec<&str>, &str) {
    let mut segments: Vec<&str> = remote_path.split('/').filter(|s| !s.is_empty()).collect();
    let file_name = segments.pop().unwrap_or("");
    (segments, file_name)
}

fn ftp_error(action: &str) -> impl FnOnce(FtpError) -> AppError + '_ {
    move |e| AppError::Ftp(format!("{action}: {e}"))
}

/// Authenticated, binary, passive-mode connection. Logs out and disconnects on drop.
struct FtpSession {
    stream: FtpStream,
}

impl FtpSession {
    fn open(destination: &Destination) -> Result<Self> {
        let (user, password) = destination.credentials()?;
        let address = endpoint_address(&destination.endpoint)?;

        let stream = FtpStream::connect(address.as_str())
            .map_err(|e| AppError::Ftp(format!("failed to connect to FTP {address}: {e}")))?;
        let mut session = Self { stream };
        session
            .stream
            .login(user, password)
            .map_err(ftp_error("FTP login failed (user/password)"))?;
        session
            .stream
            .transfer_type(FileType::Binary)
            .map_err(ftp_error("failed to switch to binary mode"))?;
        session.stream.set_mode(Mode::Passive);
        Ok(session)
    }

    /// Enters every directory segment, creating the missing ones.
    fn enter_dirs(&mut self, dirs: &[&str]) -> Result<()> {
        for dir in dirs {
            if self.stream.cwd(dir).is_ok() {
                continue;
            }
            self.stream
                .mkdir(dir)
                .map_err(|e| AppError::Ftp(format!("failed to create FTP directory {dir}: {e}")))?;
            self.stream
                .cwd(dir)
                .map_err(|e| AppError::Ftp(format!("failed to enter FTP directory {dir}: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        if let Err(e) = self.stream.quit() {
            debug!("FTP logout failed: {}", e);
        }
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| AppError::Ftp(format!("FTP task aborted: {e}")))?
}

pub async fn upload(destination: &Destination, file: &Path, remote_path: &str) -> Result<String> {
    let destination = destination.clone();
    let file = file.to_path_buf();
    let remote = remote_path.to_string();

    blocking(move || {
        let mut session = FtpSession::open(&destination)?;
        let (dirs, file_name) = split_remote_path(&remote);
        session.enter_dirs(&dirs)?;

        let mut reader = File::open(&file)?;
        let written = session
            .stream
            .put_file(file_name, &mut reader)
            .map_err(ftp_error("failed to store file on FTP"))?;
        info!("✓ Stored {} bytes on FTP {} as {}", written, destination.endpoint, remote);
        Ok(remote)
    })
    .await
}

pub async fn download(destination: &Destination, remote_path: &str, target: &Path) -> Result<()> {
    let destination = destination.clone();
    let remote = remote_path.to_string();
    let target: PathBuf = target.to_path_buf();

    blocking(move || {
        let mut session = FtpSession::open(&destination)?;
        let mut output = File::create(&target)?;
        let copied = session
            .stream
            .retr(&remote, |reader| {
                std::io::copy(reader, &mut output).map_err(FtpError::ConnectionError)
            })
            .map_err(ftp_error("failed to download file from FTP"))?;
        output.flush()?;
        debug!("Downloaded {} bytes from FTP {}", copied, remote);
        Ok(())
    })
    .await
}

pub async fn delete(destination: &Destination, remote_path: &str) -> Result<()> {
    let destination = destination.clone();
    let remote = remote_path.to_string();

    blocking(move || {
        let mut session = FtpSession::open(&destination)?;
        session
            .stream
            .rm(&remote)
            .map_err(ftp_error("failed to delete file from FTP"))?;
        Ok(())
    })
    .await
}

/// Full connect, login and logout cycle.
pub async fn test_connection(destination: &Destination) -> Result<()> {
    let destination = destination.clone();
    blocking(move || {
        let session = FtpSession::open(&destination)?;
        drop(session);
        info!("✓ FTP {} accepted the credentials", destination.endpoint);
        Ok(())
    })
    .await
}
