use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Backup operation failed: {0}")]
    Backup(String),

    #[error("Restore operation failed: {0}")]
    Restore(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("AWS SDK S3 error: {0}")]
    S3Sdk(String),

    #[error("FTP error: {0}")]
    Ftp(String),

    #[error("Mail error: {0}")]
    Mail(String),
}

/// Coarse classification a caller (CLI, HTTP layer) maps onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad ids, missing credentials, refused state transitions.
    ClientError,
    /// Failures while dumping, transferring or restoring.
    ServerError,
    /// Engines whose dump/restore cannot be driven through a process.
    NotImplemented,
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Config(_)
            | AppError::InvalidInput(_)
            | AppError::NotFound(_)
            | AppError::Conflict(_) => ErrorClass::ClientError,
            AppError::NotImplemented(_) => ErrorClass::NotImplemented,
            _ => ErrorClass::ServerError,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
