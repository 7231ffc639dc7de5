use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Rejections raised at the ingress boundary, before a job exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid scope: {0}")]
    UnknownScope(String),

    #[error("Path must not be empty")]
    EmptyPath,

    #[error("Source file does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("Source path is not a file: {0}")]
    SourceNotAFile(PathBuf),

    #[error("Input directory does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("Input path is not a directory: {0}")]
    RootNotADirectory(PathBuf),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Network errors, timeouts, throttling and 5xx responses.
    #[error("Transient transfer error: {0}")]
    Transient(String),

    /// Permission, missing bucket, bad credentials or a vanished source file.
    #[error("Permanent transfer error: {0}")]
    Permanent(String),
}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Transient(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Job {0} is not in flight")]
    NotInFlight(Uuid),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("File discovery error: {0}")]
    Discovery(#[from] walkdir::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker shutdown")]
    Shutdown,

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
