use crate::workers::{QueueStats, UploadJob, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const ERROR_ENTITY: &str = "HMA_INGEST";

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub errors: Option<Vec<ApiError>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            errors: None,
        }
    }

    pub fn error(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            errors: Some(vec![error]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub entity: String,
    pub code: String,
    pub cause: String,
}

impl ApiError {
    pub fn new(code: &str, cause: &str) -> Self {
        Self {
            entity: ERROR_ENTITY.to_string(),
            code: code.to_string(),
            cause: cause.to_string(),
        }
    }

    pub fn system_error() -> Self {
        Self::new("1000", "SYSTEM_ERROR")
    }

    pub fn invalid_request() -> Self {
        Self::new("1001", "INVALID_REQUEST")
    }

    pub fn queue_full() -> Self {
        Self::new("1005", "QUEUE_FULL")
    }
}

impl From<&ValidationError> for ApiError {
    fn from(error: &ValidationError) -> Self {
        match error {
            ValidationError::EmptyPath => Self::invalid_request(),
            ValidationError::UnknownScope(_) => Self::new("1002", "INVALID_SCOPE"),
            ValidationError::SourceNotFound(_) | ValidationError::RootNotFound(_) => {
                Self::new("1003", "SOURCE_NOT_FOUND")
            }
            ValidationError::SourceNotAFile(_) | ValidationError::RootNotADirectory(_) => {
                Self::new("1004", "SOURCE_NOT_A_FILE")
            }
        }
    }
}

/// Body of `POST /jobs`. A missing path deserializes as empty and fails validation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub path: String,

    #[serde(default)]
    #[validate(length(min = 1))]
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub destination: String,
}

impl From<&UploadJob> for JobAccepted {
    fn from(job: &UploadJob) -> Self {
        Self {
            job_id: job.id(),
            bucket: job.bucket().to_string(),
            key: job.key().to_string(),
            destination: job.destination(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub stats: QueueStats,
}
