use crate::workers::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Logical namespace that selects the destination bucket and key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Mba,
    Policy,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Mba => "mba",
            Scope::Policy => "policy",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mba" => Ok(Scope::Mba),
            "policy" => Ok(Scope::Policy),
            _ => Err(ValidationError::UnknownScope(value.to_string())),
        }
    }
}

/// One resolved unit of upload work.
///
/// Bucket and key are resolved by the caller before construction and the job
/// is read-only afterwards; the queue hands it from producer to worker by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    id: Uuid,
    source_path: PathBuf,
    scope: Scope,
    bucket: String,
    key: String,
    created_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn new(source_path: PathBuf, scope: Scope, bucket: String, key: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path,
            scope,
            bucket,
            key,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn destination(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
