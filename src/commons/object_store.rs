use crate::workers::TransferError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;

/// User metadata key holding the hex SHA-256 of the uploaded content.
pub const CONTENT_SHA256_METADATA_KEY: &str = "content-sha256";

/// Remote object facts needed for the duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    /// Hex SHA-256 digest, when the store knows it.
    pub sha256: Option<String>,
    pub etag: Option<String>,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub server_side_encryption: Option<String>,
    pub content_sha256: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// The upload primitive the pipeline depends on.
///
/// Implementations classify their failures as transient or permanent; the
/// retry decision is made by the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns `None` when no object exists at `key`.
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, TransferError>;

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> Result<(), TransferError>;

    /// Objects under `prefix` in key order, at most `max_keys` of them.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectSummary>, TransferError>;
}
