use crate::commons::object_store::CONTENT_SHA256_METADATA_KEY;
use crate::commons::{ObjectStore, PutOptions};
use crate::config::Settings;
use crate::services::file_utils::calculate_file_hash;
use crate::services::retry::RetryPolicy;
use crate::workers::{UploadJob, WorkerConfig};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub skip_if_identical: bool,
    pub server_side_encryption: Option<String>,
}

impl UploadConfig {
    pub fn new(worker_config: &WorkerConfig, settings: &Settings) -> Self {
        Self {
            max_retries: worker_config.upload_max_retry,
            backoff_base: worker_config.upload_backoff_base,
            backoff_max: worker_config.upload_backoff_max,
            skip_if_identical: worker_config.upload_skip_if_identical,
            server_side_encryption: settings.s3_sse.clone(),
        }
    }
}

/// What happened to one job's transfer. Never stored, only counted and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { attempts: u32 },
    SkippedDuplicate,
    Failed { reason: String, attempts: u32 },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, UploadOutcome::Failed { .. })
    }

    pub fn retries(&self) -> u32 {
        match self {
            UploadOutcome::Uploaded { attempts } | UploadOutcome::Failed { attempts, .. } => {
                attempts.saturating_sub(1)
            }
            UploadOutcome::SkippedDuplicate => 0,
        }
    }
}

/// Transfers one job's file to the object store.
///
/// Skips the transfer when the destination already holds identical content,
/// retries transient failures with jittered exponential backoff and fails fast
/// on permanent ones. Counter updates are left to the caller.
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    config: UploadConfig,
    retry_policy: RetryPolicy,
}

impl UploadService {
    pub fn new(store: Arc<dyn ObjectStore>, config: UploadConfig) -> Self {
        let retry_policy = RetryPolicy::new(config.max_retries, config.backoff_base, config.backoff_max);
        Self {
            store,
            config,
            retry_policy,
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id(), key = %job.key()))]
    pub async fn upload(&self, job: &UploadJob) -> UploadOutcome {
        let source = job.source_path().to_path_buf();

        // A file that disappeared after enqueue is not worth retrying
        let local_size = match tokio::fs::metadata(&source).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => return Self::fail_local(format!("Source is not a file: {}", source.display())),
            Err(e) => {
                return Self::fail_local(format!("Source file unavailable {}: {}", source.display(), e))
            }
        };

        let digest = match hash_file(source.clone()).await {
            Ok(digest) => digest,
            Err(reason) => return Self::fail_local(reason),
        };

        if self.config.skip_if_identical {
            let head = self
                .retry_policy
                .run("head_object", |_| self.store.head(job.bucket(), job.key()))
                .await;

            match head.result {
                Ok(Some(remote)) => {
                    if remote.size == local_size && remote.sha256.as_deref() == Some(digest.as_str()) {
                        info!(
                            "Skipping duplicate: {} already exists at {} with identical content",
                            job.file_name(),
                            job.destination()
                        );
                        return UploadOutcome::SkippedDuplicate;
                    }
                    debug!(
                        local_size,
                        remote_size = remote.size,
                        remote_etag = ?remote.etag,
                        "Destination exists with different content, uploading"
                    );
                }
                Ok(None) => {}
                // An unreadable destination is uploaded rather than failing the job
                Err(e) => {
                    warn!(
                        "Duplicate check failed for {}, uploading anyway: {}",
                        job.destination(),
                        e
                    );
                }
            }
        }

        let options = self.put_options(job, &digest);
        let put = self
            .retry_policy
            .run("put_object", |attempt| {
                debug!(
                    "Upload attempt {}/{}: {} -> {}",
                    attempt,
                    self.config.max_retries + 1,
                    source.display(),
                    job.destination()
                );
                self.store.put_file(job.bucket(), job.key(), &source, &options)
            })
            .await;

        match put.result {
            Ok(()) => {
                info!(
                    "Successfully uploaded: {} -> {}",
                    job.file_name(),
                    job.destination()
                );
                UploadOutcome::Uploaded {
                    attempts: put.attempts,
                }
            }
            Err(e) => {
                error!(
                    "Upload failed after {} attempt(s): {} -> {}: {}",
                    put.attempts,
                    job.file_name(),
                    job.destination(),
                    e
                );
                UploadOutcome::Failed {
                    reason: e.to_string(),
                    attempts: put.attempts,
                }
            }
        }
    }

    fn put_options(&self, job: &UploadJob, digest: &str) -> PutOptions {
        let mut metadata = HashMap::new();
        metadata.insert("original-filename".to_string(), job.file_name());
        metadata.insert(CONTENT_SHA256_METADATA_KEY.to_string(), digest.to_string());
        metadata.insert("upload-timestamp".to_string(), Utc::now().timestamp().to_string());

        PutOptions {
            server_side_encryption: self.config.server_side_encryption.clone(),
            content_sha256: Some(digest.to_string()),
            metadata,
        }
    }

    fn fail_local(reason: String) -> UploadOutcome {
        warn!("{}", reason);
        UploadOutcome::Failed {
            reason,
            attempts: 0,
        }
    }
}

async fn hash_file(source: PathBuf) -> Result<String, String> {
    let display = source.display().to_string();
    match tokio::task::spawn_blocking(move || calculate_file_hash(&source)).await {
        Ok(Ok(digest)) => Ok(digest),
        Ok(Err(e)) => Err(format!("Cannot hash {}: {}", display, e)),
        Err(e) => Err(format!("Hashing task for {} failed: {}", display, e)),
    }
}
