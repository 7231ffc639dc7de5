use crate::services::file_utils::{validate_source_file, KeyBuilder};
use crate::workers::{JobQueue, QueueStats, Scope, UploadJob, ValidationError, WorkerResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Single-file ingress: validate, resolve, enqueue.
///
/// Enqueueing never waits; a full bounded queue is reported back to the caller.
pub struct IngestService {
    queue: Arc<JobQueue>,
    key_builder: Arc<KeyBuilder>,
}

impl IngestService {
    pub fn new(queue: Arc<JobQueue>, key_builder: Arc<KeyBuilder>) -> Self {
        Self { queue, key_builder }
    }

    pub fn submit(&self, path: &str, scope: &str) -> WorkerResult<UploadJob> {
        let (source, scope) = match Self::validate(path, scope) {
            Ok(validated) => validated,
            Err(e) => {
                warn!("Rejected job submission for {}: {}", path, e);
                return Err(e.into());
            }
        };

        let (bucket, key) = self.key_builder.resolve(scope, &source);
        let job = UploadJob::new(source, scope, bucket, key);

        self.queue.try_put(job.clone()).map_err(|(_, e)| e)?;
        info!("Job {} accepted for {}", job.id(), job.destination());
        Ok(job)
    }

    fn validate(path: &str, scope: &str) -> Result<(PathBuf, Scope), ValidationError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ValidationError::EmptyPath);
        }

        let scope: Scope = scope.parse()?;
        let source = PathBuf::from(path);
        validate_source_file(&source)?;
        Ok((source, scope))
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}
