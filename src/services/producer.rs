use crate::services::file_utils::{
    detect_scope_from_path, discover_files, validate_input_dir, ExtensionFilter, KeyBuilder,
};
use crate::workers::{JobQueue, Scope, UploadJob, WorkerResult};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Scope argument that resolves each file's scope from its location.
pub const AUTO_SCOPE: &str = "auto";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerReport {
    pub discovered: usize,
    pub enqueued: usize,
}

/// Turns a directory of files into upload jobs.
pub struct Producer {
    queue: Arc<JobQueue>,
    key_builder: Arc<KeyBuilder>,
}

impl Producer {
    pub fn new(queue: Arc<JobQueue>, key_builder: Arc<KeyBuilder>) -> Self {
        Self { queue, key_builder }
    }

    /// Discover files under `input_dir` and enqueue one job per file.
    ///
    /// Scope and root are validated and discovery completes before the first
    /// job is enqueued, so a rejected call leaves the queue untouched. With
    /// `scope == "auto"` every file takes the scope of the `mba`/`policy`
    /// directory it lives in; files outside both are skipped.
    #[instrument(skip(self, filter), fields(input_dir = %input_dir.display()))]
    pub async fn enqueue_directory(
        &self,
        input_dir: &Path,
        scope: &str,
        filter: &ExtensionFilter,
    ) -> WorkerResult<ProducerReport> {
        let fixed_scope: Option<Scope> = if scope.trim().eq_ignore_ascii_case(AUTO_SCOPE) {
            None
        } else {
            Some(scope.parse()?)
        };
        validate_input_dir(input_dir)?;

        let files = discover_files(input_dir, filter, fixed_scope)?;
        let mut report = ProducerReport {
            discovered: files.len(),
            enqueued: 0,
        };

        for path in files {
            let Some(scope) = fixed_scope.or_else(|| detect_scope_from_path(&path, input_dir)) else {
                warn!("Cannot determine scope for {}, skipping", path.display());
                continue;
            };

            let (bucket, key) = self.key_builder.resolve(scope, &path);
            self.queue.put(UploadJob::new(path, scope, bucket, key)).await;
            report.enqueued += 1;
        }

        info!(
            "Enqueued {} of {} discovered files (scope {})",
            report.enqueued, report.discovered, scope
        );
        Ok(report)
    }
}
