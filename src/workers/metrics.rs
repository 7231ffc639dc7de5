use crate::services::UploadOutcome;
use crate::workers::QueueStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// WorkerMetrics tracks upload statistics for the worker pool
pub struct WorkerMetrics {
    // Outcome counters
    pub jobs_started: AtomicU64,
    pub jobs_uploaded: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_panicked: AtomicU64,

    // Retries spent inside the upload operation
    pub transfer_retries: AtomicU64,

    // Timing metrics (stored as milliseconds)
    pub total_processing_time_ms: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self {
            jobs_started: AtomicU64::new(0),
            jobs_uploaded: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_panicked: AtomicU64::new(0),
            transfer_retries: AtomicU64::new(0),
            total_processing_time_ms: AtomicU64::new(0),
        }
    }

    pub fn record_job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded { .. } => {
                self.jobs_uploaded.fetch_add(1, Ordering::Relaxed);
            }
            UploadOutcome::SkippedDuplicate => {
                self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            }
            UploadOutcome::Failed { .. } => {
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.transfer_retries
            .fetch_add(outcome.retries() as u64, Ordering::Relaxed);
    }

    pub fn record_job_panicked(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_time(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.total_processing_time_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn log_metrics(&self, queue_stats: QueueStats) {
        let jobs_started = self.jobs_started.load(Ordering::Relaxed);

        if jobs_started > 0 {
            let jobs_uploaded = self.jobs_uploaded.load(Ordering::Relaxed);
            let duplicates_skipped = self.duplicates_skipped.load(Ordering::Relaxed);
            let jobs_failed = self.jobs_failed.load(Ordering::Relaxed);
            let jobs_panicked = self.jobs_panicked.load(Ordering::Relaxed);
            let transfer_retries = self.transfer_retries.load(Ordering::Relaxed);
            let total_time_ms = self.total_processing_time_ms.load(Ordering::Relaxed);
            let avg_time_ms = total_time_ms / jobs_started;

            info!(
                "Worker metrics: started={}, uploaded={}, skipped_duplicates={}, failed={}, \
                 panicked={}, transfer_retries={}, avg_time_ms={}, \
                 queued={}, processed={}, queue_failed={}",
                jobs_started,
                jobs_uploaded,
                duplicates_skipped,
                jobs_failed,
                jobs_panicked,
                transfer_retries,
                avg_time_ms,
                queue_stats.queued,
                queue_stats.processed,
                queue_stats.failed
            );

            // Alert if error rate is high
            let error_rate = (jobs_failed as f64) / (jobs_started as f64);
            if error_rate > 0.1 {
                warn!("Upload failure rate is high: {:.2}%", error_rate * 100.0);
            }
        }
    }

    /// Create a timer that will record processing time when dropped
    pub fn start_timer(&self) -> MetricsTimer<'_> {
        MetricsTimer {
            metrics: self,
            start_time: Instant::now(),
        }
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer that automatically records the duration when it goes out of scope
pub struct MetricsTimer<'a> {
    metrics: &'a WorkerMetrics,
    start_time: Instant,
}

impl<'a> Drop for MetricsTimer<'a> {
    fn drop(&mut self) {
        let duration = self.start_time.elapsed();
        self.metrics.record_processing_time(duration);
    }
}
