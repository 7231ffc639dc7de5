use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // Worker pool configuration
    pub worker_concurrency: usize,
    pub worker_consumer_wait_interval: Duration,

    // Upload configuration
    pub upload_max_retry: u32,
    pub upload_backoff_base: Duration,
    pub upload_backoff_max: Duration,
    pub upload_skip_if_identical: bool,

    // Queue configuration, 0 means unbounded
    pub job_queue_capacity: usize,

    // Shutdown configuration
    pub graceful_shutdown_timeout: Duration,

    pub metrics_log_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            worker_concurrency: env::var("WORKER_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,

            worker_consumer_wait_interval: Duration::from_millis(
                env::var("WORKER_CONSUMER_WAIT_INTERVAL_IN_MILLISECONDS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?
            ),

            upload_max_retry: env::var("UPLOAD_MAX_RETRY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            upload_backoff_base: Duration::from_millis(
                env::var("UPLOAD_BACKOFF_BASE_MILLISECONDS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?
            ),

            upload_backoff_max: Duration::from_millis(
                env::var("UPLOAD_BACKOFF_MAX_MILLISECONDS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()?
            ),

            upload_skip_if_identical: env::var("UPLOAD_SKIP_IF_IDENTICAL")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            job_queue_capacity: env::var("JOB_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,

            graceful_shutdown_timeout: Duration::from_secs(
                env::var("WORKER_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?
            ),

            metrics_log_interval: Duration::from_secs(
                env::var("WORKER_METRICS_LOG_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?
            ),
        })
    }

    pub fn queue_capacity(&self) -> Option<usize> {
        Some(self.job_queue_capacity).filter(|c| *c > 0)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            worker_consumer_wait_interval: Duration::from_millis(1000),
            upload_max_retry: 3,
            upload_backoff_base: Duration::from_millis(1000),
            upload_backoff_max: Duration::from_millis(30000),
            upload_skip_if_identical: true,
            job_queue_capacity: 0,
            graceful_shutdown_timeout: Duration::from_secs(30),
            metrics_log_interval: Duration::from_secs(300),
        }
    }
}
