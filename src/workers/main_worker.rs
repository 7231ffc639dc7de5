use crate::services::UploadService;
use crate::workers::{
    JobQueue, PoolConfig, PoolHandle, UploadWorkerPool, WorkerConfig, WorkerError, WorkerMetrics,
    WorkerResult,
};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// MainWorker owns the upload worker pool, its cancellation token and the metrics reporter
pub struct MainWorker {
    config: WorkerConfig,
    drain_once: bool,
    queue: Arc<JobQueue>,
    upload_service: Arc<UploadService>,
    cancel: CancellationToken,
    metrics: Arc<WorkerMetrics>,
    pool: Option<PoolHandle>,
    metrics_task: Option<JoinHandle<()>>,
}

impl MainWorker {
    /// Create a new MainWorker with the given configuration
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, upload_service: Arc<UploadService>) -> Self {
        Self {
            config,
            drain_once: false,
            queue,
            upload_service,
            cancel: CancellationToken::new(),
            metrics: Arc::new(WorkerMetrics::new()),
            pool: None,
            metrics_task: None,
        }
    }

    /// Let workers exit once the queue stays empty for one wait interval.
    pub fn drain_once(mut self) -> Self {
        self.drain_once = true;
        self
    }

    /// Start the worker pool and the periodic metrics reporter
    pub async fn start(&mut self) -> WorkerResult<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        info!("Starting Upload Worker System");

        // Start metrics reporting background task
        let metrics_clone = self.metrics.clone();
        let queue_clone = self.queue.clone();
        let cancel_clone = self.cancel.clone();
        let interval = self.config.metrics_log_interval;
        self.metrics_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => break,
                    _ = tokio::time::sleep(interval) => metrics_clone.log_metrics(queue_clone.stats()),
                }
            }
        }));

        let pool = UploadWorkerPool::new(
            PoolConfig::from_worker_config(&self.config, self.drain_once),
            self.queue.clone(),
            self.upload_service.clone(),
            self.cancel.clone(),
            self.metrics.clone(),
        );
        self.pool = Some(pool.start());

        info!("Upload worker pool started successfully");
        Ok(())
    }

    /// Signal all workers to stop after their current job
    pub fn signal_shutdown(&self) {
        info!("Signaling shutdown to the upload worker pool");
        self.cancel.cancel();
    }

    /// Wait for a draining pool to run out of work on its own
    pub async fn join(&mut self) -> WorkerResult<()> {
        if let Some(mut pool) = self.pool.take() {
            pool.wait().await;
        }
        self.stop_metrics_task();
        self.metrics.log_metrics(self.queue.stats());
        Ok(())
    }

    /// Wait for all workers to complete in-progress jobs and shut down gracefully
    pub async fn await_shutdown(&mut self) -> WorkerResult<()> {
        let grace_period = self.config.graceful_shutdown_timeout;
        info!("Waiting up to {:?} for workers to shutdown gracefully", grace_period);

        let result = match self.pool.take() {
            Some(mut pool) => match timeout(grace_period, pool.wait()).await {
                Ok(_) => {
                    info!("Upload worker pool shutdown gracefully");
                    Ok(())
                }
                Err(_) => {
                    error!("Worker shutdown timed out after {:?}, aborting workers", grace_period);
                    pool.abort();
                    Err(WorkerError::Shutdown)
                }
            },
            None => Ok(()),
        };

        self.stop_metrics_task();
        // Log final metrics
        self.metrics.log_metrics(self.queue.stats());
        self.queue.log_stats();
        result
    }

    /// Run until `stopped` resolves, then shut the pool down however it ended.
    pub async fn run_until<F: Future>(&mut self, stopped: F) -> F::Output {
        let output = stopped.await;

        self.signal_shutdown();
        if let Err(e) = self.await_shutdown().await {
            warn!("Error during worker shutdown: {}", e);
        }
        output
    }

    fn stop_metrics_task(&mut self) {
        if let Some(task) = self.metrics_task.take() {
            task.abort();
        }
    }

    /// Get a reference to the metrics collector
    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }
}
