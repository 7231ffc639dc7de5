use crate::services::{UploadOutcome, UploadService};
use crate::workers::{JobQueue, UploadJob, WorkerConfig, WorkerMetrics};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub concurrency: usize,
    /// Exit once a `get` times out on an empty queue instead of waiting for more jobs.
    pub drain_once: bool,
    pub wait_interval: Duration,
}

impl PoolConfig {
    pub fn from_worker_config(config: &WorkerConfig, drain_once: bool) -> Self {
        Self {
            concurrency: config.worker_concurrency.max(1),
            drain_once,
            wait_interval: config.worker_consumer_wait_interval,
        }
    }
}

/// UploadWorkerPool runs N consumers that pull jobs from the shared queue
pub struct UploadWorkerPool {
    config: PoolConfig,
    queue: Arc<JobQueue>,
    upload_service: Arc<UploadService>,
    cancel: CancellationToken,
    metrics: Arc<WorkerMetrics>,
}

/// Handle over the spawned consumers of one pool.
pub struct PoolHandle {
    handles: Vec<JoinHandle<()>>,
    completion_rx: mpsc::Receiver<String>,
}

impl PoolHandle {
    /// Wait for every consumer to exit, returning how many reported a clean shutdown.
    pub async fn wait(&mut self) -> usize {
        for result in join_all(self.handles.iter_mut()).await {
            if let Err(e) = result {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        let mut completed_count = 0;
        while let Ok(worker_id) = self.completion_rx.try_recv() {
            info!("Worker {} completed graceful shutdown", worker_id);
            completed_count += 1;
        }

        info!(
            "All {} worker threads completed graceful shutdown",
            completed_count
        );
        completed_count
    }

    /// Stop consumers and their running uploads immediately. Jobs they held stay in flight and are not requeued.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl UploadWorkerPool {
    pub fn new(
        config: PoolConfig,
        queue: Arc<JobQueue>,
        upload_service: Arc<UploadService>,
        cancel: CancellationToken,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self {
            config,
            queue,
            upload_service,
            cancel,
            metrics,
        }
    }

    /// Start the pool with the configured number of consumers
    pub fn start(&self) -> PoolHandle {
        let concurrency = self.config.concurrency.max(1);
        info!(
            "Starting UploadWorkerPool with {} workers (drain_once={})",
            concurrency, self.config.drain_once
        );

        let (tx, completion_rx) = mpsc::channel(concurrency);

        let mut handles = Vec::with_capacity(concurrency);
        for i in 0..concurrency {
            let worker_id = format!("worker-{}", i);
            let thread_config = self.config.clone();
            let thread_queue = self.queue.clone();
            let thread_service = self.upload_service.clone();
            let thread_cancel = self.cancel.clone();
            let thread_tx = tx.clone();
            let thread_metrics = self.metrics.clone();

            handles.push(tokio::spawn(Self::run_consumer(
                worker_id,
                thread_config,
                thread_queue,
                thread_service,
                thread_cancel,
                thread_tx,
                thread_metrics,
            )));
        }

        // Drop the original sender so the channel can close when all senders are done
        drop(tx);

        PoolHandle {
            handles,
            completion_rx,
        }
    }

    #[instrument(skip(config, queue, upload_service, cancel, completion_tx, metrics), fields(worker_id = %worker_id))]
    async fn run_consumer(
        worker_id: String,
        config: PoolConfig,
        queue: Arc<JobQueue>,
        upload_service: Arc<UploadService>,
        cancel: CancellationToken,
        completion_tx: mpsc::Sender<String>,
        metrics: Arc<WorkerMetrics>,
    ) {
        info!("Worker thread started");

        loop {
            // Check if shutdown was requested
            if cancel.is_cancelled() {
                info!("Shutdown signal received, stopping worker");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received while waiting, stopping worker");
                    break;
                }
                job = queue.get(config.wait_interval) => job,
            };

            match next {
                Some(job) => Self::process_job(&queue, &upload_service, &metrics, job).await,
                None if config.drain_once => {
                    info!("Queue drained, stopping worker");
                    break;
                }
                None => debug!("No job available, waiting for next job"),
            }
        }

        // Signal completion
        if let Err(e) = completion_tx.send(worker_id.clone()).await {
            error!("Failed to signal worker completion: {}", e);
        }

        info!("Worker thread exiting");
    }

    #[instrument(skip(queue, upload_service, metrics, job), fields(job_id = %job.id(), key = %job.key()))]
    async fn process_job(
        queue: &JobQueue,
        upload_service: &Arc<UploadService>,
        metrics: &WorkerMetrics,
        job: UploadJob,
    ) {
        info!(
            queue_wait_ms = (Utc::now() - job.created_at()).num_milliseconds(),
            "Processing job: {} -> {}",
            job.file_name(),
            job.destination()
        );
        let _timer = metrics.start_timer();
        metrics.record_job_started();

        // Run the upload in its own task so a panic only costs this job.
        // The task is aborted with its consumer.
        let task_service = upload_service.clone();
        let task_job = job.clone();
        let result = AbortOnDropHandle::new(tokio::spawn(async move {
            task_service.upload(&task_job).await
        }))
        .await;

        let settled = match result {
            Ok(outcome) => {
                metrics.record_outcome(&outcome);
                if outcome.is_success() {
                    debug!("Job {} settled: {:?}", job.id(), outcome);
                    queue.task_done(&job)
                } else {
                    warn!("Job {} failed: {:?}", job.id(), outcome);
                    queue.mark_failed(&job)
                }
            }
            Err(e) if e.is_panic() => {
                error!("Upload task panicked for job {}", job.id());
                metrics.record_job_panicked();
                queue.mark_failed(&job)
            }
            Err(e) => {
                error!("Upload task for job {} was cancelled: {}", job.id(), e);
                metrics.record_outcome(&UploadOutcome::Failed {
                    reason: e.to_string(),
                    attempts: 0,
                });
                queue.mark_failed(&job)
            }
        };

        if let Err(e) = settled {
            error!("Could not settle job {}: {}", job.id(), e);
        }
    }
}
