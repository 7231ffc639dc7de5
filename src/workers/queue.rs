use crate::workers::{QueueError, UploadJob};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Point-in-time view of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Pending plus in-flight jobs.
    pub queued: u64,
    pub processed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<UploadJob>,
    in_flight: HashSet<Uuid>,
    processed: u64,
    failed: u64,
}

/// In-process FIFO mailbox shared by producers and upload workers.
///
/// The queue only records final outcomes; it never retries a job.
pub struct JobQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    job_available: Notify,
    space_available: Notify,
}

impl JobQueue {
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    /// `None` or `Some(0)` produce an unbounded queue.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.filter(|c| *c > 0),
            job_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    // Critical sections never panic; recover the state from a poisoned lock anyway
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_space(&self, state: &QueueState) -> bool {
        match self.capacity {
            Some(capacity) => state.pending.len() < capacity,
            None => true,
        }
    }

    /// Append a job, waiting for free capacity when the queue is bounded.
    pub async fn put(&self, mut job: UploadJob) {
        loop {
            let space = self.space_available.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.try_put(job) {
                Ok(()) => return,
                Err((returned, _)) => job = returned,
            }

            debug!("Job queue full, waiting for capacity");
            space.await;
        }
    }

    /// Append a job without waiting. A full bounded queue hands the job back.
    pub fn try_put(&self, job: UploadJob) -> Result<(), (UploadJob, QueueError)> {
        {
            let mut state = self.lock();
            if !self.has_space(&state) {
                let capacity = self.capacity.unwrap_or_default();
                return Err((job, QueueError::Full { capacity }));
            }
            debug!("Job {} enqueued for {}", job.id(), job.destination());
            state.pending.push_back(job);
        }

        self.job_available.notify_one();
        Ok(())
    }

    /// Remove the head job, waiting up to `timeout` for one to arrive.
    pub async fn get(&self, timeout: Duration) -> Option<UploadJob> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.job_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.try_get() {
                return Some(job);
            }

            if timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn try_get(&self) -> Option<UploadJob> {
        let (job, more_pending) = {
            let mut state = self.lock();
            let job = state.pending.pop_front()?;
            state.in_flight.insert(job.id());
            (job, !state.pending.is_empty())
        };

        self.space_available.notify_one();
        // Pass the wakeup along while jobs remain
        if more_pending {
            self.job_available.notify_one();
        }

        Some(job)
    }

    pub fn task_done(&self, job: &UploadJob) -> Result<(), QueueError> {
        let mut state = self.lock();
        if !state.in_flight.remove(&job.id()) {
            return Err(QueueError::NotInFlight(job.id()));
        }
        state.processed += 1;
        Ok(())
    }

    pub fn mark_failed(&self, job: &UploadJob) -> Result<(), QueueError> {
        let mut state = self.lock();
        if !state.in_flight.remove(&job.id()) {
            return Err(QueueError::NotInFlight(job.id()));
        }
        state.failed += 1;
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            queued: (state.pending.len() + state.in_flight.len()) as u64,
            processed: state.processed,
            failed: state.failed,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            queued = stats.queued,
            pending = self.pending_len(),
            processed = stats.processed,
            failed = stats.failed,
            capacity = ?self.capacity(),
            "Job queue stats"
        );
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::Scope;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn job(name: &str) -> UploadJob {
        UploadJob::new(
            PathBuf::from(format!("/data/{}", name)),
            Scope::Mba,
            "hma-mba-bucket".to_string(),
            format!("mba/pdf/{}", name),
        )
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::unbounded();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            queue.put(job(name)).await;
        }

        let mut names = Vec::new();
        while let Some(next) = queue.try_get() {
            names.push(next.file_name());
        }
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[tokio::test]
    async fn test_get_times_out_on_empty_queue() {
        let queue = JobQueue::unbounded();
        let started = std::time::Instant::now();
        assert!(queue.get(Duration::from_millis(50)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_counters_balance_after_processing() {
        let queue = JobQueue::unbounded();
        for i in 0..10 {
            queue.put(job(&format!("{}.pdf", i))).await;
        }
        assert_eq!(queue.stats().queued, 10);

        let mut turn = 0;
        while let Some(next) = queue.get(Duration::from_millis(10)).await {
            if turn % 3 == 0 {
                queue.mark_failed(&next).unwrap();
            } else {
                queue.task_done(&next).unwrap();
            }
            turn += 1;
        }

        let stats = queue.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.processed + stats.failed, 10);
        assert_eq!(stats.failed, 4);
    }

    #[tokio::test]
    async fn test_in_flight_jobs_stay_queued() {
        let queue = JobQueue::unbounded();
        queue.put(job("a.pdf")).await;
        let taken = queue.try_get().unwrap();

        assert_eq!(queue.stats(), QueueStats { queued: 1, processed: 0, failed: 0 });
        queue.task_done(&taken).unwrap();
        assert_eq!(queue.stats(), QueueStats { queued: 0, processed: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_acknowledging_unknown_job_is_rejected() {
        let queue = JobQueue::unbounded();
        queue.put(job("a.pdf")).await;
        let taken = queue.try_get().unwrap();
        queue.task_done(&taken).unwrap();

        assert_eq!(queue.task_done(&taken), Err(QueueError::NotInFlight(taken.id())));
        assert!(queue.mark_failed(&job("b.pdf")).is_err());
        assert_eq!(queue.stats(), QueueStats { queued: 0, processed: 1, failed: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_never_share_a_job() {
        let queue = Arc::new(JobQueue::unbounded());
        let total = 200;
        for i in 0..total {
            queue.put(job(&format!("{}.pdf", i))).await;
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(next) = queue.get(Duration::from_millis(20)).await {
                    ids.push(next.id());
                    queue.task_done(&next).unwrap();
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "job {} delivered twice", id);
            }
        }
        assert_eq!(seen.len(), total);
        assert_eq!(queue.stats(), QueueStats { queued: 0, processed: total as u64, failed: 0 });
    }

    #[tokio::test]
    async fn test_waiting_get_is_woken_by_put() {
        let queue = Arc::new(JobQueue::unbounded());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.put(job("late.pdf")).await;

        let received = waiter.await.unwrap().expect("waiter should receive the job");
        assert_eq!(received.file_name(), "late.pdf");
    }

    #[tokio::test]
    async fn test_bounded_try_put_returns_job_when_full() {
        let queue = JobQueue::bounded(1);
        queue.try_put(job("a.pdf")).unwrap();

        let (returned, err) = queue.try_put(job("b.pdf")).unwrap_err();
        assert_eq!(returned.file_name(), "b.pdf");
        assert_eq!(err, QueueError::Full { capacity: 1 });
        assert_eq!(queue.stats().queued, 1);
    }

    #[tokio::test]
    async fn test_bounded_put_waits_for_capacity() {
        let queue = Arc::new(JobQueue::bounded(1));
        queue.put(job("a.pdf")).await;

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.put(job("b.pdf")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.pending_len(), 1);

        let first = queue.try_get().unwrap();
        producer.await.unwrap();

        assert_eq!(first.file_name(), "a.pdf");
        assert_eq!(queue.try_get().unwrap().file_name(), "b.pdf");
    }

    #[test]
    fn test_zero_capacity_means_unbounded() {
        assert_eq!(JobQueue::with_capacity(Some(0)).capacity(), None);
        assert_eq!(JobQueue::bounded(0).capacity(), Some(1));
    }
}
