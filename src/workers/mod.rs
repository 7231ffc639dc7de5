pub mod config;
pub mod error;
pub mod job;
pub mod main_worker;
pub mod metrics;
pub mod queue;
pub mod upload_worker;

pub use config::WorkerConfig;
pub use error::{QueueError, TransferError, ValidationError, WorkerError, WorkerResult};
pub use job::{Scope, UploadJob};
pub use main_worker::MainWorker;
pub use metrics::WorkerMetrics;
pub use queue::{JobQueue, QueueStats};
pub use upload_worker::{PoolConfig, PoolHandle, UploadWorkerPool};
