pub mod duplicate_detector;
pub mod file_utils;
pub mod ingest_service;
pub mod producer;
pub mod retry;
pub mod upload_service;

pub use duplicate_detector::DuplicateDetector;
pub use file_utils::{ExtensionFilter, KeyBuilder};
pub use ingest_service::IngestService;
pub use producer::Producer;
pub use upload_service::{UploadConfig, UploadOutcome, UploadService};
