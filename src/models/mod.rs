pub mod api;

pub use api::{ApiError, ApiResponse, CreateJobRequest, HealthResponse, JobAccepted};
