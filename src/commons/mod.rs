pub mod object_store;
pub mod s3_store;

#[cfg(test)]
pub mod memory_store;

pub use object_store::{ObjectMetadata, ObjectStore, ObjectSummary, PutOptions};
pub use s3_store::S3ObjectStore;
