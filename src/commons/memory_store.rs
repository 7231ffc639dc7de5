use crate::commons::{ObjectMetadata, ObjectStore, ObjectSummary, PutOptions};
use crate::workers::TransferError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory object store with scripted failures for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), ObjectMetadata>>,
    scripted_failures: Mutex<VecDeque<TransferError>>,
    always_fail: Mutex<Option<TransferError>>,
    panic_on_key: Mutex<Option<String>>,
    head_failure: Mutex<Option<TransferError>>,
    put_delay: Mutex<Option<Duration>>,
    put_calls: AtomicU32,
    head_calls: AtomicU32,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` puts with `error`, then succeed.
    pub fn fail_next_puts(&self, times: u32, error: TransferError) {
        let mut failures = self.scripted_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    pub fn fail_every_put(&self, error: TransferError) {
        *self.always_fail.lock().unwrap() = Some(error);
    }

    pub fn fail_every_head(&self, error: TransferError) {
        *self.head_failure.lock().unwrap() = Some(error);
    }

    /// Hold every put for `delay` before the object is stored.
    pub fn delay_puts(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub fn panic_on_key(&self, key: &str) {
        *self.panic_on_key.lock().unwrap() = Some(key.to_string());
    }

    pub fn insert(&self, bucket: &str, key: &str, metadata: ObjectMetadata) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), metadata);
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<ObjectMetadata> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> u32 {
        self.head_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, TransferError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.head_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.get(bucket, key))
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        _options: &PutOptions,
    ) -> Result<(), TransferError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if self.panic_on_key.lock().unwrap().as_deref() == Some(key) {
            panic!("simulated store panic for {}", key);
        }
        if let Some(error) = self.always_fail.lock().unwrap().clone() {
            return Err(error);
        }
        if let Some(error) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| TransferError::Permanent(e.to_string()))?;
        let metadata = ObjectMetadata {
            size: bytes.len() as u64,
            sha256: Some(hex::encode(Sha256::digest(&bytes))),
            etag: None,
        };
        self.insert(bucket, key, metadata);
        Ok(())
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectSummary>, TransferError> {
        let mut objects: Vec<ObjectSummary> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, key), metadata)| ObjectSummary {
                key: key.clone(),
                size: metadata.size,
                last_modified: None,
                etag: metadata.etag.clone(),
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        objects.truncate(max_keys);
        Ok(objects)
    }
}
