//! Mock MinIO client for unit testing
//!
//! This module provides an in-memory implementation of ObjectStoreClient that
//! can be used in unit tests without a running MinIO instance. Every call is
//! journaled into a [`CallLog`], which callers may share with other fakes to
//! assert ordering across systems.

use crate::error::MinIOError;
use crate::store_trait::ObjectStoreClient;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, ordered journal of calls made against test doubles
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct MockState {
    // bucket -> (key -> body)
    buckets: HashMap<String, BTreeMap<String, Vec<u8>>>,
    policies: HashMap<String, String>,
    // Buckets owned by someone else
    foreign: HashSet<String>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
}

/// Mock MinIO client for testing
#[derive(Clone)]
pub struct MockMinIOClient {
    endpoint: String,
    state: Arc<Mutex<MockState>>,
    calls: CallLog,
}

impl MockMinIOClient {
    /// Create a new mock client with its own call log
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_call_log(endpoint, Arc::new(Mutex::new(Vec::new())))
    }

    /// Create a new mock client that journals into `calls`
    pub fn with_call_log(endpoint: impl Into<String>, calls: CallLog) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Arc::new(Mutex::new(MockState::default())),
            calls,
        }
    }

    /// Same backing state, different endpoint (what a reconnect looks like)
    pub fn reconnected(&self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: self.state.clone(),
            calls: self.calls.clone(),
        }
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every call to `operation` (e.g. `"make_bucket"`) fail
    pub fn fail_on(&self, operation: &str) {
        self.state.lock().unwrap().failing.insert(operation.to_string());
    }

    /// Make every call to `operation` take `delay` before it takes effect
    pub fn delay_on(&self, operation: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(operation.to_string(), delay);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    /// Add a bucket to the mock store (for test setup)
    pub fn add_bucket(&self, bucket: &str) {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    /// Mark a bucket name as owned by another account
    pub fn add_foreign_bucket(&self, bucket: &str) {
        self.state.lock().unwrap().foreign.insert(bucket.to_string());
    }

    /// Add an object to the mock store, creating the bucket if needed
    pub fn add_object(&self, bucket: &str, key: &str, body: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.to_vec());
    }

    /// Set a raw policy document (for test setup)
    pub fn add_policy(&self, bucket: &str, document: &str) {
        self.state
            .lock()
            .unwrap()
            .policies
            .insert(bucket.to_string(), document.to_string());
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(bucket)
    }

    pub fn objects(&self, bucket: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn policy(&self, bucket: &str) -> Option<String> {
        self.state.lock().unwrap().policies.get(bucket).cloned()
    }

    /// Record the call, then wait out any configured delay
    async fn enter(&self, operation: &str, target: &str) -> Result<(), MinIOError> {
        self.record(operation, target)?;
        let delay = self.state.lock().unwrap().delays.get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn record(&self, operation: &str, target: &str) -> Result<(), MinIOError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, target));
        if self.state.lock().unwrap().failing.contains(operation) {
            return Err(MinIOError::Request(format!(
                "injected failure: {} {}",
                operation, target
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObjectStoreClient for MockMinIOClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MinIOError> {
        self.enter("bucket_exists", bucket).await?;
        Ok(self.has_bucket(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), MinIOError> {
        self.enter("make_bucket", bucket).await?;
        let mut state = self.state.lock().unwrap();
        if state.foreign.contains(bucket) {
            return Err(MinIOError::BucketTaken(bucket.to_string()));
        }
        state.buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    fn list_objects<'a>(&'a self, bucket: &'a str) -> BoxStream<'a, Result<String, MinIOError>> {
        if let Err(e) = self.record("list_objects", bucket) {
            return stream::once(async move { Err(e) }).boxed();
        }
        let keys = match self.state.lock().unwrap().buckets.get(bucket) {
            Some(objects) => objects.keys().cloned().map(Ok).collect::<Vec<_>>(),
            None => vec![Err(MinIOError::BucketNotFound(bucket.to_string()))],
        };
        stream::iter(keys).boxed()
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), MinIOError> {
        self.enter("remove_object", &format!("{}/{}", bucket, key)).await?;
        if let Some(objects) = self.state.lock().unwrap().buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<(), MinIOError> {
        self.enter("remove_bucket", bucket).await?;
        let mut state = self.state.lock().unwrap();
        match state.buckets.get(bucket) {
            None => Err(MinIOError::BucketNotFound(bucket.to_string())),
            Some(objects) if !objects.is_empty() => Err(MinIOError::Request(format!(
                "BucketNotEmpty: {} still holds {} objects",
                bucket,
                objects.len()
            ))),
            Some(_) => {
                state.buckets.remove(bucket);
                state.policies.remove(bucket);
                Ok(())
            }
        }
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<Option<String>, MinIOError> {
        self.enter("get_bucket_policy", bucket).await?;
        let state = self.state.lock().unwrap();
        if !state.buckets.contains_key(bucket) {
            return Err(MinIOError::BucketNotFound(bucket.to_string()));
        }
        Ok(state.policies.get(bucket).cloned())
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: Option<&str>) -> Result<(), MinIOError> {
        self.enter("set_bucket_policy", bucket).await?;
        let mut state = self.state.lock().unwrap();
        if !state.buckets.contains_key(bucket) {
            return Err(MinIOError::BucketNotFound(bucket.to_string()));
        }
        match policy {
            Some(document) => {
                state.policies.insert(bucket.to_string(), document.to_string());
            }
            None => {
                state.policies.remove(bucket);
            }
        }
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, MinIOError> {
        self.enter("object_exists", &format!("{}/{}", bucket, key)).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), MinIOError> {
        self.enter("put_object", &format!("{}/{}", bucket, key)).await?;
        match self.state.lock().unwrap().buckets.get_mut(bucket) {
            Some(objects) => {
                objects.insert(key.to_string(), body);
                Ok(())
            }
            None => Err(MinIOError::BucketNotFound(bucket.to_string())),
        }
    }
}
