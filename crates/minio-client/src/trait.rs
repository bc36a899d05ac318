//! ObjectStoreClient trait for mocking
//!
//! This trait abstracts the MinIO client so reconcilers can be unit tested
//! against the in-memory mock. The concrete `MinIOClient` implements it on
//! top of the S3 API.

use crate::error::MinIOError;
use futures::stream::BoxStream;

/// Bucket-level operations the controller needs from an object store
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Endpoint the client talks to
    fn endpoint(&self) -> &str;

    /// Whether the bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MinIOError>;

    /// Create the bucket. A bucket that already exists and is owned by the
    /// caller counts as success.
    async fn make_bucket(&self, bucket: &str) -> Result<(), MinIOError>;

    /// Stream every object key in the bucket, following pagination
    fn list_objects<'a>(&'a self, bucket: &'a str) -> BoxStream<'a, Result<String, MinIOError>>;

    /// Delete a single object
    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), MinIOError>;

    /// Delete an (empty) bucket
    async fn remove_bucket(&self, bucket: &str) -> Result<(), MinIOError>;

    /// Current bucket policy document, `None` when the bucket has no policy
    async fn get_bucket_policy(&self, bucket: &str) -> Result<Option<String>, MinIOError>;

    /// Replace the bucket policy; `None` removes it
    async fn set_bucket_policy(&self, bucket: &str, policy: Option<&str>) -> Result<(), MinIOError>;

    /// Whether an object exists
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, MinIOError>;

    /// Upload an object
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), MinIOError>;
}
