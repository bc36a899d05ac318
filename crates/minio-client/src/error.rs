//! MinIO client errors

use thiserror::Error;

/// Errors that can occur when talking to a MinIO instance
#[derive(Debug, Error)]
pub enum MinIOError {
    /// S3 request failed (transport, timeout, or service error)
    #[error("S3 request failed: {0}")]
    Request(String),

    /// Bucket does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket name is taken by another owner
    #[error("Bucket name already taken: {0}")]
    BucketTaken(String),

    /// Endpoint could not be turned into a client
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Policy document serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
