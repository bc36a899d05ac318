//! MinIO Bucket Client
//!
//! A small client for the bucket-level operations the bucket controller needs
//! from a MinIO instance, spoken over the S3 API.
//!
//! # Example
//!
//! ```no_run
//! use minio_client::{Credentials, MinIOClient, ObjectStoreClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MinIOClient::new(
//!     "minio-hl-svc.storage.svc:9000",
//!     &Credentials::new("access-key", "secret-key"),
//!     Duration::from_secs(30),
//! )?;
//!
//! if !client.bucket_exists("assets").await? {
//!     client.make_bucket("assets").await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Buckets**: existence check, idempotent creation, removal
//! - **Objects**: paginated listing as a stream, removal, upload
//! - **Policies**: canned read-only / read-write documents

pub mod client;
pub mod error;
pub mod policy;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{Credentials, MinIOClient};
pub use error::MinIOError;
pub use policy::{BucketAccessPolicy, CannedPolicy};
pub use store_trait::ObjectStoreClient;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{CallLog, MockMinIOClient};
