//! MinIO Bucket Controller CRD Definitions
//!
//! Kubernetes Custom Resource Definitions read and written by the bucket
//! controller.

pub mod minio_bucket;
pub mod minio_instance;
pub mod selector;

pub use minio_bucket::*;
pub use minio_instance::*;
pub use selector::*;
