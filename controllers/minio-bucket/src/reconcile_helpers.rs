//! Helper functions for common reconciliation patterns
//!
//! Finalizer bookkeeping and status comparison, kept free of I/O so they
//! can be unit tested on plain objects.

use crds::{MINIO_BUCKET_FINALIZER, MinIOBucket, MinIOBucketStatus};

/// Add the controller's finalizer. Returns false if it was already present.
pub fn add_finalizer(bucket: &mut MinIOBucket) -> bool {
    let finalizers = bucket.metadata.finalizers.get_or_insert_with(Vec::new);
    if finalizers.iter().any(|f| f == MINIO_BUCKET_FINALIZER) {
        return false;
    }
    finalizers.push(MINIO_BUCKET_FINALIZER.to_string());
    true
}

/// Remove the controller's finalizer, leaving any others in place.
/// Returns false if it was not present.
pub fn remove_finalizer(bucket: &mut MinIOBucket) -> bool {
    let Some(finalizers) = bucket.metadata.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != MINIO_BUCKET_FINALIZER);
    finalizers.len() != before
}

/// Check if the observed status differs from the desired one
///
/// A missing status is equivalent to the default (not ready).
pub fn status_needs_update(
    current_status: Option<&MinIOBucketStatus>,
    desired: &MinIOBucketStatus,
) -> bool {
    match current_status {
        None => *desired != MinIOBucketStatus::default(),
        Some(status) => status != desired,
    }
}
