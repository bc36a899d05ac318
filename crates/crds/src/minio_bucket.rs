//! MinIOBucket CRD
//!
//! Requests a bucket on whichever MinIO instance the selector resolves to.

use crate::selector::InstanceSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::de::value::StringDeserializer;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer, Serialize};

/// Finalizer token owned by the bucket controller.
pub const MINIO_BUCKET_FINALIZER: &str = "minio-bucket-controller.minio.f110.dev/finalizer";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "minio.f110.dev",
    version = "v1alpha1",
    kind = "MinIOBucket",
    namespaced,
    status = "MinIOBucketStatus",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MinIOBucketSpec {
    /// Selector of the MinIOInstance hosting the bucket
    #[serde(default)]
    pub selector: InstanceSelector,

    /// What happens to the bucket when this object is deleted.
    ///
    /// Unset behaves like `Keep`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub bucket_finalize_policy: Option<BucketFinalizePolicy>,

    /// Anonymous access policy of the bucket.
    ///
    /// Unset leaves whatever policy the bucket already has untouched.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub policy: Option<BucketPolicy>,

    /// Create an empty `index.html` at the top of the bucket
    #[serde(default)]
    pub create_index_file: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MinIOBucketStatus {
    /// The bucket exists on the backend in the desired shape
    #[serde(default)]
    pub ready: bool,
}

/// Bucket handling on deletion of the custom resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum BucketFinalizePolicy {
    /// Remove every object and then the bucket itself
    Delete,

    /// Leave the bucket and its contents behind
    Keep,
}

/// Anonymous access policy applied to the bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum BucketPolicy {
    /// Anonymous read and write
    Public,

    /// Anonymous read
    ReadOnly,

    /// No anonymous access
    Private,
}

/// An empty string is the same as leaving the field out
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) if value.is_empty() => Ok(None),
        Some(value) => {
            let value: StringDeserializer<D::Error> = value.into_deserializer();
            T::deserialize(value).map(Some)
        }
    }
}

impl MinIOBucket {
    /// True once deletion was requested and the object only waits for finalizers
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the controller's finalizer token is present
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|item| item == MINIO_BUCKET_FINALIZER))
    }

    /// Effective finalize policy (unset means keep)
    pub fn finalize_policy(&self) -> BucketFinalizePolicy {
        self.spec
            .bucket_finalize_policy
            .unwrap_or(BucketFinalizePolicy::Keep)
    }
}
