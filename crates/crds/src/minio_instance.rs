//! MinIOInstance CRD
//!
//! Owned by the MinIO operator. Only the fields the bucket controller reads
//! are modelled here; unknown fields are ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "miniocontroller.min.io",
    version = "v1beta1",
    kind = "MinIOInstance",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MinIOInstanceSpec {
    /// Secret holding the root credentials (`accesskey` / `secretkey`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creds_secret: Option<SecretRef>,

    /// Number of MinIO server replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// Reference to a secret in the instance's namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the secret
    pub name: String,
}

impl MinIOInstance {
    /// Name of the headless service the MinIO operator creates for the instance
    pub fn headless_service_name(&self) -> String {
        format!("{}-hl-svc", self.metadata.name.as_deref().unwrap_or_default())
    }
}
