//! Resource store abstraction.
//!
//! Everything the reconciler reads from or writes to the Kubernetes API goes
//! through [`ResourceStore`], so the reconcile state machine can be tested
//! against an in-memory fake.

use crate::cache::ObjectCache;
use crate::error::ControllerError;
use crds::{InstanceSelector, MinIOBucket, MinIOInstance};
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use kube::api::{ListParams, Patch, PatchParams};
use kube::core::Selector;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reads and writes the controller needs from the cluster
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Current MinIOBucket, `None` if it no longer exists
    async fn get_bucket(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<MinIOBucket>, ControllerError>;

    /// Persist `bucket`'s finalizer list. Fails with `PersistConflict` if
    /// the stored object moved past `bucket`'s resourceVersion.
    async fn update_bucket(&self, bucket: &MinIOBucket) -> Result<MinIOBucket, ControllerError>;

    /// Persist `bucket`'s status, with the same conflict semantics
    async fn update_bucket_status(
        &self,
        bucket: &MinIOBucket,
    ) -> Result<MinIOBucket, ControllerError>;

    /// MinIOInstances in `namespace` matching `selector`
    async fn list_instances(
        &self,
        namespace: &str,
        selector: &InstanceSelector,
    ) -> Result<Vec<MinIOInstance>, ControllerError>;

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError>;

    /// Pods in `namespace` carrying all of `labels`
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError>;

    /// Decoded data of a Secret, `None` if it does not exist
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ControllerError>;
}

/// [`ResourceStore`] backed by the Kubernetes API, with MinIOBucket reads
/// served from the informer cache
pub struct KubeResourceStore {
    client: Client,
    buckets: Arc<ObjectCache<MinIOBucket>>,
}

impl KubeResourceStore {
    pub fn new(client: Client, buckets: Arc<ObjectCache<MinIOBucket>>) -> Self {
        Self { client, buckets }
    }

    fn bucket_api(&self, namespace: &str) -> Api<MinIOBucket> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn bucket_identity(bucket: &MinIOBucket) -> Result<(String, String), ControllerError> {
    let namespace = bucket
        .namespace()
        .ok_or_else(|| ControllerError::InvalidKey(format!("MinIOBucket {} has no namespace", bucket.name_any())))?;
    let name = bucket
        .metadata
        .name
        .clone()
        .ok_or_else(|| ControllerError::InvalidKey("MinIOBucket missing name".to_string()))?;
    Ok((namespace, name))
}

/// 409 means someone else wrote first; the caller re-reads and retries
fn persist_error(err: kube::Error, what: String) -> ControllerError {
    match err {
        kube::Error::Api(ref api_err) if api_err.code == 409 => {
            ControllerError::PersistConflict(what)
        }
        other => ControllerError::Kube(other),
    }
}

#[async_trait::async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_bucket(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<MinIOBucket>, ControllerError> {
        Ok(self
            .buckets
            .get(&format!("{}/{}", namespace, name))
            .map(|bucket| bucket.as_ref().clone()))
    }

    async fn update_bucket(&self, bucket: &MinIOBucket) -> Result<MinIOBucket, ControllerError> {
        let (namespace, name) = bucket_identity(bucket)?;
        // resourceVersion in a merge patch acts as a precondition
        let patch = json!({
            "metadata": {
                "resourceVersion": bucket.resource_version(),
                "finalizers": bucket.finalizers(),
            }
        });
        self.bucket_api(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| persist_error(e, format!("MinIOBucket {}/{}", namespace, name)))
    }

    async fn update_bucket_status(
        &self,
        bucket: &MinIOBucket,
    ) -> Result<MinIOBucket, ControllerError> {
        let (namespace, name) = bucket_identity(bucket)?;
        let patch = json!({
            "metadata": {
                "resourceVersion": bucket.resource_version(),
            },
            "status": bucket.status,
        });
        self.bucket_api(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| persist_error(e, format!("MinIOBucket {}/{} status", namespace, name)))
    }

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &InstanceSelector,
    ) -> Result<Vec<MinIOInstance>, ControllerError> {
        let api: Api<MinIOInstance> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels_from(&selector.to_selector());
        let instances = api.list(&params).await?;
        Ok(instances
            .items
            .into_iter()
            .filter(|instance| selector.matches(instance.labels()))
            .collect())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let selector: Selector = labels.clone().into_iter().collect();
        let pods = api.list(&ListParams::default().labels_from(&selector)).await?;
        Ok(pods.items)
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ControllerError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|secret| {
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect()
        }))
    }
}
