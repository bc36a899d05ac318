//! Reconciliation logic for MinIOBucket CRDs.
//!
//! One `sync` call is one level-triggered pass over a single MinIOBucket:
//!
//! 1. Gone from the store: nothing to do.
//! 2. Alive without our finalizer: add it and persist before touching MinIO.
//! 3. Resolve the MinIOInstance; none yet means "try again on the next event".
//! 4. Terminating: honor `bucketFinalizePolicy`, then release the finalizer.
//! 5. Alive: ensure the bucket (and its policy / index file) exists, then
//!    mark the status ready if it is not already.
//!
//! Errors are returned unchanged; the controller loop owns retry decisions.

use crate::cache::split_key;
use crate::connectivity::{BackendEndpoint, Connectivity};
use crate::error::ControllerError;
use crate::reconcile_helpers::{add_finalizer, remove_finalizer, status_needs_update};
use crate::resolver::{BackendResolver, Resolution};
use crate::store::ResourceStore;
use crds::{BucketFinalizePolicy, BucketPolicy, MinIOBucket, MinIOBucketSpec, MinIOBucketStatus, MinIOInstance};
use futures::StreamExt;
use kube::ResourceExt;
use minio_client::{CannedPolicy, Credentials, MinIOClient, MinIOError, ObjectStoreClient};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Secret keys holding a MinIOInstance's root credentials
const ACCESS_KEY_FIELD: &str = "accesskey";
const SECRET_KEY_FIELD: &str = "secretkey";

/// Object created when `createIndexFile` is set
const INDEX_FILE: &str = "index.html";

/// Builds backend clients for an endpoint
pub trait ClientFactory: Send + Sync {
    fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ObjectStoreClient>, ControllerError>;
}

/// [`ClientFactory`] producing S3 clients
pub struct MinIOClientFactory {
    operation_timeout: Duration,
}

impl MinIOClientFactory {
    pub fn new(operation_timeout: Duration) -> Self {
        Self { operation_timeout }
    }
}

impl ClientFactory for MinIOClientFactory {
    fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ObjectStoreClient>, ControllerError> {
        Ok(Arc::new(MinIOClient::new(
            address,
            credentials,
            self.operation_timeout,
        )?))
    }
}

/// Reconciles MinIOBucket resources.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    resolver: BackendResolver,
    connectivity: Connectivity,
    clients: Arc<dyn ClientFactory>,
    shutdown: CancellationToken,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        connectivity: Connectivity,
        clients: Arc<dyn ClientFactory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            resolver: BackendResolver::new(store.clone()),
            store,
            connectivity,
            clients,
            shutdown,
        }
    }

    /// Reconciles the MinIOBucket identified by `key` (`namespace/name`).
    pub async fn sync(&self, key: &str) -> Result<(), ControllerError> {
        let (namespace, name) = split_key(key)?;

        let Some(mut bucket) = self.store.get_bucket(namespace, name).await? else {
            debug!("MinIOBucket {} is not found", key);
            return Ok(());
        };

        info!("Reconciling MinIOBucket {}", key);

        if !bucket.is_terminating() && add_finalizer(&mut bucket) {
            bucket = self.store.update_bucket(&bucket).await?;
            info!("Added finalizer to MinIOBucket {}", key);
        }

        if bucket.is_terminating() && !bucket.has_finalizer() {
            debug!("MinIOBucket {} is terminating without our finalizer", key);
            return Ok(());
        }

        let instance = match self.resolver.resolve(namespace, &bucket.spec.selector).await? {
            Resolution::NotReady => {
                debug!("No MinIOInstance for MinIOBucket {} yet", key);
                return Ok(());
            }
            Resolution::Resolved(instance) => instance,
        };

        if bucket.is_terminating() {
            return self.finalize(bucket, &instance, key).await;
        }

        let (endpoint, client) = self.open_backend(&instance).await?;
        let converged = self
            .until_shutdown(converge_bucket(client.as_ref(), name, &bucket.spec))
            .await;
        endpoint.close().await;
        converged?;

        let desired = MinIOBucketStatus { ready: true };
        if status_needs_update(bucket.status.as_ref(), &desired) {
            bucket.status = Some(desired);
            self.store.update_bucket_status(&bucket).await?;
            info!("MinIOBucket {} is ready", key);
        }

        Ok(())
    }

    async fn finalize(
        &self,
        mut bucket: MinIOBucket,
        instance: &MinIOInstance,
        key: &str,
    ) -> Result<(), ControllerError> {
        match bucket.finalize_policy() {
            BucketFinalizePolicy::Keep => {
                info!("Keeping bucket of MinIOBucket {}", key);
            }
            BucketFinalizePolicy::Delete => {
                let (endpoint, client) = self.open_backend(instance).await?;
                let bucket_name = bucket.name_any();
                let removed = self
                    .until_shutdown(remove_bucket_and_objects(client.as_ref(), &bucket_name))
                    .await;
                endpoint.close().await;
                removed?;
            }
        }

        remove_finalizer(&mut bucket);
        self.store.update_bucket(&bucket).await?;
        info!("Removed finalizer from MinIOBucket {}", key);
        Ok(())
    }

    /// Run backend work unless shutdown fires first; work in flight is
    /// dropped at its next await point
    async fn until_shutdown(
        &self,
        work: impl Future<Output = Result<(), ControllerError>>,
    ) -> Result<(), ControllerError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ControllerError::Cancelled),
            result = work => result,
        }
    }

    /// Credentials, an endpoint and a client for `instance`. The endpoint
    /// must be closed by the caller.
    async fn open_backend(
        &self,
        instance: &MinIOInstance,
    ) -> Result<(BackendEndpoint, Arc<dyn ObjectStoreClient>), ControllerError> {
        let credentials = self.credentials(instance).await?;
        let endpoint = self.connectivity.open(instance).await?;
        match self.clients.connect(&endpoint.address(), &credentials) {
            Ok(client) => Ok((endpoint, client)),
            Err(e) => {
                endpoint.close().await;
                Err(e)
            }
        }
    }

    async fn credentials(&self, instance: &MinIOInstance) -> Result<Credentials, ControllerError> {
        let namespace = instance.namespace().unwrap_or_default();
        let secret_name = instance
            .spec
            .creds_secret
            .as_ref()
            .map(|secret| secret.name.as_str())
            .ok_or_else(|| {
                ControllerError::BackendUnavailable(format!(
                    "MinIOInstance {}/{} names no credentials secret",
                    namespace,
                    instance.name_any()
                ))
            })?;

        let data = self
            .store
            .get_secret(&namespace, secret_name)
            .await?
            .ok_or_else(|| {
                ControllerError::BackendUnavailable(format!(
                    "credentials secret {}/{} not found",
                    namespace, secret_name
                ))
            })?;

        Ok(Credentials::new(
            secret_field(&data, ACCESS_KEY_FIELD, &namespace, secret_name)?,
            secret_field(&data, SECRET_KEY_FIELD, &namespace, secret_name)?,
        ))
    }
}

fn secret_field(
    data: &BTreeMap<String, Vec<u8>>,
    field: &str,
    namespace: &str,
    secret_name: &str,
) -> Result<String, ControllerError> {
    data.get(field)
        .map(|value| String::from_utf8_lossy(value).into_owned())
        .ok_or_else(|| {
            ControllerError::BackendUnavailable(format!(
                "credentials secret {}/{} has no {}",
                namespace, secret_name, field
            ))
        })
}

/// Drive the bucket on the backend toward `spec`
async fn converge_bucket(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    spec: &MinIOBucketSpec,
) -> Result<(), ControllerError> {
    if client.bucket_exists(bucket).await? {
        debug!("Bucket {} already exists", bucket);
    } else {
        client.make_bucket(bucket).await?;
        info!("Created bucket {} on {}", bucket, client.endpoint());
    }

    if let Some(policy) = spec.policy {
        ensure_policy(client, bucket, policy).await?;
    }

    if spec.create_index_file && !client.object_exists(bucket, INDEX_FILE).await? {
        client.put_object(bucket, INDEX_FILE, Vec::new()).await?;
        info!("Created {} in bucket {}", INDEX_FILE, bucket);
    }

    Ok(())
}

async fn ensure_policy(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    policy: BucketPolicy,
) -> Result<(), ControllerError> {
    let current = client.get_bucket_policy(bucket).await?;

    let canned = match policy {
        BucketPolicy::Public => CannedPolicy::ReadWrite,
        BucketPolicy::ReadOnly => CannedPolicy::ReadOnly,
        BucketPolicy::Private => {
            if current.is_some() {
                client.set_bucket_policy(bucket, None).await?;
                info!("Removed policy from bucket {}", bucket);
            }
            return Ok(());
        }
    };

    if canned.is_applied(bucket, current.as_deref()) {
        debug!("Bucket {} policy is up to date", bucket);
        return Ok(());
    }

    let document = canned.document(bucket).to_json()?;
    client.set_bucket_policy(bucket, Some(&document)).await?;
    info!("Set {:?} policy on bucket {}", policy, bucket);
    Ok(())
}

/// Empty the bucket, then remove it. A bucket that is already gone counts
/// as removed.
async fn remove_bucket_and_objects(
    client: &dyn ObjectStoreClient,
    bucket: &str,
) -> Result<(), ControllerError> {
    let mut objects = client.list_objects(bucket);
    while let Some(object) = objects.next().await {
        match object {
            Ok(key) => {
                client.remove_object(bucket, &key).await?;
                info!("{}/{} is removed", bucket, key);
            }
            Err(MinIOError::BucketNotFound(_)) => {
                info!("Bucket {} is already gone", bucket);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
    drop(objects);

    match client.remove_bucket(bucket).await {
        Ok(()) => {
            info!("Removed bucket {}", bucket);
            Ok(())
        }
        Err(MinIOError::BucketNotFound(_)) => {
            info!("Bucket {} is already gone", bucket);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
