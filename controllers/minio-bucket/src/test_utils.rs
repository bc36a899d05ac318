//! Test utilities for unit testing the reconciler
//!
//! This module provides in-memory fakes for the cluster-facing traits and
//! helpers for creating test data. The fakes journal their writes into the
//! same [`CallLog`] as the mock MinIO client, so tests can assert ordering
//! across the cluster and the backend.

use crate::connectivity::{Connectivity, ConnectivityMode};
use crate::error::ControllerError;
use crate::reconciler::{ClientFactory, Reconciler};
use crate::store::ResourceStore;
use crate::tunnel::{PortForwarder, Tunnel};
use crds::*;
use k8s_openapi::api::core::v1::{Pod, PodStatus, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use minio_client::{CallLog, Credentials, MockMinIOClient, ObjectStoreClient};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const TEST_NAMESPACE: &str = "ns";
pub const INSTANCE_NAME: &str = "minio";

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// MinIOBucket selecting `app=minio`, with a UID and resourceVersion
pub fn bucket(namespace: &str, name: &str) -> MinIOBucket {
    bucket_with_uid(namespace, name, &format!("uid-{}", name))
}

pub fn bucket_with_uid(namespace: &str, name: &str, uid: &str) -> MinIOBucket {
    let mut bucket = MinIOBucket::new(
        name,
        MinIOBucketSpec {
            selector: InstanceSelector::from_labels([("app", "minio")]),
            ..Default::default()
        },
    );
    bucket.metadata.namespace = Some(namespace.to_string());
    bucket.metadata.uid = Some(uid.to_string());
    bucket.metadata.resource_version = Some("1".to_string());
    bucket
}

/// Mark a bucket as deleted by the API server
pub fn terminating(mut bucket: MinIOBucket) -> MinIOBucket {
    bucket.metadata.deletion_timestamp = Some(Time(Default::default()));
    bucket
}

pub fn instance(namespace: &str, name: &str, label_pairs: &[(&str, &str)]) -> MinIOInstance {
    let mut instance = MinIOInstance::new(
        name,
        MinIOInstanceSpec {
            creds_secret: Some(SecretRef {
                name: format!("{}-creds", name),
            }),
            replicas: Some(1),
        },
    );
    instance.metadata.namespace = Some(namespace.to_string());
    instance.metadata.labels = Some(labels(label_pairs));
    instance
}

pub fn service(namespace: &str, name: &str, port: i32, selector: &[(&str, &str)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port,
                ..Default::default()
            }]),
            selector: Some(labels(selector)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pod(namespace: &str, name: &str, phase: &str, label_pairs: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(label_pairs)),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// In-memory [`ResourceStore`] with resourceVersion checks
pub struct FakeResourceStore {
    buckets: Mutex<HashMap<String, MinIOBucket>>,
    instances: Mutex<Vec<MinIOInstance>>,
    services: Mutex<Vec<Service>>,
    pods: Mutex<Vec<Pod>>,
    secrets: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    conflict_next_write: AtomicBool,
    calls: CallLog,
}

impl FakeResourceStore {
    pub fn new() -> Self {
        Self::with_call_log(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_call_log(calls: CallLog) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            instances: Mutex::new(Vec::new()),
            services: Mutex::new(Vec::new()),
            pods: Mutex::new(Vec::new()),
            secrets: Mutex::new(HashMap::new()),
            conflict_next_write: AtomicBool::new(false),
            calls,
        }
    }

    pub fn add_bucket(&self, bucket: MinIOBucket) {
        let key = format!("{}/{}", bucket.namespace().unwrap_or_default(), bucket.name_any());
        self.buckets.lock().unwrap().insert(key, bucket);
    }

    pub fn bucket(&self, namespace: &str, name: &str) -> Option<MinIOBucket> {
        self.buckets
            .lock()
            .unwrap()
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    pub fn add_instance(&self, instance: MinIOInstance) {
        self.instances.lock().unwrap().push(instance);
    }

    pub fn add_service(&self, service: Service) {
        self.services.lock().unwrap().push(service);
    }

    pub fn add_pod(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }

    pub fn add_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        self.secrets.lock().unwrap().insert(
            format!("{}/{}", namespace, name),
            data.iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
        );
    }

    /// Make the next bucket write fail as if another writer got there first
    pub fn conflict_next_write(&self) {
        self.conflict_next_write.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Optimistic write: check the version, apply `mutate`, bump the version
    fn write_bucket(
        &self,
        bucket: &MinIOBucket,
        mutate: impl FnOnce(&mut MinIOBucket),
    ) -> Result<MinIOBucket, ControllerError> {
        let key = format!("{}/{}", bucket.namespace().unwrap_or_default(), bucket.name_any());
        if self.conflict_next_write.swap(false, Ordering::SeqCst) {
            return Err(ControllerError::PersistConflict(key));
        }

        let mut buckets = self.buckets.lock().unwrap();
        let stored = buckets
            .get_mut(&key)
            .ok_or_else(|| ControllerError::PersistConflict(format!("{} is gone", key)))?;
        if stored.metadata.resource_version != bucket.metadata.resource_version {
            return Err(ControllerError::PersistConflict(key));
        }

        mutate(stored);
        let version: u64 = stored
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        stored.metadata.resource_version = Some((version + 1).to_string());
        let updated = stored.clone();

        // The API server drops a terminating object once its last finalizer is gone
        if updated.is_terminating() && updated.finalizers().is_empty() {
            buckets.remove(&key);
        }
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl ResourceStore for FakeResourceStore {
    async fn get_bucket(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<MinIOBucket>, ControllerError> {
        Ok(self.bucket(namespace, name))
    }

    async fn update_bucket(&self, bucket: &MinIOBucket) -> Result<MinIOBucket, ControllerError> {
        let finalizers = bucket.finalizers().to_vec();
        self.record(format!("update_bucket finalizers={:?}", finalizers));
        self.write_bucket(bucket, |stored| {
            stored.metadata.finalizers = Some(finalizers);
        })
    }

    async fn update_bucket_status(
        &self,
        bucket: &MinIOBucket,
    ) -> Result<MinIOBucket, ControllerError> {
        let status = bucket.status.clone();
        self.record(format!(
            "update_status ready={}",
            status.as_ref().is_some_and(|s| s.ready)
        ));
        self.write_bucket(bucket, |stored| {
            stored.status = status;
        })
    }

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &InstanceSelector,
    ) -> Result<Vec<MinIOInstance>, ControllerError> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.namespace().as_deref() == Some(namespace) && selector.matches(i.labels()))
            .cloned()
            .collect())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.namespace().as_deref() == Some(namespace) && s.name_any() == name)
            .cloned())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        wanted: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                p.namespace().as_deref() == Some(namespace)
                    && wanted.iter().all(|(k, v)| p.labels().get(k) == Some(v))
            })
            .cloned()
            .collect())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ControllerError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&format!("{}/{}", namespace, name))
            .cloned())
    }
}

/// [`PortForwarder`] handing out tunnels that forward nothing
pub struct FakePortForwarder {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    next_port: AtomicU16,
    targets: Mutex<Vec<String>>,
    hang: AtomicBool,
    calls: Option<CallLog>,
}

impl FakePortForwarder {
    pub fn new() -> Self {
        Self {
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            next_port: AtomicU16::new(40000),
            targets: Mutex::new(Vec::new()),
            hang: AtomicBool::new(false),
            calls: None,
        }
    }

    pub fn with_call_log(calls: CallLog) -> Self {
        Self {
            calls: Some(calls),
            ..Self::new()
        }
    }

    /// Never report readiness
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// `namespace/pod:port` of every opened tunnel
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PortForwarder for FakePortForwarder {
    async fn open(&self, namespace: &str, pod: &str, port: u16) -> Result<Tunnel, ControllerError> {
        if self.hang.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }

        let target = format!("{}/{}:{}", namespace, pod, port);
        if let Some(calls) = &self.calls {
            calls.lock().unwrap().push(format!("open_tunnel {}", target));
        }
        self.targets.lock().unwrap().push(target);
        self.opened.fetch_add(1, Ordering::SeqCst);

        let local_port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let local_addr = SocketAddr::from(([127, 0, 0, 1], local_port));
        let shutdown = CancellationToken::new();
        let task = {
            let shutdown = shutdown.clone();
            let closed = self.closed.clone();
            let calls = self.calls.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                closed.fetch_add(1, Ordering::SeqCst);
                if let Some(calls) = calls {
                    calls.lock().unwrap().push("close_tunnel".to_string());
                }
            })
        };
        Ok(Tunnel::new(local_addr, shutdown, task))
    }
}

/// [`ClientFactory`] connecting every address to the same mock backend
pub struct MockClientFactory {
    backend: MockMinIOClient,
    addresses: Mutex<Vec<String>>,
}

impl MockClientFactory {
    pub fn new(backend: MockMinIOClient) -> Self {
        Self {
            backend,
            addresses: Mutex::new(Vec::new()),
        }
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().unwrap().clone()
    }
}

impl ClientFactory for MockClientFactory {
    fn connect(
        &self,
        address: &str,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn ObjectStoreClient>, ControllerError> {
        self.addresses.lock().unwrap().push(address.to_string());
        Ok(Arc::new(self.backend.reconnected(address)))
    }
}

/// A reconciler wired to fakes sharing one call log
pub struct TestHarness {
    pub store: Arc<FakeResourceStore>,
    pub minio: MockMinIOClient,
    pub forwarder: Arc<FakePortForwarder>,
    pub clients: Arc<MockClientFactory>,
    pub reconciler: Reconciler,
    /// Process shutdown as seen by connectivity and the reconciler
    pub shutdown: CancellationToken,
    calls: CallLog,
}

impl TestHarness {
    pub fn new(mode: ConnectivityMode) -> Self {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(FakeResourceStore::with_call_log(calls.clone()));
        let minio = MockMinIOClient::with_call_log("http://unconnected", calls.clone());
        let forwarder = Arc::new(FakePortForwarder::with_call_log(calls.clone()));
        let clients = Arc::new(MockClientFactory::new(minio.clone()));
        let shutdown = CancellationToken::new();
        let connectivity = Connectivity::new(mode, store.clone(), forwarder.clone(), shutdown.clone());
        let reconciler = Reconciler::new(
            store.clone(),
            connectivity,
            clients.clone(),
            shutdown.clone(),
        );

        Self {
            store,
            minio,
            forwarder,
            clients,
            reconciler,
            shutdown,
            calls,
        }
    }

    /// One `app=minio` instance in the test namespace with its service,
    /// a running replica and credentials
    pub fn with_backend(self) -> Self {
        let replica_labels = [("v1.min.io/instance", INSTANCE_NAME)];
        self.store
            .add_instance(instance(TEST_NAMESPACE, INSTANCE_NAME, &[("app", "minio")]));
        self.store.add_service(service(
            TEST_NAMESPACE,
            &format!("{}-hl-svc", INSTANCE_NAME),
            9000,
            &replica_labels,
        ));
        self.store
            .add_pod(pod(TEST_NAMESPACE, "minio-0", "Running", &replica_labels));
        self.store.add_secret(
            TEST_NAMESPACE,
            &format!("{}-creds", INSTANCE_NAME),
            &[("accesskey", "access"), ("secretkey", "secret")],
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}
