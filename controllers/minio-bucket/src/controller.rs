//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the informer,
//! the work queue and the reconciler together and runs the worker pool.

use crate::backoff::{CONFIG_DEFECT_MIN_DELAY, RateLimiter};
use crate::cache::ObjectCache;
use crate::config::ControllerConfig;
use crate::connectivity::Connectivity;
use crate::error::ControllerError;
use crate::events::EventTranslator;
use crate::queue::WorkQueue;
use crate::reconciler::{MinIOClientFactory, Reconciler};
use crate::store::KubeResourceStore;
use crate::tunnel::KubePortForwarder;
use crate::watcher::Informer;
use crds::MinIOBucket;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Main controller for MinIOBucket resources.
pub struct Controller {
    cache: Arc<ObjectCache<MinIOBucket>>,
    queue: WorkQueue,
    informer: Informer,
    reconciler: Arc<Reconciler>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        config: &ControllerConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing MinIO Bucket Controller");

        let kube_client = Client::try_default().await?;

        let bucket_api: Api<MinIOBucket> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        let cache: Arc<ObjectCache<MinIOBucket>> = Arc::new(ObjectCache::new());
        let queue = WorkQueue::new(RateLimiter::default());

        let store = Arc::new(KubeResourceStore::new(kube_client.clone(), cache.clone()));
        let forwarder = Arc::new(KubePortForwarder::new(kube_client));
        let connectivity = Connectivity::new(config.mode, store.clone(), forwarder, shutdown.clone());
        info!("Backend connectivity mode: {:?}", connectivity.mode());

        let clients = Arc::new(MinIOClientFactory::new(config.backend_timeout));
        let reconciler = Arc::new(Reconciler::new(store, connectivity, clients, shutdown.clone()));

        let informer = Informer::new(
            bucket_api,
            cache.clone(),
            EventTranslator::new(queue.clone()),
            config.resync_period,
        );

        Ok(Self {
            cache,
            queue,
            informer,
            reconciler,
            shutdown,
        })
    }

    /// Runs the controller until shutdown.
    ///
    /// Workers start only after the cache holds a full list. Failing to get
    /// there is the only fatal startup error.
    pub async fn run(self, workers: usize) -> Result<(), ControllerError> {
        let informer_shutdown = self.shutdown.child_token();
        let mut informer = tokio::spawn(self.informer.run(informer_shutdown.clone()));

        info!("Waiting for MinIOBucket cache to sync");
        let synced = tokio::select! {
            synced = self.cache.wait_for_sync(&self.shutdown) => synced,
            result = &mut informer => {
                self.queue.shut_down();
                return Err(ControllerError::CacheSync(informer_exit_reason(result)));
            }
        };
        if !synced {
            informer_shutdown.cancel();
            self.queue.shut_down();
            return Err(ControllerError::CacheSync(
                "shutdown before initial sync".to_string(),
            ));
        }
        info!("MinIOBucket cache synced with {} objects", self.cache.len());

        info!("Starting {} workers", workers);
        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| {
                let queue = self.queue.clone();
                let reconciler = self.reconciler.clone();
                tokio::spawn(async move {
                    debug!("Worker {} started", id);
                    while process_next(&queue, &reconciler).await {}
                    debug!("Worker {} stopped", id);
                })
            })
            .collect();

        // A watch that gives up leaves the cache stale; stop so the process
        // gets restarted
        let watch_failure = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = &mut informer => Some(informer_exit_reason(result)),
        };

        info!("Shutting down MinIO Bucket Controller");
        informer_shutdown.cancel();
        self.queue.shut_down();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }

        match watch_failure {
            Some(reason) => Err(ControllerError::Watch(reason)),
            None => {
                if let Ok(Err(e)) = informer.await {
                    warn!("MinIOBucket watcher exited with error: {}", e);
                }
                info!("MinIO Bucket Controller stopped");
                Ok(())
            }
        }
    }
}

/// Process one key from the queue. Returns false once the queue is shut
/// down and drained.
pub async fn process_next(queue: &WorkQueue, reconciler: &Reconciler) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    match reconciler.sync(&key).await {
        Ok(()) => queue.forget(&key),
        Err(e) => {
            e.log(&key);
            if e.is_configuration_defect() {
                queue.add_rate_limited_at_least(&key, CONFIG_DEFECT_MIN_DELAY);
            } else {
                queue.add_rate_limited(&key);
            }
        }
    }
    queue.done(&key);
    true
}

fn informer_exit_reason(
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> String {
    match result {
        Ok(Ok(())) => "watcher stopped".to_string(),
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("watcher task failed: {}", e),
    }
}
