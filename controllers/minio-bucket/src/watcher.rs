//! Kubernetes resource watcher.
//!
//! The informer owns the `MinIOBucket` watch stream. It keeps the object
//! cache current, hands every change to the event translator, and
//! periodically re-emits every cached object so that buckets converge even
//! when nothing changes on the Kubernetes side.

use crate::cache::ObjectCache;
use crate::error::ControllerError;
use crate::events::{EventTranslator, ResourceEvent};
use crds::MinIOBucket;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::{WatchStreamExt, watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watches MinIOBucket resources and feeds the cache and work queue.
pub struct Informer {
    api: Api<MinIOBucket>,
    cache: Arc<ObjectCache<MinIOBucket>>,
    translator: EventTranslator,
    resync_period: Duration,
}

impl Informer {
    /// Creates a new informer instance.
    pub fn new(
        api: Api<MinIOBucket>,
        cache: Arc<ObjectCache<MinIOBucket>>,
        translator: EventTranslator,
        resync_period: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            translator,
            resync_period,
        }
    }

    /// Runs the watch until `shutdown` fires.
    ///
    /// Watch errors are retried by the watcher's default backoff; the
    /// stream only ends if the watcher gives up.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        info!("Starting MinIOBucket watcher");

        let mut stream = watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();

        let mut resync = tokio::time::interval(self.resync_period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        resync.tick().await;

        let mut init_buffer: Option<Vec<MinIOBucket>> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("MinIOBucket watcher stopped");
                    return Ok(());
                }
                _ = resync.tick() => {
                    resync_all(&self.cache, &self.translator);
                }
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        apply_watch_event(&self.cache, &self.translator, &mut init_buffer, event);
                    }
                    Some(Err(e)) => {
                        warn!("MinIOBucket watch error (retrying): {}", e);
                    }
                    None => {
                        return Err(ControllerError::Watch(
                            "MinIOBucket watch stream ended".to_string(),
                        ));
                    }
                },
            }
        }
    }
}

/// Re-emit every cached object as an update
pub fn resync_all(cache: &ObjectCache<MinIOBucket>, translator: &EventTranslator) {
    if !cache.has_synced() {
        return;
    }
    let objects = cache.list();
    debug!("Resyncing {} MinIOBuckets", objects.len());
    for obj in objects {
        translator.handle(ResourceEvent::Updated {
            old: obj.clone(),
            new: obj,
        });
    }
}

/// Fold one watcher event into the cache and translate the resulting changes
///
/// A full (re-)list arrives as `Init`, any number of `InitApply`, then
/// `InitDone`; the listed objects are buffered and swapped into the cache in
/// one step so deletions missed while disconnected surface as tombstones.
pub fn apply_watch_event(
    cache: &ObjectCache<MinIOBucket>,
    translator: &EventTranslator,
    init_buffer: &mut Option<Vec<MinIOBucket>>,
    event: watcher::Event<MinIOBucket>,
) {
    match event {
        watcher::Event::Init => {
            debug!("MinIOBucket list started");
            *init_buffer = Some(Vec::new());
        }
        watcher::Event::InitApply(bucket) => {
            debug!("MinIOBucket init apply: {}", bucket.name_any());
            init_buffer.get_or_insert_with(Vec::new).push(bucket);
        }
        watcher::Event::InitDone => {
            let listed = init_buffer.take().unwrap_or_default();
            let count = listed.len();
            for event in cache.replace(listed) {
                translator.handle(event);
            }
            if !cache.has_synced() {
                cache.mark_synced();
                info!("MinIOBucket cache synced ({} objects)", count);
            } else {
                debug!("MinIOBucket re-list complete ({} objects)", count);
            }
        }
        watcher::Event::Apply(bucket) => {
            debug!("MinIOBucket applied: {}", bucket.name_any());
            if let Some(event) = cache.apply(bucket) {
                translator.handle(event);
            }
        }
        watcher::Event::Delete(bucket) => {
            debug!("MinIOBucket deleted: {}", bucket.name_any());
            if let Some(event) = cache.delete(bucket) {
                translator.handle(event);
            }
        }
    }
}
