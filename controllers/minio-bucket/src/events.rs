//! Watch notifications and their translation into queue keys.

use crate::cache::object_key;
use crate::queue::WorkQueue;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::debug;

/// A change observed on a watched resource
#[derive(Debug, Clone)]
pub enum ResourceEvent<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(DeletedObject<K>),
}

/// Payload of a deletion
#[derive(Debug, Clone)]
pub enum DeletedObject<K> {
    /// The deletion itself was observed
    Known(Arc<K>),
    /// The object disappeared while we were not watching (re-list, or a
    /// delete-and-recreate under the same name). `last_known` may be stale.
    FinalStateUnknown { key: String, last_known: Arc<K> },
}

impl<K: Resource> DeletedObject<K> {
    pub fn key(&self) -> Option<String> {
        match self {
            DeletedObject::Known(obj) => object_key(obj.as_ref()),
            DeletedObject::FinalStateUnknown { key, .. } => Some(key.clone()),
        }
    }
}

/// Turns resource events into work queue keys
///
/// Deliberately unfiltered: every event enqueues, and the reconciler decides
/// what the current state calls for.
#[derive(Clone)]
pub struct EventTranslator {
    queue: WorkQueue,
}

impl EventTranslator {
    pub fn new(queue: WorkQueue) -> Self {
        Self { queue }
    }

    pub fn handle<K: Resource>(&self, event: ResourceEvent<K>) {
        match event {
            ResourceEvent::Added(obj) => self.enqueue(obj.as_ref(), "added"),
            ResourceEvent::Updated { old, new } => {
                if old.uid() != new.uid() {
                    // Deleted and recreated under the same name: flush the
                    // old identity before handling the new one
                    if let Some(key) = object_key(old.as_ref()) {
                        self.handle(ResourceEvent::Deleted(DeletedObject::FinalStateUnknown {
                            key,
                            last_known: old,
                        }));
                    }
                }
                self.enqueue(new.as_ref(), "updated");
            }
            ResourceEvent::Deleted(deleted) => match deleted.key() {
                Some(key) => {
                    debug!("Enqueueing {} (deleted)", key);
                    self.queue.add(&key);
                }
                None => debug!("Ignoring deletion of an unnamed object"),
            },
        }
    }

    fn enqueue<K: Resource>(&self, obj: &K, reason: &str) {
        match object_key(obj) {
            Some(key) => {
                debug!("Enqueueing {} ({})", key, reason);
                self.queue.add(&key);
            }
            None => debug!("Ignoring unnamed object ({})", reason),
        }
    }
}
