//! Read-through object cache fed by the informer.
//!
//! Workers only read from the cache. The informer is the single writer and
//! derives `ResourceEvent`s by comparing incoming objects with what is
//! already cached.

use crate::error::ControllerError;
use crate::events::{DeletedObject, ResourceEvent};
use kube::Resource;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// `"namespace/name"` for namespaced objects, `"name"` otherwise
pub fn object_key<K: Resource>(obj: &K) -> Option<String> {
    let name = obj.meta().name.as_deref()?;
    Some(match obj.meta().namespace.as_deref() {
        Some(namespace) => format!("{}/{}", namespace, name),
        None => name.to_string(),
    })
}

/// Inverse of [`object_key`] for namespaced objects
pub fn split_key(key: &str) -> Result<(&str, &str), ControllerError> {
    match key.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace, name))
        }
        _ => Err(ControllerError::InvalidKey(key.to_string())),
    }
}

/// Cached view of every watched object, keyed by [`object_key`]
pub struct ObjectCache<K> {
    objects: RwLock<HashMap<String, Arc<K>>>,
    synced: watch::Sender<bool>,
}

impl<K: Resource + Clone> Default for ObjectCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Resource + Clone> ObjectCache<K> {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            synced: watch::channel(false).0,
        }
    }

    /// Insert or replace an object
    pub fn apply(&self, obj: K) -> Option<ResourceEvent<K>> {
        let key = object_key(&obj)?;
        let new = Arc::new(obj);
        let old = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, new.clone());
        Some(match old {
            Some(old) => ResourceEvent::Updated { old, new },
            None => ResourceEvent::Added(new),
        })
    }

    /// Remove an object whose deletion was observed
    pub fn delete(&self, obj: K) -> Option<ResourceEvent<K>> {
        let key = object_key(&obj)?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Some(ResourceEvent::Deleted(DeletedObject::Known(Arc::new(obj))))
    }

    /// Swap in the result of a full list. Objects that vanished since the
    /// previous list are reported as final-state-unknown deletions.
    pub fn replace(&self, objs: Vec<K>) -> Vec<ResourceEvent<K>> {
        let mut fresh: HashMap<String, Arc<K>> = HashMap::with_capacity(objs.len());
        for obj in objs {
            if let Some(key) = object_key(&obj) {
                fresh.insert(key, Arc::new(obj));
            }
        }

        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::take(&mut *objects);

        let mut events = Vec::with_capacity(fresh.len());
        for (key, new) in &fresh {
            events.push(match previous.get(key) {
                Some(old) => ResourceEvent::Updated {
                    old: old.clone(),
                    new: new.clone(),
                },
                None => ResourceEvent::Added(new.clone()),
            });
        }
        for (key, last_known) in previous {
            if !fresh.contains_key(&key) {
                events.push(ResourceEvent::Deleted(DeletedObject::FinalStateUnknown {
                    key,
                    last_known,
                }));
            }
        }

        *objects = fresh;
        events
    }

    pub fn get(&self, key: &str) -> Option<Arc<K>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn list(&self) -> Vec<Arc<K>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Called by the informer once the first full list is cached
    pub fn mark_synced(&self) {
        self.synced.send_replace(true);
    }

    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Block until the first full list is cached. Returns false if
    /// `shutdown` fires first.
    pub async fn wait_for_sync(&self, shutdown: &CancellationToken) -> bool {
        let mut synced = self.synced.subscribe();
        tokio::select! {
            result = synced.wait_for(|synced| *synced) => result.is_ok(),
            _ = shutdown.cancelled() => false,
        }
    }
}
