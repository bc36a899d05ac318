//! Rate-limited work queue of resource keys.
//!
//! A key is in at most one of two places: waiting in the queue, or being
//! processed by a worker. Adding a key that is already waiting is a no-op;
//! adding a key that is being processed marks it dirty, and `done` puts it
//! back exactly once.

use crate::backoff::RateLimiter;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<String>,
    // Keys that need processing: queued, or re-added while in flight
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
    limiter: RateLimiter,
    // Cancels delayed adds on shutdown
    delayed: CancellationToken,
}

/// Deduplicating work queue shared by the event translator and workers
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                limiter,
                delayed: CancellationToken::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `key` unless it is already pending
    pub fn add(&self, key: &str) {
        {
            let mut state = self.state();
            if state.shutting_down {
                debug!("Dropping {} added after shutdown", key);
                return;
            }
            if !state.dirty.insert(key.to_string()) {
                return;
            }
            if state.processing.contains(key) {
                // Re-delivered by done()
                return;
            }
            state.queue.push_back(key.to_string());
        }
        self.inner.notify.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shut down
    /// and every pending key has been handed out.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a concurrent add/shut_down
            // between the check and the await is not missed
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as no longer in flight
    pub fn done(&self, key: &str) {
        let requeued = {
            let mut state = self.state();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };
        if requeued {
            self.inner.notify.notify_one();
        }
    }

    /// Enqueue `key` after `delay`. Pending delayed adds are dropped on shutdown.
    pub fn add_after(&self, key: &str, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = self.clone();
        let key = key.to_string();
        let cancelled = self.inner.delayed.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(&key),
            }
        });
    }

    /// Enqueue `key` after its per-key backoff delay
    pub fn add_rate_limited(&self, key: &str) {
        let delay = self.inner.limiter.when(key);
        debug!("Requeueing {} in {:?}", key, delay);
        self.add_after(key, delay);
    }

    /// Like `add_rate_limited`, but never sooner than `floor`
    pub fn add_rate_limited_at_least(&self, key: &str, floor: Duration) {
        let delay = self.inner.limiter.when(key).max(floor);
        debug!("Requeueing {} in {:?}", key, delay);
        self.add_after(key, delay);
    }

    /// Reset the backoff of `key`
    pub fn forget(&self, key: &str) {
        self.inner.limiter.forget(key);
    }

    pub fn num_requeues(&self, key: &str) -> u32 {
        self.inner.limiter.num_requeues(key)
    }

    /// Number of keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Stop accepting keys and wake every waiting worker
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.inner.delayed.cancel();
        self.inner.notify.notify_waiters();
    }
}
