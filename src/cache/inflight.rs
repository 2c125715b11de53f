//! Optional de-duplication of concurrent identical requests.
//!
//! The first caller for a key becomes the leader and does the work; callers
//! arriving while it runs wait on a [`Notify`] and then re-check the cache.
//! The leader's [`LeaderGuard`] releases the slot on drop, so a leader that
//! fails or is cancelled still wakes its waiters, which then retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use super::key::CacheKey;

/// Registry of keys currently being produced.
#[derive(Default)]
pub struct InFlight {
    pending: Mutex<HashMap<CacheKey, Arc<Notify>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<Notify>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Become the leader for `key`, or wait for the current leader.
    ///
    /// Returns `Some(guard)` when the caller must produce the entry, and
    /// `None` once another leader has finished (successfully or not).
    pub async fn join(&self, key: &CacheKey) -> Option<LeaderGuard<'_>> {
        let notify = match self.claim(key) {
            None => {
                return Some(LeaderGuard {
                    owner: self,
                    key: key.clone(),
                })
            }
            Some(notify) => notify,
        };

        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        // The leader removes its slot before notifying, so checking after
        // enabling cannot miss the wakeup.
        if self.is_pending(key, &notify) {
            notified.await;
        }
        None
    }

    /// Register as leader, or return the current leader's notifier.
    fn claim(&self, key: &CacheKey) -> Option<Arc<Notify>> {
        let mut pending = self.lock();
        if let Some(notify) = pending.get(key) {
            return Some(Arc::clone(notify));
        }
        pending.insert(key.clone(), Arc::new(Notify::new()));
        None
    }

    fn is_pending(&self, key: &CacheKey, notify: &Arc<Notify>) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, notify))
    }

    /// Number of keys currently being produced.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Held by the leader while it produces an entry.
pub struct LeaderGuard<'a> {
    owner: &'a InFlight,
    key: CacheKey,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        let notify = self.owner.lock().remove(&self.key);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}
