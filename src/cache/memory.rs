//! Memory tier.
//!
//! A process-lifetime map from [`CacheKey`] to [`CachedArtifact`] kept in LRU
//! order. It is a pure performance layer over the persistent tier.
//!
//! # Capacity
//!
//! The default [`CapacityPolicy::Unbounded`] never evicts. Bounded policies
//! evict least-recently-used entries after each insert and hand them back to
//! the caller, which removes their backing files. The entry that was just
//! inserted is never evicted by its own insert.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::RwLock;

use super::artifact::CachedArtifact;
use super::key::CacheKey;

/// How much the cache may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityPolicy {
    /// Grow until explicitly cleared
    #[default]
    Unbounded,

    /// Keep at most this many entries
    MaxEntries(NonZeroUsize),

    /// Keep at most this many bytes of artifacts
    MaxBytes(u64),
}

struct MemoryState {
    entries: LruCache<CacheKey, CachedArtifact>,
    bytes: u64,
}

/// LRU map of cached artifacts.
pub struct MemoryTier {
    state: RwLock<MemoryState>,
    policy: CapacityPolicy,
}

impl MemoryTier {
    /// Create an empty tier with the given policy.
    pub fn new(policy: CapacityPolicy) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            policy,
        }
    }

    /// Look up an entry, marking it recently used.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedArtifact> {
        let mut state = self.state.write().await;
        state.entries.get(key).cloned()
    }

    /// Check for an entry without updating LRU order.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let state = self.state.read().await;
        state.entries.contains(key)
    }

    /// Insert or replace an entry.
    ///
    /// Returns the entries evicted to satisfy the capacity policy.
    pub async fn insert(
        &self,
        key: CacheKey,
        artifact: CachedArtifact,
    ) -> Vec<(CacheKey, CachedArtifact)> {
        let weight = artifact.weight();
        let mut state = self.state.write().await;

        if let Some(old) = state.entries.put(key, artifact) {
            state.bytes = state.bytes.saturating_sub(old.weight());
        }
        state.bytes += weight;

        let mut evicted = Vec::new();
        while state.entries.len() > 1 && self.over_capacity(&state) {
            match state.entries.pop_lru() {
                Some((key, artifact)) => {
                    state.bytes = state.bytes.saturating_sub(artifact.weight());
                    evicted.push((key, artifact));
                }
                None => break,
            }
        }
        evicted
    }

    fn over_capacity(&self, state: &MemoryState) -> bool {
        match self.policy {
            CapacityPolicy::Unbounded => false,
            CapacityPolicy::MaxEntries(max) => state.entries.len() > max.get(),
            CapacityPolicy::MaxBytes(max) => state.bytes > max,
        }
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.bytes = 0;
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Total weight of all entries in bytes.
    pub async fn size(&self) -> u64 {
        self.state.read().await.bytes
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new(CapacityPolicy::Unbounded)
    }
}
