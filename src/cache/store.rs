//! Two-tier cache store.
//!
//! ```text
//!   get(key)                                put(key, payload)
//!      │                                        │
//!      ▼                                        ▼
//! ┌──────────────┐  miss   ┌──────────────────────────────┐
//! │ Memory tier  │────────▶│ Persistent tier              │
//! │ (LRU map)    │◀────────│ <dir>/<sha256>.<ext>         │
//! └──────────────┘ promote └──────────────────────────────┘
//! ```
//!
//! The persistent tier is authoritative. `put` writes to disk first and only
//! then updates memory, so the store never claims an entry it could not serve
//! after a restart.
//!
//! # Write Protocol
//!
//! 1. Create the cache directory if needed
//! 2. Write the bytes to a unique temporary file next to the entry
//! 3. Check the temporary file's size against the payload
//! 4. Rename the temporary file onto `<digest>.<ext>`
//! 5. Insert into memory
//!
//! Readers therefore see either nothing or a complete file. Concurrent writers
//! for one key each rename their own temporary file; the last rename wins and
//! the contents are identical either way.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{IoError, PersistenceError};
use crate::io::Filesystem;
use crate::transform::{probe_dimensions, strip_data_uri_prefix};

use super::artifact::{ArtifactPayload, CachedArtifact};
use super::key::{CacheKey, EntryKind};
use super::memory::{CapacityPolicy, MemoryTier};

/// Process-wide counter for unique temporary file names.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held in memory
    pub memory_entries: usize,
    /// Bytes accounted in memory
    pub memory_bytes: u64,
    /// Lookups served from memory
    pub memory_hits: u64,
    /// Lookups served from disk (and promoted)
    pub disk_hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Successful writes
    pub writes: u64,
    /// Entries removed by a bounded capacity policy
    pub evictions: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} entries in memory ({} bytes), {} memory hits, {} disk hits, {} misses, {} writes, {} evictions",
            self.memory_entries,
            self.memory_bytes,
            self.memory_hits,
            self.disk_hits,
            self.misses,
            self.writes,
            self.evictions
        )
    }
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

// =============================================================================
// Cache Store
// =============================================================================

/// Memory map backed by a cache directory.
///
/// # Thread Safety
///
/// The store is shared across tasks via `Arc`. No lock is held across I/O;
/// lookups for different keys only contend on the memory tier's short
/// critical section.
pub struct CacheStore {
    dir: PathBuf,
    fs: Arc<dyn Filesystem>,
    memory: MemoryTier,
    counters: Counters,
}

impl CacheStore {
    /// Create a store rooted at `dir`.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(dir: impl Into<PathBuf>, fs: Arc<dyn Filesystem>, policy: CapacityPolicy) -> Self {
        Self {
            dir: dir.into(),
            fs,
            memory: MemoryTier::new(policy),
            counters: Counters::default(),
        }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the persistent entry for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn temp_path(&self, key: &CacheKey) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.tmp-{}-{}",
            key.file_name(),
            std::process::id(),
            n
        ))
    }

    /// Look up `key`: memory first, then disk.
    ///
    /// A disk hit is promoted into memory before it is returned. Unreadable or
    /// empty disk entries count as misses.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedArtifact> {
        if let Some(artifact) = self.memory.get(key).await {
            trace!(key = %key, "Memory cache hit");
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(artifact);
        }

        match self.load_from_disk(key).await {
            Some(artifact) => {
                trace!(key = %key, "Disk cache hit");
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                let evicted = self.memory.insert(key.clone(), artifact.clone()).await;
                self.remove_evicted(evicted).await;
                debug!(key = %key, "Promoted disk entry into memory");
                Some(artifact)
            }
            None => {
                trace!(key = %key, "Cache miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn load_from_disk(&self, key: &CacheKey) -> Option<CachedArtifact> {
        let path = self.entry_path(key);

        let meta = match self.fs.metadata(&path).await {
            Ok(meta) => meta,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(path = %path.display(), error = %e, "Cannot stat cache entry");
                }
                return None;
            }
        };
        if !meta.is_file || meta.len == 0 {
            warn!(path = %path.display(), "Ignoring empty or non-file cache entry");
            return None;
        }

        let data = match self.fs.read(&path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read cache entry");
                return None;
            }
        };

        match key.kind() {
            EntryKind::Image(format) => match probe_dimensions(&data) {
                Ok((width, height)) => Some(CachedArtifact::Image {
                    path,
                    width,
                    height,
                    format,
                    size_bytes: meta.len,
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable cached image");
                    None
                }
            },
            EntryKind::Base64 => match std::str::from_utf8(&data) {
                Ok(text) => Some(CachedArtifact::Base64 {
                    path,
                    data: strip_data_uri_prefix(text.trim()).into(),
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring non-UTF-8 base64 entry");
                    None
                }
            },
        }
    }

    /// Persist `payload` under `key`, then cache it in memory.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the directory cannot be created or the
    /// entry cannot be written and verified. Memory is left untouched and no
    /// entry becomes visible to `get`.
    pub async fn put(
        &self,
        key: &CacheKey,
        payload: ArtifactPayload,
    ) -> Result<CachedArtifact, PersistenceError> {
        self.fs
            .create_dir_all(&self.dir)
            .await
            .map_err(|e| PersistenceError::CreateDir {
                path: self.dir.display().to_string(),
                source: e,
            })?;

        let path = self.entry_path(key);
        let temp = self.temp_path(key);
        let bytes = payload.bytes();
        let expected = bytes.len() as u64;

        if let Err(e) = self.fs.write(&temp, bytes).await {
            self.discard(&temp).await;
            return Err(write_error(&path, e));
        }
        // A short temp file must never reach the entry path.
        let actual = match self.fs.metadata(&temp).await {
            Ok(meta) => meta.len,
            Err(e) => {
                self.discard(&temp).await;
                return Err(write_error(&path, e));
            }
        };
        if actual != expected {
            self.discard(&temp).await;
            return Err(PersistenceError::SizeMismatch {
                path: path.display().to_string(),
                expected,
                actual,
            });
        }

        if let Err(e) = self.fs.rename(&temp, &path).await {
            self.discard(&temp).await;
            return Err(write_error(&path, e));
        }

        let artifact = payload.into_artifact(path);
        let evicted = self.memory.insert(key.clone(), artifact.clone()).await;
        self.remove_evicted(evicted).await;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        debug!(key = %key, bytes = expected, "Stored cache entry");
        Ok(artifact)
    }

    /// Clear memory, and with `include_disk` the whole cache directory.
    ///
    /// The directory is recreated empty. Removing a directory that is already
    /// gone is not an error.
    pub async fn invalidate(&self, include_disk: bool) -> Result<(), PersistenceError> {
        self.memory.clear().await;

        if include_disk {
            self.fs
                .remove_dir_all(&self.dir)
                .await
                .map_err(|e| PersistenceError::Remove {
                    path: self.dir.display().to_string(),
                    source: e,
                })?;
            self.fs
                .create_dir_all(&self.dir)
                .await
                .map_err(|e| PersistenceError::CreateDir {
                    path: self.dir.display().to_string(),
                    source: e,
                })?;
        }

        debug!(include_disk, dir = %self.dir.display(), "Invalidated cache");
        Ok(())
    }

    async fn remove_evicted(&self, evicted: Vec<(CacheKey, CachedArtifact)>) {
        for (key, artifact) in evicted {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            match self.fs.remove_file(artifact.path()).await {
                Ok(()) => debug!(key = %key, "Evicted cache entry"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to remove evicted entry"),
            }
        }
    }

    async fn discard(&self, temp: &Path) {
        if let Err(e) = self.fs.remove_file(temp).await {
            if !e.is_not_found() {
                warn!(path = %temp.display(), error = %e, "Failed to remove temporary file");
            }
        }
    }

    /// Check the memory tier only.
    pub async fn contains_in_memory(&self, key: &CacheKey) -> bool {
        self.memory.contains(key).await
    }

    /// Current statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.len().await,
            memory_bytes: self.memory.size().await,
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.memory.policy()
    }
}

fn write_error(path: &Path, source: IoError) -> PersistenceError {
    PersistenceError::Write {
        path: path.display().to_string(),
        source,
    }
}
