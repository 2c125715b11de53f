//! Two-tier cache for transformed images.
//!
//! Entries live in a process-lifetime memory tier backed by a persistent
//! directory. Keys are content-transformation keys: equal (reference, spec)
//! pairs always map to the same entry.
//!
//! - [`derive_key`]: SHA-256 key derivation
//! - [`MemoryTier`]: LRU map with an optional capacity bound
//! - [`CacheStore`]: memory + disk lookups, atomic writes, invalidation
//! - [`InFlight`]: optional collapsing of concurrent identical requests

mod artifact;
mod inflight;
mod key;
mod memory;
mod store;

pub use artifact::{ArtifactPayload, CachedArtifact};
pub use inflight::{InFlight, LeaderGuard};
pub use key::{derive_key, CacheKey, EntryKind, KeyVariant, BASE64_EXPORT_SENTINEL, BASE64_EXTENSION};
pub use memory::{CapacityPolicy, MemoryTier};
pub use store::{CacheStats, CacheStore};
