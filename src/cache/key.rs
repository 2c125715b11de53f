//! Content-transformation cache keys.
//!
//! A key is the SHA-256 of the canonical image reference and a stable
//! serialization of what is being done to it. The same inputs always give the
//! same key; there are no timestamps or random salts. That collision-by-design
//! is what makes the cache work.
//!
//! # Layout
//!
//! ```text
//! sha256( reference ‖ 0x00 ‖ params )
//!
//! params = "{max_width}x{max_height}_{quality}_{ext}"   resize entries
//!        = "base64-export"                              base64 entries
//! ```
//!
//! The NUL separator cannot occur in a path, so a reference can never be
//! crafted to look like a different (reference, params) split.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::transform::{OutputFormat, TransformSpec};
use crate::uri::ImageReference;

/// Sentinel params for the base64 export path.
pub const BASE64_EXPORT_SENTINEL: &str = "base64-export";

/// File extension of base64 entries.
pub const BASE64_EXTENSION: &str = "txt";

/// What a key is for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyVariant {
    /// A resized, re-encoded image
    Transform(TransformSpec),

    /// A base64 payload for analysis requests
    Base64Export,
}

impl KeyVariant {
    fn params(&self) -> String {
        match self {
            KeyVariant::Transform(spec) => spec.key_params(),
            KeyVariant::Base64Export => BASE64_EXPORT_SENTINEL.to_string(),
        }
    }
}

/// Kind of artifact stored under a key, which selects the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Image(OutputFormat),
    Base64,
}

impl EntryKind {
    /// File extension for entries of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            EntryKind::Image(format) => format.extension(),
            EntryKind::Base64 => BASE64_EXTENSION,
        }
    }
}

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: Arc<str>,
    kind: EntryKind,
}

impl CacheKey {
    /// Lowercase hex SHA-256 digest (64 characters).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Kind of entry stored under this key.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// File name of the persistent entry: `<digest>.<ext>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.digest, self.kind.extension())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Derive the key for `reference` under `variant`.
///
/// Pure and deterministic.
///
/// # Example
///
/// ```
/// use pixcache::cache::{derive_key, KeyVariant};
/// use pixcache::transform::TransformSpec;
/// use pixcache::uri::UriNormalizer;
///
/// let reference = UriNormalizer::default().normalize("/tmp/photo.jpg").unwrap();
/// let resized = derive_key(&reference, &KeyVariant::Transform(TransformSpec::upload()));
/// let base64 = derive_key(&reference, &KeyVariant::Base64Export);
///
/// assert_eq!(resized.digest().len(), 64);
/// assert_ne!(resized.digest(), base64.digest());
/// assert!(resized.file_name().ends_with(".jpg"));
/// assert!(base64.file_name().ends_with(".txt"));
/// ```
pub fn derive_key(reference: &ImageReference, variant: &KeyVariant) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(variant.params().as_bytes());

    let kind = match variant {
        KeyVariant::Transform(spec) => EntryKind::Image(spec.format),
        KeyVariant::Base64Export => EntryKind::Base64,
    };

    CacheKey {
        digest: hex::encode(hasher.finalize()).into(),
        kind,
    }
}
