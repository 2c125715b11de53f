use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::transform::{OutputFormat, TransformedImage};

/// An entry served by the cache.
///
/// Artifacts are immutable. A hit always means the bytes at `path` were fully
/// written and verified when the entry was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CachedArtifact {
    /// A resized, re-encoded image on disk
    Image {
        path: PathBuf,
        width: u32,
        height: u32,
        format: OutputFormat,
        size_bytes: u64,
    },

    /// A base64 payload, held in memory and mirrored to a `.txt` file
    Base64 {
        path: PathBuf,
        #[serde(skip)]
        data: Arc<str>,
    },
}

impl CachedArtifact {
    /// Path of the persistent entry.
    pub fn path(&self) -> &Path {
        match self {
            CachedArtifact::Image { path, .. } => path,
            CachedArtifact::Base64 { path, .. } => path,
        }
    }

    /// Bytes accounted against a byte-bounded capacity policy.
    pub fn weight(&self) -> u64 {
        match self {
            CachedArtifact::Image { size_bytes, .. } => *size_bytes,
            CachedArtifact::Base64 { data, .. } => data.len() as u64,
        }
    }

    /// Output dimensions, for image entries.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            CachedArtifact::Image { width, height, .. } => Some((*width, *height)),
            CachedArtifact::Base64 { .. } => None,
        }
    }

    /// Base64 text, for base64 entries.
    pub fn base64(&self) -> Option<&str> {
        match self {
            CachedArtifact::Base64 { data, .. } => Some(data),
            CachedArtifact::Image { .. } => None,
        }
    }
}

/// Content handed to [`CacheStore::put`](super::CacheStore::put).
#[derive(Debug, Clone)]
pub enum ArtifactPayload {
    Image(TransformedImage),
    Base64(String),
}

impl ArtifactPayload {
    /// Bytes written to the persistent entry.
    pub fn bytes(&self) -> &[u8] {
        match self {
            ArtifactPayload::Image(image) => &image.data,
            ArtifactPayload::Base64(text) => text.as_bytes(),
        }
    }

    pub(crate) fn into_artifact(self, path: PathBuf) -> CachedArtifact {
        match self {
            ArtifactPayload::Image(image) => CachedArtifact::Image {
                path,
                width: image.width,
                height: image.height,
                format: image.format,
                size_bytes: image.data.len() as u64,
            },
            ArtifactPayload::Base64(text) => CachedArtifact::Base64 {
                path,
                data: text.into(),
            },
        }
    }
}
