//! Image cache service.
//!
//! The service is the entry point for collaborators. Every request goes
//! through the same pipeline:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       ImageCacheService                          │
//! │                                                                  │
//! │  raw uri ─▶ normalize ─▶ derive key ─▶ store.get ──hit──▶ return │
//! │                                            │                     │
//! │                                           miss                   │
//! │                                            ▼                     │
//! │                 exists? ─▶ transform (─▶ base64) ─▶ store.put    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Build one service at startup and share it behind an `Arc`.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::cache::{
    derive_key, ArtifactPayload, CacheKey, CacheStats, CacheStore, CachedArtifact, InFlight,
    KeyVariant,
};
use crate::config::StoreConfig;
use crate::error::{EncodingError, ImageCacheError, ImageProcessingError, IoError};
use crate::io::{Filesystem, LocalFilesystem};
use crate::uri::{ExistenceVerifier, ImageReference, UriNormalizer};

use super::base64::Base64Encoder;
use super::encoder::{ImageResizer, ImageTransformer};
use super::spec::TransformSpec;

/// Result of [`ImageCacheService::process_image`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedImage {
    /// Reference to the cached output file
    pub uri: String,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Whether the result was served without transforming
    pub cache_hit: bool,
}

/// Resizes, encodes and caches images.
///
/// # Example
///
/// ```no_run
/// use pixcache::{ImageCacheService, StoreConfig, TransformSpec};
///
/// # async fn run() -> Result<(), pixcache::ImageCacheError> {
/// let service = ImageCacheService::new(StoreConfig::default());
///
/// let first = service.process_image("file:///photos/coin.jpg", &TransformSpec::upload()).await?;
/// let second = service.process_image("/photos/coin.jpg?v=2", &TransformSpec::upload()).await?;
/// assert!(!first.cache_hit);
/// assert!(second.cache_hit);
/// # Ok(())
/// # }
/// ```
pub struct ImageCacheService {
    normalizer: UriNormalizer,
    verifier: ExistenceVerifier,
    store: CacheStore,
    transformer: Arc<dyn ImageTransformer>,
    base64: Base64Encoder,
    in_flight: Option<InFlight>,
}

impl ImageCacheService {
    /// Create a service over the local filesystem.
    pub fn new(config: StoreConfig) -> Self {
        let fs: Arc<dyn Filesystem> = Arc::new(LocalFilesystem::new());
        let transformer = Arc::new(ImageResizer::new(Arc::clone(&fs)));
        Self::with_components(config, fs, transformer)
    }

    /// Create a service with a custom filesystem and transformer.
    pub fn with_components(
        config: StoreConfig,
        fs: Arc<dyn Filesystem>,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Self {
        let normalizer = config.normalizer();
        Self {
            verifier: ExistenceVerifier::new(normalizer.clone(), Arc::clone(&fs)),
            store: CacheStore::new(config.cache_dir, fs, config.capacity),
            base64: Base64Encoder::new(Arc::clone(&transformer)),
            transformer,
            normalizer,
            in_flight: config.dedupe_in_flight.then(InFlight::new),
        }
    }

    /// Resize and re-encode an image, or return the cached result.
    ///
    /// Equivalent references (differing only by `file://`, query or fragment)
    /// share one entry.
    pub async fn process_image<'a>(
        &self,
        raw: impl Into<Option<&'a str>>,
        spec: &TransformSpec,
    ) -> Result<ProcessedImage, ImageCacheError> {
        spec.validate()?;
        let reference = self.reference(raw.into())?;
        let variant = KeyVariant::Transform(*spec);
        let key = derive_key(&reference, &variant);

        let (artifact, cache_hit) = self.get_or_produce(&reference, &key, &variant).await?;

        let (width, height) = artifact.dimensions().unwrap_or_default();
        let uri = self
            .normalizer
            .reference_for_path(artifact.path())
            .to_string();

        Ok(ProcessedImage {
            uri,
            width,
            height,
            cache_hit,
        })
    }

    /// Raw base64 of the image downsized with [`TransformSpec::analysis`].
    ///
    /// The payload carries no `data:` prefix.
    pub async fn image_to_base64<'a>(
        &self,
        raw: impl Into<Option<&'a str>>,
    ) -> Result<String, ImageCacheError> {
        let reference = self.reference(raw.into())?;
        let variant = KeyVariant::Base64Export;
        let key = derive_key(&reference, &variant);

        let (artifact, _) = self.get_or_produce(&reference, &key, &variant).await?;
        match artifact.base64() {
            Some(data) => Ok(data.to_string()),
            None => Err(EncodingError::NotBase64 {
                path: artifact.path().display().to_string(),
            }
            .into()),
        }
    }

    /// Clear the memory tier, and with `include_disk` every persisted entry.
    pub async fn clear(&self, include_disk: bool) -> Result<(), ImageCacheError> {
        self.store.invalidate(include_disk).await?;
        Ok(())
    }

    /// Whether `raw` names a file that still exists. Never fails.
    pub async fn exists<'a>(&self, raw: impl Into<Option<&'a str>>) -> bool {
        self.verifier.exists(raw).await
    }

    /// Current cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.store.stats().await
    }

    /// The normalizer requests go through.
    pub fn normalizer(&self) -> &UriNormalizer {
        &self.normalizer
    }

    /// The underlying store.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn reference(&self, raw: Option<&str>) -> Result<ImageReference, ImageCacheError> {
        self.normalizer
            .normalize(raw)
            .ok_or_else(|| ImageCacheError::InvalidReference(raw.unwrap_or_default().to_string()))
    }

    /// Serve `key` from the store, producing and storing it on a miss.
    ///
    /// Returns the artifact and whether it was a hit.
    async fn get_or_produce(
        &self,
        reference: &ImageReference,
        key: &CacheKey,
        variant: &KeyVariant,
    ) -> Result<(CachedArtifact, bool), ImageCacheError> {
        loop {
            if let Some(artifact) = self.store.get(key).await {
                return Ok((artifact, true));
            }

            let _leader = match &self.in_flight {
                Some(in_flight) => match in_flight.join(key).await {
                    Some(guard) => {
                        // A previous leader may have finished between the
                        // lookup and the claim.
                        if let Some(artifact) = self.store.get(key).await {
                            return Ok((artifact, true));
                        }
                        Some(guard)
                    }
                    None => continue,
                },
                None => None,
            };

            self.ensure_source(reference).await?;
            let payload = self.produce(reference, variant).await?;
            let artifact = self.store.put(key, payload).await?;

            debug!(reference = %reference, key = %key, "Cached new artifact");
            return Ok((artifact, false));
        }
    }

    async fn ensure_source(&self, reference: &ImageReference) -> Result<(), ImageProcessingError> {
        if reference.local_path().is_none() {
            return Err(ImageProcessingError::UnsupportedReference {
                reference: reference.to_string(),
            });
        }
        if !self.verifier.exists(reference.as_str()).await {
            return Err(ImageProcessingError::SourceUnavailable {
                reference: reference.to_string(),
                source: IoError::NotFound(reference.to_string()),
            });
        }
        Ok(())
    }

    async fn produce(
        &self,
        reference: &ImageReference,
        variant: &KeyVariant,
    ) -> Result<ArtifactPayload, ImageCacheError> {
        match variant {
            KeyVariant::Transform(spec) => {
                let image = self.transformer.transform(reference, spec).await?;
                Ok(ArtifactPayload::Image(image))
            }
            KeyVariant::Base64Export => {
                let payload = self.base64.encode(reference).await?;
                Ok(ArtifactPayload::Base64(payload))
            }
        }
    }
}
