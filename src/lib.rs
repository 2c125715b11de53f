//! # pixcache
//!
//! A two-tier (memory + disk) content-transformation cache for images.
//!
//! Uploads and analysis requests repeatedly resize, re-encode and base64 the
//! same photos. This library does that work once per (image, parameters) pair
//! and serves every later request from cache.
//!
//! ## Features
//!
//! - **Canonical references**: `file://` prefixes, query strings and fragments
//!   do not create distinct cache entries
//! - **Content-transformation keys**: SHA-256 over the reference and the
//!   transform parameters
//! - **Two tiers**: an LRU memory map in front of a persistent directory, with
//!   disk hits promoted into memory
//! - **Atomic writes**: entries appear only once fully written and verified
//! - **Base64 export**: fixed-size JPEG payloads for analysis requests
//!
//! ## Architecture
//!
//! - [`uri`] - Reference normalization and existence checks
//! - [`cache`] - Key derivation, memory tier and cache store
//! - [`transform`] - Resizing, base64 encoding and the service pipeline
//! - [`io`] - Filesystem abstraction
//! - [`config`] - Library and CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use pixcache::{ImageCacheService, StoreConfig, TransformSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pixcache::ImageCacheError> {
//!     let service = ImageCacheService::new(StoreConfig::new("/tmp/pixcache"));
//!
//!     let image = service
//!         .process_image("file:///photos/stamp.jpg", &TransformSpec::upload())
//!         .await?;
//!     println!("{} ({}x{})", image.uri, image.width, image.height);
//!
//!     let payload = service.image_to_base64("/photos/stamp.jpg").await?;
//!     println!("{} base64 chars", payload.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod io;
pub mod transform;
pub mod uri;

// Re-export commonly used types
pub use cache::{CacheKey, CacheStats, CacheStore, CachedArtifact, CapacityPolicy, KeyVariant};
pub use config::{Cli, Command, StoreConfig};
pub use error::{EncodingError, ImageCacheError, ImageProcessingError, IoError, PersistenceError};
pub use io::{Filesystem, LocalFilesystem};
pub use transform::{
    Base64Encoder, ImageCacheService, ImageResizer, ImageTransformer, OutputFormat,
    ProcessedImage, TransformSpec,
};
pub use uri::{ExistenceVerifier, ImageReference, SchemePolicy, UriNormalizer};
