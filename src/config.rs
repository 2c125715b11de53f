//! Configuration management for pixcache.
//!
//! The library is configured through [`StoreConfig`]. The `pixcache` binary
//! builds one from command-line arguments, each of which can also be set via an
//! environment variable with the `PIXCACHE_` prefix:
//!
//! - `PIXCACHE_CACHE_DIR` - Cache directory (default: platform cache dir + `image-cache`)
//! - `PIXCACHE_SCHEME` - How local files are addressed: `file` or `bare` (default: file)
//! - `PIXCACHE_MAX_ENTRIES` - Bound the cache by entry count (default: unbounded)
//! - `PIXCACHE_MAX_BYTES` - Bound the cache by artifact bytes (default: unbounded)
//! - `PIXCACHE_DEDUPE` - Collapse concurrent identical requests (default: false)
//!
//! # Example
//!
//! ```
//! use pixcache::config::StoreConfig;
//!
//! let config = StoreConfig::new("/tmp/pixcache")
//!     .with_max_entries(500)
//!     .with_dedupe(true);
//! assert!(config.validate().is_ok());
//! ```

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::cache::CapacityPolicy;
use crate::error::ImageProcessingError;
use crate::transform::{OutputFormat, TransformSpec};
use crate::uri::{SchemePolicy, UriNormalizer};

// =============================================================================
// Default Values
// =============================================================================

/// Subdirectory of the cache root holding entries.
pub const DEFAULT_CACHE_SUBDIR: &str = "image-cache";

/// Application name used to locate the platform cache directory.
const APP_NAME: &str = "pixcache";

/// Default cache directory: the platform cache dir plus [`DEFAULT_CACHE_SUBDIR`].
///
/// Falls back to the system temp directory when no home directory is known.
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME).map_or_else(
        || std::env::temp_dir().join(APP_NAME).join(DEFAULT_CACHE_SUBDIR),
        |dirs| dirs.cache_dir().join(DEFAULT_CACHE_SUBDIR),
    )
}

// =============================================================================
// Library Configuration
// =============================================================================

/// Settings for building an [`ImageCacheService`](crate::ImageCacheService).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding persistent entries
    pub cache_dir: PathBuf,

    /// Memory-tier bound; evictions also delete the entry's file
    pub capacity: CapacityPolicy,

    /// Collapse concurrent requests for the same key into one transform
    pub dedupe_in_flight: bool,

    /// How local files are written back out as references
    pub scheme: SchemePolicy,
}

impl StoreConfig {
    /// Unbounded, non-deduplicating config rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            capacity: CapacityPolicy::Unbounded,
            dedupe_in_flight: false,
            scheme: SchemePolicy::default(),
        }
    }

    pub fn with_capacity(mut self, capacity: CapacityPolicy) -> Self {
        self.capacity = capacity;
        self
    }

    /// Bound the cache to `max` entries. Zero leaves it unbounded.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.capacity = match NonZeroUsize::new(max) {
            Some(max) => CapacityPolicy::MaxEntries(max),
            None => CapacityPolicy::Unbounded,
        };
        self
    }

    pub fn with_max_bytes(mut self, max: u64) -> Self {
        self.capacity = CapacityPolicy::MaxBytes(max);
        self
    }

    pub fn with_dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_in_flight = enabled;
        self
    }

    pub fn with_scheme(mut self, scheme: SchemePolicy) -> Self {
        self.scheme = scheme;
        self
    }

    /// Normalizer using this config's scheme policy.
    pub fn normalizer(&self) -> UriNormalizer {
        UriNormalizer::new(self.scheme.clone())
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }
        if self.capacity == CapacityPolicy::MaxBytes(0) {
            return Err("max_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(default_cache_dir())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// pixcache - A two-tier cache for resized images and base64 payloads.
///
/// Resizes and re-encodes local images once, then serves the result from
/// memory or disk for every later request with the same parameters.
#[derive(Parser, Debug, Clone)]
#[command(name = "pixcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding cached entries.
    #[arg(long, global = true, env = "PIXCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// How local files are addressed in returned references.
    #[arg(long, global = true, value_enum, default_value_t = SchemeArg::File, env = "PIXCACHE_SCHEME")]
    pub scheme: SchemeArg,

    /// Bound the cache to this many entries.
    #[arg(long, global = true, env = "PIXCACHE_MAX_ENTRIES", conflicts_with = "max_bytes")]
    pub max_entries: Option<usize>,

    /// Bound the cache to this many bytes of artifacts.
    #[arg(long, global = true, env = "PIXCACHE_MAX_BYTES")]
    pub max_bytes: Option<u64>,

    /// Collapse concurrent identical requests into one transform.
    #[arg(long, global = true, default_value_t = false, env = "PIXCACHE_DEDUPE")]
    pub dedupe: bool,

    /// Enable verbose logging (debug level) and print cache statistics.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Reference style for local files.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeArg {
    /// `file:///path/to/image.jpg`
    File,
    /// `/path/to/image.jpg`
    Bare,
}

impl From<SchemeArg> for SchemePolicy {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::File => SchemePolicy::file_scheme(),
            SchemeArg::Bare => SchemePolicy::bare(),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resize and re-encode an image, printing the cached result as JSON.
    Process(ProcessArgs),

    /// Print the analysis payload for an image as raw base64.
    Base64 {
        /// Image reference (path or file:// URI)
        uri: String,
    },

    /// Drop cached entries.
    Clear {
        /// Also delete every file in the cache directory
        #[arg(long, default_value_t = false)]
        disk: bool,
    },

    /// Show the normalized reference and whether the file exists.
    Check {
        /// Image reference (path or file:// URI)
        uri: String,
    },
}

/// Arguments of the `process` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Image reference (path or file:// URI)
    pub uri: String,

    /// Maximum output width in pixels.
    #[arg(long, default_value_t = 1200)]
    pub width: u32,

    /// Maximum output height in pixels.
    #[arg(long, default_value_t = 1200)]
    pub height: u32,

    /// Compression quality (0.0-1.0, ignored for PNG).
    #[arg(long, default_value_t = 0.8)]
    pub quality: f32,

    /// Output format.
    #[arg(long, default_value_t = OutputFormat::Jpeg)]
    pub format: OutputFormat,
}

impl ProcessArgs {
    /// Validated transform spec for these arguments.
    pub fn spec(&self) -> Result<TransformSpec, ImageProcessingError> {
        TransformSpec::new(self.width, self.height, self.quality, self.format)
    }
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries.is_some() && self.max_bytes.is_some() {
            return Err("max_entries and max_bytes cannot both be set".to_string());
        }
        if self.max_entries == Some(0) {
            return Err("max_entries must be greater than 0".to_string());
        }
        if self.max_bytes == Some(0) {
            return Err("max_bytes must be greater than 0".to_string());
        }
        if let Command::Process(args) = &self.command {
            args.spec().map_err(|e| e.to_string())?;
        }
        self.store_config().validate()
    }

    /// Library configuration for these arguments.
    pub fn store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(self.cache_dir.clone().unwrap_or_else(default_cache_dir))
            .with_dedupe(self.dedupe)
            .with_scheme(self.scheme.into());

        if let Some(max) = self.max_entries {
            config = config.with_max_entries(max);
        }
        if let Some(max) = self.max_bytes {
            config = config.with_max_bytes(max);
        }
        config
    }
}

// =============================================================================
// Tests
// =============================================================================
