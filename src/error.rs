use thiserror::Error;

/// I/O errors raised by the filesystem layer
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other filesystem failure
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl IoError {
    /// Build an `IoError` from a `std::io::Error`, keeping `NotFound` distinct.
    pub fn from_std(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path.display().to_string())
        } else {
            IoError::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Returns true if the error means the path is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IoError::NotFound(_))
    }
}

/// Errors from decoding, resizing or re-encoding an image
#[derive(Debug, Clone, Error)]
pub enum ImageProcessingError {
    /// Source bytes could not be read
    #[error("Cannot read source image {reference}: {source}")]
    SourceUnavailable { reference: String, source: IoError },

    /// Reference does not resolve to a local file
    #[error("Unsupported image reference: {reference}")]
    UnsupportedReference { reference: String },

    /// Source bytes are corrupt or in an unsupported format
    #[error("Failed to decode {reference}: {message}")]
    Decode { reference: String, message: String },

    /// Encoding to the output format failed
    #[error("Failed to encode {reference}: {message}")]
    Encode { reference: String, message: String },

    /// Transform parameters are out of range
    #[error("Invalid transform spec: {message}")]
    InvalidSpec { message: String },

    /// The blocking worker did not complete
    #[error("Transform task failed: {message}")]
    TaskFailed { message: String },
}

/// Errors from writing to or clearing the persistent tier
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    /// Cache directory could not be created
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir { path: String, source: IoError },

    /// Entry bytes could not be written
    #[error("Failed to write cache entry {path}: {source}")]
    Write { path: String, source: IoError },

    /// Written entry does not have the expected size
    #[error("Cache entry {path} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Cache directory could not be removed
    #[error("Failed to remove cache directory {path}: {source}")]
    Remove { path: String, source: IoError },
}

/// Errors from producing a base64 payload
#[derive(Debug, Clone, Error)]
pub enum EncodingError {
    /// Encoded image is too small to be a real picture
    #[error("Encoded image for {reference} is only {len} bytes (minimum {min})")]
    PayloadTooShort {
        reference: String,
        len: usize,
        min: usize,
    },

    /// A base64 lookup resolved to an entry holding something else
    #[error("Cache entry {path} does not hold base64 text")]
    NotBase64 { path: String },
}

/// Top-level error returned by the cache service
#[derive(Debug, Clone, Error)]
pub enum ImageCacheError {
    /// Reference normalized to nothing
    #[error("Invalid image reference: {0:?}")]
    InvalidReference(String),

    /// Transform failed
    #[error(transparent)]
    Processing(#[from] ImageProcessingError),

    /// Disk tier failed
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Base64 payload rejected
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
