//! Image transformation and the caching pipeline.
//!
//! - [`TransformSpec`]: bounding box, quality and output format
//! - [`ImageResizer`]: decode, downsize and re-encode on the blocking pool
//! - [`Base64Encoder`]: fixed-spec payloads for analysis requests
//! - [`ImageCacheService`]: normalize, look up, transform on miss, persist

mod base64;
mod encoder;
mod service;
mod spec;

pub use self::base64::{encode_payload, strip_data_uri_prefix, Base64Encoder, MIN_PAYLOAD_BYTES};
pub use encoder::{
    probe_dimensions, transform_bytes, ImageResizer, ImageTransformer, TransformedImage,
};
pub use service::{ImageCacheService, ProcessedImage};
pub use spec::{OutputFormat, TransformSpec, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY};
