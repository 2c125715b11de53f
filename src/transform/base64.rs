//! Base64 payloads for analysis requests.
//!
//! Analysis calls take a small JPEG as a raw base64 string. The encoder always
//! downsizes with [`TransformSpec::analysis`] first, so payload size is bounded
//! regardless of the source resolution.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::{EncodingError, ImageCacheError};
use crate::uri::ImageReference;

use super::encoder::{ImageTransformer, TransformedImage};
use super::spec::TransformSpec;

/// Smallest encoded image accepted for export, in bytes.
///
/// Anything shorter cannot be a real picture and usually means the source was
/// truncated.
pub const MIN_PAYLOAD_BYTES: usize = 100;

/// Strip a `data:<mime>;base64,` wrapper if present.
///
/// Text without a wrapper is returned unchanged.
pub fn strip_data_uri_prefix(text: &str) -> &str {
    if !text.starts_with("data:") {
        return text;
    }
    match text.find(',') {
        Some(idx) => &text[idx + 1..],
        None => text,
    }
}

/// Encode an already-transformed image as raw base64.
///
/// # Errors
///
/// Returns [`EncodingError::PayloadTooShort`] when the image holds fewer than
/// [`MIN_PAYLOAD_BYTES`] bytes.
pub fn encode_payload(image: &TransformedImage, reference: &str) -> Result<String, EncodingError> {
    if image.data.len() < MIN_PAYLOAD_BYTES {
        return Err(EncodingError::PayloadTooShort {
            reference: reference.to_string(),
            len: image.data.len(),
            min: MIN_PAYLOAD_BYTES,
        });
    }
    Ok(STANDARD.encode(&image.data))
}

/// Produces base64 payloads with the fixed analysis spec.
#[derive(Clone)]
pub struct Base64Encoder {
    transformer: Arc<dyn ImageTransformer>,
    spec: TransformSpec,
}

impl Base64Encoder {
    pub fn new(transformer: Arc<dyn ImageTransformer>) -> Self {
        Self {
            transformer,
            spec: TransformSpec::analysis(),
        }
    }

    /// The spec every payload is produced with.
    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }

    /// Downsize `reference` and encode it.
    ///
    /// This always runs the transformer; caching happens in the service.
    pub async fn encode(&self, reference: &ImageReference) -> Result<String, ImageCacheError> {
        let image = self.transformer.transform(reference, &self.spec).await?;
        let payload = encode_payload(&image, reference.as_str())?;

        debug!(
            reference = %reference,
            image_bytes = image.data.len(),
            payload_bytes = payload.len(),
            "Encoded base64 payload"
        );

        Ok(payload)
    }
}
