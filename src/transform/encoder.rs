//! Image transformer.
//!
//! Decodes source bytes, downsizes them into the requested bounding box and
//! re-encodes to the requested format.
//!
//! # Design Decisions
//!
//! - **One resize**: the output is computed with a single Lanczos3 resize from
//!   the decoded source. Aspect ratio is preserved and images already inside
//!   the box are not upscaled.
//!
//! - **Deterministic output**: the same source bytes and spec always produce
//!   the same output bytes. Concurrent writers for one cache key therefore
//!   write identical files.
//!
//! - **Nothing is written here**: the transformer returns bytes; persisting
//!   them is the cache store's job. A failed transform leaves no trace.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use tracing::debug;

use crate::error::ImageProcessingError;
use crate::io::Filesystem;
use crate::uri::ImageReference;

use super::spec::{OutputFormat, TransformSpec};

/// Output of a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedImage {
    /// Encoded image bytes
    pub data: Bytes,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Encoding of `data`
    pub format: OutputFormat,
}

/// Trait for the CPU-heavy transform step.
///
/// Callers go through the cache service rather than calling this directly, so
/// that repeated requests for one (reference, spec) pair only pay once.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    /// Resize and re-encode the image behind `reference`.
    async fn transform(
        &self,
        reference: &ImageReference,
        spec: &TransformSpec,
    ) -> Result<TransformedImage, ImageProcessingError>;
}

// =============================================================================
// Resizer
// =============================================================================

/// [`ImageTransformer`] that reads sources through a [`Filesystem`] and runs
/// the decode/resize/encode on the blocking thread pool.
#[derive(Clone)]
pub struct ImageResizer {
    fs: Arc<dyn Filesystem>,
}

impl ImageResizer {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ImageTransformer for ImageResizer {
    async fn transform(
        &self,
        reference: &ImageReference,
        spec: &TransformSpec,
    ) -> Result<TransformedImage, ImageProcessingError> {
        spec.validate()?;

        let path =
            reference
                .local_path()
                .ok_or_else(|| ImageProcessingError::UnsupportedReference {
                    reference: reference.to_string(),
                })?;

        let source = self.fs.read(&path).await.map_err(|e| {
            ImageProcessingError::SourceUnavailable {
                reference: reference.to_string(),
                source: e,
            }
        })?;

        let spec = *spec;
        let name = reference.to_string();
        let output = tokio::task::spawn_blocking(move || transform_bytes(&source, &spec, &name))
            .await
            .map_err(|e| ImageProcessingError::TaskFailed {
                message: e.to_string(),
            })??;

        debug!(
            reference = %reference,
            width = output.width,
            height = output.height,
            bytes = output.data.len(),
            "Transformed image"
        );

        Ok(output)
    }
}

// =============================================================================
// Synchronous Pipeline
// =============================================================================

/// Decode `source`, fit it into `spec`'s box and encode it.
///
/// `reference` is only used in error messages.
pub fn transform_bytes(
    source: &[u8],
    spec: &TransformSpec,
    reference: &str,
) -> Result<TransformedImage, ImageProcessingError> {
    let img = decode(source).map_err(|message| ImageProcessingError::Decode {
        reference: reference.to_string(),
        message,
    })?;

    let (width, height) = spec.fit(img.width(), img.height());
    let img = if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    let data = encode(&img, spec).map_err(|message| ImageProcessingError::Encode {
        reference: reference.to_string(),
        message,
    })?;

    Ok(TransformedImage {
        data: Bytes::from(data),
        width,
        height,
        format: spec.format,
    })
}

fn decode(source: &[u8]) -> Result<DynamicImage, String> {
    ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())
}

fn encode(img: &DynamicImage, spec: &TransformSpec) -> Result<Vec<u8>, String> {
    let mut output = Vec::new();

    match spec.format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut output, spec.jpeg_quality())
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(|e| e.to_string())?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut output);
            let result = if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                encoder.write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )
            } else {
                let rgb = img.to_rgb8();
                encoder.write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
            };
            result.map_err(|e| e.to_string())?;
        }
    }

    Ok(output)
}

/// Read image dimensions from the header without decoding pixels.
pub fn probe_dimensions(data: &[u8]) -> Result<(u32, u32), String> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())
}
