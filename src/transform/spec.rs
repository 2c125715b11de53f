//! Transform parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImageProcessingError;

/// Minimum quality on the JPEG encoder scale.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum quality on the JPEG encoder scale.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Output encoding for a transformed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension used for cache entries.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => f.write_str("jpeg"),
            OutputFormat::Png => f.write_str("png"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

/// A requested transformation: fit inside a bounding box, re-encode.
///
/// # Example
///
/// ```
/// use pixcache::transform::{OutputFormat, TransformSpec};
///
/// let spec = TransformSpec::new(640, 480, 0.75, OutputFormat::Jpeg).unwrap();
/// assert_eq!(spec.jpeg_quality(), 75);
/// assert!(TransformSpec::new(0, 480, 0.75, OutputFormat::Jpeg).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Maximum output width in pixels
    pub max_width: u32,

    /// Maximum output height in pixels
    pub max_height: u32,

    /// Compression quality, 0.0 to 1.0
    pub quality: f32,

    /// Output encoding
    pub format: OutputFormat,
}

impl TransformSpec {
    /// Create a validated spec.
    pub fn new(
        max_width: u32,
        max_height: u32,
        quality: f32,
        format: OutputFormat,
    ) -> Result<Self, ImageProcessingError> {
        let spec = Self {
            max_width,
            max_height,
            quality,
            format,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Spec used by the upload pipeline: 1200x1200, quality 0.8, JPEG.
    pub fn upload() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: 0.8,
            format: OutputFormat::Jpeg,
        }
    }

    /// Spec used for analysis payloads: 800x800, quality 0.7, JPEG.
    pub fn analysis() -> Self {
        Self {
            max_width: 800,
            max_height: 800,
            quality: 0.7,
            format: OutputFormat::Jpeg,
        }
    }

    /// Check dimensions and quality.
    pub fn validate(&self) -> Result<(), ImageProcessingError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ImageProcessingError::InvalidSpec {
                message: format!(
                    "bounding box must be non-zero, got {}x{}",
                    self.max_width, self.max_height
                ),
            });
        }
        if !self.quality.is_finite() || !(0.0..=1.0).contains(&self.quality) {
            return Err(ImageProcessingError::InvalidSpec {
                message: format!("quality must be between 0.0 and 1.0, got {}", self.quality),
            });
        }
        Ok(())
    }

    /// Quality on the JPEG encoder's 1-100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        let scaled = (self.quality * 100.0).round() as u8;
        scaled.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
    }

    /// Stable serialization used in cache keys.
    ///
    /// `quality` uses the shortest round-trip float formatting, so equal specs
    /// always serialize identically and distinct qualities never collide.
    pub fn key_params(&self) -> String {
        // -0.0 == 0.0, so both must print as "0"
        let quality = self.quality + 0.0;
        format!(
            "{}x{}_{}_{}",
            self.max_width,
            self.max_height,
            quality,
            self.format.extension()
        )
    }

    /// Output size that fits `(width, height)` inside the bounding box.
    ///
    /// Preserves aspect ratio, never upscales, never returns a zero side.
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.max_width && height <= self.max_height {
            return (width, height);
        }

        let scale = f64::min(
            self.max_width as f64 / width as f64,
            self.max_height as f64 / height as f64,
        );
        let new_width = ((width as f64 * scale).round() as u32).clamp(1, self.max_width);
        let new_height = ((height as f64 * scale).round() as u32).clamp(1, self.max_height);
        (new_width, new_height)
    }
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self::upload()
    }
}
