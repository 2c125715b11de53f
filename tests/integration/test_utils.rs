//! Test utilities for integration tests.
//!
//! This module provides spy implementations of the filesystem and transformer
//! seams and helpers for writing test images to disk.

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::RwLock;

use pixcache::error::{ImageProcessingError, IoError};
use pixcache::io::{FileMetadata, Filesystem, LocalFilesystem};
use pixcache::transform::{ImageResizer, ImageTransformer, OutputFormat, TransformedImage};
use pixcache::{ImageCacheService, ImageReference, StoreConfig, TransformSpec};

// =============================================================================
// Image Fixtures
// =============================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    })
}

/// Create a JPEG with a gradient pattern.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 90)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Create a PNG with a gradient pattern.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Write `data` under `dir` and return the absolute path as a string.
pub fn write_source(dir: &TempDir, name: &str, data: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path.to_string_lossy().into_owned()
}

/// Names of all files in the cache directory, sorted.
pub fn cache_files(cache_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Tracking Filesystem
// =============================================================================

/// Filesystem operation recorded by [`TrackingFilesystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Metadata,
    Read,
    Write,
    Rename,
    RemoveFile,
    CreateDir,
    RemoveDir,
}

/// A local filesystem that records every call and can be told to fail writes.
#[derive(Clone)]
pub struct TrackingFilesystem {
    inner: LocalFilesystem,
    call_count: Arc<AtomicUsize>,
    calls: Arc<RwLock<Vec<(FsOp, PathBuf)>>>,
    fail_writes: Arc<AtomicBool>,
}

impl TrackingFilesystem {
    pub fn new() -> Self {
        Self {
            inner: LocalFilesystem::new(),
            call_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(RwLock::new(Vec::new())),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub async fn get_calls(&self) -> Vec<(FsOp, PathBuf)> {
        self.calls.read().await.clone()
    }

    pub async fn count_of(&self, op: FsOp) -> usize {
        self.calls.read().await.iter().filter(|(o, _)| *o == op).count()
    }

    pub async fn reset_tracking(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.calls.write().await.clear();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn record(&self, op: FsOp, path: &Path) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.write().await.push((op, path.to_path_buf()));
    }
}

impl Default for TrackingFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filesystem for TrackingFilesystem {
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, IoError> {
        self.record(FsOp::Metadata, path).await;
        self.inner.metadata(path).await
    }

    async fn read(&self, path: &Path) -> Result<Bytes, IoError> {
        self.record(FsOp::Read, path).await;
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<(), IoError> {
        self.record(FsOp::Write, path).await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IoError::Io {
                path: path.display().to_string(),
                message: "injected write failure".to_string(),
            });
        }
        self.inner.write(path, data).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError> {
        self.record(FsOp::Rename, to).await;
        self.inner.rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> Result<(), IoError> {
        self.record(FsOp::RemoveFile, path).await;
        self.inner.remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), IoError> {
        self.record(FsOp::CreateDir, path).await;
        self.inner.create_dir_all(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), IoError> {
        self.record(FsOp::RemoveDir, path).await;
        self.inner.remove_dir_all(path).await
    }
}

/// A local filesystem whose writes silently drop trailing bytes.
#[derive(Clone, Default)]
pub struct TruncatingFilesystem {
    inner: LocalFilesystem,
    dropped: usize,
}

impl TruncatingFilesystem {
    pub fn new(dropped: usize) -> Self {
        Self {
            inner: LocalFilesystem::new(),
            dropped,
        }
    }
}

#[async_trait]
impl Filesystem for TruncatingFilesystem {
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, IoError> {
        self.inner.metadata(path).await
    }

    async fn read(&self, path: &Path) -> Result<Bytes, IoError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<(), IoError> {
        let keep = data.len().saturating_sub(self.dropped);
        self.inner.write(path, &data[..keep]).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError> {
        self.inner.rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> Result<(), IoError> {
        self.inner.remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), IoError> {
        self.inner.create_dir_all(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), IoError> {
        self.inner.remove_dir_all(path).await
    }
}

// =============================================================================
// Counting Transformer
// =============================================================================

/// Wraps the real resizer and counts how often it runs.
///
/// An optional delay keeps the transform in flight long enough for
/// concurrency tests to overlap.
#[derive(Clone)]
pub struct CountingTransformer {
    inner: ImageResizer,
    count: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingTransformer {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self {
            inner: ImageResizer::new(fs),
            count: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageTransformer for CountingTransformer {
    async fn transform(
        &self,
        reference: &ImageReference,
        spec: &TransformSpec,
    ) -> Result<TransformedImage, ImageProcessingError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.transform(reference, spec).await
    }
}

/// Transformer that returns an implausibly small "image".
pub struct TinyOutputTransformer;

#[async_trait]
impl ImageTransformer for TinyOutputTransformer {
    async fn transform(
        &self,
        _reference: &ImageReference,
        spec: &TransformSpec,
    ) -> Result<TransformedImage, ImageProcessingError> {
        Ok(TransformedImage {
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
            width: 1,
            height: 1,
            format: spec.format,
        })
    }
}

// =============================================================================
// Service Fixture
// =============================================================================

/// A service wired to spies, rooted in a temporary directory.
pub struct TestHarness {
    pub dir: TempDir,
    pub fs: TrackingFilesystem,
    pub transformer: CountingTransformer,
    pub service: ImageCacheService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::build(|config| config)
    }

    pub fn with_dedupe() -> Self {
        Self::build(|config| config.with_dedupe(true))
    }

    /// Build a harness, letting the caller adjust the config.
    pub fn build(configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        Self::build_with_delay(configure, None)
    }

    pub fn build_with_delay(
        configure: impl FnOnce(StoreConfig) -> StoreConfig,
        delay: Option<Duration>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let fs = TrackingFilesystem::new();
        let shared: Arc<dyn Filesystem> = Arc::new(fs.clone());

        let mut transformer = CountingTransformer::new(Arc::clone(&shared));
        if let Some(delay) = delay {
            transformer = transformer.with_delay(delay);
        }

        let config = configure(StoreConfig::new(dir.path().join("image-cache")));
        let service =
            ImageCacheService::with_components(config, shared, Arc::new(transformer.clone()));

        Self {
            dir,
            fs,
            transformer,
            service,
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("image-cache")
    }

    /// Write a JPEG source image and return its path.
    pub fn jpeg_source(&self, name: &str, width: u32, height: u32) -> String {
        write_source(&self.dir, name, &create_test_jpeg(width, height))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Output format of encoded bytes, panicking on anything unexpected.
pub fn format_of(data: &[u8]) -> OutputFormat {
    match image::guess_format(data).expect("unrecognised image bytes") {
        image::ImageFormat::Jpeg => OutputFormat::Jpeg,
        image::ImageFormat::Png => OutputFormat::Png,
        other => panic!("unexpected format {other:?}"),
    }
}
