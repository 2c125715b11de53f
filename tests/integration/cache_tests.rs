//! Cache store and key derivation tests.

use std::sync::Arc;

use pixcache::cache::{derive_key, ArtifactPayload, CacheStore, CapacityPolicy, KeyVariant};
use pixcache::error::PersistenceError;
use pixcache::io::Filesystem;
use pixcache::transform::{transform_bytes, OutputFormat, TransformSpec};
use pixcache::uri::UriNormalizer;
use tempfile::TempDir;

use super::test_utils::{
    cache_files, create_test_png, FsOp, TrackingFilesystem, TruncatingFilesystem,
};

fn tracked_store(dir: &TempDir) -> (CacheStore, TrackingFilesystem) {
    let fs = TrackingFilesystem::new();
    let shared: Arc<dyn Filesystem> = Arc::new(fs.clone());
    let store = CacheStore::new(dir.path().join("cache"), shared, CapacityPolicy::Unbounded);
    (store, fs)
}

fn png_payload(width: u32, height: u32) -> ArtifactPayload {
    let spec = TransformSpec::new(width, height, 1.0, OutputFormat::Png).unwrap();
    let image = transform_bytes(&create_test_png(width, height), &spec, "fixture").unwrap();
    ArtifactPayload::Image(image)
}

fn png_key(raw: &str) -> pixcache::CacheKey {
    let reference = UriNormalizer::default().normalize(raw).unwrap();
    let spec = TransformSpec::new(16, 16, 1.0, OutputFormat::Png).unwrap();
    derive_key(&reference, &KeyVariant::Transform(spec))
}

// =============================================================================
// Normalization and Keys
// =============================================================================

#[test]
fn test_normalization_is_idempotent() {
    for normalizer in [UriNormalizer::with_file_scheme(), UriNormalizer::bare_paths()] {
        for raw in [
            "/a/b.jpg",
            "file:///a/b.jpg",
            "/a/b.jpg?w=1#top",
            "relative/img.png",
            "content://media/external/1",
            "file://file:///a/b.jpg",
        ] {
            let once = normalizer.normalize(raw).unwrap();
            let twice = normalizer.normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }
}

#[test]
fn test_equivalent_references_share_keys() {
    let normalizer = UriNormalizer::default();
    let variant = KeyVariant::Transform(TransformSpec::upload());

    let keys: Vec<_> = [
        "/photos/coin.jpg",
        "file:///photos/coin.jpg",
        "/photos/coin.jpg?version=3",
        "file:///photos/coin.jpg#front",
    ]
    .into_iter()
    .map(|raw| derive_key(&normalizer.normalize(raw).unwrap(), &variant))
    .collect();

    assert!(keys.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_distinct_inputs_have_distinct_keys() {
    let normalizer = UriNormalizer::default();
    let mut seen = std::collections::HashSet::new();

    for raw in ["/a.jpg", "/b.jpg", "/a.png"] {
        let reference = normalizer.normalize(raw).unwrap();
        for variant in [
            KeyVariant::Transform(TransformSpec::upload()),
            KeyVariant::Transform(TransformSpec::analysis()),
            KeyVariant::Transform(TransformSpec::new(1200, 1200, 0.8, OutputFormat::Png).unwrap()),
            KeyVariant::Base64Export,
        ] {
            assert!(seen.insert(derive_key(&reference, &variant).digest().to_string()));
        }
    }
    assert_eq!(seen.len(), 12);
}

// =============================================================================
// Store Behaviour
// =============================================================================

#[tokio::test]
async fn test_memory_hit_touches_no_filesystem() {
    let dir = TempDir::new().unwrap();
    let (store, fs) = tracked_store(&dir);
    let key = png_key("/a.png");

    store.put(&key, png_payload(16, 16)).await.unwrap();
    fs.reset_tracking().await;

    assert!(store.get(&key).await.is_some());
    assert_eq!(fs.call_count(), 0);
}

#[tokio::test]
async fn test_disk_hit_is_promoted() {
    let dir = TempDir::new().unwrap();
    let (store, fs) = tracked_store(&dir);
    let key = png_key("/a.png");

    let stored = store.put(&key, png_payload(16, 8)).await.unwrap();
    store.invalidate(false).await.unwrap();
    fs.reset_tracking().await;

    let from_disk = store.get(&key).await.unwrap();
    assert_eq!(from_disk, stored);
    assert!(fs.count_of(FsOp::Metadata).await >= 1);

    fs.reset_tracking().await;
    let from_memory = store.get(&key).await.unwrap();
    assert_eq!(from_memory, stored);
    assert_eq!(fs.call_count(), 0);
}

#[tokio::test]
async fn test_invalidate_disk_then_get_misses() {
    let dir = TempDir::new().unwrap();
    let (store, _fs) = tracked_store(&dir);

    let keys: Vec<_> = ["/a.png", "/b.png"].iter().map(|r| png_key(r)).collect();
    for key in &keys {
        store.put(key, png_payload(8, 8)).await.unwrap();
    }
    assert_eq!(cache_files(store.dir()).len(), 2);

    store.invalidate(true).await.unwrap();
    for key in &keys {
        assert!(store.get(key).await.is_none());
    }
    assert!(cache_files(store.dir()).is_empty());
}

#[tokio::test]
async fn test_failed_write_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let (store, fs) = tracked_store(&dir);
    let key = png_key("/a.png");

    fs.set_fail_writes(true);
    let err = store.put(&key, png_payload(8, 8)).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Write { .. }));
    assert!(cache_files(store.dir()).is_empty());
    assert!(store.get(&key).await.is_none());
    assert_eq!(fs.count_of(FsOp::Rename).await, 0);

    fs.set_fail_writes(false);
    store.put(&key, png_payload(8, 8)).await.unwrap();
    assert!(store.get(&key).await.is_some());
}

#[tokio::test]
async fn test_short_write_is_never_published() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(
        dir.path().join("cache"),
        Arc::new(TruncatingFilesystem::new(10)),
        CapacityPolicy::Unbounded,
    );
    let key = png_key("/a.png");

    let err = store.put(&key, png_payload(8, 8)).await.unwrap_err();
    assert!(matches!(err, PersistenceError::SizeMismatch { .. }));

    assert!(store.get(&key).await.is_none());
    assert!(!store.entry_path(&key).exists());
    assert!(cache_files(store.dir()).is_empty());
    assert_eq!(store.stats().await.writes, 0);
}

#[tokio::test]
async fn test_put_writes_via_temp_and_rename() {
    let dir = TempDir::new().unwrap();
    let (store, fs) = tracked_store(&dir);
    let key = png_key("/a.png");

    store.put(&key, png_payload(8, 8)).await.unwrap();

    let calls = fs.get_calls().await;
    let write = calls.iter().find(|(op, _)| *op == FsOp::Write).unwrap();
    let rename = calls.iter().find(|(op, _)| *op == FsOp::Rename).unwrap();
    assert_ne!(write.1, store.entry_path(&key));
    assert_eq!(rename.1, store.entry_path(&key));
    assert_eq!(cache_files(store.dir()), vec![key.file_name()]);
}

#[tokio::test]
async fn test_base64_and_image_entries_coexist() {
    let dir = TempDir::new().unwrap();
    let (store, _fs) = tracked_store(&dir);
    let reference = UriNormalizer::default().normalize("/tmp/photo.jpg").unwrap();

    let image_key = derive_key(&reference, &KeyVariant::Transform(TransformSpec::analysis()));
    let base64_key = derive_key(&reference, &KeyVariant::Base64Export);
    assert_ne!(image_key.digest(), base64_key.digest());

    store.put(&image_key, png_payload(8, 8)).await.unwrap();
    store
        .put(&base64_key, ArtifactPayload::Base64("QUJD".repeat(40)))
        .await
        .unwrap();

    assert!(store.get(&image_key).await.unwrap().base64().is_none());
    assert_eq!(
        store.get(&base64_key).await.unwrap().base64(),
        Some("QUJD".repeat(40).as_str())
    );
    assert_eq!(cache_files(store.dir()).len(), 2);
}

#[tokio::test]
async fn test_bounded_store_stays_bounded_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(
        dir.path().join("cache"),
        Arc::new(pixcache::LocalFilesystem::new()),
        CapacityPolicy::MaxEntries(std::num::NonZeroUsize::new(3).unwrap()),
    );

    for i in 0..10 {
        store
            .put(&png_key(&format!("/{i}.png")), png_payload(8, 8))
            .await
            .unwrap();
    }

    assert_eq!(cache_files(store.dir()).len(), 3);
    let stats = store.stats().await;
    assert_eq!(stats.memory_entries, 3);
    assert_eq!(stats.evictions, 7);
    assert_eq!(stats.writes, 10);
}
