//! Block cache effectiveness integration tests.
//!
//! Tests verify:
//! - Walking an IFD chain through the cache collapses many small reads
//! - A prefetched header block serves the whole translation
//! - Concurrent translations share block fetches

use std::sync::Arc;

use virtual_tiff::io::{BlockCache, RangeReader};
use virtual_tiff::tiff::TiffDirectoryReader;
use virtual_tiff::translate::VirtualTiff;

use super::test_utils::{IfdBuilder, TiffBuilder, TrackingMockReader};

fn geotiff_pyramid() -> Vec<u8> {
    let mut full = IfdBuilder::tiled(4096, 4096, 256, 16, 1);
    full.short(259, &[50000])
        .short(34735, &[1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32633])
        .double(33550, &[10.0, 10.0, 0.0])
        .double(33922, &[0.0, 0.0, 0.0, 500000.0, 4100000.0, 0.0]);

    TiffBuilder::new()
        .add_ifd(full)
        .add_ifd(IfdBuilder::tiled(2048, 2048, 256, 16, 1))
        .add_ifd(IfdBuilder::tiled(1024, 1024, 256, 16, 1))
        .build()
}

#[tokio::test]
async fn test_cache_reduces_requests() {
    let data = geotiff_pyramid();

    let direct = TrackingMockReader::new(data.clone(), "mem://direct.tif");
    let group = VirtualTiff::new()
        .translate(&direct, &TiffDirectoryReader)
        .await
        .unwrap();
    assert_eq!(group.len(), 3);
    let direct_requests = direct.request_count();

    let inner = TrackingMockReader::new(data, "mem://cached.tif");
    let cache = BlockCache::with_capacity(inner.clone(), 4096, 16);
    let cached_group = VirtualTiff::new()
        .translate(&cache, &TiffDirectoryReader)
        .await
        .unwrap();

    assert_eq!(cached_group.len(), 3);
    assert!(
        inner.request_count() < direct_requests,
        "cached: {}, direct: {}",
        inner.request_count(),
        direct_requests
    );
}

#[tokio::test]
async fn test_prefetch_serves_translation() {
    let data = geotiff_pyramid();
    let size = data.len() as u64;

    let inner = TrackingMockReader::new(data, "mem://prefetch.tif");
    let cache = BlockCache::with_capacity(inner.clone(), 64 * 1024, 4);

    let blocks = cache.prefetch(64 * 1024).await.unwrap();
    assert_eq!(blocks, 1);
    assert_eq!(inner.request_count(), 1);
    assert_eq!(inner.get_requests().await, vec![(0, size as usize)]);

    VirtualTiff::new()
        .translate(&cache, &TiffDirectoryReader)
        .await
        .unwrap();
    assert_eq!(inner.request_count(), 1);
}

#[tokio::test]
async fn test_manifest_uses_inner_identifier() {
    let inner = TrackingMockReader::new(geotiff_pyramid(), "s3://bucket/scene.tif");
    let cache = BlockCache::new(inner);
    assert_eq!(cache.identifier(), "s3://bucket/scene.tif");

    let group = VirtualTiff::new()
        .with_ifd(Some(2))
        .translate(&cache, &TiffDirectoryReader)
        .await
        .unwrap();
    let entry = group.get(2).unwrap().manifest.get(&[0, 0]).unwrap();
    assert_eq!(entry.path, "s3://bucket/scene.tif");
}

#[tokio::test]
async fn test_concurrent_translations_share_blocks() {
    let inner = TrackingMockReader::new(geotiff_pyramid(), "mem://shared.tif");
    let cache = Arc::new(BlockCache::with_capacity(inner.clone(), 64 * 1024, 4));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            VirtualTiff::new()
                .translate(cache.as_ref(), &TiffDirectoryReader)
                .await
                .map(|group| group.len())
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 3);
    }

    // The whole file fits in one block, fetched once
    assert_eq!(inner.request_count(), 1);
}
