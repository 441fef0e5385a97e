//! Tile store integration tests.
//!
//! Tests verify:
//! - Successful downloads are written through to the store
//! - Stored tiles are served without touching the network
//! - Disk layout under the application cache directory
//! - Failed downloads are never stored
//! - Memory and tiered stores behind a real registry

use std::sync::Arc;

use tempfile::TempDir;

use tile_bridge::cache::ONLINE_CACHE_DIR;
use tile_bridge::{DiskTileCache, MemoryTileStore, TieredTileStore, TileCoordinate, TileStore};

use super::test_utils::{fetch, manual_engine, open_registry, template_source, tile_bytes, ScriptedProtocol, TileServer};

const TILE: TileCoordinate = TileCoordinate::new(5, 10, 12);

/// Wait for the write-through that follows a completed download.
///
/// The store is written after the consumer is woken, on the client's
/// callback thread.
async fn wait_for_tile(store: &dyn TileStore, source: &str, coordinate: &TileCoordinate) -> bool {
    for _ in 0..100 {
        if matches!(store.read(source, coordinate), Ok(Some(_))) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}

// =============================================================================
// Disk Cache
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_disk_write_through_and_hit() {
    let server = TileServer::start().await;
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskTileCache::in_cache_dir(dir.path()).unwrap());
    let registry = open_registry(
        vec![template_source("osm", server.template("tiles"))],
        Some(disk.clone()),
    );

    let first = fetch(&registry, "osm", TILE).await.unwrap();
    assert!(!first.cache_hit);
    assert!(wait_for_tile(&*disk, "osm", &TILE).await);

    let second = fetch(&registry, "osm", TILE).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.data, first.data);
    assert_eq!(server.hits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disk_layout() {
    let server = TileServer::start().await;
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskTileCache::in_cache_dir(dir.path()).unwrap());
    let registry = open_registry(
        vec![template_source("osm", server.template("tiles"))],
        Some(disk.clone()),
    );

    fetch(&registry, "osm", TILE).await.unwrap();
    assert!(wait_for_tile(&*disk, "osm", &TILE).await);

    let path = dir
        .path()
        .join(ONLINE_CACHE_DIR)
        .join("osm")
        .join("5")
        .join("10")
        .join("12.tile");
    assert_eq!(std::fs::read(path).unwrap(), tile_bytes(5, 10, 12));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_download_not_stored() {
    let server = TileServer::start().await;
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskTileCache::in_cache_dir(dir.path()).unwrap());
    let registry = open_registry(
        vec![template_source("broken", server.template("broken"))],
        Some(disk.clone()),
    );

    assert!(fetch(&registry, "broken", TILE).await.is_err());
    assert!(disk.read("broken", &TILE).unwrap().is_none());

    // Still not stored, so the next fetch goes back to the network
    assert!(fetch(&registry, "broken", TILE).await.is_err());
    assert_eq!(server.hits(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sources_share_store_by_code() {
    let server = TileServer::start().await;
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskTileCache::in_cache_dir(dir.path()).unwrap());
    let registry = open_registry(
        vec![
            template_source("osm", server.template("tiles")),
            template_source("topo", server.template("tiles")),
        ],
        Some(disk.clone()),
    );

    fetch(&registry, "osm", TILE).await.unwrap();
    assert!(wait_for_tile(&*disk, "osm", &TILE).await);

    // Same tile, other source: stored separately
    let tile = fetch(&registry, "topo", TILE).await.unwrap();
    assert!(!tile.cache_hit);
    assert_eq!(server.hits(), 2);
}

#[test]
fn test_cache_hit_skips_resolver() {
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskTileCache::open(dir.path()).unwrap());
    disk.write("osm", &TILE, b"stored").unwrap();

    let protocol = ScriptedProtocol::answering("https://tiles.test");
    let (engine, client) = manual_engine(
        template_source("osm", "template:https://unused/{z}/{x}/{y}".to_string()),
        protocol.clone(),
        Some(disk),
    );
    let mut slot = engine.open_slot();

    slot.send_request(TILE).unwrap();

    assert!(slot.state().is_success());
    assert!(slot.was_cache_hit());
    assert_eq!(slot.read().unwrap().into_bytes(), &b"stored"[..]);
    assert_eq!(protocol.queries(), 0);
    assert_eq!(client.submitted(), 0);
}

#[test]
fn test_write_through_from_manual_client() {
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskTileCache::open(dir.path()).unwrap());
    let (engine, client) = manual_engine(
        template_source("osm", "template:https://unused/{z}/{x}/{y}".to_string()),
        ScriptedProtocol::answering("https://tiles.test"),
        Some(disk.clone()),
    );
    let mut slot = engine.open_slot();

    slot.send_request(TILE).unwrap();
    client.chunk(0, b"tile-");
    client.chunk(0, b"bytes");
    client.succeed(0);

    // The manual client delivers on this thread, so the write is done
    assert_eq!(
        disk.read("osm", &TILE).unwrap().as_deref(),
        Some(&b"tile-bytes"[..])
    );
}

// =============================================================================
// Memory and Tiered Stores
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_memory_store_behind_registry() {
    let server = TileServer::start().await;
    let memory = Arc::new(MemoryTileStore::with_capacity(1024 * 1024));
    let registry = open_registry(
        vec![template_source("osm", server.template("tiles"))],
        Some(memory.clone()),
    );

    fetch(&registry, "osm", TILE).await.unwrap();
    assert!(wait_for_tile(&*memory, "osm", &TILE).await);
    assert!(memory.contains("osm", &TILE));

    assert!(fetch(&registry, "osm", TILE).await.unwrap().cache_hit);
    assert_eq!(server.hits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tiered_store_promotes_disk_hits() {
    let server = TileServer::start().await;
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskTileCache::in_cache_dir(dir.path()).unwrap());
    disk.write("osm", &TILE, b"from-disk").unwrap();

    let memory = Arc::new(MemoryTileStore::with_capacity(1024 * 1024));
    let tiered = Arc::new(TieredTileStore::new(memory.clone(), disk.clone()));
    let registry = open_registry(vec![template_source("osm", server.template("tiles"))], Some(tiered));

    let tile = fetch(&registry, "osm", TILE).await.unwrap();
    assert!(tile.cache_hit);
    assert_eq!(tile.data, &b"from-disk"[..]);
    assert!(memory.contains("osm", &TILE));
    assert_eq!(server.hits(), 0);
}

#[test]
fn test_disk_cache_reopens_existing_root() {
    let dir = TempDir::new().unwrap();
    {
        let disk = DiskTileCache::in_cache_dir(dir.path()).unwrap();
        disk.write("osm", &TILE, b"kept").unwrap();
    }

    let disk = DiskTileCache::in_cache_dir(dir.path()).unwrap();
    assert_eq!(disk.read("osm", &TILE).unwrap().as_deref(), Some(&b"kept"[..]));
}
