//! Tile stores.
//!
//! The fetch engine consults an optional [`TileStore`] before going to the
//! network and writes successful downloads back to it. Stores are keyed by
//! source code and tile coordinate.
//!
//! - [`DiskTileCache`]: one file per tile under a cache root
//! - [`MemoryTileStore`]: size-bounded LRU in memory
//! - [`TieredTileStore`]: a fast store in front of a slower one

mod disk;
mod memory;

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::tile::TileCoordinate;

pub use disk::{DiskTileCache, ONLINE_CACHE_DIR, TILE_EXTENSION};
pub use memory::{MemoryTileStore, DEFAULT_MEMORY_CAPACITY};

/// Synchronous tile storage.
///
/// Implementations must be safe to call from several threads at once.
pub trait TileStore: Send + Sync {
    /// Read a stored tile. `Ok(None)` means the tile is not stored.
    fn read(&self, source: &str, coordinate: &TileCoordinate) -> Result<Option<Bytes>, CacheError>;

    /// Store a tile, replacing any previous copy.
    fn write(&self, source: &str, coordinate: &TileCoordinate, data: &[u8]) -> Result<(), CacheError>;
}

/// Two stores layered: reads try `front` first and promote hits found in
/// `back`; writes go to both. A failing front store never hides the back
/// store from readers.
pub struct TieredTileStore {
    front: Arc<dyn TileStore>,
    back: Arc<dyn TileStore>,
}

impl TieredTileStore {
    pub fn new(front: Arc<dyn TileStore>, back: Arc<dyn TileStore>) -> Self {
        Self { front, back }
    }
}

impl TileStore for TieredTileStore {
    fn read(&self, source: &str, coordinate: &TileCoordinate) -> Result<Option<Bytes>, CacheError> {
        match self.front.read(source, coordinate) {
            Ok(Some(data)) => return Ok(Some(data)),
            Ok(None) => {}
            Err(e) => warn!(source, tile = %coordinate, "Front tile store read failed: {}", e),
        }

        let data = self.back.read(source, coordinate)?;
        if let Some(data) = &data {
            if let Err(e) = self.front.write(source, coordinate, data) {
                debug!(source, tile = %coordinate, "Tile promotion failed: {}", e);
            }
        }
        Ok(data)
    }

    fn write(&self, source: &str, coordinate: &TileCoordinate, data: &[u8]) -> Result<(), CacheError> {
        let front = self.front.write(source, coordinate, data);
        self.back.write(source, coordinate, data)?;
        front
    }
}

/// Assemble the configured stores.
///
/// The disk store lives in the `online` subdirectory of `cache_dir`. A disk
/// store that cannot be opened is skipped with a warning and tiles are
/// served without it. Memory and disk together form a [`TieredTileStore`].
pub fn open_tile_store(cache_dir: Option<&Path>, memory_bytes: Option<usize>) -> Option<Arc<dyn TileStore>> {
    let disk = cache_dir.and_then(|dir| match DiskTileCache::in_cache_dir(dir) {
        Ok(disk) => {
            info!("  Disk cache: {}", disk.root().display());
            Some(Arc::new(disk) as Arc<dyn TileStore>)
        }
        Err(e) => {
            warn!(dir = %dir.display(), "Continuing without disk cache: {}", e);
            None
        }
    });

    let memory = memory_bytes.map(|bytes| {
        info!("  Memory cache: {}MB", bytes / (1024 * 1024));
        Arc::new(MemoryTileStore::with_capacity(bytes)) as Arc<dyn TileStore>
    });

    match (memory, disk) {
        (Some(memory), Some(disk)) => Some(Arc::new(TieredTileStore::new(memory, disk))),
        (memory, disk) => memory.or(disk),
    }
}
