//! In-memory tile store.
//!
//! Tiles are kept in an LRU keyed by source code and coordinate. The store
//! tracks the total size of cached tiles in bytes and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

use super::TileStore;
use crate::error::CacheError;
use crate::tile::TileCoordinate;

/// Default capacity: 64MB
pub const DEFAULT_MEMORY_CAPACITY: usize = 64 * 1024 * 1024;

/// Bound on entry count, independent of byte size
const DEFAULT_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(16_384) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TileKey {
    source: Arc<str>,
    coordinate: TileCoordinate,
}

impl TileKey {
    fn new(source: &str, coordinate: &TileCoordinate) -> Self {
        Self {
            source: Arc::from(source),
            coordinate: *coordinate,
        }
    }
}

struct Inner {
    tiles: LruCache<TileKey, Bytes>,
    size: usize,
}

/// Size-bounded LRU tile store.
///
/// Reads hand out cheap clones of the stored [`Bytes`].
pub struct MemoryTileStore {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl MemoryTileStore {
    /// Create a store with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a store holding at most `max_size` bytes of tile data.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tiles: LruCache::new(max_entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Number of stored tiles.
    pub fn len(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tiles.is_empty()
    }

    /// Total size of stored tiles in bytes.
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Whether a tile is stored, without touching LRU order.
    pub fn contains(&self, source: &str, coordinate: &TileCoordinate) -> bool {
        self.inner.lock().tiles.contains(&TileKey::new(source, coordinate))
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.tiles.clear();
        inner.size = 0;
    }
}

impl Default for MemoryTileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TileStore for MemoryTileStore {
    fn read(&self, source: &str, coordinate: &TileCoordinate) -> Result<Option<Bytes>, CacheError> {
        let mut inner = self.inner.lock();
        Ok(inner.tiles.get(&TileKey::new(source, coordinate)).cloned())
    }

    fn write(&self, source: &str, coordinate: &TileCoordinate, data: &[u8]) -> Result<(), CacheError> {
        if data.len() > self.max_size {
            return Ok(());
        }

        let key = TileKey::new(source, coordinate);
        let mut inner = self.inner.lock();

        let value = Bytes::copy_from_slice(data);
        let released = match inner.tiles.peek(&key).map(Bytes::len) {
            Some(old_len) => {
                inner.tiles.put(key, value);
                old_len
            }
            // Entry-count eviction happens inside push
            None => inner
                .tiles
                .push(key, value)
                .map(|(_, evicted)| evicted.len())
                .unwrap_or(0),
        };
        inner.size = inner.size.saturating_sub(released) + data.len();

        while inner.size > self.max_size {
            match inner.tiles.pop_lru() {
                Some((_, evicted)) => inner.size = inner.size.saturating_sub(evicted.len()),
                None => break,
            }
        }

        Ok(())
    }
}
