use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::slot::FetchSlot;
use crate::cache::TileStore;
use crate::error::ResolverError;
use crate::net::NetworkClient;
use crate::resolver::TileUrlResolver;
use crate::tile::{BoundingBox, TileCoordinate, TileSourceDescriptor};

/// State shared by an engine and its slots.
pub(crate) struct EngineShared {
    pub(crate) descriptor: TileSourceDescriptor,
    pub(crate) resolver: Mutex<TileUrlResolver>,
    pub(crate) client: Arc<dyn NetworkClient>,
    pub(crate) cache: Option<Arc<dyn TileStore>>,
    next_slot: AtomicU64,
}

/// Fetch engine for one tile source.
///
/// The engine owns the source's resolver handle and network client. Tile
/// consumers each open their own [`FetchSlot`] and drive it from their own
/// thread; slots share the resolver through a per-source mutex.
///
/// Cloning an engine is cheap and yields a handle to the same source.
#[derive(Clone)]
pub struct AsyncFetchEngine {
    shared: Arc<EngineShared>,
}

impl AsyncFetchEngine {
    pub fn new(
        descriptor: TileSourceDescriptor,
        resolver: TileUrlResolver,
        client: Arc<dyn NetworkClient>,
        cache: Option<Arc<dyn TileStore>>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                descriptor,
                resolver: Mutex::new(resolver),
                client,
                cache,
                next_slot: AtomicU64::new(1),
            }),
        }
    }

    /// Open the source's resolver.
    pub fn open(&self) -> Result<(), ResolverError> {
        self.shared.resolver.lock().open()?;
        info!(
            source = %self.shared.descriptor.code,
            uri = %self.shared.descriptor.uri,
            "Tile source opened"
        );
        Ok(())
    }

    /// Release the source's resolver. Slots opened afterwards fail to
    /// resolve until the engine is opened again.
    pub fn close(&self) {
        self.shared.resolver.lock().close();
        debug!(source = %self.shared.descriptor.code, "Tile source closed");
    }

    pub fn is_open(&self) -> bool {
        self.shared.resolver.lock().is_open()
    }

    pub fn descriptor(&self) -> &TileSourceDescriptor {
        &self.shared.descriptor
    }

    /// Source code.
    pub fn code(&self) -> &str {
        &self.shared.descriptor.code
    }

    /// Coverage of the source, falling back to the whole world.
    pub fn bounding_box(&self) -> BoundingBox {
        self.shared.resolver.lock().bounding_box()
    }

    /// Whether a store is attached.
    pub fn has_cache(&self) -> bool {
        self.shared.cache.is_some()
    }

    /// Resolve a tile URL without fetching it.
    pub fn resolve_url(&self, coordinate: &TileCoordinate) -> Option<String> {
        self.shared.resolver.lock().resolve_url(coordinate)
    }

    /// Open a new consumer slot.
    pub fn open_slot(&self) -> FetchSlot {
        let id = self.shared.next_slot.fetch_add(1, Ordering::Relaxed);
        FetchSlot::new(id, Arc::clone(&self.shared))
    }
}

impl EngineShared {
    /// Consult the store, treating failures as misses.
    pub(crate) fn cached(&self, coordinate: &TileCoordinate) -> Option<bytes::Bytes> {
        let cache = self.cache.as_ref()?;
        match cache.read(&self.descriptor.code, coordinate) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    source = %self.descriptor.code,
                    tile = %coordinate,
                    "Tile cache read failed: {}",
                    e
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for AsyncFetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFetchEngine")
            .field("code", &self.shared.descriptor.code)
            .field("cache", &self.shared.cache.is_some())
            .finish()
    }
}
