use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{info, warn};

use super::engine::AsyncFetchEngine;
use super::pool::SlotPool;
use super::slot::FetchedTile;
use crate::cache::TileStore;
use crate::error::TileError;
use crate::net::QueuedHttpClient;
use crate::resolver::{ResolverProtocol, TileUrlResolver};
use crate::tile::{TileCoordinate, TileSourceDescriptor};

struct RegisteredSource {
    engine: AsyncFetchEngine,
    pool: SlotPool,
}

/// Open tile sources, keyed by code.
///
/// Each source gets a slot pool sized by its thread budget. Lookups are
/// read-only, so a registry can be shared behind an `Arc` once built.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
    index: HashMap<Arc<str>, usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and open an engine for every descriptor.
    ///
    /// Every source gets its own [`QueuedHttpClient`] bounded by its thread
    /// budget; all of them share the `http` connection pool. Sources whose
    /// resolver fails to open are skipped with a warning.
    pub fn open(
        descriptors: Vec<TileSourceDescriptor>,
        runtime: &Handle,
        http: &reqwest::Client,
        protocol: Arc<dyn ResolverProtocol>,
        cache: Option<Arc<dyn TileStore>>,
    ) -> Self {
        let mut registry = Self::new();

        for descriptor in descriptors {
            let client = QueuedHttpClient::with_client(http.clone(), runtime.clone(), descriptor.threads);
            let resolver = TileUrlResolver::for_source(&descriptor, Arc::clone(&protocol));
            let engine = AsyncFetchEngine::new(descriptor, resolver, Arc::new(client), cache.clone());

            match engine.open() {
                Ok(()) => registry.register(engine),
                Err(e) => warn!(source = %engine.code(), "Skipping tile source: {}", e),
            }
        }

        info!(sources = registry.len(), "Tile sources ready");
        registry
    }

    /// Add an engine. A source registered under the same code is replaced.
    pub fn register(&mut self, engine: AsyncFetchEngine) {
        let code = Arc::clone(&engine.descriptor().code);
        let pool = SlotPool::new(&engine, engine.descriptor().threads);
        let entry = RegisteredSource { engine, pool };

        match self.index.get(&code) {
            Some(&position) => {
                warn!(source = %code, "Replacing tile source with duplicate code");
                let previous = std::mem::replace(&mut self.sources[position], entry);
                previous.engine.close();
            }
            None => {
                self.index.insert(code, self.sources.len());
                self.sources.push(entry);
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<&AsyncFetchEngine> {
        self.lookup(code).map(|source| &source.engine)
    }

    /// Engines in registration order.
    pub fn engines(&self) -> impl Iterator<Item = &AsyncFetchEngine> {
        self.sources.iter().map(|source| &source.engine)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Fetch one tile, blocking the calling thread.
    ///
    /// `timeout` covers waiting for a free slot, resolving the URL and the
    /// download. Must not be called from an async task.
    pub fn fetch_tile(
        &self,
        code: &str,
        coordinate: TileCoordinate,
        timeout: Duration,
    ) -> Result<FetchedTile, TileError> {
        let source = self.lookup(code).ok_or_else(|| TileError::UnknownSource {
            code: code.to_string(),
        })?;

        coordinate.validate()?;
        if !source.engine.descriptor().covers(&coordinate) {
            return Err(TileError::OutOfCoverage {
                code: code.to_string(),
                coordinate,
            });
        }

        let deadline = Instant::now() + timeout;
        let timed_out = TileError::Timeout {
            coordinate,
            millis: timeout.as_millis() as u64,
        };
        match source.pool.with_slot(timeout, |slot| {
            slot.fetch(coordinate, deadline.saturating_duration_since(Instant::now()))
        }) {
            Some(Err(TileError::Timeout { .. })) | None => Err(timed_out),
            Some(result) => result,
        }
    }

    /// Close every source.
    pub fn close(&self) {
        for source in &self.sources {
            source.engine.close();
        }
    }

    fn lookup(&self, code: &str) -> Option<&RegisteredSource> {
        self.index.get(code).map(|&position| &self.sources[position])
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|source| source.engine.code()))
            .finish()
    }
}
