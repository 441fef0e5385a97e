//! Consumer slots.
//!
//! A [`FetchSlot`] is one consumer's "this tile is currently wanted". The
//! consumer thread drives it with [`send_request`](FetchSlot::send_request),
//! waits with [`await_completion`](FetchSlot::await_completion) and takes the
//! bytes with [`read`](FetchSlot::read). The network client mutates it from
//! its own threads through a listener tied to the request.
//!
//! # Superseded requests
//!
//! Every request carries the slot generation it was issued under.
//! Cancelling bumps the generation while holding the slot lock, and every
//! callback re-checks it under the same lock, so a callback for a
//! superseded request can never touch the state of a later one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::engine::EngineShared;
use super::state::{Completion, SlotState};
use crate::cache::TileStore;
use crate::error::{BufferError, FetchError, NetworkError, ReadError, TileError};
use crate::io::{ByteBufferHandoff, TileReader};
use crate::net::{RequestHandle, RequestTag, ResponseListener, ResponseMetadata, TileHttpRequest};
use crate::tile::TileCoordinate;

/// Tile bytes delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTile {
    pub data: Bytes,

    /// Served from the tile store without touching the network
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// The request was issued or already completed
    Started,

    /// The deadline passed while resolving the URL
    Expired,
}

#[derive(Default)]
struct SlotInner {
    state: SlotState,
    buffer: Option<ByteBufferHandoff>,
    reader: Option<TileReader>,
    cache_hit: bool,
}

struct SlotShared {
    generation: AtomicU64,
    inner: Mutex<SlotInner>,
    completed: Condvar,
}

impl SlotShared {
    /// Lock the slot if `generation` is still current.
    fn lock_current(&self, generation: u64) -> Option<MutexGuard<'_, SlotInner>> {
        if self.generation.load(Ordering::Acquire) != generation {
            return None;
        }
        let inner = self.inner.lock();
        (self.generation.load(Ordering::Acquire) == generation).then_some(inner)
    }

    fn complete(&self, mut inner: MutexGuard<'_, SlotInner>, completion: Completion) {
        inner.state = SlotState::Completed(completion);
        drop(inner);
        self.completed.notify_all();
    }
}

/// One consumer's view of a tile source.
///
/// A slot has at most one outstanding request. Issuing a new request or
/// closing the slot cancels the previous one. Dropping the slot closes it.
pub struct FetchSlot {
    id: u64,
    engine: Arc<EngineShared>,
    shared: Arc<SlotShared>,
    coordinate: Option<TileCoordinate>,
    url: Option<String>,
    request: Option<RequestHandle>,
}

impl FetchSlot {
    pub(crate) fn new(id: u64, engine: Arc<EngineShared>) -> Self {
        Self {
            id,
            engine,
            shared: Arc::new(SlotShared {
                generation: AtomicU64::new(0),
                inner: Mutex::new(SlotInner::default()),
                completed: Condvar::new(),
            }),
            coordinate: None,
            url: None,
            request: None,
        }
    }

    /// Request a tile, replacing whatever this slot was fetching.
    ///
    /// Fails synchronously with [`FetchError::InvalidRequest`] for a
    /// malformed coordinate or a zoom level the source does not serve; the
    /// resolver is not contacted and the slot is left idle. Every other
    /// outcome is reported through the slot state.
    pub fn send_request(&mut self, coordinate: TileCoordinate) -> Result<(), FetchError> {
        self.dispatch(coordinate, None).map(|_| ())
    }

    /// Issue a request, resolving its URL before `deadline` if one is set.
    ///
    /// Past the deadline the slot is returned to idle without submitting
    /// anything and [`Dispatch::Expired`] is reported.
    fn dispatch(&mut self, coordinate: TileCoordinate, deadline: Option<Instant>) -> Result<Dispatch, FetchError> {
        self.cancel();

        coordinate.validate()?;
        let source = &self.engine.descriptor;
        if !source.supports_zoom(coordinate.zoom) {
            return Err(FetchError::InvalidRequest(format!(
                "zoom {} outside source range {}..={}",
                coordinate.zoom, source.zoom_min, source.zoom_max
            )));
        }

        self.coordinate = Some(coordinate);
        let generation = self.shared.generation.load(Ordering::Acquire);

        if let Some(data) = self.engine.cached(&coordinate) {
            debug!(source = %source.code, tile = %coordinate, bytes = data.len(), "Tile cache hit");
            let mut inner = self.shared.inner.lock();
            inner.reader = Some(TileReader::from(data));
            inner.cache_hit = true;
            self.shared.complete(inner, Completion::Success);
            return Ok(Dispatch::Started);
        }

        self.transition(SlotState::AwaitingResolve);
        let engine = Arc::clone(&self.engine);
        let resolved = match deadline {
            None => Some(engine.resolver.lock().resolve(&coordinate)),
            Some(deadline) => engine.resolver.try_lock_until(deadline).map(|mut resolver| {
                resolver.resolve_within(&coordinate, deadline.saturating_duration_since(Instant::now()))
            }),
        };
        let resolved = match resolved {
            Some(resolved) if !deadline.is_some_and(|deadline| Instant::now() >= deadline) => resolved,
            _ => {
                debug!(source = %engine.descriptor.code, tile = %coordinate, "Tile URL not resolved before deadline");
                self.cancel();
                return Ok(Dispatch::Expired);
            }
        };

        let source = &self.engine.descriptor;
        let url = match resolved {
            Ok(Some(url)) => url,
            Ok(None) => {
                self.fail_resolve(coordinate, "resolver has no URL for tile".to_string());
                return Ok(Dispatch::Started);
            }
            Err(e) => {
                warn!(source = %source.code, tile = %coordinate, "Tile URL lookup failed: {}", e);
                self.fail_resolve(coordinate, e.to_string());
                return Ok(Dispatch::Started);
            }
        };

        // Callbacks may fire before submit returns
        self.transition(SlotState::AwaitingNetwork);

        let tag = RequestTag::new(Arc::clone(&source.code), self.id, coordinate);
        let listener = Arc::new(SlotListener {
            slot: Arc::clone(&self.shared),
            generation,
            source: Arc::clone(&source.code),
            coordinate,
            cache: self.engine.cache.clone(),
        });
        let request = TileHttpRequest::new(url.clone(), tag).with_headers(source.headers.clone());

        debug!(source = %source.code, tile = %coordinate, url = %url, "Tile request submitted");
        self.request = Some(self.engine.client.submit(request, listener));
        self.url = Some(url);
        Ok(Dispatch::Started)
    }

    /// Cancel the outstanding request and return to idle.
    ///
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        self.cancel();
    }

    /// Take the bytes of a successfully completed fetch.
    ///
    /// Never waits for the network: use
    /// [`await_completion`](Self::await_completion) first.
    pub fn read(&mut self) -> Result<TileReader, ReadError> {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        match &inner.state {
            SlotState::Completed(Completion::Success) => {
                inner.reader.take().ok_or(ReadError::Buffer(BufferError::AlreadyConsumed))
            }
            SlotState::Completed(Completion::Error(e)) => Err(ReadError::Failed(e.clone())),
            state => Err(ReadError::NotReady(state.clone())),
        }
    }

    /// Block until the slot leaves the in-flight states or `timeout`
    /// expires, and return the state it is in.
    pub fn await_completion(&self, timeout: Duration) -> SlotState {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        while inner.state.is_in_flight() {
            if self.shared.completed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.state.clone()
    }

    /// Request, wait, and read in one call.
    ///
    /// `timeout` also bounds access to the source's resolver and the URL
    /// query; a URL resolved too late is never requested. A fetch still
    /// running when `timeout` expires is cancelled.
    pub fn fetch(&mut self, coordinate: TileCoordinate, timeout: Duration) -> Result<FetchedTile, TileError> {
        let deadline = Instant::now() + timeout;
        let timed_out = TileError::Timeout {
            coordinate,
            millis: timeout.as_millis() as u64,
        };

        if self.dispatch(coordinate, Some(deadline))? == Dispatch::Expired {
            return Err(timed_out);
        }

        if self
            .await_completion(deadline.saturating_duration_since(Instant::now()))
            .is_in_flight()
        {
            self.cancel();
            return Err(timed_out);
        }

        let cache_hit = self.was_cache_hit();
        match self.read() {
            Ok(reader) => Ok(FetchedTile {
                data: reader.into_bytes(),
                cache_hit,
            }),
            Err(ReadError::Failed(e)) => Err(TileError::Fetch(e)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn state(&self) -> SlotState {
        self.shared.inner.lock().state.clone()
    }

    /// Bytes received so far for the current request.
    pub fn buffered_bytes(&self) -> usize {
        let inner = self.shared.inner.lock();
        match (&inner.buffer, &inner.reader) {
            (Some(buffer), _) => buffer.len(),
            (None, Some(reader)) => reader.len(),
            (None, None) => 0,
        }
    }

    /// Whether the current request was served from the tile store.
    pub fn was_cache_hit(&self) -> bool {
        self.shared.inner.lock().cache_hit
    }

    /// Slot identifier, unique within the source.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tile currently requested.
    pub fn coordinate(&self) -> Option<TileCoordinate> {
        self.coordinate
    }

    /// Resolved URL of the current request.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn transition(&self, state: SlotState) {
        let mut inner = self.shared.inner.lock();
        debug!(slot = self.id, from = %inner.state, to = %state, "Slot transition");
        inner.state = state;
    }

    fn fail_resolve(&self, coordinate: TileCoordinate, reason: String) {
        let inner = self.shared.inner.lock();
        self.shared.complete(
            inner,
            Completion::Error(FetchError::ResolveUnavailable { coordinate, reason }),
        );
    }

    fn cancel(&mut self) {
        let previous = {
            let mut inner = self.shared.inner.lock();
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            inner.buffer = None;
            inner.reader = None;
            inner.cache_hit = false;
            std::mem::take(&mut inner.state)
        };
        self.shared.completed.notify_all();

        if let Some(request) = self.request.take() {
            self.engine.client.cancel_all(request.tag());
        }

        if previous.is_in_flight() {
            if let Some(coordinate) = self.coordinate {
                debug!(source = %self.engine.descriptor.code, tile = %coordinate, "Tile request cancelled");
            }
        }

        self.coordinate = None;
        self.url = None;
    }
}

impl Drop for FetchSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for FetchSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchSlot")
            .field("id", &self.id)
            .field("source", &self.engine.descriptor.code)
            .field("coordinate", &self.coordinate)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Network callbacks for one request of one slot.
struct SlotListener {
    slot: Arc<SlotShared>,
    generation: u64,
    source: Arc<str>,
    coordinate: TileCoordinate,
    cache: Option<Arc<dyn TileStore>>,
}

impl ResponseListener for SlotListener {
    fn on_chunk(&self, chunk: Bytes) {
        let Some(mut inner) = self.slot.lock_current(self.generation) else {
            return;
        };
        if inner.state.is_completed() {
            return;
        }

        let buffer = inner.buffer.get_or_insert_with(ByteBufferHandoff::new);
        if let Err(e) = buffer.append(&chunk) {
            panic!("tile buffer for {} rejected a chunk: {}", self.coordinate, e);
        }

        if inner.state == SlotState::AwaitingNetwork {
            inner.state = SlotState::Buffering;
        }
    }

    fn on_success(&self, metadata: ResponseMetadata) {
        let Some(mut inner) = self.slot.lock_current(self.generation) else {
            debug!(source = %self.source, tile = %self.coordinate, "Dropping late success");
            return;
        };
        if inner.state.is_completed() {
            return;
        }

        let reader = match inner.buffer.take() {
            Some(mut buffer) => buffer
                .take_reader()
                .unwrap_or_else(|e| panic!("tile buffer for {} was consumed early: {}", self.coordinate, e)),
            None => TileReader::new(Bytes::new()),
        };
        let data = reader.as_bytes().clone();
        inner.reader = Some(reader);
        self.slot.complete(inner, Completion::Success);

        debug!(
            source = %self.source,
            tile = %self.coordinate,
            status = metadata.status,
            bytes = data.len(),
            "Tile fetched"
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write(&self.source, &self.coordinate, &data) {
                warn!(source = %self.source, tile = %self.coordinate, "Tile cache write failed: {}", e);
            }
        }
    }

    fn on_error(&self, error: NetworkError) {
        let Some(mut inner) = self.slot.lock_current(self.generation) else {
            debug!(source = %self.source, tile = %self.coordinate, "Dropping late error");
            return;
        };
        if inner.state.is_completed() {
            return;
        }

        inner.buffer = None;
        debug!(source = %self.source, tile = %self.coordinate, "Tile fetch failed: {}", error);
        self.slot.complete(inner, Completion::Error(FetchError::Network(error)));
    }
}
