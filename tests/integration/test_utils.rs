//! Test utilities for integration tests.
//!
//! This module provides a local tile server, a manually driven network
//! client, a scripted resolver and helpers for building sources and
//! registries against them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use bytes::Bytes;
use parking_lot::Mutex;

use tile_bridge::error::{NetworkError, ResolverError, TileError};
use tile_bridge::{
    build_http_client, AsyncFetchEngine, FetchedTile, NetworkClient, RequestHandle, RequestTag,
    ResolverConnection, ResolverProtocol, ResponseListener, ResponseMetadata, SchemeProtocol,
    SourceRegistry, TileCoordinate, TileHttpRequest, TileSourceDescriptor, TileStore,
    TileUrlResolver,
};

/// PNG file signature, used as the start of every served tile.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Bytes the local tile server returns for a tile.
pub fn tile_bytes(zoom: i32, x: i32, y: i32) -> Vec<u8> {
    let mut data = PNG_SIGNATURE.to_vec();
    data.extend_from_slice(format!("{}/{}/{}", zoom, x, y).as_bytes());
    data
}

// =============================================================================
// Local Tile Server
// =============================================================================

/// Tile server listening on a loopback port.
///
/// | Path                       | Response                           |
/// |----------------------------|------------------------------------|
/// | `/tiles/{z}/{x}/{y}.png`   | [`tile_bytes`]                     |
/// | `/broken/{z}/{x}/{y}.png`  | 500                                |
/// | `/missing/{z}/{x}/{y}.png` | 404                                |
/// | `/slow/{z}/{x}/{y}.png`    | [`tile_bytes`] after 10 seconds    |
///
/// Must be started from inside a multi-threaded tokio runtime.
pub struct TileServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TileServer {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));

        let app = Router::new()
            .route("/tiles/{z}/{x}/{file}", get(serve_tile))
            .route("/broken/{z}/{x}/{file}", get(serve_broken))
            .route("/missing/{z}/{x}/{file}", get(serve_missing))
            .route("/slow/{z}/{x}/{file}", get(serve_slow))
            .with_state(Arc::clone(&hits));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `template:` URI serving tiles from the given route prefix.
    pub fn template(&self, route: &str) -> String {
        format!("template:{}/{}/{{z}}/{{x}}/{{y}}.png", self.base_url(), route)
    }

    /// Number of requests that reached the server.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

type TilePath = Path<(i32, i32, String)>;

fn parse_row(file: &str) -> Option<i32> {
    file.split('.').next()?.parse().ok()
}

async fn serve_tile(State(hits): State<Arc<AtomicUsize>>, Path((z, x, file)): TilePath) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    match parse_row(&file) {
        Some(y) => (StatusCode::OK, [("content-type", "image/png")], tile_bytes(z, x, y)).into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn serve_broken(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn serve_missing(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

async fn serve_slow(state: State<Arc<AtomicUsize>>, path: TilePath) -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(10)).await;
    serve_tile(state, path).await
}

// =============================================================================
// Sources and Registries
// =============================================================================

/// Source resolved through a `template:` URI.
pub fn template_source(code: &str, uri: String) -> TileSourceDescriptor {
    TileSourceDescriptor::builder()
        .name(format!("{} tiles", code))
        .code(code)
        .uri(uri)
        .zoom_max(16)
        .threads(2)
        .build()
        .unwrap()
}

/// Open a registry on the current runtime with template resolution.
pub fn open_registry(
    sources: Vec<TileSourceDescriptor>,
    cache: Option<Arc<dyn TileStore>>,
) -> Arc<SourceRegistry> {
    let http = build_http_client(Duration::from_secs(5)).unwrap();
    Arc::new(SourceRegistry::open(
        sources,
        &tokio::runtime::Handle::current(),
        &http,
        Arc::new(SchemeProtocol::template_only()),
        cache,
    ))
}

/// Run a blocking registry fetch on the blocking pool.
pub async fn fetch(
    registry: &Arc<SourceRegistry>,
    code: &str,
    coordinate: TileCoordinate,
) -> Result<FetchedTile, TileError> {
    let registry = Arc::clone(registry);
    let code = code.to_string();
    tokio::task::spawn_blocking(move || registry.fetch_tile(&code, coordinate, Duration::from_secs(5)))
        .await
        .unwrap()
}

/// Engine over a manual client and a scripted resolver, already open.
pub fn manual_engine(
    descriptor: TileSourceDescriptor,
    protocol: ScriptedProtocol,
    cache: Option<Arc<dyn TileStore>>,
) -> (AsyncFetchEngine, Arc<ManualClient>) {
    let client = Arc::new(ManualClient::new());
    let resolver = TileUrlResolver::for_source(&descriptor, Arc::new(protocol));
    let engine = AsyncFetchEngine::new(descriptor, resolver, client.clone(), cache);
    engine.open().unwrap();
    (engine, client)
}

// =============================================================================
// Manual Network Client
// =============================================================================

/// A submitted request together with its listener.
#[derive(Clone)]
pub struct Submission {
    pub request: TileHttpRequest,
    pub listener: Arc<dyn ResponseListener>,
}

/// Network client that never touches the network.
///
/// Requests are recorded; the test delivers chunks and terminal callbacks
/// by hand, in whatever order it needs.
#[derive(Default)]
pub struct ManualClient {
    submissions: Mutex<Vec<Submission>>,
    cancelled: Mutex<Vec<RequestTag>>,
    next_id: AtomicU64,
}

impl ManualClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn submission(&self, index: usize) -> Submission {
        self.submissions.lock()[index].clone()
    }

    pub fn cancelled(&self) -> Vec<RequestTag> {
        self.cancelled.lock().clone()
    }

    pub fn chunk(&self, index: usize, data: &[u8]) {
        self.submission(index)
            .listener
            .on_chunk(Bytes::copy_from_slice(data));
    }

    pub fn succeed(&self, index: usize) {
        self.submission(index).listener.on_success(ResponseMetadata {
            status: 200,
            content_type: Some("image/png".to_string()),
            content_length: None,
        });
    }

    pub fn fail(&self, index: usize, error: NetworkError) {
        self.submission(index).listener.on_error(error);
    }
}

impl NetworkClient for ManualClient {
    fn submit(&self, request: TileHttpRequest, listener: Arc<dyn ResponseListener>) -> RequestHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = RequestHandle::new(id, request.tag.clone());
        self.submissions.lock().push(Submission { request, listener });
        handle
    }

    fn cancel_all(&self, tag: &RequestTag) {
        self.cancelled.lock().push(tag.clone());
    }
}

// =============================================================================
// Scripted Resolver
// =============================================================================

/// Resolver protocol answering every query with `{prefix}/{z}/{x}/{y}`.
///
/// With no prefix every query is answered with "no URL".
#[derive(Clone, Default)]
pub struct ScriptedProtocol {
    prefix: Option<String>,
    queries: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedProtocol {
    pub fn answering(prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl ResolverProtocol for ScriptedProtocol {
    fn connect(&self, _uri: &str) -> Result<Box<dyn ResolverConnection>, ResolverError> {
        Ok(Box::new(self.clone()))
    }
}

impl ResolverConnection for ScriptedProtocol {
    fn query(&mut self, coordinate: &TileCoordinate) -> Result<Option<String>, ResolverError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.prefix.as_ref().map(|prefix| {
            format!("{}/{}/{}/{}", prefix, coordinate.zoom, coordinate.x, coordinate.y)
        }))
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
