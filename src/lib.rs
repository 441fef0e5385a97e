//! # tile-bridge
//!
//! Map tile acquisition for renderers that work synchronously.
//!
//! A renderer asks for a tile by zoom/x/y. The library resolves the tile's
//! URL through the source's resolution provider, queues the download on an
//! async HTTP client, buffers the response as it streams in and hands the
//! finished bytes back to the renderer without copying them. Successful
//! downloads are written through to an optional tile store.
//!
//! ## Features
//!
//! - **Slot-based fetching**: each consumer owns a [`FetchSlot`] that moves
//!   through a small state machine and can be polled or awaited
//! - **Late-callback safety**: cancelling or reusing a slot invalidates
//!   every callback still in flight for its previous request
//! - **Pluggable resolution**: `http(s)://` resolver services and local
//!   `template:` URIs
//! - **Write-through caching**: on disk, in memory, or both
//! - **Tile proxy**: an axum server exposing every source over HTTP
//!
//! ## Architecture
//!
//! - [`tile`] - Coordinates, bounding boxes and source descriptors
//! - [`io`] - Zero-copy handoff from network chunks to readers
//! - [`net`] - Queued HTTP client and its callback contract
//! - [`resolver`] - Tile URL resolution
//! - [`cache`] - Tile stores
//! - [`fetch`] - Fetch engine, slots and the source registry
//! - [`catalog`] - Source catalog files
//! - [`server`] - Axum-based tile proxy
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tile_bridge::{
//!     build_http_client, SchemeProtocol, SourceCatalog, SourceRegistry, TileCoordinate,
//! };
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let http = build_http_client(Duration::from_secs(30)).unwrap();
//! let catalog = SourceCatalog::load("maps.json").unwrap();
//!
//! let registry = SourceRegistry::open(
//!     catalog.into_sources(),
//!     runtime.handle(),
//!     &http,
//!     Arc::new(SchemeProtocol::template_only()),
//!     None,
//! );
//!
//! let tile = registry
//!     .fetch_tile("topo", TileCoordinate::new(8, 148, 90), Duration::from_secs(10))
//!     .unwrap();
//! println!("{} bytes", tile.data.len());
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod io;
pub mod net;
pub mod resolver;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use cache::{DiskTileCache, MemoryTileStore, TieredTileStore, TileStore};
pub use catalog::SourceCatalog;
pub use config::{CheckConfig, Cli, Command, FetchConfig, ServeConfig};
pub use error::{
    BufferError, CacheError, ConfigError, FetchError, NetworkError, ReadError, ResolverError,
    TileError,
};
pub use fetch::{AsyncFetchEngine, Completion, FetchSlot, FetchedTile, SlotPool, SlotState, SourceRegistry};
pub use io::{ByteBufferHandoff, TileReader};
pub use net::{
    build_http_client, NetworkClient, QueuedHttpClient, RequestHandle, RequestTag,
    ResponseListener, ResponseMetadata, TileHttpRequest,
};
pub use resolver::{
    HttpResolverProtocol, ResolverConnection, ResolverProtocol, SchemeProtocol, TemplateProtocol,
    TileUrlResolver,
};
pub use server::{create_router, AppState, RouterConfig};
pub use tile::{BoundingBox, TileCoordinate, TileSourceDescriptor};
