//! HTTP server layer for tile-bridge.
//!
//! The proxy is a tile consumer like any other: every request borrows a slot
//! from its source's pool, waits for the tile on the blocking pool and
//! returns the bytes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer                           │
//! │            GET /tiles/{code}/{z}/{x}/{y}.png                │
//! │                                                             │
//! │  ┌─────────────────────┐      ┌──────────────────────────┐  │
//! │  │      handlers       │      │          routes          │  │
//! │  │ (requests, errors)  │      │ (router, CORS, tracing)  │  │
//! │  └──────────┬──────────┘      └──────────────────────────┘  │
//! └─────────────┼───────────────────────────────────────────────┘
//!               ▼
//!        SourceRegistry ─▶ SlotPool ─▶ FetchSlot
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, sources_handler, tile_handler, AppState, ErrorResponse, HealthResponse,
    SourceInfo, SourcesResponse, TilePathParams, CACHE_HIT_HEADER,
};
pub use routes::{create_router, RouterConfig};
