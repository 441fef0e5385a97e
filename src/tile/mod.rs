//! Tile value types.
//!
//! - [`TileCoordinate`]: zoom/x/y identity of a tile, the key for caches and
//!   in-flight request tracking
//! - [`BoundingBox`]: geographic extent of a source or a tile
//! - [`TileSourceDescriptor`]: immutable configuration of one online source
//!
//! # Example
//!
//! ```
//! use tile_bridge::tile::{BoundingBox, TileCoordinate, TileSourceDescriptor};
//!
//! let source = TileSourceDescriptor::builder()
//!     .name("Topo")
//!     .code("topo")
//!     .uri("template:https://tiles.example.com/{z}/{x}/{y}.png")
//!     .bounds(BoundingBox::new(41.1, 19.6, 48.3, 30.1))
//!     .build()
//!     .unwrap();
//!
//! assert!(source.covers(&TileCoordinate::new(8, 148, 90)));
//! ```

mod coord;
mod source;

pub use coord::{BoundingBox, TileCoordinate, MAX_LAT, MAX_ZOOM, MIN_LAT};
pub use source::{
    TileSourceBuilder, TileSourceDescriptor, DEFAULT_THREAD_BUDGET, DEFAULT_ZOOM_MAX,
    DEFAULT_ZOOM_MIN,
};

pub(crate) use source::is_valid_code;
