//! Tile coordinates and geographic extents.
//!
//! Coordinates follow the Web Mercator XYZ scheme used by slippy-map tile
//! servers: `x` grows west to east, `y` grows north to south, and a zoom
//! level `z` has `2^z` tiles along each axis.

use std::f64::consts::PI;
use std::fmt;

use serde::Serialize;

use crate::error::FetchError;

/// Deepest zoom level accepted by the fetch path.
pub const MAX_ZOOM: i32 = 30;

/// Northernmost latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.0511;

/// Southernmost latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.0511;

// =============================================================================
// Tile Coordinate
// =============================================================================

/// Identity of a single map tile.
///
/// Fields are signed because renderers hand coordinates over as plain
/// integers; [`TileCoordinate::validate`] rejects anything that does not
/// address a real tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoordinate {
    /// Zoom level (0 = whole world in one tile)
    pub zoom: i32,

    /// Column, 0-indexed from the antimeridian
    pub x: i32,

    /// Row, 0-indexed from the north edge
    pub y: i32,
}

impl TileCoordinate {
    /// Create a coordinate without validating it.
    pub const fn new(zoom: i32, x: i32, y: i32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this zoom level.
    ///
    /// Returns 0 for zoom levels that cannot be represented.
    pub fn tiles_per_axis(&self) -> u64 {
        if (0..=MAX_ZOOM).contains(&self.zoom) {
            1u64 << self.zoom
        } else {
            0
        }
    }

    /// Check that the coordinate addresses an existing tile.
    pub fn validate(&self) -> Result<(), FetchError> {
        if !(0..=MAX_ZOOM).contains(&self.zoom) {
            return Err(FetchError::InvalidRequest(format!(
                "zoom {} is outside 0-{}",
                self.zoom, MAX_ZOOM
            )));
        }

        let limit = self.tiles_per_axis();
        if self.x < 0 || self.x as u64 >= limit {
            return Err(FetchError::InvalidRequest(format!(
                "x {} is outside 0-{} at zoom {}",
                self.x,
                limit - 1,
                self.zoom
            )));
        }
        if self.y < 0 || self.y as u64 >= limit {
            return Err(FetchError::InvalidRequest(format!(
                "y {} is outside 0-{} at zoom {}",
                self.y,
                limit - 1,
                self.zoom
            )));
        }

        Ok(())
    }

    /// Geographic extent covered by this tile.
    ///
    /// The coordinate must be valid.
    pub fn bounds(&self) -> BoundingBox {
        let n = self.tiles_per_axis() as f64;
        let west = self.x as f64 / n * 360.0 - 180.0;
        let east = (self.x as f64 + 1.0) / n * 360.0 - 180.0;
        let north = row_to_lat(self.y as f64, n);
        let south = row_to_lat(self.y as f64 + 1.0, n);
        BoundingBox::new(south, west, north, east)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Inverse Web Mercator for a (possibly fractional) tile row.
fn row_to_lat(row: f64, n: f64) -> f64 {
    let lat_rad = (PI * (1.0 - 2.0 * row / n)).sinh().atan();
    lat_rad * 180.0 / PI
}

// =============================================================================
// Bounding Box
// =============================================================================

/// Geographic extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Whole-world Web Mercator coverage.
    pub const WORLD: BoundingBox = BoundingBox {
        south: MIN_LAT,
        west: -180.0,
        north: MAX_LAT,
        east: 180.0,
    };

    /// Create a bounding box from its south, west, north and east edges.
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Parse the `"left, bottom, right, top"` form used by map packages.
    ///
    /// Returns `None` if the string does not hold four numbers or the edges
    /// are inverted.
    pub fn from_edges(edges: &str) -> Option<Self> {
        let values: Vec<f64> = edges
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;

        if values.len() != 4 {
            return None;
        }

        let (west, south, east, north) = (values[0], values[1], values[2], values[3]);
        if south > north || west > east {
            return None;
        }

        Some(Self::new(south, west, north, east))
    }

    /// Whether two extents overlap (touching edges count as overlap).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.south <= other.north
            && other.south <= self.north
            && self.west <= other.east
            && other.west <= self.east
    }

    /// Whether a point lies inside the extent.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::WORLD
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.west, self.south, self.east, self.north
        )
    }
}
