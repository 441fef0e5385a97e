//! Immutable description of an online tile source.

use std::sync::Arc;

use serde::Serialize;

use crate::error::ConfigError;

use super::coord::{BoundingBox, TileCoordinate, MAX_ZOOM};

/// Default minimum zoom level of a source.
pub const DEFAULT_ZOOM_MIN: i32 = 0;

/// Default maximum zoom level of a source.
pub const DEFAULT_ZOOM_MAX: i32 = 18;

/// Default number of concurrent requests a source may have in flight.
pub const DEFAULT_THREAD_BUDGET: usize = 2;

/// Descriptor of a tile source, built once when the source is constructed.
#[derive(Debug, Clone, Serialize)]
pub struct TileSourceDescriptor {
    /// Human-readable name
    pub name: String,

    /// Short identifier, also the cache scope
    pub code: Arc<str>,

    /// URI of the resolution provider
    pub uri: String,

    /// License or attribution text, if published
    pub license: Option<String>,

    /// Declared coverage, `None` means whole world
    pub bounds: Option<BoundingBox>,

    /// Minimum zoom level served
    pub zoom_min: i32,

    /// Maximum zoom level served
    pub zoom_max: i32,

    /// Number of concurrent network requests allowed
    pub threads: usize,

    /// Extra headers sent with every tile request
    pub headers: Vec<(String, String)>,
}

impl TileSourceDescriptor {
    /// Start building a descriptor.
    pub fn builder() -> TileSourceBuilder {
        TileSourceBuilder::default()
    }

    /// Coverage of the source, falling back to the whole world.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds.unwrap_or(BoundingBox::WORLD)
    }

    /// Whether the source serves the given zoom level.
    pub fn supports_zoom(&self, zoom: i32) -> bool {
        (self.zoom_min..=self.zoom_max).contains(&zoom)
    }

    /// Whether a valid coordinate falls inside the zoom range and coverage.
    pub fn covers(&self, coordinate: &TileCoordinate) -> bool {
        self.supports_zoom(coordinate.zoom)
            && coordinate.validate().is_ok()
            && self.bounding_box().intersects(&coordinate.bounds())
    }
}

/// Builder for [`TileSourceDescriptor`].
#[derive(Debug, Clone)]
pub struct TileSourceBuilder {
    name: Option<String>,
    code: Option<String>,
    uri: Option<String>,
    license: Option<String>,
    bounds: Option<BoundingBox>,
    zoom_min: i32,
    zoom_max: i32,
    threads: usize,
    headers: Vec<(String, String)>,
}

impl Default for TileSourceBuilder {
    fn default() -> Self {
        Self {
            name: None,
            code: None,
            uri: None,
            license: None,
            bounds: None,
            zoom_min: DEFAULT_ZOOM_MIN,
            zoom_max: DEFAULT_ZOOM_MAX,
            threads: DEFAULT_THREAD_BUDGET,
            headers: Vec::new(),
        }
    }
}

impl TileSourceBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn zoom_min(mut self, zoom: i32) -> Self {
        self.zoom_min = zoom;
        self
    }

    pub fn zoom_max(mut self, zoom: i32) -> Self {
        self.zoom_max = zoom;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<TileSourceDescriptor, ConfigError> {
        let name = required(self.name, "name")?;
        let code = required(self.code, "code")?;
        let uri = required(self.uri, "uri")?;

        if !is_valid_code(&code) {
            return Err(ConfigError::Invalid(format!(
                "source code '{}' may only contain letters, digits, '-', '_' and '.'",
                code
            )));
        }

        if self.zoom_min < 0 || self.zoom_max > MAX_ZOOM || self.zoom_min > self.zoom_max {
            return Err(ConfigError::Invalid(format!(
                "zoom range {}-{} of source '{}' must lie within 0-{}",
                self.zoom_min, self.zoom_max, code, MAX_ZOOM
            )));
        }

        if self.threads == 0 {
            return Err(ConfigError::Invalid(format!(
                "source '{}' needs a thread budget of at least 1",
                code
            )));
        }

        Ok(TileSourceDescriptor {
            name,
            code: code.into(),
            uri,
            license: self.license,
            bounds: self.bounds,
            zoom_min: self.zoom_min,
            zoom_max: self.zoom_max,
            threads: self.threads,
            headers: self.headers,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ConfigError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Invalid(format!("source {} is required", field))),
    }
}

/// Source codes double as cache directory names.
pub(crate) fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code != "."
        && code != ".."
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
