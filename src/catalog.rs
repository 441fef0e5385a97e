//! Tile source catalog.
//!
//! Sources are declared in a JSON file modelled on the resource bundles map
//! plugins publish:
//!
//! ```json
//! {
//!   "maps": [
//!     {
//!       "code": "otm",
//!       "name": "OpenTopoMap",
//!       "uri": "template:https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
//!       "license": "© OpenTopoMap (CC-BY-SA)",
//!       "bounds": "-180, -85.0511, 180, 85.0511",
//!       "threads": 2,
//!       "min_zoom": 2,
//!       "max_zoom": 17,
//!       "headers": { "Referer": "https://maptrek.mobi" }
//!     }
//!   ]
//! }
//! ```
//!
//! Entries without a name or uri are skipped. Malformed bounds are ignored
//! and the source keeps world coverage.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::tile::{BoundingBox, TileSourceDescriptor};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    maps: Vec<CatalogEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogEntry {
    code: Option<String>,
    name: Option<String>,
    uri: Option<String>,
    license: Option<String>,
    bounds: Option<String>,
    threads: Option<usize>,
    min_zoom: Option<i32>,
    max_zoom: Option<i32>,
    headers: BTreeMap<String, String>,
}

/// Tile sources loaded from a catalog file.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: Vec<TileSourceDescriptor>,
}

impl SourceCatalog {
    /// Load a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a catalog document.
    ///
    /// Fails only if the document itself is malformed; bad entries are
    /// skipped with a warning.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_json::from_str(text)?;
        let sources = file
            .maps
            .into_iter()
            .enumerate()
            .filter_map(|(position, entry)| entry.into_descriptor(position))
            .collect();
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[TileSourceDescriptor] {
        &self.sources
    }

    pub fn into_sources(self) -> Vec<TileSourceDescriptor> {
        self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl CatalogEntry {
    fn into_descriptor(self, position: usize) -> Option<TileSourceDescriptor> {
        let label = self
            .code
            .clone()
            .unwrap_or_else(|| format!("#{}", position));

        let (Some(name), Some(uri)) = (self.name, self.uri) else {
            warn!(source = %label, "Skipping catalog entry without name or uri");
            return None;
        };

        let mut builder = TileSourceDescriptor::builder()
            .name(name)
            .code(self.code.unwrap_or_default())
            .uri(uri);

        if let Some(license) = self.license {
            builder = builder.license(license);
        }
        if let Some(threads) = self.threads {
            builder = builder.threads(threads);
        }
        if let Some(zoom) = self.min_zoom {
            builder = builder.zoom_min(zoom);
        }
        if let Some(zoom) = self.max_zoom {
            builder = builder.zoom_max(zoom);
        }
        if let Some(edges) = self.bounds {
            match BoundingBox::from_edges(&edges) {
                Some(bounds) => builder = builder.bounds(bounds),
                None => warn!(source = %label, bounds = %edges, "Ignoring malformed bounds"),
            }
        }
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        match builder.build() {
            Ok(descriptor) => {
                debug!(source = %descriptor.code, name = %descriptor.name, "Catalog entry loaded");
                Some(descriptor)
            }
            Err(e) => {
                warn!(source = %label, "Skipping catalog entry: {}", e);
                None
            }
        }
    }
}
