//! Tile URL resolution.
//!
//! A tile source does not know its tile URLs up front. It holds the URI of
//! a resolution provider and asks it, tile by tile, where the bytes live.
//!
//! ```text
//! ┌──────────────────┐  open()   ┌────────────────────┐
//! │  TileUrlResolver │ ────────▶ │  ResolverProtocol  │  connect(uri)
//! │  (one per source)│           └─────────┬──────────┘
//! │                  │                     ▼
//! │  resolve_url()   │ ────────▶ ┌────────────────────┐
//! │                  │           │ ResolverConnection │  query {uri}/{z}/{x}/{y}
//! │  close()         │ ────────▶ │                    │  release()
//! └──────────────────┘           └────────────────────┘
//! ```
//!
//! Two protocols are provided and combined by [`SchemeProtocol`]:
//!
//! - [`HttpResolverProtocol`] for `http://` and `https://` resolver services
//! - [`TemplateProtocol`] for `template:` URIs resolved locally

mod http;
mod template;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ResolverError;
use crate::tile::{BoundingBox, TileCoordinate, TileSourceDescriptor};

pub use http::HttpResolverProtocol;
pub use template::{TemplateProtocol, TEMPLATE_SCHEME};

/// Build the query URI for a tile: `{base}/{z}/{x}/{y}`.
pub fn query_uri(base: &str, coordinate: &TileCoordinate) -> String {
    format!(
        "{}/{}/{}/{}",
        base.trim_end_matches('/'),
        coordinate.zoom,
        coordinate.x,
        coordinate.y
    )
}

// =============================================================================
// Protocol traits
// =============================================================================

/// External URL-resolution protocol.
pub trait ResolverProtocol: Send + Sync {
    /// Acquire a live handle to the provider identified by `uri`.
    fn connect(&self, uri: &str) -> Result<Box<dyn ResolverConnection>, ResolverError>;
}

/// Live handle to a resolution provider.
///
/// A connection is not required to support concurrent queries; the
/// resolver serializes access.
pub trait ResolverConnection: Send {
    /// Look up the fetch URL of a tile.
    ///
    /// Returns `Ok(None)` when the provider has no answer for the tile.
    fn query(&mut self, coordinate: &TileCoordinate) -> Result<Option<String>, ResolverError>;

    /// Look up the fetch URL of a tile, giving up after `timeout`.
    ///
    /// Connections that cannot be interrupted keep the default, which
    /// ignores the budget.
    fn query_within(
        &mut self,
        coordinate: &TileCoordinate,
        _timeout: Duration,
    ) -> Result<Option<String>, ResolverError> {
        self.query(coordinate)
    }

    /// Release provider-side resources.
    fn release(&mut self) {}
}

/// Dispatches on the URI scheme.
pub struct SchemeProtocol {
    http: Option<HttpResolverProtocol>,
    template: TemplateProtocol,
}

impl SchemeProtocol {
    /// Support both resolver services and local templates.
    pub fn new(http: HttpResolverProtocol) -> Self {
        Self {
            http: Some(http),
            template: TemplateProtocol,
        }
    }

    /// Support local templates only.
    pub fn template_only() -> Self {
        Self {
            http: None,
            template: TemplateProtocol,
        }
    }
}

impl ResolverProtocol for SchemeProtocol {
    fn connect(&self, uri: &str) -> Result<Box<dyn ResolverConnection>, ResolverError> {
        let scheme = uri.split_once(':').map(|(scheme, _)| scheme).unwrap_or("");

        match scheme {
            TEMPLATE_SCHEME => self.template.connect(uri),
            "http" | "https" => match &self.http {
                Some(http) => http.connect(uri),
                None => Err(ResolverError::UnsupportedScheme(scheme.to_string())),
            },
            _ => Err(ResolverError::UnsupportedScheme(scheme.to_string())),
        }
    }
}

// =============================================================================
// Tile URL Resolver
// =============================================================================

/// Resolves tile coordinates to fetch URLs for one source.
///
/// Owns the provider connection between [`open`](Self::open) and
/// [`close`](Self::close). Calling `open` on an open resolver releases the
/// old connection first.
pub struct TileUrlResolver {
    uri: String,
    protocol: Arc<dyn ResolverProtocol>,
    connection: Option<Box<dyn ResolverConnection>>,
    bounds: Option<BoundingBox>,
}

impl TileUrlResolver {
    /// Create a closed resolver for `uri`.
    pub fn new(uri: impl Into<String>, protocol: Arc<dyn ResolverProtocol>) -> Self {
        Self {
            uri: uri.into(),
            protocol,
            connection: None,
            bounds: None,
        }
    }

    /// Create a closed resolver for a source.
    pub fn for_source(source: &TileSourceDescriptor, protocol: Arc<dyn ResolverProtocol>) -> Self {
        Self {
            uri: source.uri.clone(),
            protocol,
            connection: None,
            bounds: source.bounds,
        }
    }

    /// Set the coverage extent.
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Acquire the provider connection.
    pub fn open(&mut self) -> Result<(), ResolverError> {
        if self.connection.is_some() {
            debug!(uri = %self.uri, "Resolver already open, reconnecting");
            self.close();
        }

        let connection = self.protocol.connect(&self.uri)?;
        self.connection = Some(connection);
        debug!(uri = %self.uri, "Resolver opened");
        Ok(())
    }

    /// Whether a provider connection is held.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Look up the URL of a tile, reporting why none is available.
    ///
    /// Empty answers count as no answer.
    pub fn resolve(&mut self, coordinate: &TileCoordinate) -> Result<Option<String>, ResolverError> {
        let connection = self.connection.as_mut().ok_or(ResolverError::NotOpen)?;
        let url = connection.query(coordinate)?;
        Ok(url.filter(|url| !url.trim().is_empty()))
    }

    /// [`resolve`](Self::resolve) bounded by `timeout`.
    pub fn resolve_within(
        &mut self,
        coordinate: &TileCoordinate,
        timeout: Duration,
    ) -> Result<Option<String>, ResolverError> {
        let connection = self.connection.as_mut().ok_or(ResolverError::NotOpen)?;
        let url = connection.query_within(coordinate, timeout)?;
        Ok(url.filter(|url| !url.trim().is_empty()))
    }

    /// Look up the URL of a tile.
    ///
    /// Returns `None` if the provider has no answer, the query fails, or the
    /// resolver is not open.
    pub fn resolve_url(&mut self, coordinate: &TileCoordinate) -> Option<String> {
        match self.resolve(coordinate) {
            Ok(url) => url,
            Err(e) => {
                warn!(uri = %self.uri, tile = %coordinate, "Tile URL lookup failed: {}", e);
                None
            }
        }
    }

    /// Release the provider connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.release();
            debug!(uri = %self.uri, "Resolver closed");
        }
    }

    /// Configured coverage, or the whole world if unset.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds.unwrap_or(BoundingBox::WORLD)
    }

    /// Provider URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for TileUrlResolver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TileUrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileUrlResolver")
            .field("uri", &self.uri)
            .field("open", &self.is_open())
            .field("bounds", &self.bounds)
            .finish()
    }
}
