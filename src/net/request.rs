use std::fmt;
use std::sync::Arc;

use crate::tile::TileCoordinate;

/// Opaque tag attached to every submitted request.
///
/// Requests are cancelled by tag. The tag names the coordinate being fetched
/// and the slot that wants it, so two consumers fetching the same tile never
/// cancel each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTag {
    /// Code of the source the tile belongs to
    pub source: Arc<str>,

    /// Identifier of the requesting slot, unique within the source
    pub slot: u64,

    /// Tile being fetched
    pub coordinate: TileCoordinate,
}

impl RequestTag {
    pub fn new(source: Arc<str>, slot: u64, coordinate: TileCoordinate) -> Self {
        Self {
            source,
            slot,
            coordinate,
        }
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.source, self.slot, self.coordinate)
    }
}

/// A GET request for one tile.
#[derive(Debug, Clone)]
pub struct TileHttpRequest {
    /// Fully resolved tile URL
    pub url: String,

    /// Extra request headers, in order
    pub headers: Vec<(String, String)>,

    /// Cancellation tag
    pub tag: RequestTag,
}

impl TileHttpRequest {
    pub fn new(url: impl Into<String>, tag: RequestTag) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            tag,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// Response metadata delivered with a successful completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// HTTP status code
    pub status: u16,

    /// `Content-Type` header, if present
    pub content_type: Option<String>,

    /// `Content-Length` header, if present
    pub content_length: Option<u64>,
}

/// Handle to an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHandle {
    id: u64,
    tag: RequestTag,
}

impl RequestHandle {
    pub fn new(id: u64, tag: RequestTag) -> Self {
        Self { id, tag }
    }

    /// Client-assigned request identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tag the request was submitted with
    pub fn tag(&self) -> &RequestTag {
        &self.tag
    }
}
