use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::SlotState;
use crate::tile::TileCoordinate;

/// Errors raised by [`ByteBufferHandoff`](crate::io::ByteBufferHandoff)
/// when its write-then-read protocol is violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Write attempted after the storage was handed to a reader
    #[error("Buffer is frozen: its storage was handed to a reader")]
    Frozen,

    /// Reader requested a second time
    #[error("Buffer reader was already taken")]
    AlreadyConsumed,
}

/// Errors reported by the network client for a single request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Connection could not be established or broke mid-transfer
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request exceeded the client timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Request could not be built (bad URL or header)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Client is shutting down and no longer accepts work
    #[error("Network client unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while talking to the external URL-resolution protocol
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// The provider behind the URI could not be acquired
    #[error("Failed to get provider for uri {uri}: {reason}")]
    Open { uri: String, reason: String },

    /// No protocol is registered for the URI scheme
    #[error("Unsupported resolver scheme: {0}")]
    UnsupportedScheme(String),

    /// The provider failed to answer a query
    #[error("Resolver query failed: {0}")]
    Query(String),

    /// Query attempted on a resolver that is not open
    #[error("Resolver is not open")]
    NotOpen,
}

/// Terminal fetch failures.
///
/// `InvalidRequest` is returned synchronously from
/// [`FetchSlot::send_request`](crate::fetch::FetchSlot::send_request); the
/// other variants are only ever observed through the slot state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Malformed coordinate or zoom outside the source range
    #[error("Invalid tile request: {0}")]
    InvalidRequest(String),

    /// Resolver closed or returned no URL for the tile
    #[error("No URL available for tile {coordinate}: {reason}")]
    ResolveUnavailable {
        coordinate: TileCoordinate,
        reason: String,
    },

    /// Network client reported a failure
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Errors returned by [`FetchSlot::read`](crate::fetch::FetchSlot::read)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The slot has not reached a terminal state
    #[error("Tile is not ready: slot is {0}")]
    NotReady(SlotState),

    /// The fetch finished with an error
    #[error("Tile fetch failed: {0}")]
    Failed(#[from] FetchError),

    /// The completed tile was already read
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Errors raised by tile stores
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source code or coordinate cannot be mapped to a storage key
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Configuration and source catalog errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Catalog file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Catalog file is not valid JSON for the expected shape
    #[error("Failed to parse source catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range or missing
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the source registry to tile consumers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// No source registered under the code
    #[error("Unknown tile source: {code}")]
    UnknownSource { code: String },

    /// Tile lies outside the zoom range or coverage of its source
    #[error("Tile {coordinate} is outside the coverage of source {code}")]
    OutOfCoverage {
        code: String,
        coordinate: TileCoordinate,
    },

    /// No slot became free or the fetch did not finish in time
    #[error("Timed out after {millis}ms waiting for tile {coordinate}")]
    Timeout {
        coordinate: TileCoordinate,
        millis: u64,
    },

    /// Fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Read failed
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The worker running the fetch died
    #[error("Tile worker failed: {0}")]
    Internal(String),
}
