//! HTTP request handlers for the tile proxy.
//!
//! # Endpoints
//!
//! - `GET /tiles/{code}/{z}/{x}/{y}[.ext]` - Serve a tile
//! - `GET /sources` - List tile sources
//! - `GET /health` - Health check endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{FetchError, NetworkError, TileError};
use crate::fetch::SourceRegistry;
use crate::tile::{BoundingBox, TileCoordinate};

/// Response header telling whether a tile came from the tile store.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the source registry.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// How long a request may wait for its tile
    pub fetch_timeout: Duration,
}

impl AppState {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            cache_max_age: 86_400,
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{code}/{z}/{x}/{filename}` where filename is
/// `{y}` or `{y}.{ext}`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Source code
    pub code: String,

    /// Zoom level
    pub z: i32,

    /// Tile column
    pub x: i32,

    /// Tile row with optional extension (e.g., "12" or "12.png")
    pub filename: String,
}

impl TilePathParams {
    /// Parse the row from the filename, stripping any extension.
    pub fn y(&self) -> Result<i32, std::num::ParseIntError> {
        self.stem().parse()
    }

    /// Requested extension, if any.
    pub fn extension(&self) -> Option<&str> {
        self.filename.split_once('.').map(|(_, ext)| ext)
    }

    fn stem(&self) -> &str {
        self.filename
            .split_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "source_not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sources: usize,
}

/// One entry of the sources listing.
#[derive(Debug, Serialize)]
pub struct SourceInfo {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub bounds: BoundingBox,
    pub min_zoom: i32,
    pub max_zoom: i32,
    pub cached: bool,
}

/// Response from the sources endpoint.
#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceInfo>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// 5xx errors are logged at ERROR level, 404s at DEBUG, other client errors
/// at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::UnknownSource { .. } => (StatusCode::NOT_FOUND, "source_not_found"),
            TileError::OutOfCoverage { .. } => (StatusCode::NOT_FOUND, "out_of_coverage"),
            TileError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            TileError::Fetch(FetchError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            TileError::Fetch(FetchError::ResolveUnavailable { .. }) => {
                (StatusCode::NOT_FOUND, "tile_unavailable")
            }
            TileError::Fetch(FetchError::Network(NetworkError::Status { status: 404, .. })) => {
                (StatusCode::NOT_FOUND, "tile_not_found")
            }
            TileError::Fetch(FetchError::Network(NetworkError::Timeout(_))) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout")
            }
            TileError::Fetch(FetchError::Network(_)) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            TileError::Read(_) | TileError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Tile not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{code}/{z}/{x}/{y}[.ext]`
///
/// # Response
///
/// - `200 OK`: tile bytes
/// - `400 Bad Request`: malformed coordinate or unsupported zoom
/// - `404 Not Found`: unknown source, tile outside coverage, or no URL
/// - `502 Bad Gateway`: upstream tile server failed
/// - `504 Gateway Timeout`: tile did not arrive in time
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, TileError> {
    let y = params.y().map_err(|_| {
        FetchError::InvalidRequest(format!("invalid tile row '{}'", params.filename))
    })?;
    let coordinate = TileCoordinate::new(params.z, params.x, y);

    let registry = Arc::clone(&state.registry);
    let timeout = state.fetch_timeout;
    let code = params.code.clone();

    // Slots block the calling thread until the tile arrives
    let tile = tokio::task::spawn_blocking(move || registry.fetch_tile(&code, coordinate, timeout))
        .await
        .map_err(|e| TileError::Internal(e.to_string()))??;

    let content_type = sniff_content_type(&tile.data, params.extension());
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (CACHE_HIT_HEADER, tile.cache_hit.to_string()),
    ];

    Ok((StatusCode::OK, headers, tile.data).into_response())
}

/// List tile sources.
///
/// # Endpoint
///
/// `GET /sources`
pub async fn sources_handler(State(state): State<AppState>) -> Json<SourcesResponse> {
    let sources = state
        .registry
        .engines()
        .map(|engine| {
            let source = engine.descriptor();
            SourceInfo {
                code: source.code.to_string(),
                name: source.name.clone(),
                license: source.license.clone(),
                bounds: engine.bounding_box(),
                min_zoom: source.zoom_min,
                max_zoom: source.zoom_max,
                cached: engine.has_cache(),
            }
        })
        .collect();

    Json(SourcesResponse { sources })
}

/// Health check endpoint.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sources: state.registry.len(),
    })
}

/// Guess the media type of tile bytes, falling back to the requested
/// extension.
fn sniff_content_type(data: &[u8], extension: Option<&str>) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        _ => match extension.map(str::to_ascii_lowercase).as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("pbf") | Some("mvt") => "application/x-protobuf",
            _ => "application/octet-stream",
        },
    }
}
