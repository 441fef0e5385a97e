//! Router configuration for the tile proxy.
//!
//! # Route Structure
//!
//! ```text
//! /health                               - Health check
//! /sources                              - List tile sources
//! /tiles/{code}/{z}/{x}/{y}[.ext]       - Tile endpoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tile_bridge::server::{create_router, RouterConfig};
//!
//! let registry = Arc::new(SourceRegistry::open(sources, &handle, &http, protocol, cache));
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(registry, config);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, sources_handler, tile_handler, AppState};
use crate::config::{DEFAULT_CACHE_MAX_AGE, DEFAULT_FETCH_TIMEOUT};
use crate::fetch::SourceRegistry;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// How long a tile request may wait for its tile
    pub fetch_timeout: Duration,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 day
    /// - Tiles are awaited for 30 seconds
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT),
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// Tile requests are served from `registry`; CORS and request tracing are
/// applied as configured.
pub fn create_router(registry: Arc<SourceRegistry>, config: RouterConfig) -> Router {
    let app_state = AppState::new(registry)
        .with_cache_max_age(config.cache_max_age)
        .with_fetch_timeout(config.fetch_timeout);

    let cors = build_cors_layer(&config);

    // {filename} captures both "{y}" and "{y}.png"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/sources", get(sources_handler))
        .route("/tiles/{code}/{z}/{x}/{filename}", get(tile_handler))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
