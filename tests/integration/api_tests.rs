//! API integration tests for the tile proxy.
//!
//! Tests verify:
//! - Tile retrieval through the router, with and without the cache
//! - Error cases (unknown source, out of coverage, bad row, upstream failure)
//! - HTTP response codes and headers
//! - Health and source listing endpoints

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use tile_bridge::server::CACHE_HIT_HEADER;
use tile_bridge::{create_router, BoundingBox, MemoryTileStore, RouterConfig, SourceRegistry, TileSourceDescriptor};

use super::test_utils::{open_registry, template_source, tile_bytes, TileServer};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn router(registry: Arc<SourceRegistry>) -> axum::Router {
    create_router(registry, RouterConfig::new().with_tracing(false))
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_tile_retrieval_success() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("osm", server.template("tiles"))], None);

    let response = router(registry)
        .oneshot(get("/tiles/osm/5/10/12.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=86400"
    );
    assert_eq!(response.headers().get(CACHE_HIT_HEADER).unwrap(), "false");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, tile_bytes(5, 10, 12));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tile_without_extension() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("osm", server.template("tiles"))], None);

    let response = router(registry).oneshot(get("/tiles/osm/5/10/12")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // Sniffed from the bytes
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_request_served_from_cache() {
    let server = TileServer::start().await;
    let memory = Arc::new(MemoryTileStore::with_capacity(1024 * 1024));
    let registry = open_registry(
        vec![template_source("osm", server.template("tiles"))],
        Some(memory.clone()),
    );
    let app = router(registry);

    let first = app.clone().oneshot(get("/tiles/osm/5/10/12.png")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    for _ in 0..100 {
        if memory.contains("osm", &tile_bridge::TileCoordinate::new(5, 10, 12)) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let second = app.oneshot(get("/tiles/osm/5/10/12.png")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get(CACHE_HIT_HEADER).unwrap(), "true");
    assert_eq!(server.hits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_cache_max_age() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("osm", server.template("tiles"))], None);
    let app = create_router(
        registry,
        RouterConfig::new().with_cache_max_age(600).with_tracing(false),
    );

    let response = app.oneshot(get("/tiles/osm/5/10/12.png")).await.unwrap();
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=600"
    );
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_source() {
    let registry = open_registry(Vec::new(), None);

    let response = router(registry).oneshot(get("/tiles/nope/5/10/12.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"], "source_not_found");
    assert_eq!(json["status"], 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_out_of_coverage() {
    let server = TileServer::start().await;
    let regional = TileSourceDescriptor::builder()
        .name("Regional")
        .code("regional")
        .uri(server.template("tiles"))
        .bounds(BoundingBox::new(41.1, 19.6, 48.3, 30.1))
        .zoom_max(12)
        .build()
        .unwrap();
    let registry = open_registry(vec![regional], None);
    let app = router(registry);

    // Western hemisphere
    let response = app.clone().oneshot(get("/tiles/regional/5/2/12.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "out_of_coverage");

    // Beyond the zoom range
    let response = app.oneshot(get("/tiles/regional/14/9000/5800.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.hits(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_row() {
    let registry = open_registry(vec![template_source("osm", "template:http://unused/{z}/{x}/{y}".to_string())], None);

    let response = router(registry).oneshot(get("/tiles/osm/5/10/abc.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_coordinate() {
    let registry = open_registry(vec![template_source("osm", "template:http://unused/{z}/{x}/{y}".to_string())], None);

    // Column 40 does not exist at zoom 5
    let response = router(registry).oneshot(get("/tiles/osm/5/40/12.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_failure() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("broken", server.template("broken"))], None);

    let response = router(registry).oneshot(get("/tiles/broken/5/10/12.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"], "upstream_error");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_not_found() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("gaps", server.template("missing"))], None);

    let response = router(registry).oneshot(get("/tiles/gaps/5/10/12.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "tile_not_found");
}

// =============================================================================
// Health and Sources
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let registry = open_registry(
        vec![template_source("osm", "template:http://unused/{z}/{x}/{y}".to_string())],
        None,
    );

    let response = router(registry).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["sources"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sources_listing() {
    let regional = TileSourceDescriptor::builder()
        .name("Regional")
        .code("regional")
        .uri("template:http://unused/{z}/{x}/{y}")
        .license("CC-BY-SA")
        .bounds(BoundingBox::new(41.1, 19.6, 48.3, 30.1))
        .zoom_min(3)
        .zoom_max(12)
        .build()
        .unwrap();
    let registry = open_registry(
        vec![
            template_source("osm", "template:http://unused/{z}/{x}/{y}".to_string()),
            regional,
        ],
        None,
    );

    let response = router(registry).oneshot(get("/sources")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let sources = json["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);

    assert_eq!(sources[0]["code"], "osm");
    assert_eq!(sources[0]["cached"], false);

    assert_eq!(sources[1]["code"], "regional");
    assert_eq!(sources[1]["license"], "CC-BY-SA");
    assert_eq!(sources[1]["min_zoom"], 3);
    assert_eq!(sources[1]["max_zoom"], 12);
    assert_eq!(sources[1]["bounds"]["north"], 48.3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cors_preflight() {
    let registry = open_registry(Vec::new(), None);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/tiles/osm/5/10/12.png")
        .header("origin", "https://viewer.test")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();

    let response = router(registry).oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}
