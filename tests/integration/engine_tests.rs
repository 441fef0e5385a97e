//! Fetch engine integration tests.
//!
//! Tests verify:
//! - Full fetches over real HTTP through the queued client
//! - Upstream failures surface as slot errors
//! - Cancellation and slot reuse never leak bytes between requests
//! - Resolver lifecycle through the public API

use std::sync::Arc;
use std::time::Duration;

use tile_bridge::error::{FetchError, NetworkError, ReadError, TileError};
use tile_bridge::{Completion, SlotState, TileCoordinate};

use super::test_utils::{
    fetch, manual_engine, open_registry, template_source, tile_bytes, ScriptedProtocol, TileServer,
};

const TILE: TileCoordinate = TileCoordinate::new(5, 10, 12);

// =============================================================================
// Real HTTP
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_over_http() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("osm", server.template("tiles"))], None);

    let tile = fetch(&registry, "osm", TILE).await.unwrap();

    assert_eq!(tile.data, tile_bytes(5, 10, 12));
    assert!(!tile.cache_hit);
    assert_eq!(server.hits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slot_states_over_http() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("osm", server.template("tiles"))], None);
    let engine = registry.get("osm").unwrap().clone();

    let (state, data, url) = tokio::task::spawn_blocking(move || {
        let mut slot = engine.open_slot();
        assert_eq!(slot.state(), SlotState::Idle);

        slot.send_request(TILE).unwrap();
        let state = slot.await_completion(Duration::from_secs(5));
        let data = slot.read().unwrap().into_bytes();
        (state, data, slot.url().map(str::to_owned))
    })
    .await
    .unwrap();

    assert_eq!(state, SlotState::Completed(Completion::Success));
    assert_eq!(data, tile_bytes(5, 10, 12));
    assert!(url.unwrap().ends_with("/tiles/5/10/12.png"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_error_status() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("broken", server.template("broken"))], None);

    let err = fetch(&registry, "broken", TILE).await.unwrap_err();

    match err {
        TileError::Fetch(FetchError::Network(NetworkError::Status { status, url })) => {
            assert_eq!(status, 500);
            assert!(url.contains("/broken/5/10/12"));
        }
        other => panic!("expected upstream status error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_not_found() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("gaps", server.template("missing"))], None);

    let err = fetch(&registry, "gaps", TILE).await.unwrap_err();
    assert!(matches!(
        err,
        TileError::Fetch(FetchError::Network(NetworkError::Status { status: 404, .. }))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_cancels_slow_request() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("slow", server.template("slow"))], None);
    let engine = registry.get("slow").unwrap().clone();

    let state = tokio::task::spawn_blocking(move || {
        let mut slot = engine.open_slot();
        slot.send_request(TILE).unwrap();
        assert!(slot.state().is_in_flight());

        slot.close();
        slot.await_completion(Duration::from_millis(200))
    })
    .await
    .unwrap();

    assert_eq!(state, SlotState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_timeout() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("slow", server.template("slow"))], None);

    let err = tokio::task::spawn_blocking(move || {
        registry.fetch_tile("slow", TILE, Duration::from_millis(300))
    })
    .await
    .unwrap()
    .unwrap_err();

    assert!(matches!(err, TileError::Timeout { coordinate, .. } if coordinate == TILE));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_consumers() {
    let server = TileServer::start().await;
    let registry = open_registry(vec![template_source("osm", server.template("tiles"))], None);

    let fetches: Vec<_> = (0..8)
        .map(|x| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { fetch(&registry, "osm", TileCoordinate::new(6, x, 3)).await })
        })
        .collect();

    for (x, handle) in fetches.into_iter().enumerate() {
        let tile = handle.await.unwrap().unwrap();
        assert_eq!(tile.data, tile_bytes(6, x as i32, 3));
    }
    assert_eq!(server.hits(), 8);
}

// =============================================================================
// Manual Client
// =============================================================================

#[test]
fn test_reused_slot_ignores_superseded_callbacks() {
    let protocol = ScriptedProtocol::answering("https://tiles.test");
    let (engine, client) = manual_engine(
        template_source("osm", "template:https://unused/{z}/{x}/{y}".to_string()),
        protocol,
        None,
    );
    let mut slot = engine.open_slot();

    slot.send_request(TileCoordinate::new(5, 10, 12)).unwrap();
    client.chunk(0, b"old-");

    slot.send_request(TileCoordinate::new(5, 10, 13)).unwrap();
    assert_eq!(client.cancelled().len(), 1);
    assert_eq!(client.cancelled()[0].coordinate, TileCoordinate::new(5, 10, 12));

    // The first request keeps talking after it was superseded
    client.chunk(0, b"stale");
    client.succeed(0);
    assert_eq!(slot.state(), SlotState::AwaitingNetwork);
    assert_eq!(slot.buffered_bytes(), 0);

    client.chunk(1, b"fresh");
    client.succeed(1);
    assert_eq!(slot.read().unwrap().into_bytes(), &b"fresh"[..]);
}

#[test]
fn test_error_is_terminal() {
    let (engine, client) = manual_engine(
        template_source("osm", "template:https://unused/{z}/{x}/{y}".to_string()),
        ScriptedProtocol::answering("https://tiles.test"),
        None,
    );
    let mut slot = engine.open_slot();

    slot.send_request(TILE).unwrap();
    client.chunk(0, b"partial");
    client.fail(0, NetworkError::Connection("reset".to_string()));

    // A success after the error changes nothing
    client.succeed(0);

    let expected = FetchError::Network(NetworkError::Connection("reset".to_string()));
    assert_eq!(slot.state(), SlotState::Completed(Completion::Error(expected.clone())));
    assert_eq!(slot.read().unwrap_err(), ReadError::Failed(expected));
}

#[test]
fn test_silent_resolver_fails_without_network() {
    let (engine, client) = manual_engine(
        template_source("osm", "template:https://unused/{z}/{x}/{y}".to_string()),
        ScriptedProtocol::silent(),
        None,
    );
    let mut slot = engine.open_slot();

    slot.send_request(TILE).unwrap();

    assert!(matches!(
        slot.state().error(),
        Some(FetchError::ResolveUnavailable { coordinate, .. }) if *coordinate == TILE
    ));
    assert_eq!(client.submitted(), 0);
}

#[test]
fn test_engine_close_releases_resolver() {
    let protocol = ScriptedProtocol::answering("https://tiles.test");
    let (engine, client) = manual_engine(
        template_source("osm", "template:https://unused/{z}/{x}/{y}".to_string()),
        protocol.clone(),
        None,
    );

    assert_eq!(engine.resolve_url(&TILE).as_deref(), Some("https://tiles.test/5/10/12"));
    assert_eq!(protocol.queries(), 1);

    engine.close();
    engine.close();
    assert_eq!(protocol.releases(), 1);
    assert!(!engine.is_open());

    let mut slot = engine.open_slot();
    slot.send_request(TILE).unwrap();
    assert!(matches!(
        slot.state().error(),
        Some(FetchError::ResolveUnavailable { .. })
    ));
    assert_eq!(client.submitted(), 0);
}

#[test]
fn test_request_carries_source_headers() {
    let descriptor = tile_bridge::TileSourceDescriptor::builder()
        .name("Keyed")
        .code("keyed")
        .uri("template:https://unused/{z}/{x}/{y}")
        .header("Referer", "https://maps.test/")
        .build()
        .unwrap();
    let (engine, client) = manual_engine(descriptor, ScriptedProtocol::answering("https://k.test"), None);
    let mut slot = engine.open_slot();

    slot.send_request(TILE).unwrap();

    let request = client.submission(0).request;
    assert_eq!(request.url, "https://k.test/5/10/12");
    assert_eq!(
        request.headers,
        vec![("Referer".to_string(), "https://maps.test/".to_string())]
    );
    assert_eq!(&*request.tag.source, "keyed");
    assert_eq!(request.tag.slot, slot.id());
}
