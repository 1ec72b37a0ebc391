//! API integration tests for tiles, style, metadata and events.
//!
//! Tests verify:
//! - Tile delivery and the not-found / failed / invalid outcomes
//! - Request coalescing for repeated requests of one tile
//! - Style and metadata documents before and after load
//! - Event dispatch and viewport updates

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use maptile_pacer::map::MapView;
use maptile_pacer::zxy_to_tile_id;

use super::test_utils::{build_loaded_router, build_router, json_body, MockArchive};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sample_archive() -> Arc<MockArchive> {
    Arc::new(
        MockArchive::new("eddy_kinetic_energy.pmtiles")
            .with_layers(&["ocean", "coast"])
            .with_tile(5, 3, 2, &[1, 2, 3])
            .with_tile(0, 0, 0, &[9])
            .with_tile(1, 1, 0, &[])
            .with_failing_tile(4, 4, 4),
    )
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let (router, _) = build_loaded_router(sample_archive()).await;

    let response = router.oneshot(get("/tiles/5/3/2.mvt")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/x-protobuf"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(
        response.headers().get("x-tile-id").unwrap(),
        zxy_to_tile_id(5, 3, 2).to_string().as_str()
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &[1, 2, 3]);
}

#[tokio::test]
async fn test_tile_retrieval_extension_variants() {
    let (router, _) = build_loaded_router(sample_archive()).await;

    for uri in ["/tiles/0/0/0", "/tiles/0/0/0.pbf", "/tiles/0/0/0.mvt"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_missing_tile_is_not_found() {
    let (router, _) = build_loaded_router(sample_archive()).await;

    let response = router.oneshot(get("/tiles/3/1/1.mvt")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status"], 404);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("z=3, x=1, y=1"));
    assert!(message.contains(&zxy_to_tile_id(3, 1, 1).to_string()));
}

#[tokio::test]
async fn test_empty_tile_is_not_found() {
    let (router, _) = build_loaded_router(sample_archive()).await;

    let response = router.oneshot(get("/tiles/1/1/0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fetch_failure_is_bad_gateway() {
    let (router, _) = build_loaded_router(sample_archive()).await;

    let response = router.oneshot(get("/tiles/4/4/4.mvt")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"], "fetch_failed");
    assert!(body["message"].as_str().unwrap().contains("upstream reset"));
}

#[tokio::test]
async fn test_invalid_tile_coordinates() {
    let (router, _) = build_loaded_router(sample_archive()).await;

    for uri in [
        "/tiles/2/4/0.mvt",
        "/tiles/2/0/abc.mvt",
        "/tiles/2/0/1.png",
        "/tiles/40/0/0.mvt",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_tile");
    }
}

#[tokio::test]
async fn test_tiles_before_load_are_unavailable() {
    let (router, _) = build_router(sample_archive());

    let response = router.oneshot(get("/tiles/5/3/2.mvt")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"], "not_loaded");
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let archive = sample_archive();
    let (router, _) = build_loaded_router(Arc::clone(&archive)).await;

    let (a, b, c) = tokio::join!(
        router.clone().oneshot(get("/tiles/5/3/2.mvt")),
        router.clone().oneshot(get("/tiles/5/3/2")),
        router.clone().oneshot(get("/tiles/5/3/2.pbf")),
    );

    for response in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(archive.fetch_count(), 1);
}

#[tokio::test]
async fn test_sequential_requests_fetch_again() {
    let archive = sample_archive();
    let (router, _) = build_loaded_router(Arc::clone(&archive)).await;

    router.clone().oneshot(get("/tiles/0/0/0")).await.unwrap();
    router.oneshot(get("/tiles/0/0/0")).await.unwrap();

    assert_eq!(archive.fetch_count(), 2);
}

// =============================================================================
// Style and Metadata
// =============================================================================

#[tokio::test]
async fn test_style_before_and_after_load() {
    let (router, session) = build_router(sample_archive());

    let before = json_body(router.clone().oneshot(get("/style.json")).await.unwrap()).await;
    assert_eq!(before["version"], 8);
    assert_eq!(before["layers"].as_array().unwrap().len(), 0);
    assert_eq!(before["sources"]["protomaps"]["type"], "vector");
    assert_eq!(
        before["sources"]["protomaps"]["url"],
        "pmtiles://http://localhost:5175/eddy_kinetic_energy.pmtiles"
    );
    assert_eq!(before["sources"]["protomaps"]["attribution"], "Kodjo");

    session.load().await.unwrap();

    let after = json_body(router.oneshot(get("/style.json")).await.unwrap()).await;
    let layers = after["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0]["id"], "ocean");
    assert_eq!(layers[0]["type"], "fill");
    assert_eq!(layers[0]["source-layer"], "ocean");
    assert_eq!(layers[0]["paint"]["fill-color"], "#888888");
    assert_eq!(layers[0]["paint"]["fill-opacity"], 0.5);
}

#[tokio::test]
async fn test_metadata_endpoint() {
    let (router, session) = build_router(sample_archive());

    let response = router.clone().oneshot(get("/metadata")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    session.load().await.unwrap();

    let response = router.oneshot(get("/metadata")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["name"], "mock");
    assert_eq!(body["vector_layers"][1]["id"], "coast");
}

#[tokio::test]
async fn test_health_endpoint() {
    let (router, _) = build_router(sample_archive());

    let response = router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_load_event_enables_tiles() {
    let (router, session) = build_router(sample_archive());

    let response = router.clone().oneshot(post("/events/load", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(session.is_loaded());

    let response = router.oneshot(get("/tiles/5/3/2.mvt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_moveend_updates_viewport() {
    let (router, session) = build_loaded_router(sample_archive()).await;

    let body = r#"{"bounds": {"_sw": {"lng": -10.0, "lat": 20.0}, "_ne": {"lng": 12.0, "lat": 40.0}}, "zoom": 3.7}"#;
    let response = router.oneshot(post("/events/moveend", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(session.view().zoom(), 3.7);
    assert_eq!(session.view().bounds().ne.lat, 40.0);
}

#[tokio::test]
async fn test_unknown_event_rejected() {
    let (router, _) = build_router(sample_archive());

    let response = router.oneshot(post("/events/click", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_event");
}

#[tokio::test]
async fn test_malformed_viewport_rejected() {
    let (router, _) = build_router(sample_archive());

    let response = router
        .oneshot(post("/events/zoomend", r#"{"zoom": "high"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_viewport");
}
