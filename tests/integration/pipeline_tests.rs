//! End-to-end tests over real PMTiles files.
//!
//! Tests verify that an archive written to disk or served over HTTP is
//! opened through the stock source and protocol, and its layers and tiles
//! reach the HTTP API. HTTP archives must be read with bounded ranges.

use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use tower::ServiceExt;

use maptile_pacer::map::{MapSession, SessionConfig, StyleConfig, StyleDocument};
use maptile_pacer::server::{create_router, RouterConfig, ServerMapView};
use maptile_pacer::{ArchiveProtocol, PmTilesSource};

use super::test_utils::{build_pmtiles, fast_loader_config, json_body};

fn write_archive(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn file_router(location: &str) -> (axum::Router, Arc<MapSession<PmTilesSource, ServerMapView>>) {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let source = PmTilesSource::new().with_http_client(http);

    let mut session_config = SessionConfig::new(location, "eke");
    session_config.loader = fast_loader_config();

    let mut style_config = StyleConfig::new(location);
    style_config.source_name = "eke".to_string();

    let session = Arc::new(MapSession::new(
        session_config,
        Arc::new(ArchiveProtocol::new(source)),
        Arc::new(ServerMapView::new(StyleDocument::new(&style_config))),
    ));
    let router = create_router(Arc::clone(&session), RouterConfig::new().with_tracing(false));
    (router, session)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_pmtiles_file_end_to_end() {
    let file = write_archive(&build_pmtiles(
        &["ocean", "coast"],
        &[(0, 0, 0, vec![0x1a, 0x02]), (5, 3, 2, vec![1, 2, 3])],
    ));
    let location = format!("pmtiles://{}", file.path().display());
    let (router, _) = file_router(&location);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events/load")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let style = json_body(router.clone().oneshot(get("/style.json")).await.unwrap()).await;
    let ids: Vec<&str> = style["layers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|layer| layer["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["ocean", "coast"]);
    assert_eq!(style["layers"][0]["source"], "eke");
    assert_eq!(style["sources"]["eke"]["url"], location.as_str());

    let response = router.clone().oneshot(get("/tiles/5/3/2.mvt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &[1, 2, 3]);

    let response = router.oneshot(get("/tiles/6/0/0.mvt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_file_fails_load() {
    let (router, session) = file_router("/definitely/not/here.pmtiles");

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events/load")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "archive_not_found");
    assert!(!session.is_loaded());
}

#[tokio::test]
async fn test_corrupt_file_fails_load() {
    let file = write_archive(b"definitely not a pmtiles archive");
    let (_, session) = file_router(&file.path().display().to_string());

    let result = session.load().await;
    assert!(result.is_err());
    assert!(!session.is_loaded());
}

// =============================================================================
// Ranged HTTP Archives
// =============================================================================

/// Static file server honouring single `Range: bytes=a-b` requests.
#[derive(Clone)]
struct RangeServer {
    data: bytes::Bytes,
    requests: Arc<Mutex<Vec<(Method, Option<String>)>>>,
}

async fn serve_archive(State(server): State<RangeServer>, method: Method, headers: HeaderMap) -> Response {
    let range = headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap().to_string());
    server.requests.lock().unwrap().push((method, range.clone()));

    let data = &server.data;
    match range {
        Some(range) => {
            let (start, end) = range.trim_start_matches("bytes=").split_once('-').unwrap();
            let start: usize = start.parse().unwrap();
            let end: usize = end.parse().unwrap();
            let content_range = format!("bytes {}-{}/{}", start, end, data.len());
            (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, content_range)],
                data.slice(start..=end),
            )
                .into_response()
        }
        None => (
            [(header::CONTENT_LENGTH, data.len().to_string())],
            data.clone(),
        )
            .into_response(),
    }
}

async fn spawn_range_server(data: Vec<u8>) -> (String, RangeServer) {
    let server = RangeServer {
        data: bytes::Bytes::from(data),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = axum::Router::new()
        .route("/world.pmtiles", axum::routing::get(serve_archive))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/world.pmtiles", addr), server)
}

#[tokio::test]
async fn test_http_archive_is_read_by_range() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let archive = build_pmtiles(
        &["ocean"],
        &[
            (0, 0, 0, vec![7; 5000]),
            (5, 3, 2, payload.clone()),
            (8, 100, 100, vec![9; 5000]),
        ],
    );
    let total = archive.len();
    let (url, server) = spawn_range_server(archive).await;
    let (router, _) = file_router(&format!("pmtiles://{}", url));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events/load")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let opening = std::mem::take(&mut *server.requests.lock().unwrap());
    assert_eq!(opening[0], (Method::HEAD, None));
    assert!(opening[1..]
        .iter()
        .all(|(method, range)| *method == Method::GET && range.is_some()));

    let response = router.oneshot(get("/tiles/5/3/2.mvt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &payload[..]);

    let requests = server.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let (method, range) = &requests[0];
    assert_eq!(*method, Method::GET);
    let (start, end) = range
        .as_deref()
        .unwrap()
        .trim_start_matches("bytes=")
        .split_once('-')
        .unwrap();
    let len = end.parse::<usize>().unwrap() - start.parse::<usize>().unwrap() + 1;
    assert_eq!(len, payload.len());
    assert!(len < total);
}

#[tokio::test]
async fn test_missing_http_archive_is_not_found() {
    let (url, _) = spawn_range_server(build_pmtiles(&["ocean"], &[(0, 0, 0, vec![1])])).await;
    let missing = url.replace("world.pmtiles", "elsewhere.pmtiles");
    let (_, session) = file_router(&missing);

    let result = session.load().await;
    assert!(matches!(
        result,
        Err(maptile_pacer::SessionError::Archive(maptile_pacer::ArchiveError::NotFound(_)))
    ));
}
