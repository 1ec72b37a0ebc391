//! HTTP request handlers for the maptile-pacer API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /style.json` - Style document for the renderer
//! - `GET /metadata` - Archive metadata
//! - `GET /tiles/{z}/{x}/{y}` - Serve a tile (`{y}`, `{y}.mvt` or `{y}.pbf`)
//! - `POST /events/{event}` - Report a renderer event (`load`, `moveend`, `zoomend`)

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::view::ServerMapView;
use crate::archive::{ArchiveMetadata, ArchiveSource, TileCoord};
use crate::error::{ArchiveError, SessionError, TileLoadError};
use crate::map::{MapEvent, MapSession, StyleDocument, UnknownEvent, Viewport};
use crate::tile::TileTarget;

/// Content type of Mapbox Vector Tiles.
pub const MVT_CONTENT_TYPE: &str = "application/x-protobuf";

/// Response header carrying the tile id.
pub const TILE_ID_HEADER: HeaderName = HeaderName::from_static("x-tile-id");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the map session.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ArchiveSource> {
    /// The session owning the protocol and the tile loader
    pub session: Arc<MapSession<S, ServerMapView>>,

    /// Cache-Control max-age in seconds for tiles (defaults to 1 hour)
    pub cache_max_age: u32,
}

impl<S: ArchiveSource> AppState<S> {
    pub fn new(session: Arc<MapSession<S, ServerMapView>>) -> Self {
        Self::with_cache_max_age(session, 3600)
    }

    pub fn with_cache_max_age(session: Arc<MapSession<S, ServerMapView>>, cache_max_age: u32) -> Self {
        Self {
            session,
            cache_max_age,
        }
    }
}

impl<S: ArchiveSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{z}/{x}/{filename}`
/// where filename is `{y}`, `{y}.mvt` or `{y}.pbf`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Zoom level
    pub z: u8,

    /// Tile column
    pub x: u32,

    /// Tile row with optional extension (e.g., "2" or "2.mvt")
    pub filename: String,
}

impl TilePathParams {
    /// Parse the row from the filename, stripping any tile extension.
    pub fn y(&self) -> Result<u32, std::num::ParseIntError> {
        let y_str = self
            .filename
            .strip_suffix(".mvt")
            .or_else(|| self.filename.strip_suffix(".pbf"))
            .unwrap_or(&self.filename);
        y_str.parse()
    }
}

/// Tile object filled by the loader for one HTTP request.
#[derive(Debug)]
struct ResponseTile {
    coord: TileCoord,
    data: Option<Bytes>,
}

impl TileTarget for ResponseTile {
    fn canonical(&self) -> TileCoord {
        self.coord
    }

    fn set_data(&mut self, data: Bytes) {
        self.data = Some(data);
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_tile")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    pub status: u16,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors produced by the handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or out-of-range tile coordinates
    InvalidTile(String),

    /// Unknown event name
    InvalidEvent(String),

    /// Event body is not a viewport
    InvalidViewport(String),

    Session(SessionError),

    Tile(TileLoadError),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err)
    }
}

impl From<TileLoadError> for ApiError {
    fn from(err: TileLoadError) -> Self {
        ApiError::Tile(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::InvalidTile(message) => {
                (StatusCode::BAD_REQUEST, "invalid_tile", message.clone())
            }
            ApiError::InvalidEvent(message) => {
                (StatusCode::BAD_REQUEST, "invalid_event", message.clone())
            }
            ApiError::InvalidViewport(message) => {
                (StatusCode::BAD_REQUEST, "invalid_viewport", message.clone())
            }
            ApiError::Session(err) => {
                let (status, error_type) = match err {
                    SessionError::NotLoaded => (StatusCode::SERVICE_UNAVAILABLE, "not_loaded"),
                    SessionError::Archive(ArchiveError::NotFound(_)) => {
                        (StatusCode::NOT_FOUND, "archive_not_found")
                    }
                    SessionError::Archive(_) => (StatusCode::BAD_GATEWAY, "archive_error"),
                };
                (status, error_type, err.to_string())
            }
            ApiError::Tile(err) => {
                let (status, error_type) = match err {
                    TileLoadError::InvalidTile { .. } => (StatusCode::BAD_REQUEST, "invalid_tile"),
                    TileLoadError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                    TileLoadError::Fetch { .. } => (StatusCode::BAD_GATEWAY, "fetch_failed"),
                    TileLoadError::Interrupted { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "interrupted")
                    }
                };
                (status, error_type, err.to_string())
            }
        }
    }
}

/// Convert ApiError to HTTP response.
///
/// - 5xx errors are logged at ERROR level
/// - 404s are logged at DEBUG level (missing tiles are routine)
/// - other 4xx errors are logged at WARN level
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();

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
                "Resource not found: {}",
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
/// `GET /tiles/{z}/{x}/{y}` (also `{y}.mvt` and `{y}.pbf`)
///
/// # Response
///
/// - `200 OK`: raw tile bytes with `Content-Type: application/x-protobuf`
/// - `400 Bad Request`: malformed or out-of-range coordinates
/// - `404 Not Found`: the archive has no data for the tile
/// - `502 Bad Gateway`: the archive failed while fetching
/// - `503 Service Unavailable`: not loaded yet, or the fetch was interrupted
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Id: {tile id}`
pub async fn tile_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, ApiError> {
    let y = params
        .y()
        .map_err(|_| ApiError::InvalidTile(format!("Invalid tile row: {}", params.filename)))?;

    let coord = TileCoord::new(params.z, params.x, y);
    let loader = state.session.loader()?;
    let mut tile = ResponseTile { coord, data: None };
    loader.load(&mut tile).await?;

    let data = tile.data.unwrap_or_default();
    let headers = [
        (header::CONTENT_TYPE, MVT_CONTENT_TYPE.to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (TILE_ID_HEADER, coord.tile_id().to_string()),
    ];

    Ok((StatusCode::OK, headers, Body::from(data)).into_response())
}

/// Handle style requests.
///
/// # Endpoint
///
/// `GET /style.json`
///
/// Returns the style including the layers added on load.
pub async fn style_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
) -> Json<StyleDocument> {
    Json(state.session.view().style())
}

/// Handle archive metadata requests.
///
/// # Endpoint
///
/// `GET /metadata`
///
/// # Errors
///
/// - `503 Service Unavailable`: the load event has not completed yet
pub async fn metadata_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<ArchiveMetadata>, ApiError> {
    let archive = state.session.archive()?;
    Ok(Json(archive.metadata().clone()))
}

/// Handle renderer events.
///
/// # Endpoint
///
/// `POST /events/{event}` where event is `load`, `moveend` or `zoomend`
///
/// The optional JSON body is the renderer's current viewport:
/// ```json
/// {
///   "bounds": {"_sw": {"lng": -10.0, "lat": 20.0}, "_ne": {"lng": 12.0, "lat": 40.0}},
///   "zoom": 3.7
/// }
/// ```
///
/// # Response
///
/// - `204 No Content`: event handled
/// - `400 Bad Request`: unknown event or malformed viewport
/// - `404` / `502`: the archive could not be opened on load
pub async fn event_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
    Path(event): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event: MapEvent = event
        .parse()
        .map_err(|e: UnknownEvent| ApiError::InvalidEvent(e.to_string()))?;

    if !body.is_empty() {
        let viewport: Viewport = serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidViewport(format!("Invalid viewport: {}", e)))?;
        state.session.view().set_viewport(viewport);
    }

    state.session.handle(event).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
