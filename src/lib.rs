//! # maptile-pacer
//!
//! Rate-limited vector tile loading from PMTiles archives.
//!
//! A map renderer asks for tiles one at a time and often asks for the same
//! tile many times while the user pans or zooms. This crate sits behind the
//! renderer: each tile request is logged through a shared throttle and
//! fetched through a shared, per-tile debounce, so a burst of requests for
//! one tile becomes a single archive read.
//!
//! ## Features
//!
//! - **Rate limiters**: leading-edge [`Throttle`] and trailing-edge [`Debouncer`]
//! - **Tile loading**: [`TileLoader`] with delivered / not-found / failed outcomes
//! - **Archives**: PMTiles from local files, HTTP(S) or S3, cached per URL
//! - **Map session**: load / moveend / zoomend handling and fill layers from metadata
//! - **HTTP server**: style, metadata, tiles and event endpoints on axum
//!
//! ## Architecture
//!
//! - [`rate`] - Throttle, debounce and clocks
//! - [`archive`] - Archive trait, PMTiles adapter, sources and protocol
//! - [`tile`] - The tile-loading override
//! - [`map`] - Style document, viewport and session
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use maptile_pacer::{
//!     create_router, ArchiveProtocol, MapSession, PmTilesSource, RouterConfig, ServerMapView,
//!     SessionConfig, StyleConfig, StyleDocument,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let archive = "pmtiles://https://example.com/world.pmtiles";
//!     let protocol = Arc::new(ArchiveProtocol::new(PmTilesSource::new()));
//!     let view = Arc::new(ServerMapView::new(StyleDocument::new(&StyleConfig::new(archive))));
//!     let session = Arc::new(MapSession::new(
//!         SessionConfig::new(archive, "protomaps"),
//!         protocol,
//!         view,
//!     ));
//!
//!     let router = create_router(session, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod map;
pub mod rate;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use archive::{
    create_s3_client, zxy_to_tile_id, Archive, ArchiveLocation, ArchiveMetadata, ArchiveProtocol,
    ArchiveSource, PmTilesArchive, PmTilesSource, RangeReader, TileCoord, TileId, VectorLayer,
};
pub use config::Config;
pub use error::{ArchiveError, LoadWarning, SessionError, TileLoadError};
pub use map::{
    EventOutcome, LngLat, LngLatBounds, LoadReport, MapEvent, MapSession, MapView, SessionConfig,
    StyleConfig, StyleDocument, StyleLayer, Viewport,
};
pub use rate::{debounce, throttle, DebounceError, Debouncer, Throttle};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig, ServerMapView};
pub use tile::{LoaderConfig, TileLoader, TileTarget};
