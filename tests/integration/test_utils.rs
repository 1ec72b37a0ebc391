//! Test utilities for integration tests.
//!
//! This module provides mock archives and sources, a session/router builder
//! and a helper for writing real PMTiles archives to disk.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use bytes::Bytes;
use http_body_util::BodyExt;
use pmtiles2::{util::tile_id, Compression, PMTiles, TileType};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use maptile_pacer::archive::{Archive, ArchiveMetadata, ArchiveSource, TileCoord};
use maptile_pacer::error::ArchiveError;
use maptile_pacer::map::{MapSession, SessionConfig, StyleConfig, StyleDocument};
use maptile_pacer::server::{create_router, RouterConfig, ServerMapView};
use maptile_pacer::tile::LoaderConfig;
use maptile_pacer::ArchiveProtocol;

/// Archive location every mock session points at.
pub const ARCHIVE_URL: &str = "pmtiles://http://localhost:5175/eddy_kinetic_energy.pmtiles";

// =============================================================================
// Mock Archive
// =============================================================================

/// In-memory archive that counts fetches.
pub struct MockArchive {
    identifier: String,
    metadata: ArchiveMetadata,
    tiles: HashMap<TileCoord, Bytes>,
    failing: HashSet<TileCoord>,
    fetches: AtomicUsize,
}

impl MockArchive {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            metadata: ArchiveMetadata::default(),
            tiles: HashMap::new(),
            failing: HashSet::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Declare the given vector layer ids in the metadata.
    pub fn with_layers(mut self, ids: &[&str]) -> Self {
        let layers: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        self.metadata = ArchiveMetadata::from_value(json!({
            "name": "mock",
            "vector_layers": layers,
        }))
        .unwrap();
        self
    }

    pub fn with_tile(mut self, z: u8, x: u32, y: u32, data: &[u8]) -> Self {
        self.tiles
            .insert(TileCoord::new(z, x, y), Bytes::copy_from_slice(data));
        self
    }

    /// Make fetches of this tile fail with an HTTP error.
    pub fn with_failing_tile(mut self, z: u8, x: u32, y: u32) -> Self {
        self.failing.insert(TileCoord::new(z, x, y));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Archive for MockArchive {
    fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    async fn get_tile_at(&self, coord: TileCoord) -> Result<Option<Bytes>, ArchiveError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&coord) {
            return Err(ArchiveError::Http(format!("upstream reset at {}", coord)));
        }
        Ok(self.tiles.get(&coord).cloned())
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Mock Source
// =============================================================================

/// Source serving pre-built archives by location; unknown locations are 404s.
#[derive(Default)]
pub struct MockArchiveSource {
    archives: HashMap<String, Arc<MockArchive>>,
    opens: AtomicUsize,
}

impl MockArchiveSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `archive` under `location` (prefix stripped).
    pub fn with_archive(mut self, location: &str, archive: Arc<MockArchive>) -> Self {
        let location = location.strip_prefix("pmtiles://").unwrap_or(location);
        self.archives.insert(location.to_string(), archive);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveSource for MockArchiveSource {
    async fn open(&self, location: &str) -> Result<Arc<dyn Archive>, ArchiveError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.archives
            .get(location)
            .map(|archive| Arc::clone(archive) as Arc<dyn Archive>)
            .ok_or_else(|| ArchiveError::NotFound(location.to_string()))
    }
}

// =============================================================================
// Session and Router Builders
// =============================================================================

/// Loader limits short enough for wall-clock tests.
pub fn fast_loader_config() -> LoaderConfig {
    LoaderConfig {
        log_interval: Duration::from_millis(1000),
        fetch_debounce: Duration::from_millis(20),
    }
}

pub type TestSession = MapSession<MockArchiveSource, ServerMapView>;

/// Session over `source` pointed at [`ARCHIVE_URL`].
pub fn build_session(source: MockArchiveSource) -> Arc<TestSession> {
    let mut style_config = StyleConfig::new(ARCHIVE_URL);
    style_config.attribution = Some("Kodjo".to_string());

    let mut session_config = SessionConfig::new(ARCHIVE_URL, "protomaps");
    session_config.loader = fast_loader_config();

    Arc::new(MapSession::new(
        session_config,
        Arc::new(ArchiveProtocol::new(source)),
        Arc::new(ServerMapView::new(StyleDocument::new(&style_config))),
    ))
}

/// Router over `archive`, not yet loaded.
pub fn build_router(archive: Arc<MockArchive>) -> (axum::Router, Arc<TestSession>) {
    let source = MockArchiveSource::new().with_archive(ARCHIVE_URL, archive);
    let session = build_session(source);
    let router = create_router(Arc::clone(&session), RouterConfig::new().with_tracing(false));
    (router, session)
}

/// Router over `archive` with the load event already handled.
pub async fn build_loaded_router(archive: Arc<MockArchive>) -> (axum::Router, Arc<TestSession>) {
    let (router, session) = build_router(archive);
    session.load().await.unwrap();
    (router, session)
}

/// Read a response body as JSON.
pub async fn json_body(response: Response<Body>) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// PMTiles Files
// =============================================================================

/// Serialize an uncompressed PMTiles archive with the given layers and tiles.
pub fn build_pmtiles(layers: &[&str], tiles: &[(u8, u64, u64, Vec<u8>)]) -> Vec<u8> {
    let mut pm = PMTiles::new(TileType::Mvt, Compression::None);
    let layers: Vec<Value> = layers.iter().map(|id| json!({ "id": id })).collect();
    pm.meta_data.insert("name".into(), json!("fixture"));
    pm.meta_data.insert("vector_layers".into(), json!(layers));
    for (z, x, y, data) in tiles {
        pm.add_tile(tile_id(*z, *x, *y), data.clone()).unwrap();
    }
    let mut out = Cursor::new(Vec::new());
    pm.to_writer(&mut out).unwrap();
    out.into_inner()
}
