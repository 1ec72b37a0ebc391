//! Session integration tests.
//!
//! Tests verify:
//! - Load wiring against a shared protocol (layers, warnings, retries)
//! - The tile loader singleton surviving repeated loads
//! - Debounced fetching through the session's loader with a paused clock

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use maptile_pacer::archive::TileCoord;
use maptile_pacer::error::{ArchiveError, LoadWarning, SessionError, TileLoadError};
use maptile_pacer::map::{EventOutcome, MapEvent};
use maptile_pacer::tile::TileTarget;

use super::test_utils::{build_session, MockArchive, MockArchiveSource, ARCHIVE_URL};

/// Tile object shared between the test and the loader task.
#[derive(Clone)]
struct SharedTile {
    coord: TileCoord,
    data: Arc<Mutex<Option<Bytes>>>,
}

impl SharedTile {
    fn new(z: u8, x: u32, y: u32) -> Self {
        Self {
            coord: TileCoord::new(z, x, y),
            data: Arc::new(Mutex::new(None)),
        }
    }

    fn data(&self) -> Option<Bytes> {
        self.data.lock().unwrap().clone()
    }
}

impl TileTarget for SharedTile {
    fn canonical(&self) -> TileCoord {
        self.coord
    }

    fn set_data(&mut self, data: Bytes) {
        *self.data.lock().unwrap() = Some(data);
    }
}

#[tokio::test]
async fn test_load_event_reports_layers() {
    let archive = Arc::new(MockArchive::new("eke").with_layers(&["ocean"]));
    let session = build_session(MockArchiveSource::new().with_archive(ARCHIVE_URL, archive));

    let outcome = session.handle(MapEvent::Load).await.unwrap();

    match outcome {
        EventOutcome::Loaded(report) => {
            assert_eq!(report.archive, "eke");
            assert_eq!(report.layers_added, vec!["ocean"]);
            assert!(report.warning.is_none());
        }
        other => panic!("expected load report, got {:?}", other),
    }
    assert_eq!(session.view().style().layers.len(), 1);
}

#[tokio::test]
async fn test_load_without_layers_warns_and_serves_tiles() {
    let archive = Arc::new(MockArchive::new("raster").with_tile(0, 0, 0, &[5]));
    let session = build_session(MockArchiveSource::new().with_archive(ARCHIVE_URL, archive));

    let report = session.load().await.unwrap();
    assert!(matches!(
        report.warning,
        Some(LoadWarning::NoVectorLayers { ref archive }) if archive == "raster"
    ));
    assert!(session.view().style().layers.is_empty());

    let mut tile = SharedTile::new(0, 0, 0);
    session.loader().unwrap().load(&mut tile).await.unwrap();
    assert_eq!(tile.data(), Some(Bytes::from_static(&[5])));
}

#[tokio::test]
async fn test_failed_load_can_be_retried() {
    let session = build_session(MockArchiveSource::new());

    let first = session.load().await;
    assert!(matches!(
        first,
        Err(SessionError::Archive(ArchiveError::NotFound(_)))
    ));
    let second = session.load().await;
    assert!(second.is_err());

    assert_eq!(session.protocol().source().open_count(), 2);
    assert!(!session.is_loaded());
}

#[tokio::test]
async fn test_repeated_loads_keep_one_loader() {
    let archive = Arc::new(MockArchive::new("eke").with_layers(&["ocean", "coast"]));
    let session = build_session(MockArchiveSource::new().with_archive(ARCHIVE_URL, archive));

    session.load().await.unwrap();
    let loader = session.loader().unwrap();
    session.load().await.unwrap();

    assert!(Arc::ptr_eq(&loader, &session.loader().unwrap()));
    assert_eq!(session.protocol().source().open_count(), 1);
    assert_eq!(session.view().style().layers.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tile_burst_is_debounced() {
    let archive = Arc::new(
        MockArchive::new("eke")
            .with_layers(&["ocean"])
            .with_tile(5, 3, 2, &[1, 2, 3]),
    );
    let session = build_session(
        MockArchiveSource::new().with_archive(ARCHIVE_URL, Arc::clone(&archive)),
    );
    session.load().await.unwrap();
    let loader = session.loader().unwrap();

    let mut receivers = Vec::new();
    let mut tiles = Vec::new();
    for _ in 0..3 {
        let tile = SharedTile::new(5, 3, 2);
        let (tx, rx) = oneshot::channel();
        loader.load_tile(tile.clone(), move |result| {
            let _ = tx.send(result);
        });
        tiles.push(tile);
        receivers.push(rx);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(archive.fetch_count(), 0);

    for rx in receivers {
        rx.await.unwrap().unwrap();
    }
    assert_eq!(archive.fetch_count(), 1);
    for tile in tiles {
        assert_eq!(tile.data(), Some(Bytes::from_static(&[1, 2, 3])));
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_tile_callback_error() {
    let archive = Arc::new(MockArchive::new("eke").with_layers(&["ocean"]));
    let session = build_session(MockArchiveSource::new().with_archive(ARCHIVE_URL, archive));
    session.load().await.unwrap();

    let (tx, rx) = oneshot::channel();
    session
        .loader()
        .unwrap()
        .load_tile(SharedTile::new(5, 3, 2), move |result| {
            let _ = tx.send(result);
        });

    let err = rx.await.unwrap().unwrap_err();
    assert!(matches!(err, TileLoadError::NotFound { z: 5, x: 3, y: 2, .. }));
    assert!(err.to_string().contains("z=5, x=3, y=2"));
}
