//! The tile-loading override.
//!
//! Each tile request goes through the same shared pipeline:
//!
//! Coordinates outside the tile pyramid are rejected with `InvalidTile`
//! before they are logged or keyed into the debouncer.
//!
//! ```text
//! Requested ──► Logging (throttled) ──► Fetching (debounced per tile id)
//!                                            │
//!                      ┌─────────────────────┼────────────────────┐
//!                      ▼                     ▼                    ▼
//!                  Delivered              NotFound              Failed
//!             set_data + Ok(())     Err(NotFound)         log + Err(Fetch)
//! ```
//!
//! The throttle and the debouncer are owned by the [`TileLoader`] and shared
//! by every request it serves, so one loader must be created per archive
//! and reused, never one per tile.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::archive::{Archive, TileCoord, TileId};
use crate::error::{ArchiveError, TileLoadError};
use crate::rate::{Debouncer, Throttle};

/// Default interval between "Loading tile" log lines.
pub const DEFAULT_TILE_LOG_INTERVAL: Duration = Duration::from_millis(1000);

/// Default quiet period before a tile fetch is issued.
pub const DEFAULT_FETCH_DEBOUNCE: Duration = Duration::from_millis(100);

type FetchResult = Result<Option<Bytes>, ArchiveError>;

// =============================================================================
// Renderer Contract
// =============================================================================

/// A tile object handed over by the renderer.
///
/// The loader reads the canonical coordinates and, on success, stores the
/// fetched bytes through `set_data`.
pub trait TileTarget {
    /// Canonical `(z, x, y)` of the tile.
    fn canonical(&self) -> TileCoord;

    /// Store the tile's raw bytes.
    fn set_data(&mut self, data: Bytes);
}

/// Rate-limit settings for a [`TileLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Minimum interval between per-tile log lines
    pub log_interval: Duration,

    /// Quiet period before a fetch for a tile is issued
    pub fetch_debounce: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            log_interval: DEFAULT_TILE_LOG_INTERVAL,
            fetch_debounce: DEFAULT_FETCH_DEBOUNCE,
        }
    }
}

/// Log line payload for the throttled tile logger.
#[derive(Debug, Clone, Copy)]
struct TileLogEntry {
    coord: TileCoord,
    tile_id: TileId,
}

// =============================================================================
// TileLoader
// =============================================================================

/// Loads tiles from an archive for a renderer, with throttled logging and
/// debounced fetching.
pub struct TileLoader {
    archive: Arc<dyn Archive>,
    log: Throttle<TileLogEntry>,
    fetch: Debouncer<TileId, TileCoord, FetchResult>,
}

impl TileLoader {
    /// Create a loader over `archive` with the given rate limits.
    pub fn new(archive: Arc<dyn Archive>, config: LoaderConfig) -> Self {
        let log = Throttle::new(config.log_interval, |entry: TileLogEntry| {
            info!(
                "Loading tile: z={}, x={}, y={}, tileId={}",
                entry.coord.z, entry.coord.x, entry.coord.y, entry.tile_id
            );
        });

        let fetch_archive = Arc::clone(&archive);
        let fetch = Debouncer::new(config.fetch_debounce, move |coord: TileCoord| {
            let archive = Arc::clone(&fetch_archive);
            async move { archive.get_tile_at(coord).await }
        });

        Self {
            archive,
            log,
            fetch,
        }
    }

    /// The archive tiles are read from.
    pub fn archive(&self) -> &Arc<dyn Archive> {
        &self.archive
    }

    /// Number of tiles whose fetch is still waiting out the debounce.
    pub fn pending_fetches(&self) -> usize {
        self.fetch.pending_count()
    }

    /// Load one tile.
    ///
    /// On success the bytes have been handed to `tile.set_data`. Errors
    /// name the tile's coordinates and id; fetch failures are also logged.
    pub async fn load<T>(&self, tile: &mut T) -> Result<(), TileLoadError>
    where
        T: TileTarget + ?Sized,
    {
        let coord = tile.canonical();
        let TileCoord { z, x, y } = coord;

        // Out-of-range coordinates share ids with real tiles or overflow the id
        if !coord.is_valid() {
            return Err(TileLoadError::InvalidTile { z, x, y });
        }
        let tile_id = coord.tile_id();

        self.log.invoke(TileLogEntry { coord, tile_id });

        let fetched = self
            .fetch
            .call_keyed(tile_id, coord)
            .await
            .map_err(|_| TileLoadError::Interrupted { z, x, y, tile_id })?;

        match fetched {
            Ok(Some(data)) if !data.is_empty() => {
                tile.set_data(data);
                debug!("Loaded tile data for tileId: {}", tile_id);
                Ok(())
            }
            Ok(_) => Err(TileLoadError::NotFound { z, x, y, tile_id }),
            Err(source) => {
                error!(
                    archive = self.archive.identifier(),
                    "Error loading tile z={}, x={}, y={}, tileId={}: {}", z, x, y, tile_id, source
                );
                Err(TileLoadError::Fetch {
                    z,
                    x,
                    y,
                    tile_id,
                    source,
                })
            }
        }
    }

    /// Renderer hook: load `tile` in the background and report through
    /// `callback`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn load_tile<T, F>(self: &Arc<Self>, tile: T, callback: F)
    where
        T: TileTarget + Send + 'static,
        F: FnOnce(Result<(), TileLoadError>) + Send + 'static,
    {
        let loader = Arc::clone(self);
        tokio::spawn(async move {
            let mut tile = tile;
            let result = loader.load(&mut tile).await;
            callback(result);
        });
    }
}

impl std::fmt::Debug for TileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLoader")
            .field("archive", &self.archive.identifier())
            .field("log", &self.log)
            .field("fetch", &self.fetch)
            .finish()
    }
}
