//! Archive protocol: resolves archive URLs to shared, cached archives.
//!
//! The protocol provides:
//! - LRU caching of opened archives, so a URL is fetched and parsed once
//! - Singleflight opening, so concurrent requests for the same URL share one open
//! - `pmtiles://` prefix handling, so style source URLs can be passed verbatim
//!
//! One protocol instance is meant to live for the whole process and be
//! handed to every consumer; creating a second one duplicates the cache.
//!
//! # Example
//!
//! ```ignore
//! use maptile_pacer::archive::{ArchiveProtocol, PmTilesSource};
//!
//! let protocol = ArchiveProtocol::new(PmTilesSource::new());
//! let archive = protocol.get("pmtiles://https://example.com/world.pmtiles").await?;
//! let tile = archive.get_tile_at(TileCoord::new(0, 0, 0)).await?;
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info};

use super::source::{strip_protocol, ArchiveSource};
use super::Archive;
use crate::error::ArchiveError;

/// Default number of opened archives kept in memory.
pub const DEFAULT_ARCHIVE_CACHE_CAPACITY: usize = 16;

type OpenResult = Result<Arc<dyn Archive>, ArchiveError>;

/// Resolves archive locations through an [`ArchiveSource`] and caches the
/// opened archives.
pub struct ArchiveProtocol<S: ArchiveSource> {
    /// The source for opening archives
    source: S,

    /// Opened archives indexed by location (prefix stripped)
    cache: RwLock<LruCache<String, Arc<dyn Archive>>>,

    /// Opens in progress; late callers wait on the same cell
    in_flight: Mutex<HashMap<String, Arc<OnceCell<OpenResult>>>>,
}

impl<S: ArchiveSource> ArchiveProtocol<S> {
    /// Create a protocol with the default cache capacity.
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_ARCHIVE_CACHE_CAPACITY)
    }

    /// Create a protocol caching at most `capacity` archives (minimum 1).
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            cache: RwLock::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the archive at `location`, opening it if not already cached.
    ///
    /// Failed opens are not cached; the next call retries.
    pub async fn get(&self, location: &str) -> Result<Arc<dyn Archive>, ArchiveError> {
        let key = strip_protocol(location).to_string();

        // Fast path: check cache
        {
            let mut cache = self.cache.write().await;
            if let Some(archive) = cache.get(&key) {
                return Ok(Arc::clone(archive));
            }
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };

        let result = cell
            .get_or_init(|| async {
                info!(archive = %key, "Opening archive");
                let result = self.source.open(&key).await;

                if let Ok(ref archive) = result {
                    let mut cache = self.cache.write().await;
                    cache.put(key.clone(), Arc::clone(archive));
                }

                let mut in_flight = self.in_flight.lock().await;
                in_flight.remove(&key);

                result
            })
            .await
            .clone();

        if let Err(ref e) = result {
            debug!(archive = %key, error = %e, "Archive open failed");
        }
        result
    }

    /// Drop a cached archive so the next `get` reopens it.
    pub async fn invalidate(&self, location: &str) {
        let mut cache = self.cache.write().await;
        cache.pop(strip_protocol(location));
    }

    /// Drop all cached archives.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Number of cached archives.
    pub async fn cached_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }
}
