//! Tile archive access.
//!
//! An [`Archive`] gives random access to the tiles of one tiled archive and
//! exposes its JSON metadata. Archives are resolved from URLs by the
//! [`ArchiveProtocol`], which caches opened archives so every consumer of a
//! URL shares one instance.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               TileLoader                │
//! └────────────────────┬────────────────────┘
//!                      │ get_tile_at(z, x, y)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │       ArchiveProtocol (LRU cache)       │
//! └────────────────────┬────────────────────┘
//!                      │ open(location)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   PmTilesSource: file / http(s) / s3    │
//! │   → RangeReader → PmTilesArchive        │
//! └─────────────────────────────────────────┘
//! ```

mod pmtiles;
mod protocol;
mod reader;
mod source;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ArchiveError;

pub use pmtiles::{PmTilesArchive, TileCompression};
pub use protocol::{ArchiveProtocol, DEFAULT_ARCHIVE_CACHE_CAPACITY};
pub use reader::{HttpRangeReader, MemoryRangeReader, RangeReader, S3RangeReader};
pub use source::{create_s3_client, ArchiveLocation, ArchiveSource, PmTilesSource, PROTOCOL_PREFIX};

/// Deterministic key of a tile, derived from its coordinates.
pub type TileId = u64;

/// Highest zoom level accepted for tile coordinates.
pub const MAX_ZOOM: u8 = 30;

/// Compute the archive's tile id for `(z, x, y)`.
///
/// Pure: identical inputs always yield the same id.
pub fn zxy_to_tile_id(z: u8, x: u32, y: u32) -> TileId {
    pmtiles2::util::tile_id(z, u64::from(x), u64::from(y))
}

// =============================================================================
// Tile Coordinates
// =============================================================================

/// Canonical coordinates of a tile in the XYZ scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level (0 = whole world in one tile)
    pub z: u8,

    /// Column, 0-indexed from the antimeridian
    pub x: u32,

    /// Row, 0-indexed from the north
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Whether the coordinates address a tile that can exist.
    pub fn is_valid(&self) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let size = 1u64 << self.z;
        u64::from(self.x) < size && u64::from(self.y) < size
    }

    /// The tile's id.
    pub fn tile_id(&self) -> TileId {
        zxy_to_tile_id(self.z, self.x, self.y)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "z={}, x={}, y={}", self.z, self.x, self.y)
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// One entry of the metadata's `vector_layers` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorLayer {
    /// Layer name as used by `source-layer` in style layers
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u8>,

    /// Attribute names mapped to their declared type
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// JSON metadata stored in an archive.
///
/// Only `vector_layers` is interpreted; every other key is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_layers: Option<Vec<VectorLayer>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArchiveMetadata {
    /// Parse metadata from a JSON value. `null` yields empty metadata.
    pub fn from_value(value: Value) -> Result<Self, ArchiveError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ArchiveError::Format(format!("invalid metadata: {}", e)))
    }

    /// The declared vector layers, or `None` when the list is missing or empty.
    pub fn vector_layers(&self) -> Option<&[VectorLayer]> {
        self.vector_layers
            .as_deref()
            .filter(|layers| !layers.is_empty())
    }

    /// The archive's `name` entry, if any.
    pub fn name(&self) -> Option<&str> {
        self.extra.get("name").and_then(Value::as_str)
    }
}

// =============================================================================
// Archive Trait
// =============================================================================

/// Random access to the tiles of one archive.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Metadata read when the archive was opened.
    fn metadata(&self) -> &ArchiveMetadata;

    /// Fetch the tile at `coord`.
    ///
    /// Returns `Ok(None)` when the archive holds no tile there.
    async fn get_tile_at(&self, coord: TileCoord) -> Result<Option<Bytes>, ArchiveError>;

    /// Identifier for logging, e.g. `s3://bucket/world.pmtiles`.
    fn identifier(&self) -> &str;
}
