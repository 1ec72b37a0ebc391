use thiserror::Error;

use crate::archive::TileId;

/// Errors raised while opening or reading a tile archive.
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    /// The archive (file, object or URL) does not exist
    #[error("Archive not found: {0}")]
    NotFound(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// HTTP transport or status error
    #[error("HTTP error: {0}")]
    Http(String),

    /// The archive bytes could not be parsed
    #[error("Invalid archive: {0}")]
    Format(String),

    /// Tile payloads use a compression scheme we cannot inflate
    #[error("Unsupported tile compression: {0}")]
    UnsupportedCompression(String),

    /// The archive location uses an unknown scheme or is malformed
    #[error("Unsupported archive location: {0}")]
    UnsupportedLocation(String),

    /// Requested range exceeds the archive's bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

/// Errors delivered to the renderer's tile callback.
#[derive(Debug, Clone, Error)]
pub enum TileLoadError {
    /// The coordinates cannot address a tile (`z > 30` or `x`/`y` outside `0..2^z`)
    #[error("Invalid tile: z={z}, x={x}, y={y}")]
    InvalidTile { z: u8, x: u32, y: u32 },

    /// The archive has no data for this tile
    #[error("Tile not found: z={z}, x={x}, y={y}, tileId={tile_id}")]
    NotFound { z: u8, x: u32, y: u32, tile_id: TileId },

    /// The archive failed while fetching the tile
    #[error("Error loading tile z={z}, x={x}, y={y}, tileId={tile_id}: {source}")]
    Fetch {
        z: u8,
        x: u32,
        y: u32,
        tile_id: TileId,
        #[source]
        source: ArchiveError,
    },

    /// The scheduled fetch never completed (runtime shutdown or task panic)
    #[error("Tile load interrupted: z={z}, x={x}, y={y}, tileId={tile_id}")]
    Interrupted { z: u8, x: u32, y: u32, tile_id: TileId },
}

/// Non-fatal problems found by the load event.
#[derive(Debug, Clone, Error)]
pub enum LoadWarning {
    /// The archive metadata carries no `vector_layers`
    #[error("No vector layers found in the archive metadata: {archive}")]
    NoVectorLayers { archive: String },
}

/// Errors raised while wiring a map session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The archive could not be resolved
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A tile or metadata request arrived before the load event
    #[error("Map session has not been loaded yet")]
    NotLoaded,
}
