//! PMTiles-backed archive.
//!
//! Header and directory decoding is left to `pmtiles2`; this adapter reads
//! every part of the archive through a [`RangeReader`], so remote archives
//! are never downloaded whole. Opening costs three reads (header, root
//! directory, metadata). A tile costs one read for its payload plus one per
//! leaf directory not yet cached.
//!
//! Gzip tile payloads are inflated so callers always receive raw bytes.

use std::io::Read;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use lru::LruCache;
use pmtiles2::{Compression, Directory, Entry, Header};
use tracing::debug;

use super::reader::{MemoryRangeReader, RangeReader};
use super::{Archive, ArchiveMetadata, TileCoord, TileId};
use crate::error::ArchiveError;

/// Size of the fixed PMTiles v3 header.
pub const HEADER_LEN: usize = 127;

/// Root plus at most three levels of leaf directories.
const MAX_DIRECTORY_DEPTH: usize = 4;

/// Leaf directories kept in memory per archive.
const LEAF_CACHE_CAPACITY: usize = 64;

/// How tile payloads are stored in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCompression {
    Identity,
    Gzip,
}

/// Where a directory lookup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Tile { offset: u64, length: u32 },
    Leaf { offset: u64, length: u32 },
}

/// Find the entry covering `tile_id`: the last entry starting at or before
/// it, either a leaf pointer or a run that still contains the id.
fn find_entry(directory: &Directory, tile_id: TileId) -> Option<Lookup> {
    let entries: &[Entry] = &directory[..];
    let idx = entries.partition_point(|entry| entry.tile_id <= tile_id);
    let entry = entries.get(idx.checked_sub(1)?)?;

    if entry.is_leaf_dir_entry() {
        Some(Lookup::Leaf {
            offset: entry.offset,
            length: entry.length,
        })
    } else if tile_id - entry.tile_id < u64::from(entry.run_length) {
        Some(Lookup::Tile {
            offset: entry.offset,
            length: entry.length,
        })
    } else {
        None
    }
}

/// A PMTiles archive read on demand.
pub struct PmTilesArchive {
    reader: Arc<dyn RangeReader>,
    metadata: ArchiveMetadata,
    compression: TileCompression,
    internal_compression: Compression,
    root: Arc<Directory>,
    leaf_directories_offset: u64,
    tile_data_offset: u64,
    leaves: Mutex<LruCache<u64, Arc<Directory>>>,
}

impl PmTilesArchive {
    /// Open the archive behind `reader`.
    ///
    /// Fails when the header or directories are malformed, the metadata is
    /// not a JSON object, or tiles use a compression other than gzip/none.
    pub async fn open(reader: Arc<dyn RangeReader>) -> Result<Self, ArchiveError> {
        let identifier = reader.identifier().to_string();
        let format_err = |e: std::io::Error| ArchiveError::Format(format!("{}: {}", identifier, e));

        if reader.size() < HEADER_LEN as u64 {
            return Err(ArchiveError::Format(format!(
                "{}: {} bytes is too small for a PMTiles header",
                identifier,
                reader.size()
            )));
        }
        let header_bytes = reader.read_exact_at(0, HEADER_LEN).await?;
        let header = Header::from_bytes(&header_bytes).map_err(format_err)?;

        let compression = match header.tile_compression {
            Compression::GZip => TileCompression::Gzip,
            Compression::None => TileCompression::Identity,
            other => {
                return Err(ArchiveError::UnsupportedCompression(format!("{:?}", other)));
            }
        };
        let internal_compression = header.internal_compression;

        let root_bytes = reader
            .read_exact_at(
                header.root_directory_offset,
                to_len(header.root_directory_length, &identifier)?,
            )
            .await?;
        let root = Directory::from_bytes(&root_bytes, internal_compression).map_err(format_err)?;

        let metadata = if header.json_metadata_length == 0 {
            ArchiveMetadata::default()
        } else {
            let raw = reader
                .read_exact_at(
                    header.json_metadata_offset,
                    to_len(header.json_metadata_length, &identifier)?,
                )
                .await?;
            let json = pmtiles2::util::decompress_all(internal_compression, &raw).map_err(format_err)?;
            let value: serde_json::Value = serde_json::from_slice(&json)
                .map_err(|e| ArchiveError::Format(format!("{}: invalid metadata: {}", identifier, e)))?;
            if !value.is_object() {
                return Err(ArchiveError::Format(format!(
                    "{}: metadata must be a JSON object",
                    identifier
                )));
            }
            ArchiveMetadata::from_value(value)?
        };

        debug!(
            archive = %identifier,
            size = reader.size(),
            root_entries = root.len(),
            "Opened PMTiles archive"
        );

        let capacity = NonZeroUsize::new(LEAF_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            reader,
            metadata,
            compression,
            internal_compression,
            root: Arc::new(root),
            leaf_directories_offset: header.leaf_directories_offset,
            tile_data_offset: header.tile_data_offset,
            leaves: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Open an archive whose full contents are already in memory.
    pub async fn from_bytes(identifier: impl Into<String>, data: Bytes) -> Result<Self, ArchiveError> {
        Self::open(Arc::new(MemoryRangeReader::new(identifier, data))).await
    }

    /// Tile payload compression declared in the header.
    pub fn compression(&self) -> TileCompression {
        self.compression
    }

    /// The reader the archive is served from.
    pub fn reader(&self) -> &Arc<dyn RangeReader> {
        &self.reader
    }

    async fn leaf(&self, offset: u64, length: u32) -> Result<Arc<Directory>, ArchiveError> {
        {
            let mut leaves = self.leaves.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(directory) = leaves.get(&offset) {
                return Ok(Arc::clone(directory));
            }
        }

        let bytes = self
            .reader
            .read_exact_at(self.leaf_directories_offset + offset, length as usize)
            .await?;
        let directory = Directory::from_bytes(&bytes, self.internal_compression)
            .map(Arc::new)
            .map_err(|e| ArchiveError::Format(format!("{}: leaf directory: {}", self.identifier(), e)))?;

        let mut leaves = self.leaves.lock().unwrap_or_else(PoisonError::into_inner);
        leaves.put(offset, Arc::clone(&directory));
        Ok(directory)
    }

    fn inflate(&self, data: Bytes) -> Result<Bytes, ArchiveError> {
        match self.compression {
            TileCompression::Identity => Ok(data),
            TileCompression::Gzip => {
                let mut decoder = GzDecoder::new(&data[..]);
                let mut inflated = Vec::new();
                decoder.read_to_end(&mut inflated).map_err(|e| {
                    ArchiveError::Format(format!("{}: corrupt gzip tile: {}", self.identifier(), e))
                })?;
                Ok(Bytes::from(inflated))
            }
        }
    }
}

fn to_len(length: u64, identifier: &str) -> Result<usize, ArchiveError> {
    usize::try_from(length)
        .map_err(|_| ArchiveError::Format(format!("{}: section of {} bytes", identifier, length)))
}

#[async_trait]
impl Archive for PmTilesArchive {
    fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    async fn get_tile_at(&self, coord: TileCoord) -> Result<Option<Bytes>, ArchiveError> {
        let tile_id = coord.tile_id();
        let mut directory = Arc::clone(&self.root);

        for _ in 0..MAX_DIRECTORY_DEPTH {
            match find_entry(&directory, tile_id) {
                None => return Ok(None),
                Some(Lookup::Tile { offset, length }) => {
                    let data = self
                        .reader
                        .read_exact_at(self.tile_data_offset + offset, length as usize)
                        .await?;
                    return self.inflate(data).map(Some);
                }
                Some(Lookup::Leaf { offset, length }) => {
                    directory = self.leaf(offset, length).await?;
                }
            }
        }

        Err(ArchiveError::Format(format!(
            "{} ({}): directories nested deeper than {} levels",
            self.identifier(),
            coord,
            MAX_DIRECTORY_DEPTH
        )))
    }

    fn identifier(&self) -> &str {
        self.reader.identifier()
    }
}
