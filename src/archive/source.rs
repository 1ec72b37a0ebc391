//! Archive sources.
//!
//! An [`ArchiveSource`] turns a location string into an opened archive. The
//! stock [`PmTilesSource`] reads PMTiles archives from three kinds of
//! location:
//!
//! - local paths (`/data/world.pmtiles`, `file:///data/world.pmtiles`)
//! - HTTP(S) URLs (`https://example.com/world.pmtiles`)
//! - S3 objects (`s3://bucket/key.pmtiles`), including S3-compatible
//!   services through a custom endpoint
//!
//! Any location may carry the `pmtiles://` protocol prefix used in style
//! source URLs; it is stripped before dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use super::reader::{HttpRangeReader, MemoryRangeReader, RangeReader, S3RangeReader};
use super::{Archive, PmTilesArchive};
use crate::error::ArchiveError;

/// Protocol prefix accepted in front of archive locations.
pub const PROTOCOL_PREFIX: &str = "pmtiles://";

// =============================================================================
// ArchiveSource Trait
// =============================================================================

/// Opens archives from location strings.
///
/// This abstraction lets the protocol work with different storage backends
/// without being tied to one of them.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Open the archive at `location` (protocol prefix already stripped).
    async fn open(&self, location: &str) -> Result<Arc<dyn Archive>, ArchiveError>;
}

// =============================================================================
// Locations
// =============================================================================

/// Where an archive's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLocation {
    File(PathBuf),
    Http(Url),
    S3 { bucket: String, key: String },
}

impl ArchiveLocation {
    /// Parse a location, with or without the `pmtiles://` prefix.
    ///
    /// Strings without a scheme are treated as local paths.
    pub fn parse(location: &str) -> Result<Self, ArchiveError> {
        let location = strip_protocol(location);
        if location.is_empty() {
            return Err(ArchiveError::UnsupportedLocation(
                "empty archive location".to_string(),
            ));
        }

        if !location.contains("://") {
            return Ok(Self::File(PathBuf::from(location)));
        }

        let url = Url::parse(location)
            .map_err(|e| ArchiveError::UnsupportedLocation(format!("{}: {}", location, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(Self::Http(url)),
            "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| ArchiveError::UnsupportedLocation(location.to_string())),
            "s3" => {
                let bucket = url.host_str().unwrap_or_default().to_string();
                let key = url.path().trim_start_matches('/').to_string();
                if bucket.is_empty() || key.is_empty() {
                    return Err(ArchiveError::UnsupportedLocation(format!(
                        "{}: expected s3://bucket/key",
                        location
                    )));
                }
                Ok(Self::S3 { bucket, key })
            }
            other => Err(ArchiveError::UnsupportedLocation(format!(
                "{}: unknown scheme '{}'",
                location, other
            ))),
        }
    }

    /// Identifier used in logs and error messages.
    pub fn identifier(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Http(url) => url.to_string(),
            Self::S3 { bucket, key } => format!("s3://{}/{}", bucket, key),
        }
    }
}

/// Remove a leading `pmtiles://` if present.
pub(crate) fn strip_protocol(location: &str) -> &str {
    location.strip_prefix(PROTOCOL_PREFIX).unwrap_or(location)
}

// =============================================================================
// PMTiles Source
// =============================================================================

/// Opens PMTiles archives from files, HTTP(S) URLs or S3.
///
/// Remote archives are read with range requests: opening fetches the
/// header, root directory and metadata, and each tile is one more read.
/// Local files are loaded into memory once.
#[derive(Clone, Default)]
pub struct PmTilesSource {
    http: reqwest::Client,
    s3: Option<Client>,
}

impl PmTilesSource {
    /// Create a source able to read files and HTTP(S) URLs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read HTTP(S) archives with `client`.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Enable `s3://` locations using `client`.
    pub fn with_s3_client(mut self, client: Client) -> Self {
        self.s3 = Some(client);
        self
    }

    /// Create the range reader for `location`.
    pub async fn reader(&self, location: &ArchiveLocation) -> Result<Arc<dyn RangeReader>, ArchiveError> {
        match location {
            ArchiveLocation::File(path) => {
                let data = read_file(path).await?;
                Ok(Arc::new(MemoryRangeReader::new(location.identifier(), data)))
            }
            ArchiveLocation::Http(url) => {
                let reader = HttpRangeReader::new(self.http.clone(), url.clone()).await?;
                Ok(Arc::new(reader))
            }
            ArchiveLocation::S3 { bucket, key } => {
                let client = self.s3.as_ref().ok_or_else(|| {
                    ArchiveError::UnsupportedLocation(format!(
                        "s3://{}/{}: no S3 client configured",
                        bucket, key
                    ))
                })?;
                let reader = S3RangeReader::new(client.clone(), bucket.clone(), key.clone()).await?;
                Ok(Arc::new(reader))
            }
        }
    }
}

#[async_trait]
impl ArchiveSource for PmTilesSource {
    async fn open(&self, location: &str) -> Result<Arc<dyn Archive>, ArchiveError> {
        let location = ArchiveLocation::parse(location)?;

        let reader = self.reader(&location).await?;
        debug!(archive = reader.identifier(), size = reader.size(), "Reading archive");

        let archive = PmTilesArchive::open(reader).await?;
        Ok(Arc::new(archive))
    }
}

async fn read_file(path: &PathBuf) -> Result<Bytes, ArchiveError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ArchiveError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(ArchiveError::Io(format!("{}: {}", path.display(), e))),
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
