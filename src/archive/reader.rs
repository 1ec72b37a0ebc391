//! Byte-range access to archive storage.
//!
//! A [`RangeReader`] reads slices of a remote or local resource without
//! fetching the whole of it. Remote archives are read through
//! [`HttpRangeReader`] (`Range` headers) or [`S3RangeReader`]
//! (`GetObject` with a range); local files are loaded once into a
//! [`MemoryRangeReader`].

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use url::Url;

use crate::error::ArchiveError;

/// Reads byte ranges from an archive's storage.
///
/// Implementations must be thread-safe; one reader is shared by every
/// request served from its archive.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, ArchiveError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Identifier for logging, e.g. `s3://bucket/world.pmtiles`.
    fn identifier(&self) -> &str;
}

/// Reject ranges that run past `size`.
fn check_range(offset: u64, len: usize, size: u64) -> Result<(), ArchiveError> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(ArchiveError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}

/// Inclusive HTTP range header value for `len > 0` bytes at `offset`.
fn range_header(offset: u64, len: usize) -> String {
    format!("bytes={}-{}", offset, offset + len as u64 - 1)
}

// =============================================================================
// In-memory
// =============================================================================

/// Range reader over bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    pub fn new(identifier: impl Into<String>, data: Bytes) -> Self {
        Self {
            data,
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, ArchiveError> {
        check_range(offset, len, self.size())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// HTTP(S)
// =============================================================================

/// Range reader for archives served over HTTP(S).
///
/// The size is fetched once on creation via HEAD; every read is a `GET`
/// with a `Range` header.
#[derive(Debug, Clone)]
pub struct HttpRangeReader {
    client: reqwest::Client,
    url: Url,
    size: u64,
    identifier: String,
}

impl HttpRangeReader {
    /// Create a reader for `url`.
    ///
    /// Fails with `NotFound` on a 404 and with `Http` when the server does
    /// not report a content length.
    pub async fn new(client: reqwest::Client, url: Url) -> Result<Self, ArchiveError> {
        let response = client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| ArchiveError::Http(format!("{}: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ArchiveError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(ArchiveError::Http(format!(
                "{}: status {}",
                url,
                response.status()
            )));
        }

        // reqwest reports no body length for HEAD, so read the header itself
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| ArchiveError::Http(format!("{}: missing Content-Length", url)))?;

        let identifier = url.to_string();
        Ok(Self {
            client,
            url,
            size,
            identifier,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RangeReader for HttpRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, ArchiveError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let response = self
            .client
            .get(self.url.clone())
            .header(RANGE, range_header(offset, len))
            .send()
            .await
            .map_err(|e| ArchiveError::Http(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Http(format!("{}: status {}", self.url, status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ArchiveError::Http(format!("{}: {}", self.url, e)))?;

        // A server ignoring the range answers 200 with the whole resource
        let data = if status == StatusCode::PARTIAL_CONTENT {
            body
        } else {
            let start = offset as usize;
            if body.len() < start + len {
                return Err(ArchiveError::Http(format!(
                    "{}: short response ({} bytes)",
                    self.url,
                    body.len()
                )));
            }
            body.slice(start..start + len)
        };

        if data.len() != len {
            return Err(ArchiveError::Http(format!(
                "{}: expected {} bytes at offset {}, got {}",
                self.url,
                len,
                offset,
                data.len()
            )));
        }
        Ok(data)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// S3
// =============================================================================

/// Range reader for objects in S3 or S3-compatible storage.
///
/// The object size is fetched once on creation via HEAD.
#[derive(Debug, Clone)]
pub struct S3RangeReader {
    client: Client,
    bucket: String,
    key: String,
    size: u64,
    identifier: String,
}

impl S3RangeReader {
    /// Create a reader for `s3://bucket/key`.
    ///
    /// Returns `NotFound` if the object does not exist.
    pub async fn new(client: Client, bucket: String, key: String) -> Result<Self, ArchiveError> {
        let identifier = format!("s3://{}/{}", bucket, key);

        let head = client
            .head_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);

                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    return ArchiveError::NotFound(identifier.clone());
                }

                ArchiveError::S3(e.to_string())
            })?;

        let size = head.content_length().unwrap_or(0).max(0) as u64;

        Ok(Self {
            client,
            bucket,
            key,
            size,
            identifier,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl RangeReader for S3RangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, ArchiveError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(range_header(offset, len))
            .send()
            .await
            .map_err(|e| ArchiveError::S3(e.to_string()))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| ArchiveError::S3(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
