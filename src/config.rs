//! Configuration management for maptile-pacer.
//!
//! Every setting can be given on the command line or through an environment
//! variable with the `PACER_` prefix:
//!
//! - `PACER_HOST` - Server bind address (default: 0.0.0.0)
//! - `PACER_PORT` - Server port (default: 3000)
//! - `PACER_ARCHIVE` - Archive location (required), e.g. `pmtiles://https://host/world.pmtiles`
//! - `PACER_SOURCE_NAME` - Vector source name in the style (default: protomaps)
//! - `PACER_ATTRIBUTION` - Attribution shown for the source
//! - `PACER_GLYPHS` - Glyph URL template
//! - `PACER_CENTER_LNG` / `PACER_CENTER_LAT` / `PACER_ZOOM` - Initial camera
//! - `PACER_TILE_LOG_INTERVAL_MS` - Throttle for tile log lines (default: 1000)
//! - `PACER_VIEWPORT_LOG_INTERVAL_MS` - Throttle for viewport log lines (default: 1000)
//! - `PACER_FETCH_DEBOUNCE_MS` - Quiet period before a tile fetch (default: 100)
//! - `PACER_CACHE_ARCHIVES` - Max opened archives to cache (default: 16)
//! - `PACER_S3_ENDPOINT` / `PACER_S3_REGION` - S3 settings for `s3://` archives
//! - `PACER_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `PACER_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use maptile_pacer::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Listening on {}", config.bind_address());
//! ```

use std::time::Duration;

use clap::Parser;

use crate::archive::{ArchiveLocation, DEFAULT_ARCHIVE_CACHE_CAPACITY, MAX_ZOOM};
use crate::map::{SessionConfig, StyleConfig, DEFAULT_GLYPHS, DEFAULT_SOURCE_NAME};
use crate::tile::LoaderConfig;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default tile log throttle in milliseconds.
pub const DEFAULT_TILE_LOG_INTERVAL_MS: u64 = 1000;

/// Default viewport log throttle in milliseconds.
pub const DEFAULT_VIEWPORT_LOG_INTERVAL_MS: u64 = 1000;

/// Default fetch debounce in milliseconds.
pub const DEFAULT_FETCH_DEBOUNCE_MS: u64 = 100;

// =============================================================================
// CLI Arguments
// =============================================================================

/// maptile-pacer - Rate-limited vector tile serving from PMTiles archives.
///
/// Serves a style document and the tiles of one archive to a map renderer,
/// throttling log output and debouncing tile fetches.
#[derive(Parser, Debug, Clone)]
#[command(name = "maptile-pacer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PACER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PACER_PORT")]
    pub port: u16,

    // =========================================================================
    // Archive Configuration
    // =========================================================================
    /// Archive location: local path, http(s):// URL or s3://bucket/key.
    ///
    /// A leading `pmtiles://` is accepted and ignored.
    #[arg(long, env = "PACER_ARCHIVE")]
    pub archive: String,

    /// Maximum number of opened archives kept in memory.
    #[arg(long, default_value_t = DEFAULT_ARCHIVE_CACHE_CAPACITY, env = "PACER_CACHE_ARCHIVES")]
    pub cache_archives: usize,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "PACER_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "PACER_S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Style Configuration
    // =========================================================================
    /// Name of the vector source in the style.
    #[arg(long, default_value = DEFAULT_SOURCE_NAME, env = "PACER_SOURCE_NAME")]
    pub source_name: String,

    /// Attribution text for the vector source.
    #[arg(long, env = "PACER_ATTRIBUTION")]
    pub attribution: Option<String>,

    /// Glyph URL template.
    #[arg(long, default_value = DEFAULT_GLYPHS, env = "PACER_GLYPHS")]
    pub glyphs: String,

    /// Initial map center longitude.
    #[arg(long, default_value_t = 0.0, env = "PACER_CENTER_LNG", allow_hyphen_values = true)]
    pub center_lng: f64,

    /// Initial map center latitude.
    #[arg(long, default_value_t = 0.0, env = "PACER_CENTER_LAT", allow_hyphen_values = true)]
    pub center_lat: f64,

    /// Initial zoom level.
    #[arg(long, default_value_t = 0.0, env = "PACER_ZOOM")]
    pub zoom: f64,

    // =========================================================================
    // Rate Limits
    // =========================================================================
    /// Minimum milliseconds between "Loading tile" log lines.
    #[arg(long, default_value_t = DEFAULT_TILE_LOG_INTERVAL_MS, env = "PACER_TILE_LOG_INTERVAL_MS")]
    pub tile_log_interval_ms: u64,

    /// Minimum milliseconds between "Current view" log lines.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_LOG_INTERVAL_MS, env = "PACER_VIEWPORT_LOG_INTERVAL_MS")]
    pub viewport_log_interval_ms: u64,

    /// Quiet period in milliseconds before a tile fetch is issued.
    #[arg(long, default_value_t = DEFAULT_FETCH_DEBOUNCE_MS, env = "PACER_FETCH_DEBOUNCE_MS")]
    pub fetch_debounce_ms: u64,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "PACER_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PACER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.archive.trim().is_empty() {
            return Err("Archive location is required. Set --archive or PACER_ARCHIVE".to_string());
        }
        ArchiveLocation::parse(&self.archive).map_err(|e| e.to_string())?;

        if self.source_name.trim().is_empty() {
            return Err("source_name must not be empty".to_string());
        }

        if self.cache_archives == 0 {
            return Err("cache_archives must be greater than 0".to_string());
        }

        if !(-180.0..=180.0).contains(&self.center_lng) {
            return Err("center_lng must be between -180 and 180".to_string());
        }
        if !(-90.0..=90.0).contains(&self.center_lat) {
            return Err("center_lat must be between -90 and 90".to_string());
        }
        if !(0.0..=f64::from(MAX_ZOOM)).contains(&self.zoom) {
            return Err(format!("zoom must be between 0 and {}", MAX_ZOOM));
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the archive lives in S3 and needs an S3 client.
    pub fn needs_s3(&self) -> bool {
        matches!(
            ArchiveLocation::parse(&self.archive),
            Ok(ArchiveLocation::S3 { .. })
        )
    }

    /// Rate limits for the tile loader.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            log_interval: Duration::from_millis(self.tile_log_interval_ms),
            fetch_debounce: Duration::from_millis(self.fetch_debounce_ms),
        }
    }

    /// Settings for the map session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            archive_url: self.archive.clone(),
            source_name: self.source_name.clone(),
            loader: self.loader_config(),
            viewport_log_interval: Duration::from_millis(self.viewport_log_interval_ms),
        }
    }

    /// Inputs for the style document.
    pub fn style_config(&self) -> StyleConfig {
        StyleConfig {
            source_name: self.source_name.clone(),
            archive_url: self.archive.clone(),
            attribution: self.attribution.clone(),
            glyphs: self.glyphs.clone(),
            center: [self.center_lng, self.center_lat],
            zoom: self.zoom,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
