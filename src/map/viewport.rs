//! Viewport state and throttled viewport logging.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rate::Throttle;

/// Default interval between "Current view" log lines.
pub const DEFAULT_VIEWPORT_LOG_INTERVAL: Duration = Duration::from_millis(1000);

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Visible area of the map.
///
/// Serialized the way the renderer serializes its bounds object
/// (`{"_sw": {..}, "_ne": {..}}`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    #[serde(rename = "_sw")]
    pub sw: LngLat,

    #[serde(rename = "_ne")]
    pub ne: LngLat,
}

impl LngLatBounds {
    pub fn new(sw: LngLat, ne: LngLat) -> Self {
        Self { sw, ne }
    }

    /// The whole Web Mercator world.
    pub fn world() -> Self {
        Self {
            sw: LngLat::new(-180.0, -85.051129),
            ne: LngLat::new(180.0, 85.051129),
        }
    }
}

impl Default for LngLatBounds {
    fn default() -> Self {
        Self::world()
    }
}

/// Bounds and zoom of the map at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: LngLatBounds,

    #[serde(default)]
    pub zoom: f64,
}

impl Viewport {
    pub fn new(bounds: LngLatBounds, zoom: f64) -> Self {
        Self { bounds, zoom }
    }
}

/// The "Current view" log line for `viewport`.
pub fn describe_view(viewport: &Viewport) -> String {
    let bounds = serde_json::to_string(&viewport.bounds).unwrap_or_default();
    format!(
        "Current view: zoom={}, bounds={}",
        viewport.zoom.floor(),
        bounds
    )
}

/// Logs the viewport at most once per interval.
#[derive(Debug)]
pub struct ViewportLogger {
    throttle: Throttle<Viewport>,
}

impl ViewportLogger {
    pub fn new(interval: Duration) -> Self {
        Self {
            throttle: Throttle::new(interval, |viewport: Viewport| {
                info!("{}", describe_view(&viewport));
            }),
        }
    }

    /// Log `viewport` unless a line was written within the interval.
    ///
    /// Returns whether the line was written.
    pub fn log(&self, viewport: Viewport) -> bool {
        self.throttle.invoke(viewport)
    }
}

impl Default for ViewportLogger {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWPORT_LOG_INTERVAL)
    }
}
