//! Map session: event wiring between the renderer and the archive.
//!
//! A [`MapSession`] reacts to the renderer's `load`, `moveend` and
//! `zoomend` events. On load it resolves the archive through the session's
//! single [`ArchiveProtocol`], adds one fill layer per vector layer and
//! installs the [`TileLoader`] shared by every later tile request. View
//! changes are logged through a throttle.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use super::style::{fill_layers, StyleLayer};
use super::viewport::{LngLatBounds, Viewport, ViewportLogger, DEFAULT_VIEWPORT_LOG_INTERVAL};
use crate::archive::{Archive, ArchiveProtocol, ArchiveSource};
use crate::error::{LoadWarning, SessionError};
use crate::tile::{LoaderConfig, TileLoader};

// =============================================================================
// Renderer Contract
// =============================================================================

/// The parts of the renderer a session drives.
pub trait MapView: Send + Sync {
    /// Currently visible bounds.
    fn bounds(&self) -> LngLatBounds;

    /// Current (fractional) zoom level.
    fn zoom(&self) -> f64;

    /// Add a layer to the rendered style.
    fn add_layer(&self, layer: StyleLayer);
}

/// Renderer events a session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapEvent {
    Load,
    MoveEnd,
    ZoomEnd,
}

impl MapEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapEvent::Load => "load",
            MapEvent::MoveEnd => "moveend",
            MapEvent::ZoomEnd => "zoomend",
        }
    }
}

impl fmt::Display for MapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The event name is not one of `load`, `moveend`, `zoomend`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown map event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for MapEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load" => Ok(MapEvent::Load),
            "moveend" => Ok(MapEvent::MoveEnd),
            "zoomend" => Ok(MapEvent::ZoomEnd),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Settings for a [`MapSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Archive location resolved on load
    pub archive_url: String,

    /// Source the generated layers draw from
    pub source_name: String,

    /// Rate limits of the tile loader
    pub loader: LoaderConfig,

    /// Minimum interval between viewport log lines
    pub viewport_log_interval: Duration,
}

impl SessionConfig {
    pub fn new(archive_url: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            archive_url: archive_url.into(),
            source_name: source_name.into(),
            loader: LoaderConfig::default(),
            viewport_log_interval: DEFAULT_VIEWPORT_LOG_INTERVAL,
        }
    }
}

/// What a load event did.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Identifier of the resolved archive
    pub archive: String,

    /// Ids of the layers added, in metadata order
    pub layers_added: Vec<String>,

    /// Non-fatal problem found while loading
    pub warning: Option<LoadWarning>,
}

/// Result of handling one event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Loaded(LoadReport),

    /// Whether the viewport line was written or throttled away
    ViewLogged(bool),
}

/// Event handlers and shared rate-limited state of one map.
pub struct MapSession<S: ArchiveSource, V: MapView> {
    config: SessionConfig,
    protocol: Arc<ArchiveProtocol<S>>,
    view: Arc<V>,
    loader: OnceLock<Arc<TileLoader>>,
    viewport_log: ViewportLogger,
}

impl<S: ArchiveSource, V: MapView> MapSession<S, V> {
    /// Create a session resolving archives through `protocol`.
    pub fn new(config: SessionConfig, protocol: Arc<ArchiveProtocol<S>>, view: Arc<V>) -> Self {
        let viewport_log = ViewportLogger::new(config.viewport_log_interval);
        Self {
            config,
            protocol,
            view,
            loader: OnceLock::new(),
            viewport_log,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn protocol(&self) -> &Arc<ArchiveProtocol<S>> {
        &self.protocol
    }

    pub fn view(&self) -> &Arc<V> {
        &self.view
    }

    /// Whether the load event has completed once.
    pub fn is_loaded(&self) -> bool {
        self.loader.get().is_some()
    }

    /// The tile loader installed by the load event.
    pub fn loader(&self) -> Result<Arc<TileLoader>, SessionError> {
        self.loader.get().cloned().ok_or(SessionError::NotLoaded)
    }

    /// The archive resolved by the load event.
    pub fn archive(&self) -> Result<Arc<dyn Archive>, SessionError> {
        self.loader
            .get()
            .map(|loader| Arc::clone(loader.archive()))
            .ok_or(SessionError::NotLoaded)
    }

    /// Dispatch a renderer event.
    pub async fn handle(&self, event: MapEvent) -> Result<EventOutcome, SessionError> {
        debug!(event = %event, "Handling map event");
        match event {
            MapEvent::Load => self.load().await.map(EventOutcome::Loaded),
            MapEvent::MoveEnd | MapEvent::ZoomEnd => {
                Ok(EventOutcome::ViewLogged(self.log_current_view()))
            }
        }
    }

    /// Handle the load event.
    ///
    /// Archive failures are returned. Missing vector layers are logged and
    /// reported as a warning; the tile loader is installed regardless.
    pub async fn load(&self) -> Result<LoadReport, SessionError> {
        let archive = match self.protocol.get(&self.config.archive_url).await {
            Ok(archive) => archive,
            Err(e) => {
                error!(archive = %self.config.archive_url, error = %e, "Failed to open archive");
                return Err(e.into());
            }
        };
        info!(
            archive = archive.identifier(),
            name = archive.metadata().name().unwrap_or_default(),
            "Archive loaded"
        );

        let layers = fill_layers(archive.metadata(), &self.config.source_name);
        let warning = if layers.is_empty() {
            let warning = LoadWarning::NoVectorLayers {
                archive: archive.identifier().to_string(),
            };
            error!("{}", warning);
            Some(warning)
        } else {
            None
        };

        let mut layers_added = Vec::with_capacity(layers.len());
        for layer in layers {
            info!("Adding layer: {}", layer.id);
            layers_added.push(layer.id.clone());
            self.view.add_layer(layer);
        }

        let config = self.config.loader;
        self.loader
            .get_or_init(|| Arc::new(TileLoader::new(Arc::clone(&archive), config)));

        Ok(LoadReport {
            archive: archive.identifier().to_string(),
            layers_added,
            warning,
        })
    }

    /// Log the renderer's current view, throttled.
    pub fn log_current_view(&self) -> bool {
        let viewport = Viewport::new(self.view.bounds(), self.view.zoom());
        self.viewport_log.log(viewport)
    }
}

impl<S: ArchiveSource, V: MapView> fmt::Debug for MapSession<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapSession")
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
