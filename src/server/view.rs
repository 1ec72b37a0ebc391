//! Server-side stand-in for the renderer.
//!
//! The browser renderer reports its viewport through the events endpoint;
//! layers added by the session end up in the style served at `/style.json`.

use std::sync::{PoisonError, RwLock};

use crate::map::{LngLatBounds, MapView, StyleDocument, StyleLayer, Viewport};

/// [`MapView`] backed by the served style and the last reported viewport.
#[derive(Debug)]
pub struct ServerMapView {
    style: RwLock<StyleDocument>,
    viewport: RwLock<Viewport>,
}

impl ServerMapView {
    /// Start from `style`; the viewport covers the world at the style's zoom.
    pub fn new(style: StyleDocument) -> Self {
        let viewport = Viewport::new(LngLatBounds::world(), style.zoom);
        Self {
            style: RwLock::new(style),
            viewport: RwLock::new(viewport),
        }
    }

    /// Snapshot of the current style.
    pub fn style(&self) -> StyleDocument {
        self.style
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last reported viewport.
    pub fn viewport(&self) -> Viewport {
        *self.viewport.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the viewport reported by the renderer.
    pub fn set_viewport(&self, viewport: Viewport) {
        *self.viewport.write().unwrap_or_else(PoisonError::into_inner) = viewport;
    }
}

impl MapView for ServerMapView {
    fn bounds(&self) -> LngLatBounds {
        self.viewport().bounds
    }

    fn zoom(&self) -> f64 {
        self.viewport().zoom
    }

    fn add_layer(&self, layer: StyleLayer) {
        self.style
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_layer(layer);
    }
}
