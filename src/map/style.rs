//! Style document handed to the renderer.
//!
//! Mirrors the subset of the renderer's style specification this crate
//! produces: one vector source backed by the archive, glyphs, the initial
//! camera, and the layers added once the archive metadata is known.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::archive::{ArchiveMetadata, PROTOCOL_PREFIX};

/// Style specification version understood by the renderer.
pub const STYLE_VERSION: u8 = 8;

/// Default name of the vector source.
pub const DEFAULT_SOURCE_NAME: &str = "protomaps";

/// Default glyph URL template.
pub const DEFAULT_GLYPHS: &str = "https://cdn.protomaps.com/fonts/pbf/{fontstack}/{range}.pbf";

/// Fill color of layers generated from archive metadata.
pub const FILL_COLOR: &str = "#888888";

/// Fill opacity of layers generated from archive metadata.
pub const FILL_OPACITY: f64 = 0.5;

/// Inputs for building a [`StyleDocument`].
#[derive(Debug, Clone, PartialEq)]
pub struct StyleConfig {
    /// Name the vector source is registered under
    pub source_name: String,

    /// Archive location, with or without the `pmtiles://` prefix
    pub archive_url: String,

    pub attribution: Option<String>,

    /// Glyph URL template (`{fontstack}` and `{range}` placeholders)
    pub glyphs: String,

    /// Initial map center as `[lng, lat]`
    pub center: [f64; 2],

    /// Initial zoom level
    pub zoom: f64,
}

impl StyleConfig {
    /// Config for `archive_url` with default source name, glyphs and camera.
    pub fn new(archive_url: impl Into<String>) -> Self {
        Self {
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            archive_url: archive_url.into(),
            attribution: None,
            glyphs: DEFAULT_GLYPHS.to_string(),
            center: [0.0, 0.0],
            zoom: 0.0,
        }
    }

    /// Source URL in the form the renderer routes through the protocol.
    pub fn source_url(&self) -> String {
        if self.archive_url.starts_with(PROTOCOL_PREFIX) {
            self.archive_url.clone()
        } else {
            format!("{}{}", PROTOCOL_PREFIX, self.archive_url)
        }
    }
}

/// A source entry of the style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    #[serde(rename = "type")]
    pub kind: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

/// A layer entry of the style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleLayer {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub source: String,

    #[serde(
        rename = "source-layer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_layer: Option<String>,

    #[serde(default)]
    pub layout: Map<String, Value>,

    #[serde(default)]
    pub paint: Map<String, Value>,
}

impl StyleLayer {
    /// Semi-transparent grey fill drawing `source_layer` of `source`.
    pub fn fill(source_layer: &str, source: &str) -> Self {
        let mut paint = Map::new();
        paint.insert("fill-color".to_string(), json!(FILL_COLOR));
        paint.insert("fill-opacity".to_string(), json!(FILL_OPACITY));

        Self {
            id: source_layer.to_string(),
            kind: "fill".to_string(),
            source: source.to_string(),
            source_layer: Some(source_layer.to_string()),
            layout: Map::new(),
            paint,
        }
    }
}

/// One fill layer per vector layer declared in `metadata`.
///
/// Empty when the metadata declares no vector layers.
pub fn fill_layers(metadata: &ArchiveMetadata, source: &str) -> Vec<StyleLayer> {
    metadata
        .vector_layers()
        .unwrap_or_default()
        .iter()
        .map(|layer| StyleLayer::fill(&layer.id, source))
        .collect()
}

/// The complete style document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDocument {
    pub version: u8,
    pub glyphs: String,
    pub sources: BTreeMap<String, SourceSpec>,
    pub layers: Vec<StyleLayer>,
    pub center: [f64; 2],
    pub zoom: f64,
}

impl StyleDocument {
    /// Style with the archive's vector source and no layers.
    pub fn new(config: &StyleConfig) -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            config.source_name.clone(),
            SourceSpec {
                kind: "vector".to_string(),
                url: config.source_url(),
                attribution: config.attribution.clone(),
            },
        );

        Self {
            version: STYLE_VERSION,
            glyphs: config.glyphs.clone(),
            sources,
            layers: Vec::new(),
            center: config.center,
            zoom: config.zoom,
        }
    }

    /// Add `layer`, replacing any layer with the same id.
    ///
    /// Returns `false` when an existing layer was replaced.
    pub fn add_layer(&mut self, layer: StyleLayer) -> bool {
        match self.layers.iter_mut().find(|existing| existing.id == layer.id) {
            Some(existing) => {
                *existing = layer;
                false
            }
            None => {
                self.layers.push(layer);
                true
            }
        }
    }

    /// Look up a layer by id.
    pub fn layer(&self, id: &str) -> Option<&StyleLayer> {
        self.layers.iter().find(|layer| layer.id == id)
    }
}
