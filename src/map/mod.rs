//! Map-level wiring: the style handed to the renderer, viewport tracking
//! and the session reacting to renderer events.

mod session;
mod style;
mod viewport;

pub use session::{
    EventOutcome, LoadReport, MapEvent, MapSession, MapView, SessionConfig, UnknownEvent,
};
pub use style::{
    fill_layers, SourceSpec, StyleConfig, StyleDocument, StyleLayer, DEFAULT_GLYPHS,
    DEFAULT_SOURCE_NAME, FILL_COLOR, FILL_OPACITY, STYLE_VERSION,
};
pub use viewport::{
    describe_view, LngLat, LngLatBounds, Viewport, ViewportLogger, DEFAULT_VIEWPORT_LOG_INTERVAL,
};
