//! HTTP server layer for maptile-pacer.
//!
//! The browser renderer fetches the style and tiles from this server and
//! reports its events back, so the session and tile loader run here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   GET /style.json   GET /tiles/{z}/{x}/{y}   POST /events/{e}   │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌────────────────────┐  │
//! │  │  handlers   │  │  ServerMapView   │  │      routes        │  │
//! │  │ (requests)  │  │ (style+viewport) │  │  (router config)   │  │
//! │  └─────────────┘  └──────────────────┘  └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;
pub mod view;

pub use handlers::{
    event_handler, health_handler, metadata_handler, style_handler, tile_handler, ApiError,
    AppState, ErrorResponse, HealthResponse, TilePathParams, MVT_CONTENT_TYPE, TILE_ID_HEADER,
};
pub use routes::{create_router, RouterConfig};
pub use view::ServerMapView;
