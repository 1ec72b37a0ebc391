//! Tile loading for the renderer.
//!
//! The renderer hands each tile request to a [`TileLoader`], which logs it
//! through a shared throttle and fetches its bytes from the archive through
//! a shared, per-tile debounce.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Renderer / HTTP Handler        │
//! └────────────────────┬────────────────────┘
//!                      │ load(tile)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileLoader                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │   Throttle   │  │    Debouncer    │  │
//! │  │  (log line)  │  │  (keyed by id)  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ get_tile_at(z, x, y)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │                 Archive                 │
//! └─────────────────────────────────────────┘
//! ```

mod loader;

pub use loader::{
    LoaderConfig, TileLoader, TileTarget, DEFAULT_FETCH_DEBOUNCE, DEFAULT_TILE_LOG_INTERVAL,
};
