//! # Tile Keeper
//!
//! A disk-cached Mapbox Vector Tile server for PostGIS tables.
//!
//! ## Current features
//!
//! Given a PostGIS database, any table with a geometry column can be served
//! as MVT at `/v1/mvt/{table}/{z}/{x}/{y}`. Each tile is rendered with
//! `ST_AsMVT` the first time it is requested and written to a cache directory.
//! Later requests for the same tile are answered straight from disk.
//!
//! ## Known Limitations
//!
//! The cache key is only the table and tile coordinates. Query parameters like
//! `columns` or `filter` shape the rendered tile but not where it is cached, so
//! the first request for a tile decides what every later request gets. Cached
//! tiles are never evicted or refreshed; delete them from the cache directory
//! when the underlying data changes.
//!
//! Query parameters are interpolated into SQL as-is. Only expose this server to
//! trusted clients, or connect with a read-only role limited to the tables you
//! want to publish.
//!
//! Empty tiles are not cached and are re-rendered on every request. Concurrent
//! requests for the same uncached tile each run their own query.

#![deny(warnings)]

use async_trait::async_trait;

pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod postgis;
pub mod query;
pub mod store;
pub mod telemetry;
pub mod tile;

pub use coordinator::{TileCoordinator, TileOutcome};
pub use error::Error;
pub use postgis::PostgisSource;
pub use query::{build_query, TileQuery};
pub use store::{DiskTileStore, TileStore};
pub use tile::{get_epsg_3857_tile_bounds, TileBounds, TileKey, TileQuerySpec};

/// A backend able to render a Mapbox vector tile from a prepared query.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Executes `query` and returns the encoded tile, which may be empty.
    async fn render_mvt(&self, query: &TileQuery) -> Result<Vec<u8>, sqlx::Error>;
}
