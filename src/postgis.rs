//! PostGIS tile rendering over a sqlx connection pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, PgPool, Row};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::query::TileQuery;
use crate::TileSource;

/// Renders tiles by running [`TileQuery`]s against a PostGIS database.
#[derive(Clone, Debug)]
pub struct PostgisSource {
    pool: PgPool,
}

impl PostgisSource {
    pub fn new(pool: PgPool) -> Self {
        PostgisSource { pool }
    }

    /// Builds a connection pool from `config`.
    ///
    /// Connections are opened on first use, so a database that is down at
    /// startup surfaces as a per-request error rather than a startup failure.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&config.url)?;

        Ok(PostgisSource { pool })
    }
}

#[async_trait]
impl TileSource for PostgisSource {
    async fn render_mvt(&self, tile_query: &TileQuery) -> Result<Vec<u8>, sqlx::Error> {
        let bounds = tile_query.bounds;

        // The pool hands the connection back once the row is fetched, or
        // when this future is dropped.
        let row = query(&tile_query.sql)
            .bind(bounds.west)
            .bind(bounds.south)
            .bind(bounds.east)
            .bind(bounds.north)
            .fetch_one(&self.pool)
            .await?;

        let raw_tile: Option<Vec<u8>> = row.try_get("mvt")?;
        let raw_tile = raw_tile.unwrap_or_default();
        debug!(bytes = raw_tile.len(), "rendered tile");

        Ok(raw_tile)
    }
}
