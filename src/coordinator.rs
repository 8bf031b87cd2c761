//! Cache-or-render decision for a single tile request.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::Error;
use crate::query::build_query;
use crate::store::TileStore;
use crate::tile::{TileKey, TileQuerySpec};
use crate::TileSource;

/// What a tile request resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileOutcome {
    /// Served from the tile cache.
    Cached(Vec<u8>),
    /// Freshly rendered by the source.
    Fetched(Vec<u8>),
    /// The tile has no features. Empty tiles are never cached.
    Empty,
}

impl TileOutcome {
    /// The tile bytes. Empty for [`TileOutcome::Empty`].
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            TileOutcome::Cached(blob) | TileOutcome::Fetched(blob) => blob,
            TileOutcome::Empty => Vec::new(),
        }
    }
}

/// Serves tiles from a [`TileStore`], rendering misses with a [`TileSource`].
///
/// There is no locking or request coalescing. Concurrent requests for the
/// same uncached tile each render it and each write it back; the store keeps
/// whichever write lands last.
#[derive(Clone)]
pub struct TileCoordinator {
    store: Arc<dyn TileStore>,
    source: Arc<dyn TileSource>,
}

impl TileCoordinator {
    pub fn new(store: Arc<dyn TileStore>, source: Arc<dyn TileSource>) -> Self {
        TileCoordinator { store, source }
    }

    /// Returns the tile for `key`, rendering and caching it on a miss.
    ///
    /// Keys outside the zoom level's grid fail with [`Error::OutOfGrid`]
    /// before the cache or the source is consulted. Source errors are
    /// returned untouched. Failing to cache a rendered tile is logged and
    /// otherwise ignored.
    #[instrument(skip_all, fields(tile = %key))]
    pub async fn fetch(&self, key: &TileKey, spec: &TileQuerySpec) -> Result<TileOutcome, Error> {
        if !key.in_grid() {
            return Err(Error::OutOfGrid(key.clone()));
        }

        if self.store.exists(key).await {
            let blob = self.store.read(key).await?;
            debug!(bytes = blob.len(), "cache hit");
            return Ok(TileOutcome::Cached(blob));
        }

        debug!("cache miss");
        let query = build_query(key, spec);
        let blob = self.source.render_mvt(&query).await?;

        if blob.is_empty() {
            debug!("empty tile");
            return Ok(TileOutcome::Empty);
        }

        if let Err(err) = self.store.write(key, &blob).await {
            warn!(error = %err, "unable to cache tile");
        }

        Ok(TileOutcome::Fetched(blob))
    }
}
