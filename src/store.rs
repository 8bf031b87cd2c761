//! Tile cache persistence.
//!
//! Cached tiles are never evicted. Once written, a tile stays on disk until
//! somebody removes it by hand.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::tile::TileKey;

/// File extension of cached tiles.
pub const TILE_EXTENSION: &str = "pbf";

/// Key-value persistence for rendered tiles.
#[async_trait]
pub trait TileStore: Send + Sync {
    /// Whether a tile is cached for `key`. A completed [`TileStore::write`]
    /// is always visible here.
    async fn exists(&self, key: &TileKey) -> bool;

    /// Returns the exact bytes previously written for `key`, or
    /// [`Error::NotFound`].
    async fn read(&self, key: &TileKey) -> Result<Vec<u8>, Error>;

    /// Stores `blob` under `key`, replacing any previous entry.
    async fn write(&self, key: &TileKey, blob: &[u8]) -> Result<(), Error>;
}

/// A [`TileStore`] laid out as `{root}/{table}/{z}/{x}/{y}.pbf`.
#[derive(Clone, Debug)]
pub struct DiskTileStore {
    root: PathBuf,
}

impl DiskTileStore {
    /// Creates a store rooted at `root`. Directories are created lazily on write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskTileStore { root: root.into() }
    }

    /// Resolves the file holding `key`, or `None` if the table name would
    /// leave the cache root.
    pub fn tile_path(&self, key: &TileKey) -> Option<PathBuf> {
        let table = Path::new(&key.table);
        let mut components = table.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return None,
        }

        Some(
            self.root
                .join(table)
                .join(key.z.to_string())
                .join(key.x.to_string())
                .join(format!("{}.{}", key.y, TILE_EXTENSION)),
        )
    }
}

#[async_trait]
impl TileStore for DiskTileStore {
    async fn exists(&self, key: &TileKey) -> bool {
        match self.tile_path(key) {
            Some(path) => fs::try_exists(path).await.unwrap_or(false),
            None => false,
        }
    }

    async fn read(&self, key: &TileKey) -> Result<Vec<u8>, Error> {
        let path = self
            .tile_path(key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;

        match fs::read(path).await {
            Ok(blob) => Ok(blob),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::NotFound(key.clone())),
            Err(err) => Err(Error::StoreIo(err)),
        }
    }

    async fn write(&self, key: &TileKey, blob: &[u8]) -> Result<(), Error> {
        let path = self
            .tile_path(key)
            .ok_or_else(|| Error::InvalidKey(key.clone()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Concurrent writers each get their own scratch file, and the rename
        // makes the tile visible all at once.
        let scratch =
            path.with_extension(format!("{}.{}.tmp", TILE_EXTENSION, uuid::Uuid::new_v4()));
        let result = write_file(&scratch, blob).await;
        let result = match result {
            Ok(()) => fs::rename(&scratch, &path).await,
            Err(err) => Err(err),
        };

        if result.is_err() {
            let _ = fs::remove_file(&scratch).await;
        }

        result.map_err(Error::from)
    }
}

async fn write_file(path: &Path, blob: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(blob).await?;
    file.sync_all().await
}
