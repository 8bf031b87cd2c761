use crate::tile::TileKey;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No cached tile for {0}.")]
    NotFound(TileKey),
    #[error("Tile {0} cannot be addressed in the cache directory.")]
    InvalidKey(TileKey),
    #[error("Tile {0} is outside the tile grid.")]
    OutOfGrid(TileKey),
    #[error("Tile cache I/O failed: {0}")]
    StoreIo(#[from] std::io::Error),
    #[error(transparent)]
    DataSource(#[from] sqlx::Error),
    #[error("Invalid YAML in configuration file.")]
    Config(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("HTTP server failed: {0}")]
    Server(#[source] std::io::Error),
}
