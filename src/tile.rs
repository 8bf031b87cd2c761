use std::fmt;

use serde::Deserialize;

/// Half the side of the EPSG:3857 world square, in meters.
const WEB_MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Deepest zoom whose grid is addressable with `u32` columns and rows.
pub const MAX_ZOOM: u8 = 31;

/// Identifies one cacheable tile.
///
/// Only the table and the slippy map coordinates participate in equality.
/// The [`TileQuerySpec`] used to render a tile is deliberately not part of
/// the key, so two requests that differ only in columns or filter share
/// the same cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub table: String,
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(table: impl Into<String>, z: u8, x: u32, y: u32) -> Self {
        TileKey {
            table: table.into(),
            z,
            x,
            y,
        }
    }

    /// The EPSG:3857 envelope covered by this tile.
    pub fn bounds(&self) -> TileBounds {
        get_epsg_3857_tile_bounds(self.z, self.x, self.y)
    }

    /// Whether `x` and `y` fall inside the `2^z` by `2^z` grid of zoom `z`.
    ///
    /// Zooms above 31 are never in the grid, since their columns and rows
    /// would not fit a `u32`.
    pub fn in_grid(&self) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let size = 1u64 << self.z;
        u64::from(self.x) < size && u64::from(self.y) < size
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.table, self.z, self.x, self.y)
    }
}

/// Caller supplied parameters that shape the rendering query.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TileQuerySpec {
    #[serde(default = "default_geom_column")]
    pub geom_column: String,
    /// Raw, comma separated select list fragment.
    pub columns: Option<String>,
    pub id_column: Option<String>,
    /// Raw boolean SQL expression, ANDed into the WHERE clause.
    pub filter: Option<String>,
}

fn default_geom_column() -> String {
    String::from("geom")
}

impl Default for TileQuerySpec {
    fn default() -> Self {
        TileQuerySpec {
            geom_column: default_geom_column(),
            columns: None,
            id_column: None,
            filter: None,
        }
    }
}

/// A bounding box in EPSG:3857 meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Computes the web mercator envelope of a slippy map tile.
///
/// Matches `ST_TileEnvelope(z, x, y)` with its default bounds for tiles
/// inside the zoom level's grid (see [`TileKey::in_grid`]). Coordinates
/// outside it are not checked here and produce an envelope outside the world
/// square.
pub fn get_epsg_3857_tile_bounds(zoom: u8, x: u32, y: u32) -> TileBounds {
    let tile_span = 2.0 * WEB_MERCATOR_HALF_EXTENT / 2f64.powi(i32::from(zoom));

    let west = -WEB_MERCATOR_HALF_EXTENT + f64::from(x) * tile_span;
    let north = WEB_MERCATOR_HALF_EXTENT - f64::from(y) * tile_span;

    TileBounds {
        west,
        south: north - tile_span,
        east: west + tile_span,
        north,
    }
}
