//! PostGIS query construction for single-table vector tiles.

use crate::tile::{TileBounds, TileKey, TileQuerySpec};

/// Projection every tile is served in.
pub const TILE_SRID: i32 = 3857;

/// MVT extent, in tile coordinate units.
pub const TILE_EXTENT: i32 = 4096;

/// A query ready for execution. The envelope is bound as `$1..$4`
/// (west, south, east, north), in that order.
#[derive(Clone, Debug, PartialEq)]
pub struct TileQuery {
    pub sql: String,
    pub bounds: TileBounds,
}

/// Builds the query rendering `key` as a single MVT layer named after the table.
///
/// The table name and every fragment of `spec` are interpolated verbatim.
/// Nothing is quoted or escaped, so callers must not pass untrusted input
/// unless the database role is locked down accordingly.
pub fn build_query(key: &TileKey, spec: &TileQuerySpec) -> TileQuery {
    let geom = &spec.geom_column;
    let table = &key.table;
    let envelope = format!("ST_MakeEnvelope($1, $2, $3, $4, {})", TILE_SRID);

    let mut select = format!(
        "ST_AsMVTGeom(ST_Transform({}, {}), {}, {}, 256, true) AS geom",
        geom, TILE_SRID, envelope, TILE_EXTENT
    );
    let columns = fragment(&spec.columns);
    let id_column = fragment(&spec.id_column);
    if let Some(columns) = columns {
        select.push_str(&format!(", {}", columns));
    }
    if let Some(id_column) = id_column {
        select.push_str(&format!(", {}", id_column));
    }

    // The table's native SRID comes from its first non-null geometry
    let srid_lookup = format!(
        "(SELECT ST_SRID({geom}) AS srid FROM {table} WHERE {geom} IS NOT NULL LIMIT 1) AS a"
    );

    let mut predicate = format!("ST_Intersects({}, ST_Transform({}, srid))", geom, envelope);
    if let Some(filter) = fragment(&spec.filter) {
        predicate.push_str(&format!(" AND {}", filter));
    }

    let feature_id = id_column
        .map(|id| format!(", '{}'", id))
        .unwrap_or_default();

    let sql = format!(
        "WITH mvtgeom AS (SELECT {select} FROM {table}, {srid_lookup} WHERE {predicate}) \
         SELECT ST_AsMVT(mvtgeom.*, '{table}', {extent}, 'geom'{feature_id}) AS mvt FROM mvtgeom",
        extent = TILE_EXTENT,
    );

    TileQuery {
        sql,
        bounds: key.bounds(),
    }
}

/// An optional fragment, treating a blank value (`?filter=`) as absent.
fn fragment(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
