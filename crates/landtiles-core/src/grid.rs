//! State tile grids and the derivation of candidate tiles from an AOI.
//!
//! ## Grid Convention
//!
//! Every state publishes its rasters as square tiles on a regular grid in its
//! UTM zone. A grid is described by its tile size and origin:
//!
//! - `col = floor((x - origin_x) / tile_size)`
//! - `row = floor((y - origin_y) / tile_size)`
//!
//! Tiles are named after the kilometre coordinates of their lower-left
//! corner, e.g. `32_350_5600` for the tile starting at E 350000, N 5600000 in
//! zone 32.

use crate::aoi::AreaOfInterest;
use crate::crs::Crs;
use crate::{CoreError, DataType, Result, StateCode, TileIndex};
use geo::{Area, BoundingRect, Coord, Intersects, MultiPolygon, Rect, Relate};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Native tile keys: zone, kilometre easting and kilometre northing, with or
/// without `_`/`-` separators, possibly embedded in a longer file name.
fn tile_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])(3[23])[_-]?([0-9]{3})[_-]?([0-9]{4})(?:[^0-9]|$)")
            .expect("tile key pattern is valid")
    })
}

/// Tile grid of one state and data type.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGridSpec {
    /// State publishing the grid.
    pub state: StateCode,
    /// Product type the grid applies to.
    pub data_type: DataType,
    /// Edge length of a tile in meters.
    pub tile_size: f64,
    /// Easting of the grid origin.
    pub origin_x: f64,
    /// Northing of the grid origin.
    pub origin_y: f64,
    /// UTM zone of the grid (32 or 33).
    pub utm_zone: u8,
    /// Optional coverage of the grid as (min_x, min_y, max_x, max_y).
    pub extent: Option<Rect<f64>>,
}

impl TileGridSpec {
    /// Create a grid, validating the tile size and zone.
    pub fn new(
        state: StateCode,
        data_type: DataType,
        tile_size: f64,
        origin_x: f64,
        origin_y: f64,
        utm_zone: u8,
    ) -> Result<Self> {
        if !(tile_size.is_finite() && tile_size > 0.0) {
            return Err(CoreError::InvalidTileSize(tile_size));
        }
        if utm_zone != 32 && utm_zone != 33 {
            return Err(CoreError::UnsupportedZone(utm_zone));
        }
        if !(origin_x.is_finite() && origin_y.is_finite()) {
            return Err(CoreError::InvalidConfig(format!(
                "grid origin of {state} {data_type} is not finite"
            )));
        }
        // Tile names carry kilometre corners, so every corner must be one
        let whole_km = |v: f64| (v / 1000.0 - (v / 1000.0).round()).abs() < 1e-9;
        if !(whole_km(tile_size) && whole_km(origin_x) && whole_km(origin_y)) {
            return Err(CoreError::InvalidConfig(format!(
                "grid of {state} {data_type} (tile size {tile_size}, origin {origin_x}/{origin_y}) \
                 does not align to whole kilometres"
            )));
        }
        Ok(Self {
            state,
            data_type,
            tile_size,
            origin_x,
            origin_y,
            utm_zone,
            extent: None,
        })
    }

    /// Restrict the grid to a coverage rectangle.
    pub fn with_extent(mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        self.extent = Some(Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        ));
        self
    }

    /// Coordinate reference system of the grid.
    pub fn crs(&self) -> Crs {
        Crs::Utm(self.utm_zone)
    }

    /// Grid cell containing a point.
    pub fn cell_of(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((x - self.origin_x) / self.tile_size).floor() as i64,
            ((y - self.origin_y) / self.tile_size).floor() as i64,
        )
    }

    /// Footprint of a cell.
    pub fn footprint(&self, col: i64, row: i64) -> Rect<f64> {
        let min_x = self.origin_x + col as f64 * self.tile_size;
        let min_y = self.origin_y + row as f64 * self.tile_size;
        Rect::new(
            Coord { x: min_x, y: min_y },
            Coord {
                x: min_x + self.tile_size,
                y: min_y + self.tile_size,
            },
        )
    }

    /// Tile index of a cell.
    pub fn index(&self, col: i64, row: i64) -> TileIndex {
        TileIndex::new(self.state, self.data_type, col, row)
    }

    /// Canonical tile name, `{zone}_{x_km:03}_{y_km:04}`.
    pub fn tile_name(&self, col: i64, row: i64) -> String {
        let (x_km, y_km) = self.corner_km(col, row);
        format!("{}_{:03}_{:04}", self.utm_zone, x_km, y_km)
    }

    /// Kilometre coordinates of the lower-left corner of a cell.
    pub fn corner_km(&self, col: i64, row: i64) -> (i64, i64) {
        let fp = self.footprint(col, row);
        (
            (fp.min().x / 1000.0).floor() as i64,
            (fp.min().y / 1000.0).floor() as i64,
        )
    }

    /// Resolve a native tile key to a cell of this grid.
    ///
    /// Returns `None` when the key carries no recognizable tile reference, a
    /// different UTM zone, or a corner that is not aligned to the grid.
    pub fn parse_tile_key(&self, key: &str) -> Option<(i64, i64)> {
        let caps = tile_key_regex().captures(key)?;
        let zone: u8 = caps.get(1)?.as_str().parse().ok()?;
        if zone != self.utm_zone {
            return None;
        }
        let x_km: i64 = caps.get(2)?.as_str().parse().ok()?;
        let y_km: i64 = caps.get(3)?.as_str().parse().ok()?;
        self.cell_from_corner(x_km as f64 * 1000.0, y_km as f64 * 1000.0)
    }

    fn cell_from_corner(&self, x: f64, y: f64) -> Option<(i64, i64)> {
        let col = (x - self.origin_x) / self.tile_size;
        let row = (y - self.origin_y) / self.tile_size;
        let aligned = |v: f64| (v - v.round()).abs() < 1e-9;
        if aligned(col) && aligned(row) {
            Some((col.round() as i64, row.round() as i64))
        } else {
            None
        }
    }

    fn within_extent(&self, footprint: &Rect<f64>) -> bool {
        match &self.extent {
            Some(extent) => {
                footprint.min().x < extent.max().x
                    && footprint.max().x > extent.min().x
                    && footprint.min().y < extent.max().y
                    && footprint.max().y > extent.min().y
            }
            None => true,
        }
    }
}

/// Derive the ordered set of tiles of `grid` covered by `aoi`.
///
/// Geometric AOIs are projected into the grid's zone; their bounding box is
/// rasterized and each cell is kept only if its footprint shares interior
/// area with the geometry. Tile-list AOIs bound to another state yield no
/// tiles. The result is sorted by `(row, col)`.
pub fn derive_tiles(aoi: &AreaOfInterest, grid: &TileGridSpec) -> Result<Vec<TileIndex>> {
    let cells: Vec<(i64, i64)> = match aoi {
        AreaOfInterest::Geometry { polygons, crs } => {
            let projected = crs.transform_geometry(grid.crs(), polygons);
            derive_cells(&projected, grid)
        }
        AreaOfInterest::TileList { state, rows } => {
            if *state != grid.state {
                return Ok(Vec::new());
            }
            let mut cells = BTreeSet::new();
            for row in rows {
                let cell = parse_tile_row(&row.content, grid).ok_or_else(|| {
                    CoreError::InvalidTileRow {
                        line: row.line,
                        content: row.content.clone(),
                    }
                })?;
                // (row, col) ordering
                cells.insert((cell.1, cell.0));
            }
            cells.into_iter().map(|(r, c)| (c, r)).collect()
        }
    };

    Ok(cells
        .into_iter()
        .map(|(col, row)| grid.index(col, row))
        .collect())
}

/// Cells of `grid` whose footprint overlaps `geometry`, in `(row, col)` order.
pub fn derive_cells(geometry: &MultiPolygon<f64>, grid: &TileGridSpec) -> Vec<(i64, i64)> {
    if geometry.0.is_empty() || geometry.unsigned_area() <= 0.0 {
        return Vec::new();
    }
    let Some(bbox) = geometry.bounding_rect() else {
        return Vec::new();
    };

    let (col_min, row_min) = grid.cell_of(bbox.min().x, bbox.min().y);
    let col_max = ((bbox.max().x - grid.origin_x) / grid.tile_size).ceil() as i64 - 1;
    let row_max = ((bbox.max().y - grid.origin_y) / grid.tile_size).ceil() as i64 - 1;

    let mut cells = Vec::new();
    for row in row_min..=row_max {
        for col in col_min..=col_max {
            let footprint = grid.footprint(col, row);
            if !grid.within_extent(&footprint) {
                continue;
            }
            // Cheap rejection before the full DE-9IM relation
            if !geometry.intersects(&footprint) {
                continue;
            }
            let matrix = geometry.relate(&footprint.to_polygon());
            if matrix.is_intersects() && !matrix.is_touches() {
                cells.push((col, row));
            }
        }
    }
    cells
}

/// Parse one CSV tile-list row: `col,row` / `col;row` or a native tile name.
fn parse_tile_row(content: &str, grid: &TileGridSpec) -> Option<(i64, i64)> {
    let fields: Vec<&str> = content
        .split(|c| c == ',' || c == ';' || c == '\t')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    match fields.as_slice() {
        [col, row] => Some((col.parse().ok()?, row.parse().ok()?)),
        [name] => grid.parse_tile_key(name),
        _ => None,
    }
}
