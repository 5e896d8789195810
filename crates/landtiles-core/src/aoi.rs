//! Areas of interest and state boundaries.
//!
//! An AOI is either a GeoJSON geometry (Feature, FeatureCollection or bare
//! Polygon/MultiPolygon) or a CSV list of tiles bound to a single state.

use crate::crs::Crs;
use crate::{CoreError, Result, StateCode};
use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One data row of a CSV tile list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileListRow {
    /// One-based line number in the source file.
    pub line: usize,
    /// Trimmed row content.
    pub content: String,
}

/// The user's area of interest.
#[derive(Debug, Clone, PartialEq)]
pub enum AreaOfInterest {
    /// Polygonal AOI with its source CRS.
    Geometry {
        /// AOI polygons.
        polygons: MultiPolygon<f64>,
        /// CRS the coordinates are expressed in.
        crs: Crs,
    },
    /// Explicit tile list, valid for one state only.
    TileList {
        /// State the tile list refers to.
        state: StateCode,
        /// Raw rows, resolved against the state's grid during derivation.
        rows: Vec<TileListRow>,
    },
}

impl AreaOfInterest {
    /// Load an AOI file, choosing the format by extension.
    ///
    /// `.csv` and `.txt` files are tile lists and need `state`; anything else
    /// is read as GeoJSON.
    pub fn load(path: &Path, state: Option<StateCode>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::ReadFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let aoi = match ext.as_str() {
            "csv" | "txt" => {
                let state = state.ok_or_else(|| {
                    CoreError::InvalidConfig(format!(
                        "tile list AOI {} requires aoi_state",
                        path.display()
                    ))
                })?;
                Self::from_csv_str(state, &content)
            }
            _ => Self::from_geojson_str(&content),
        }?;
        debug!(path = %path.display(), kind = aoi.kind(), "Loaded AOI");
        Ok(aoi)
    }

    /// Parse a GeoJSON document. A missing `crs` member means WGS84.
    pub fn from_geojson_str(content: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(content)?;
        let crs = document_crs(&doc)?;
        let polygons: Vec<Polygon<f64>> = document_features(&doc)?
            .into_iter()
            .flat_map(|(_, mp)| mp.0)
            .collect();
        Ok(AreaOfInterest::Geometry {
            polygons: MultiPolygon(polygons),
            crs,
        })
    }

    /// Parse a CSV tile list. An initial line without digits is a header.
    pub fn from_csv_str(state: StateCode, content: &str) -> Result<Self> {
        let mut rows = Vec::new();
        let mut seen_data = false;
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim().trim_start_matches('\u{feff}');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !seen_data && !line.bytes().any(|b| b.is_ascii_digit()) {
                // header
                seen_data = true;
                continue;
            }
            seen_data = true;
            rows.push(TileListRow {
                line: idx + 1,
                content: line.to_string(),
            });
        }
        Ok(AreaOfInterest::TileList { state, rows })
    }

    /// State a tile list is bound to; `None` for geometric AOIs.
    pub fn bound_state(&self) -> Option<StateCode> {
        match self {
            AreaOfInterest::Geometry { .. } => None,
            AreaOfInterest::TileList { state, .. } => Some(*state),
        }
    }

    /// Intersect a geometric AOI with a state boundary, in UTM `zone`.
    ///
    /// Tile lists are returned unchanged.
    pub fn clipped_to(&self, boundary: &StateBoundary, zone: u8) -> AreaOfInterest {
        match self {
            AreaOfInterest::Geometry { polygons, crs } => {
                let target = Crs::Utm(zone);
                let aoi = crs.transform_geometry(target, polygons);
                let outline = boundary.crs.transform_geometry(target, &boundary.polygons);
                AreaOfInterest::Geometry {
                    polygons: aoi.intersection(&outline),
                    crs: target,
                }
            }
            AreaOfInterest::TileList { .. } => self.clone(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AreaOfInterest::Geometry { .. } => "geometry",
            AreaOfInterest::TileList { .. } => "tile list",
        }
    }
}

/// Outline of one federal state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateBoundary {
    /// Boundary polygons.
    pub polygons: MultiPolygon<f64>,
    /// CRS of the polygons.
    pub crs: Crs,
}

/// Outlines of the federal states, loaded from a GeoJSON FeatureCollection.
#[derive(Debug, Clone, Default)]
pub struct StateBoundaries {
    boundaries: BTreeMap<StateCode, StateBoundary>,
}

impl StateBoundaries {
    /// Load boundaries from a GeoJSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::ReadFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_geojson_str(&content)
    }

    /// Parse boundaries. Features name their state with a `code` property
    /// (`"NW"`) or the German name in `GEN`; unidentifiable features are
    /// ignored. Several features of the same state are merged.
    pub fn from_geojson_str(content: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(content)?;
        let crs = document_crs(&doc)?;
        let mut boundaries: BTreeMap<StateCode, StateBoundary> = BTreeMap::new();
        for (props, mp) in document_features(&doc)? {
            let Some(state) = feature_state(&props) else {
                debug!("Ignoring boundary feature without state identification");
                continue;
            };
            boundaries
                .entry(state)
                .or_insert_with(|| StateBoundary {
                    polygons: MultiPolygon(Vec::new()),
                    crs,
                })
                .polygons
                .0
                .extend(mp.0);
        }
        Ok(Self { boundaries })
    }

    /// Boundary of `state`, if known.
    pub fn get(&self, state: StateCode) -> Option<&StateBoundary> {
        self.boundaries.get(&state)
    }

    /// Number of states with a boundary.
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    /// Whether no boundary was loaded.
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}

fn feature_state(props: &Value) -> Option<StateCode> {
    let code = props.get("code").and_then(Value::as_str);
    let name = props.get("GEN").and_then(Value::as_str);
    code.and_then(|c| c.parse().ok())
        .or_else(|| name.and_then(StateCode::from_name))
}

fn document_crs(doc: &Value) -> Result<Crs> {
    match doc
        .get("crs")
        .and_then(|c| c.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    {
        Some(name) => Crs::from_name(name),
        None => Ok(Crs::Wgs84),
    }
}

/// Flatten a GeoJSON document into `(properties, geometry)` pairs.
fn document_features(doc: &Value) -> Result<Vec<(Value, MultiPolygon<f64>)>> {
    let kind = doc
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidAoi("GeoJSON object without 'type'".to_string()))?;

    match kind {
        "FeatureCollection" => {
            let features = doc
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| CoreError::InvalidAoi("FeatureCollection without features".to_string()))?;
            let mut out = Vec::with_capacity(features.len());
            for feature in features {
                out.extend(document_features(feature)?);
            }
            Ok(out)
        }
        "Feature" => {
            let props = doc.get("properties").cloned().unwrap_or(Value::Null);
            match doc.get("geometry") {
                Some(Value::Null) | None => Ok(Vec::new()),
                Some(geometry) => Ok(vec![(props, parse_geometry(geometry)?)]),
            }
        }
        _ => Ok(vec![(Value::Null, parse_geometry(doc)?)]),
    }
}

fn parse_geometry(geometry: &Value) -> Result<MultiPolygon<f64>> {
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "Polygon" => Ok(MultiPolygon(vec![parse_polygon(coordinates(geometry)?)?])),
        "MultiPolygon" => {
            let parts = coordinates(geometry)?
                .as_array()
                .ok_or_else(|| CoreError::InvalidAoi("MultiPolygon coordinates must be an array".to_string()))?;
            parts.iter().map(parse_polygon).collect::<Result<Vec<_>>>().map(MultiPolygon)
        }
        "GeometryCollection" => {
            let mut polygons = Vec::new();
            for member in geometry
                .get("geometries")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                polygons.extend(parse_geometry(member)?.0);
            }
            Ok(MultiPolygon(polygons))
        }
        other => Err(CoreError::InvalidAoi(format!(
            "unsupported geometry type '{other}' (expected Polygon or MultiPolygon)"
        ))),
    }
}

fn coordinates(geometry: &Value) -> Result<&Value> {
    geometry
        .get("coordinates")
        .ok_or_else(|| CoreError::InvalidAoi("geometry without coordinates".to_string()))
}

fn parse_polygon(rings: &Value) -> Result<Polygon<f64>> {
    let rings = rings
        .as_array()
        .ok_or_else(|| CoreError::InvalidAoi("polygon rings must be an array".to_string()))?;
    let mut parsed = rings.iter().map(parse_ring).collect::<Result<Vec<_>>>()?;
    if parsed.is_empty() {
        return Ok(Polygon::new(LineString(Vec::new()), Vec::new()));
    }
    let exterior = parsed.remove(0);
    Ok(Polygon::new(exterior, parsed))
}

fn parse_ring(ring: &Value) -> Result<LineString<f64>> {
    let positions = ring
        .as_array()
        .ok_or_else(|| CoreError::InvalidAoi("ring must be an array of positions".to_string()))?;
    positions
        .iter()
        .map(|p| {
            let x = p.get(0).and_then(Value::as_f64);
            let y = p.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(CoreError::InvalidAoi(format!("invalid position {p}"))),
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString)
}
