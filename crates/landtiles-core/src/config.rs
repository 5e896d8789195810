//! Run configuration (the init file) and per-state source definitions.
//!
//! Both files are JSON or YAML, selected by extension:
//!
//! ```yaml
//! aoi_path: aoi/cologne.geojson
//! data_type: DTM
//! selected_states: [NW, RP]
//! meta_path: out/report.json
//! local_landing_path: landing
//! date_range: { begin: 2020-01-01, end: null }
//! upload_s3: false
//! delete: false
//! ```
//!
//! The sources file maps data type -> state -> entry (or `null` when a state
//! does not publish that product):
//!
//! ```yaml
//! DTM:
//!   NW:
//!     tile_info: { tile_size: 1000, x: 0, y: 0 }
//!     links:
//!       download_link: https://example.org/dgm1_{tile}_1_nw_{year}.tif
//!       meta_data_link: https://example.org/dgm1_meta.zip
//!       s3_path: dtm/nw/
//!   HB: null
//! ```

use crate::grid::TileGridSpec;
use crate::{CoreError, DataType, DateRange, Result, StateCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Retry settings for metadata and tile fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound of the exponential backoff.
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_state_workers() -> usize {
    2
}

/// Immutable run-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// GeoJSON or CSV file describing the area of interest.
    #[serde(alias = "geojson_path")]
    pub aoi_path: PathBuf,
    /// Product to download.
    pub data_type: DataType,
    /// States to process; `None` or empty means every configured state.
    #[serde(default)]
    pub selected_states: Option<Vec<StateCode>>,
    /// Where the run report is written.
    pub meta_path: PathBuf,
    /// Root of the local landing directory.
    pub local_landing_path: PathBuf,
    /// Accepted `last_modified` window.
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Forward downloaded tiles to storage.
    #[serde(default)]
    pub upload_s3: bool,
    /// Remove local data files once storage acknowledged them.
    #[serde(default)]
    pub delete: bool,
    /// State a CSV tile list refers to.
    #[serde(default)]
    pub aoi_state: Option<StateCode>,
    /// Optional GeoJSON with state outlines used to clip the AOI per state.
    #[serde(default)]
    pub state_boundaries_path: Option<PathBuf>,
    /// When false, runs stop after planning.
    #[serde(default = "default_true")]
    pub download: bool,
    /// Concurrent tile downloads per state.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// States processed concurrently.
    #[serde(default = "default_state_workers")]
    pub state_workers: usize,
    /// Unpack downloaded zip archives into the tile directory.
    #[serde(default = "default_true")]
    pub extract_archives: bool,
    /// Retry settings.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl RunConfig {
    /// Load and validate an init file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: RunConfig = load_document(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.state_workers == 0 {
            return Err(CoreError::InvalidConfig(
                "workers and state_workers must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(CoreError::InvalidConfig(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".to_string(),
            ));
        }
        if let Some(DateRange {
            begin: Some(begin),
            end: Some(end),
        }) = self.date_range
        {
            if begin > end {
                return Err(CoreError::InvalidConfig(format!(
                    "date_range begins after it ends ({begin} > {end})"
                )));
            }
        }
        if self.delete && !self.upload_s3 {
            return Err(CoreError::InvalidConfig(
                "delete requires upload_s3; local tiles would be lost".to_string(),
            ));
        }
        if self.is_tile_list_aoi() && self.aoi_state.is_none() {
            return Err(CoreError::InvalidConfig(format!(
                "tile list AOI {} requires aoi_state",
                self.aoi_path.display()
            )));
        }
        Ok(())
    }

    /// Whether the AOI file is a CSV tile list.
    pub fn is_tile_list_aoi(&self) -> bool {
        matches!(
            extension(&self.aoi_path).as_str(),
            "csv" | "txt"
        )
    }

    /// Whether `state` takes part in the run.
    pub fn is_selected(&self, state: StateCode) -> bool {
        match &self.selected_states {
            Some(states) if !states.is_empty() => states.contains(&state),
            _ => true,
        }
    }

    /// Date window, `None` if absent or unbounded.
    pub fn effective_date_range(&self) -> Option<DateRange> {
        self.date_range.filter(|r| !r.is_unbounded())
    }
}

/// Grid parameters of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    /// Tile edge length in meters.
    pub tile_size: f64,
    /// Grid origin easting.
    #[serde(default)]
    pub x: f64,
    /// Grid origin northing.
    #[serde(default)]
    pub y: f64,
    /// UTM zone, defaults to the state's zone.
    #[serde(default)]
    pub utm_zone: Option<u8>,
    /// Grid coverage `[min_x, min_y, max_x, max_y]`.
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
}

/// Endpoints of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLinks {
    /// URL template for tile downloads.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub download_link: Option<String>,
    /// Metadata feed URL (or template, for per-tile feeds).
    #[serde(default, deserialize_with = "empty_as_none")]
    pub meta_data_link: Option<String>,
    /// Key prefix in storage.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub s3_path: Option<String>,
}

/// Source definition of one state and data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Grid parameters.
    pub tile_info: TileInfo,
    /// Endpoints.
    #[serde(default)]
    pub links: SourceLinks,
}

/// All source definitions: data type -> state -> entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcesConfig {
    sources: BTreeMap<DataType, BTreeMap<StateCode, Option<SourceEntry>>>,
}

impl SourcesConfig {
    /// Load and validate a sources file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: SourcesConfig = load_document(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Source entry of a state, `None` when missing or null.
    pub fn entry(&self, data_type: DataType, state: StateCode) -> Option<&SourceEntry> {
        self.sources
            .get(&data_type)
            .and_then(|states| states.get(&state))
            .and_then(Option::as_ref)
    }

    /// States with a non-null entry for `data_type`, in code order.
    pub fn configured_states(&self, data_type: DataType) -> Vec<StateCode> {
        self.sources
            .get(&data_type)
            .map(|states| {
                states
                    .iter()
                    .filter(|(_, entry)| entry.is_some())
                    .map(|(state, _)| *state)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, data_type: DataType, state: StateCode, entry: Option<SourceEntry>) {
        self.sources.entry(data_type).or_default().insert(state, entry);
    }

    /// Tile grid of a state, `Ok(None)` when the state has no entry.
    pub fn grid_spec(&self, data_type: DataType, state: StateCode) -> Result<Option<TileGridSpec>> {
        let Some(entry) = self.entry(data_type, state) else {
            return Ok(None);
        };
        let info = &entry.tile_info;
        let zone = info.utm_zone.unwrap_or_else(|| state.default_utm_zone());
        let mut grid = TileGridSpec::new(state, data_type, info.tile_size, info.x, info.y, zone)?;
        if let Some([min_x, min_y, max_x, max_y]) = info.extent {
            if !(min_x < max_x && min_y < max_y) {
                return Err(CoreError::InvalidConfig(format!(
                    "empty grid extent for {state} {data_type}"
                )));
            }
            grid = grid.with_extent(min_x, min_y, max_x, max_y);
        }
        Ok(Some(grid))
    }

    /// Validate every grid definition.
    pub fn validate(&self) -> Result<()> {
        for (data_type, states) in &self.sources {
            for state in states.keys() {
                self.grid_spec(*data_type, *state)?;
            }
        }
        Ok(())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn load_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::ReadFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match extension(path).as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        _ => Ok(serde_json::from_str(&content)?),
    }
}
