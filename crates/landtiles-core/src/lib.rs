//! # landtiles-core
//!
//! Data model of the German state raster tile downloader.
//!
//! The federal states publish elevation models (DTM, DSM) and orthophotos
//! (DOP) as square tiles on regular grids in ETRS89 / UTM zone 32 or 33.
//! This crate turns a user's area of interest into the tiles of each state's
//! grid and keeps track of which tiles already sit in the local landing
//! directory:
//!
//! - [`AreaOfInterest`]: GeoJSON polygons or a CSV tile list
//! - [`TileGridSpec`] and [`derive_tiles`]: AOI to ordered [`TileIndex`] set
//! - [`RunConfig`] / [`SourcesConfig`]: init file and per-state sources
//! - [`Landing`]: the landing directory and its per-tile manifests
//!
//! ## Example
//!
//! ```no_run
//! use landtiles_core::{derive_tiles, AreaOfInterest, DataType, SourcesConfig, StateCode};
//! use std::path::Path;
//!
//! let sources = SourcesConfig::load(Path::new("sources.yaml"))?;
//! let aoi = AreaOfInterest::load(Path::new("aoi.geojson"), None)?;
//! if let Some(grid) = sources.grid_spec(DataType::Dtm, StateCode::Nw)? {
//!     for tile in derive_tiles(&aoi, &grid)? {
//!         println!("{} -> {}", tile, grid.tile_name(tile.col, tile.row));
//!     }
//! }
//! # Ok::<(), landtiles_core::CoreError>(())
//! ```

mod aoi;
mod config;
pub mod crs;
pub mod dates;
mod error;
mod grid;
mod landing;
mod types;

pub use aoi::{AreaOfInterest, StateBoundaries, StateBoundary, TileListRow};
pub use config::{RetrySettings, RunConfig, SourceEntry, SourceLinks, SourcesConfig, TileInfo};
pub use crs::Crs;
pub use error::CoreError;
pub use grid::{derive_cells, derive_tiles, TileGridSpec};
pub use landing::{Landing, ManifestFile, TileManifest, MANIFEST_NAME};
pub use types::{DataType, DateRange, StateCode, TileIndex};

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
