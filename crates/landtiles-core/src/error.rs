//! Error types for the core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading configuration, areas of interest and tile grids.
///
/// Everything in here is a configuration problem in the sense of the run
/// contract: it is detected before any network activity and aborts the run.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decoding error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configuration or AOI file could not be read.
    #[error("Failed to read {path}: {reason}")]
    ReadFile {
        /// File that was being read.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Generic invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tile size must be strictly positive.
    #[error("Invalid tile size {0} (must be > 0)")]
    InvalidTileSize(f64),

    /// Only the two UTM zones used by German states are supported.
    #[error("Unsupported UTM zone {0} (must be 32 or 33)")]
    UnsupportedZone(u8),

    /// The AOI declares a coordinate reference system we cannot handle.
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    /// The AOI geometry could not be understood.
    #[error("Invalid AOI: {0}")]
    InvalidAoi(String),

    /// A row of a CSV tile list does not resolve to a tile.
    #[error("Invalid tile list row {line}: '{content}'")]
    InvalidTileRow {
        /// One-based line number in the CSV file.
        line: usize,
        /// Raw row content.
        content: String,
    },

    /// Unknown federal state code or name.
    #[error("Unknown state: {0}")]
    UnknownState(String),

    /// Unknown data type.
    #[error("Unknown data type: {0} (expected DTM, DSM or DOP)")]
    UnknownDataType(String),
}
