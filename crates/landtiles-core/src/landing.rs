//! The local landing directory, the only ledger that persists across runs.
//!
//! Layout:
//!
//! ```text
//! {root}/{state}/{data_type}_{tile_name}/            committed tile
//! {root}/{state}/{data_type}_{tile_name}/tile.json   manifest
//! {root}/{state}/.{data_type}_{tile_name}.part       download in progress
//! {root}/{state}/.{data_type}_{tile_name}.staging/   extraction in progress
//! ```
//!
//! A tile is present iff its manifest exists. The manifest is written inside
//! the staging directory, which is then renamed into place, so a crash can
//! never leave a manifest next to incomplete data.

use crate::{DataType, Result, StateCode};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the per-tile manifest.
pub const MANIFEST_NAME: &str = "tile.json";

const PART_SUFFIX: &str = ".part";
const STAGING_SUFFIX: &str = ".staging";

/// One data file of a committed tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// File name relative to the tile directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the content, lower-case hex.
    pub sha256: String,
}

/// Record of a committed tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileManifest {
    /// Canonical tile name.
    pub tile_name: String,
    /// State of the tile.
    pub state: StateCode,
    /// Product type.
    pub data_type: DataType,
    /// Grid column.
    pub col: i64,
    /// Grid row.
    pub row: i64,
    /// URL the tile was downloaded from.
    pub download_url: String,
    /// Last-modified date announced by the feed.
    pub last_modified: NaiveDate,
    /// When the download finished.
    pub downloaded_at: DateTime<Utc>,
    /// Data files of the tile.
    pub files: Vec<ManifestFile>,
    /// Storage keys acknowledged for the tile.
    #[serde(default)]
    pub stored: Vec<String>,
    /// Whether the data files were removed after upload.
    #[serde(default)]
    pub local_files_removed: bool,
}

/// Handle on the landing directory.
#[derive(Debug, Clone)]
pub struct Landing {
    root: PathBuf,
}

impl Landing {
    /// Landing directory rooted at `root`. Nothing is created yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all tiles of a state.
    pub fn state_dir(&self, state: StateCode) -> PathBuf {
        self.root.join(state.dir_name())
    }

    /// Directory name of a tile, `{data_type}_{tile_name}`.
    pub fn tile_dir_name(data_type: DataType, tile_name: &str) -> String {
        format!("{}_{}", data_type.prefix(), tile_name)
    }

    /// Final directory of a tile.
    pub fn tile_dir(&self, state: StateCode, data_type: DataType, tile_name: &str) -> PathBuf {
        self.state_dir(state).join(Self::tile_dir_name(data_type, tile_name))
    }

    /// Temporary download target of a tile.
    pub fn partial_path(&self, state: StateCode, data_type: DataType, tile_name: &str) -> PathBuf {
        self.state_dir(state).join(format!(
            ".{}{}",
            Self::tile_dir_name(data_type, tile_name),
            PART_SUFFIX
        ))
    }

    /// Temporary directory a tile is assembled in before commit.
    pub fn staging_dir(&self, state: StateCode, data_type: DataType, tile_name: &str) -> PathBuf {
        self.state_dir(state).join(format!(
            ".{}{}",
            Self::tile_dir_name(data_type, tile_name),
            STAGING_SUFFIX
        ))
    }

    /// Whether the tile has been committed by an earlier download.
    pub fn is_present(&self, state: StateCode, data_type: DataType, tile_name: &str) -> bool {
        self.tile_dir(state, data_type, tile_name)
            .join(MANIFEST_NAME)
            .is_file()
    }

    /// Manifest of a committed tile.
    pub fn read_manifest(
        &self,
        state: StateCode,
        data_type: DataType,
        tile_name: &str,
    ) -> Result<Option<TileManifest>> {
        let path = self.tile_dir(state, data_type, tile_name).join(MANIFEST_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write `manifest` into `dir`, replacing any previous one atomically.
    pub fn write_manifest(dir: &Path, manifest: &TileManifest) -> Result<()> {
        let tmp = dir.join(format!("{MANIFEST_NAME}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(manifest)?)?;
        fs::rename(&tmp, dir.join(MANIFEST_NAME))?;
        Ok(())
    }

    /// Commit a staged tile: write its manifest and move it into place.
    ///
    /// A leftover final directory without manifest (an interrupted earlier
    /// commit) is replaced.
    pub fn commit(&self, manifest: &TileManifest) -> Result<PathBuf> {
        let staging = self.staging_dir(manifest.state, manifest.data_type, &manifest.tile_name);
        let target = self.tile_dir(manifest.state, manifest.data_type, &manifest.tile_name);
        Self::write_manifest(&staging, manifest)?;
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;
        debug!(tile = %manifest.tile_name, dir = %target.display(), "Committed tile");
        Ok(target)
    }

    /// Remove leftovers of interrupted downloads of a state.
    ///
    /// Returns the number of removed entries. Must not run while downloads of
    /// the state are in flight.
    pub fn clean_partials(&self, state: StateCode) -> Result<usize> {
        let dir = self.state_dir(state);
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let result = if name.ends_with(PART_SUFFIX) && path.is_file() {
                fs::remove_file(&path)
            } else if name.ends_with(STAGING_SUFFIX) && path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                continue;
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial download"),
            }
        }
        if removed > 0 {
            debug!(state = %state, removed, "Removed partial downloads");
        }
        Ok(removed)
    }
}
