//! Storage capability for mirroring downloaded tiles.
//!
//! Object keys follow `{s3_path}{data_type}_{tile_name}/{file_name}`.

use crate::StorageError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Acknowledgement of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAck {
    /// Object key.
    pub key: String,
    /// Where the object ended up (URL or path), for the report.
    pub location: String,
}

/// Accepts tile files for archival.
pub trait TileStore: Send + Sync {
    /// Store the file at `local_path` under `key`.
    fn store(&self, local_path: &Path, key: &str) -> Result<StoreAck, StorageError>;
}

/// Object key of a tile file.
pub fn object_key(prefix: Option<&str>, tile_dir_name: &str, file_name: &str) -> String {
    format!("{}{}/{}", prefix.unwrap_or_default(), tile_dir_name, file_name)
}

/// Store backed by a local directory (a mounted bucket, a NAS share).
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Store writing below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TileStore for DirectoryStore {
    fn store(&self, local_path: &Path, key: &str) -> Result<StoreAck, StorageError> {
        if key.split('/').any(|part| part == "..") || key.starts_with('/') {
            return Err(StorageError::Rejected {
                key: key.to_string(),
                reason: "key escapes the store root".to_string(),
            });
        }
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        let target = self.root.join(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = target.with_extension("upload");
        fs::copy(local_path, &tmp).map_err(io_err)?;
        fs::rename(&tmp, &target).map_err(io_err)?;
        debug!(key, target = %target.display(), "Stored file");
        Ok(StoreAck {
            key: key.to_string(),
            location: target.display().to_string(),
        })
    }
}
