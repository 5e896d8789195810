//! Tile downloader.
//!
//! A [`TileDownloader`] turns one [`DownloadPlanItem`] into a committed tile
//! directory. The body is streamed into the tile's `.part` file while its
//! SHA-256 is computed, verified against the feed's size and checksum, moved
//! (or unpacked) into a staging directory and committed by rename. A tile is
//! therefore either fully present with its manifest or absent.
//!
//! When a [`TileStore`] is configured every committed file is handed to it.
//! Storage failures are recorded on the result but never revoke the
//! download; local data files are only removed once every file was stored.

use crate::storage::object_key;
use crate::{with_retry, CancelToken, DownloadPlanItem, ErrorKind, FetchError, RetryPolicy, TileStore, Transport};
use chrono::{NaiveDate, Utc};
use landtiles_core::{Landing, ManifestFile, TileIndex, TileManifest};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read buffer size while streaming a tile.
const CHUNK_SIZE: usize = 64 * 1024;

/// Behaviour switches of a downloader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Unpack `.zip` downloads into the tile directory.
    pub extract_archives: bool,
    /// Remove local data files once the store acknowledged all of them.
    pub delete: bool,
    /// Prefix of storage keys (the source's `s3_path`).
    pub s3_prefix: Option<String>,
}

/// Outcome of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Downloaded and committed.
    Success,
    /// Already present, nothing fetched.
    Skipped,
    /// Not committed; see the error.
    Failed,
}

/// Why a tile failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileError {
    /// Classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&FetchError> for TileError {
    fn from(e: &FetchError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Result of fetching one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    /// Tile key.
    pub tile: TileIndex,
    /// Canonical tile name.
    pub tile_name: String,
    /// Source URL.
    pub download_url: String,
    /// Last-modified date from the feed.
    pub last_modified: NaiveDate,
    /// Outcome.
    pub status: DownloadStatus,
    /// Tile directory, for successful and skipped tiles.
    pub local_path: Option<PathBuf>,
    /// Failure reason.
    pub error: Option<TileError>,
    /// Storage keys acknowledged for the tile.
    pub stored: Vec<String>,
    /// Storage failures; they do not revoke success.
    pub upload_errors: Vec<String>,
    /// Whether local data files were removed after upload.
    pub local_files_removed: bool,
    /// Bytes transferred.
    pub bytes: u64,
}

impl DownloadResult {
    fn new(item: &DownloadPlanItem, status: DownloadStatus) -> Self {
        Self {
            tile: item.tile,
            tile_name: item.tile_name.clone(),
            download_url: item.download_url.clone(),
            last_modified: item.last_modified,
            status,
            local_path: None,
            error: None,
            stored: Vec::new(),
            upload_errors: Vec::new(),
            local_files_removed: false,
            bytes: 0,
        }
    }

    /// Result of a tile that was found in the landing directory.
    pub fn skipped(item: &DownloadPlanItem) -> Self {
        Self {
            local_path: Some(item.destination.clone()),
            ..Self::new(item, DownloadStatus::Skipped)
        }
    }

    /// Result of a tile that failed with `error`.
    pub fn failed(item: &DownloadPlanItem, error: &FetchError) -> Self {
        Self {
            error: Some(TileError::from(error)),
            ..Self::new(item, DownloadStatus::Failed)
        }
    }

    /// Whether the tile is present after the run.
    pub fn is_present(&self) -> bool {
        matches!(self.status, DownloadStatus::Success | DownloadStatus::Skipped)
    }
}

/// Download statistics of a downloader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Tiles committed.
    pub tiles_downloaded: u64,
    /// Bytes received for committed tiles.
    pub bytes_downloaded: u64,
}

/// Downloads plan items into the landing directory.
///
/// Shared by all tile workers of a state; every call only touches the tile's
/// own `.part`, staging and final paths.
pub struct TileDownloader {
    transport: Arc<dyn Transport>,
    landing: Landing,
    policy: RetryPolicy,
    cancel: CancelToken,
    store: Option<Arc<dyn TileStore>>,
    options: DownloadOptions,
    tiles_downloaded: AtomicU64,
    bytes_downloaded: AtomicU64,
}

impl TileDownloader {
    /// Create a downloader writing below `landing`.
    pub fn new(
        transport: Arc<dyn Transport>,
        landing: Landing,
        policy: RetryPolicy,
        cancel: CancelToken,
    ) -> Self {
        Self {
            transport,
            landing,
            policy,
            cancel,
            store: None,
            options: DownloadOptions::default(),
            tiles_downloaded: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
        }
    }

    /// Forward committed tiles to `store`.
    pub fn with_store(mut self, store: Arc<dyn TileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the behaviour switches.
    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Landing directory.
    pub fn landing(&self) -> &Landing {
        &self.landing
    }

    /// Statistics so far.
    pub fn stats(&self) -> DownloadStats {
        DownloadStats {
            tiles_downloaded: self.tiles_downloaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }

    /// Fetch one tile. Never panics on remote or local failures; they end up
    /// in the result.
    pub fn fetch(&self, item: DownloadPlanItem) -> DownloadResult {
        match self.download(&item) {
            Ok(committed) => {
                self.tiles_downloaded.fetch_add(1, Ordering::Relaxed);
                self.bytes_downloaded.fetch_add(committed.bytes, Ordering::Relaxed);
                let mut result = DownloadResult::new(&item, DownloadStatus::Success);
                result.bytes = committed.bytes;
                if self.store.is_some() {
                    self.upload(&committed.dir, committed.manifest, &mut result);
                }
                result.local_path = Some(committed.dir);
                info!(
                    state = %item.tile.state,
                    tile = %item.tile_name,
                    bytes = result.bytes,
                    "Downloaded tile"
                );
                result
            }
            Err(e) => {
                self.discard(&item);
                match e {
                    FetchError::Cancelled => debug!(tile = %item.tile_name, "Download cancelled"),
                    ref e => warn!(
                        state = %item.tile.state,
                        tile = %item.tile_name,
                        kind = %e.kind(),
                        error = %e,
                        "Tile download failed"
                    ),
                }
                DownloadResult::failed(&item, &e)
            }
        }
    }

    fn download(&self, item: &DownloadPlanItem) -> Result<Committed, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let TileIndex { state, data_type, .. } = item.tile;
        let url = item.download_url.as_str();
        fs::create_dir_all(self.landing.state_dir(state))?;

        let part = self.landing.partial_path(state, data_type, &item.tile_name);
        let (bytes, sha256) = with_retry(&self.policy, &self.cancel, url, || self.stream(url, &part))?;

        if let Some(expected) = item.size {
            if expected != bytes {
                return Err(FetchError::SizeMismatch {
                    url: url.to_string(),
                    expected,
                    actual: bytes,
                });
            }
        }
        if let Some(expected) = &item.checksum {
            if !expected.eq_ignore_ascii_case(&sha256) {
                return Err(FetchError::ChecksumMismatch {
                    url: url.to_string(),
                    expected: expected.clone(),
                    actual: sha256,
                });
            }
        }

        let staging = self.landing.staging_dir(state, data_type, &item.tile_name);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let file_name = file_name_of(url)
            .unwrap_or_else(|| format!("{}.bin", Landing::tile_dir_name(data_type, &item.tile_name)));
        if self.options.extract_archives && file_name.to_ascii_lowercase().ends_with(".zip") {
            extract_zip(&part, &staging)?;
            fs::remove_file(&part)?;
        } else {
            fs::rename(&part, staging.join(&file_name))?;
        }

        let mut files = Vec::new();
        collect_files(&staging, &staging, &mut files)?;
        files.sort_by(|a, b| a.name.cmp(&b.name));

        // Last chance to stop before the tile becomes visible.
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let manifest = TileManifest {
            tile_name: item.tile_name.clone(),
            state,
            data_type,
            col: item.tile.col,
            row: item.tile.row,
            download_url: item.download_url.clone(),
            last_modified: item.last_modified,
            downloaded_at: Utc::now(),
            files,
            stored: Vec::new(),
            local_files_removed: false,
        };
        let dir = self.landing.commit(&manifest)?;
        Ok(Committed { dir, manifest, bytes })
    }

    /// Stream `url` into `part`, returning its size and SHA-256.
    fn stream(&self, url: &str, part: &Path) -> Result<(u64, String), FetchError> {
        let mut body = self.transport.open(url)?;
        let mut file = File::create(part)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let n = match body.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(FetchError::Interrupted {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                }
            };
            file.write_all(&buf[..n])?;
            hasher.update(&buf[..n]);
            received += n as u64;
        }
        file.sync_all()?;

        if let Some(expected) = body.content_length {
            if received != expected {
                return Err(FetchError::Interrupted {
                    url: url.to_string(),
                    reason: format!("received {received} of {expected} bytes"),
                });
            }
        }
        Ok((received, hex::encode(hasher.finalize())))
    }

    /// Hand the committed files to the store; remove them locally if asked
    /// and every file was acknowledged.
    fn upload(&self, dir: &Path, mut manifest: TileManifest, result: &mut DownloadResult) {
        let Some(store) = &self.store else {
            return;
        };
        let tile_dir_name = Landing::tile_dir_name(manifest.data_type, &manifest.tile_name);
        for file in &manifest.files {
            let key = object_key(self.options.s3_prefix.as_deref(), &tile_dir_name, &file.name);
            match store.store(&dir.join(&file.name), &key) {
                Ok(ack) => {
                    debug!(key = %ack.key, location = %ack.location, "Uploaded tile file");
                    result.stored.push(ack.key);
                }
                Err(e) => {
                    warn!(tile = %manifest.tile_name, error = %e, "Upload failed");
                    result.upload_errors.push(e.to_string());
                }
            }
        }

        if self.options.delete && result.upload_errors.is_empty() {
            let mut removed = true;
            for file in &manifest.files {
                if let Err(e) = fs::remove_file(dir.join(&file.name)) {
                    warn!(file = %file.name, error = %e, "Failed to remove uploaded file");
                    removed = false;
                }
            }
            result.local_files_removed = removed;
        }

        manifest.stored = result.stored.clone();
        manifest.local_files_removed = result.local_files_removed;
        if let Err(e) = Landing::write_manifest(dir, &manifest) {
            warn!(tile = %manifest.tile_name, error = %e, "Failed to update manifest");
            result.upload_errors.push(format!("manifest update failed: {e}"));
        }
    }

    /// Remove whatever a failed attempt left behind.
    fn discard(&self, item: &DownloadPlanItem) {
        let TileIndex { state, data_type, .. } = item.tile;
        let part = self.landing.partial_path(state, data_type, &item.tile_name);
        if part.exists() {
            if let Err(e) = fs::remove_file(&part) {
                warn!(path = %part.display(), error = %e, "Failed to remove partial download");
            }
        }
        let staging = self.landing.staging_dir(state, data_type, &item.tile_name);
        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

/// A tile that made it into the landing directory.
struct Committed {
    dir: PathBuf,
    manifest: TileManifest,
    bytes: u64,
}

/// Last path segment of `url`, if it looks like a file name.
fn file_name_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    (!name.is_empty()).then(|| name.to_string())
}

fn extract_zip(archive_path: &Path, target: &Path) -> Result<(), FetchError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| FetchError::Archive(e.to_string()))?;
    archive
        .extract(target)
        .map_err(|e| FetchError::Archive(e.to_string()))
}

/// Files below `dir` with names relative to `root`, `/`-separated.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<ManifestFile>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let mut hasher = Sha256::new();
        let size = io::copy(&mut File::open(&path)?, &mut hasher)?;
        out.push(ManifestFile {
            name,
            size,
            sha256: hex::encode(hasher.finalize()),
        });
    }
    Ok(())
}
