//! Run report: per-state status, counts and every tile's outcome.

use crate::{DownloadResult, DownloadStatus, ErrorKind, FeedStats, FetchPlan, TileError, TileMetadataEntry};
use chrono::{DateTime, NaiveDate, Utc};
use landtiles_core::{CoreError, DataType, Landing, StateCode, TileGridSpec, TileIndex};
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// How a state's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    /// Metadata reconciled, plan executed.
    Completed,
    /// Metadata reconciled and planned; downloads were not requested.
    Planned,
    /// No source entry for the state and data type.
    NotConfigured,
    /// No adapter knows the state's feed.
    NoAdapter,
    /// The feed could not be fetched or parsed.
    MetadataUnavailable,
    /// The run was cancelled while the state was processed.
    Cancelled,
}

impl StateStatus {
    /// Whether the status makes the run exit non-zero.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StateStatus::MetadataUnavailable)
    }
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateStatus::Completed => "completed",
            StateStatus::Planned => "planned",
            StateStatus::NotConfigured => "not configured",
            StateStatus::NoAdapter => "no adapter",
            StateStatus::MetadataUnavailable => "metadata unavailable",
            StateStatus::Cancelled => "cancelled",
        })
    }
}

/// Outcome of one candidate tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileStatus {
    /// Downloaded in this run.
    Success,
    /// Already present in the landing directory.
    Skipped,
    /// Not listed by the state's feed.
    Unavailable,
    /// Outside the date range.
    Filtered,
    /// Would be downloaded; the run only planned.
    Planned,
    /// Download failed.
    Failed,
}

/// Report line of one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileRecord {
    /// Canonical tile name.
    pub tile_name: String,
    /// Grid column.
    pub col: i64,
    /// Grid row.
    pub row: i64,
    /// Outcome.
    pub status: TileStatus,
    /// Source URL, when the feed knows the tile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Last-modified date, when the feed knows the tile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<NaiveDate>,
    /// Tile directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TileError>,
    /// Storage keys.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stored: Vec<String>,
    /// Storage failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upload_errors: Vec<String>,
}

impl TileRecord {
    fn from_entry(entry: &TileMetadataEntry, status: TileStatus, location: Option<PathBuf>) -> Self {
        Self {
            tile_name: entry.tile_name.clone(),
            col: entry.tile.col,
            row: entry.tile.row,
            status,
            download_url: Some(entry.download_url.clone()),
            last_modified: Some(entry.last_modified),
            location,
            error: None,
            stored: Vec::new(),
            upload_errors: Vec::new(),
        }
    }

    fn bare(tile: &TileIndex, tile_name: String, status: TileStatus) -> Self {
        Self {
            tile_name,
            col: tile.col,
            row: tile.row,
            status,
            download_url: None,
            last_modified: None,
            location: None,
            error: None,
            stored: Vec::new(),
            upload_errors: Vec::new(),
        }
    }
}

impl From<DownloadResult> for TileRecord {
    fn from(result: DownloadResult) -> Self {
        let status = match result.status {
            DownloadStatus::Success => TileStatus::Success,
            DownloadStatus::Skipped => TileStatus::Skipped,
            DownloadStatus::Failed => TileStatus::Failed,
        };
        Self {
            tile_name: result.tile_name,
            col: result.tile.col,
            row: result.tile.row,
            status,
            download_url: Some(result.download_url),
            last_modified: Some(result.last_modified),
            location: result.local_path,
            error: result.error,
            stored: result.stored,
            upload_errors: result.upload_errors,
        }
    }
}

/// Per-state tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Tiles downloaded in this run.
    pub downloaded: usize,
    /// Tiles already present.
    pub skipped: usize,
    /// Candidates unknown to the feed.
    pub unavailable: usize,
    /// Tiles outside the date range.
    pub filtered: usize,
    /// Tiles planned but not downloaded.
    pub planned: usize,
    /// Failed downloads.
    pub failed: usize,
}

impl Counts {
    fn add(&mut self, status: TileStatus) {
        match status {
            TileStatus::Success => self.downloaded += 1,
            TileStatus::Skipped => self.skipped += 1,
            TileStatus::Unavailable => self.unavailable += 1,
            TileStatus::Filtered => self.filtered += 1,
            TileStatus::Planned => self.planned += 1,
            TileStatus::Failed => self.failed += 1,
        }
    }
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, other: Self) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.unavailable += other.unavailable;
        self.filtered += other.filtered;
        self.planned += other.planned;
        self.failed += other.failed;
    }
}

/// Report of one state.
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    /// State.
    pub state: StateCode,
    /// Outcome.
    pub status: StateStatus,
    /// Number of derived candidate tiles.
    pub candidates: usize,
    /// Tallies over `tiles`.
    pub counts: Counts,
    /// Feed statistics, when the feed was reconciled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<FeedStats>,
    /// Why the state did not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Every candidate's outcome.
    pub tiles: Vec<TileRecord>,
}

impl StateReport {
    /// Empty report with `status`.
    pub fn new(state: StateCode, status: StateStatus, candidates: usize) -> Self {
        Self {
            state,
            status,
            candidates,
            counts: Counts::default(),
            feed: None,
            message: None,
            tiles: Vec::new(),
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Add a tile record and count it.
    pub fn push(&mut self, record: TileRecord) {
        self.counts.add(record.status);
        self.tiles.push(record);
    }

    /// Attach feed statistics. Lost per-tile documents are spelled out in the
    /// message since their tiles show up as unavailable.
    pub fn record_feed(&mut self, stats: FeedStats) {
        if stats.failed_documents > 0 {
            self.message = Some(format!(
                "{} metadata document(s) could not be fetched; their tiles are reported unavailable",
                stats.failed_documents
            ));
        }
        self.feed = Some(stats);
    }

    /// Record the plan's skipped, filtered and unavailable candidates.
    pub fn record_plan(&mut self, plan: &FetchPlan, grid: &TileGridSpec, landing: &Landing) {
        for entry in &plan.skipped {
            let location = landing.tile_dir(entry.tile.state, entry.tile.data_type, &entry.tile_name);
            self.push(TileRecord::from_entry(entry, TileStatus::Skipped, Some(location)));
        }
        for entry in &plan.filtered {
            self.push(TileRecord::from_entry(entry, TileStatus::Filtered, None));
        }
        for tile in &plan.unavailable {
            self.push(TileRecord::bare(tile, grid.tile_name(tile.col, tile.row), TileStatus::Unavailable));
        }
    }

    /// Record plan items as planned, without downloading them.
    pub fn record_planned(&mut self, plan: &FetchPlan) {
        for item in &plan.items {
            self.push(TileRecord {
                tile_name: item.tile_name.clone(),
                col: item.tile.col,
                row: item.tile.row,
                status: TileStatus::Planned,
                download_url: Some(item.download_url.clone()),
                last_modified: Some(item.last_modified),
                location: Some(item.destination.clone()),
                error: None,
                stored: Vec::new(),
                upload_errors: Vec::new(),
            });
        }
    }

    /// Record every candidate as failed with `kind`.
    pub fn fail_all(&mut self, tiles: &[TileIndex], grid: &TileGridSpec, kind: ErrorKind) {
        for tile in tiles {
            let mut record = TileRecord::bare(tile, grid.tile_name(tile.col, tile.row), TileStatus::Failed);
            record.error = Some(TileError {
                kind,
                message: kind.to_string(),
            });
            self.push(record);
        }
    }

    /// Put the tile records into candidate order, `(row, col)`.
    pub fn sort_tiles(&mut self) {
        self.tiles.sort_by_key(|t| (t.row, t.col));
    }

    /// Failed tiles of the state.
    pub fn failed_tiles(&self) -> impl Iterator<Item = &TileRecord> {
        self.tiles.iter().filter(|t| t.status == TileStatus::Failed)
    }
}

/// Report of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Product of the run.
    pub data_type: DataType,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Per-state reports, in state code order.
    pub states: Vec<StateReport>,
    /// Why the report could not be written to disk.
    #[serde(skip)]
    pub write_error: Option<String>,
}

impl RunReport {
    /// Whether any state suffered a fatal metadata failure.
    pub fn has_fatal_failures(&self) -> bool {
        self.states.iter().any(|s| s.status.is_fatal())
    }

    /// Tallies over all states.
    pub fn totals(&self) -> Counts {
        let mut totals = Counts::default();
        for state in &self.states {
            totals += state.counts;
        }
        totals
    }

    /// Report of `state`, if it took part.
    pub fn state(&self, state: StateCode) -> Option<&StateReport> {
        self.states.iter().find(|s| s.state == state)
    }

    /// Check that a report can later be written to `path`: it must not be a
    /// directory and its parent must be creatable. Existing content is kept.
    pub fn ensure_writable(path: &Path) -> landtiles_core::Result<()> {
        if path.is_dir() {
            return Err(CoreError::InvalidConfig(format!(
                "report path {} is a directory",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().append(true).create(true).open(path)?;
        Ok(())
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> landtiles_core::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} run, {} state(s):", self.data_type, self.states.len())?;
        for state in &self.states {
            let c = state.counts;
            write!(
                f,
                "  {:<3} {:<20} downloaded {:>5}  skipped {:>5}  unavailable {:>5}  filtered {:>5}  failed {:>5}",
                state.state.code(),
                state.status.to_string(),
                c.downloaded,
                c.skipped,
                c.unavailable,
                c.filtered,
                c.failed
            )?;
            if c.planned > 0 {
                write!(f, "  planned {:>5}", c.planned)?;
            }
            writeln!(f)?;
            if let Some(message) = &state.message {
                writeln!(f, "      {message}")?;
            }
            for tile in state.failed_tiles() {
                match &tile.error {
                    Some(error) => writeln!(f, "      FAILED {} [{}]: {}", tile.tile_name, error.kind, error.message)?,
                    None => writeln!(f, "      FAILED {}", tile.tile_name)?,
                }
            }
        }
        if self.cancelled {
            writeln!(f, "Run was cancelled.")?;
        }
        if let Some(error) = &self.write_error {
            writeln!(f, "Report not written: {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(col: i64) -> TileIndex {
        TileIndex::new(StateCode::Nw, DataType::Dtm, col, 5600)
    }

    fn failed(col: i64, kind: ErrorKind) -> TileRecord {
        let mut record = TileRecord::bare(&tile(col), format!("32_{col:03}_5600"), TileStatus::Failed);
        record.error = Some(TileError {
            kind,
            message: "HTTP 404".to_string(),
        });
        record
    }

    fn report(states: Vec<StateReport>) -> RunReport {
        RunReport {
            data_type: DataType::Dtm,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            cancelled: false,
            states,
            write_error: None,
        }
    }

    #[test]
    fn test_counts_and_fatality() {
        let mut nw = StateReport::new(StateCode::Nw, StateStatus::Completed, 3);
        nw.push(failed(350, ErrorKind::PermanentFetch));
        nw.push(TileRecord::bare(&tile(351), "32_351_5600".to_string(), TileStatus::Unavailable));
        nw.push(TileRecord::bare(&tile(352), "32_352_5600".to_string(), TileStatus::Skipped));
        let bb = StateReport::new(StateCode::Bb, StateStatus::NoAdapter, 0);

        let run = report(vec![nw, bb]);
        assert!(!run.has_fatal_failures(), "tile failures alone are not fatal");
        let totals = run.totals();
        assert_eq!((totals.failed, totals.unavailable, totals.skipped), (1, 1, 1));

        let text = run.to_string();
        assert!(text.contains("FAILED 32_350_5600 [permanent fetch error]"), "{text}");
        assert!(text.contains("no adapter"));

        let run = report(vec![StateReport::new(StateCode::Rp, StateStatus::MetadataUnavailable, 4)]);
        assert!(run.has_fatal_failures());
    }

    #[test]
    fn test_fail_all_marks_cancelled() {
        let grid = TileGridSpec::new(StateCode::Nw, DataType::Dtm, 1000.0, 0.0, 0.0, 32).unwrap();
        let mut state = StateReport::new(StateCode::Nw, StateStatus::Cancelled, 2);
        state.fail_all(&[tile(1), tile(2)], &grid, ErrorKind::Cancelled);
        assert_eq!(state.counts.failed, 2);
        assert!(state.failed_tiles().all(|t| t.error.as_ref().unwrap().kind == ErrorKind::Cancelled));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta/report.json");
        let mut state = StateReport::new(StateCode::Nw, StateStatus::Completed, 1);
        state.push(failed(350, ErrorKind::TransientFetch));
        report(vec![state]).write_json(&path).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["data_type"], "DTM");
        assert_eq!(json["states"][0]["state"], "NW");
        assert_eq!(json["states"][0]["counts"]["failed"], 1);
        assert_eq!(json["states"][0]["tiles"][0]["error"]["kind"], "transient_fetch");
    }

    #[test]
    fn test_tiles_sorted_by_row_then_col() {
        let mut state = StateReport::new(StateCode::Nw, StateStatus::Completed, 3);
        let mut upper = TileRecord::bare(&tile(350), "32_350_5601".to_string(), TileStatus::Skipped);
        upper.row = 5601;
        state.push(upper);
        state.push(TileRecord::bare(&tile(352), "32_352_5600".to_string(), TileStatus::Filtered));
        state.push(failed(351, ErrorKind::TransientFetch));
        state.sort_tiles();
        let order: Vec<_> = state.tiles.iter().map(|t| (t.row, t.col)).collect();
        assert_eq!(order, vec![(5600, 351), (5600, 352), (5601, 350)]);
    }

    #[test]
    fn test_lost_feed_documents_in_message() {
        let mut state = StateReport::new(StateCode::Rp, StateStatus::Completed, 2);
        state.record_feed(FeedStats::default());
        assert!(state.message.is_none());

        state.record_feed(FeedStats {
            documents: 1,
            failed_documents: 1,
            ..FeedStats::default()
        });
        assert_eq!(state.feed.unwrap().failed_documents, 1);
        let text = report(vec![state]).to_string();
        assert!(text.contains("1 metadata document(s) could not be fetched"), "{text}");
    }

    #[test]
    fn test_ensure_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report.json");
        RunReport::ensure_writable(&path).unwrap();
        assert!(path.is_file());

        fs::write(&path, "previous").unwrap();
        RunReport::ensure_writable(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");

        assert!(matches!(
            RunReport::ensure_writable(dir.path()),
            Err(CoreError::InvalidConfig(_))
        ));
    }
}
