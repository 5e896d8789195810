//! Fetch planning: which candidates actually need a download.

use crate::{MetadataIndex, TileMetadataEntry};
use chrono::NaiveDate;
use landtiles_core::{DateRange, Landing, TileIndex};
use serde::Serialize;
use std::path::PathBuf;

/// One tile to download. Consumed exactly once by the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadPlanItem {
    /// Tile key.
    pub tile: TileIndex,
    /// Canonical tile name.
    pub tile_name: String,
    /// Source URL.
    pub download_url: String,
    /// Final tile directory in the landing area.
    pub destination: PathBuf,
    /// Last-modified date from the feed.
    pub last_modified: NaiveDate,
    /// Expected SHA-256, lower-case hex.
    pub checksum: Option<String>,
    /// Expected size in bytes.
    pub size: Option<u64>,
}

/// Result of planning one state.
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    /// Tiles to download, in candidate order.
    pub items: Vec<DownloadPlanItem>,
    /// Tiles already in the landing directory.
    pub skipped: Vec<TileMetadataEntry>,
    /// Tiles outside the date range.
    pub filtered: Vec<TileMetadataEntry>,
    /// Candidates the feed does not know.
    pub unavailable: Vec<TileIndex>,
}

impl FetchPlan {
    /// Number of candidates the plan accounts for.
    pub fn candidate_count(&self) -> usize {
        self.items.len() + self.skipped.len() + self.filtered.len() + self.unavailable.len()
    }
}

/// Plan the downloads of one state.
///
/// A candidate becomes a plan item iff the feed knows it, its last-modified
/// date lies in `date_range` (bounds inclusive, either may be open) and
/// `already_present` is false for it. Output order follows `candidates`.
pub fn plan<P>(
    candidates: &[TileIndex],
    metadata: &MetadataIndex,
    date_range: Option<&DateRange>,
    landing: &Landing,
    already_present: P,
) -> FetchPlan
where
    P: Fn(&TileMetadataEntry) -> bool,
{
    let mut plan = FetchPlan::default();
    for tile in candidates {
        let Some(entry) = metadata.get(tile) else {
            plan.unavailable.push(*tile);
            continue;
        };
        if let Some(range) = date_range {
            if !range.contains(entry.last_modified) {
                plan.filtered.push(entry.clone());
                continue;
            }
        }
        if already_present(entry) {
            plan.skipped.push(entry.clone());
            continue;
        }
        plan.items.push(DownloadPlanItem {
            tile: *tile,
            tile_name: entry.tile_name.clone(),
            download_url: entry.download_url.clone(),
            destination: landing.tile_dir(tile.state, tile.data_type, &entry.tile_name),
            last_modified: entry.last_modified,
            checksum: entry.checksum.clone(),
            size: entry.size,
        });
    }
    plan
}

/// The landing directory's presence predicate.
pub fn present_in(landing: &Landing) -> impl Fn(&TileMetadataEntry) -> bool + '_ {
    move |entry| landing.is_present(entry.tile.state, entry.tile.data_type, &entry.tile_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use landtiles_core::{DataType, StateCode, TileGridSpec};

    fn grid() -> TileGridSpec {
        TileGridSpec::new(StateCode::Nw, DataType::Dtm, 1000.0, 0.0, 0.0, 32).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn index(entries: &[((i64, i64), &str)]) -> MetadataIndex {
        let grid = grid();
        entries
            .iter()
            .map(|((col, row), d)| TileMetadataEntry {
                tile: grid.index(*col, *row),
                tile_name: grid.tile_name(*col, *row),
                download_url: format!("https://x/{col}_{row}.tif"),
                last_modified: date(d),
                checksum: None,
                size: None,
            })
            .collect()
    }

    #[test]
    fn test_plan_partitions_candidates() {
        let grid = grid();
        let landing = Landing::new("/landing");
        let candidates = vec![grid.index(0, 0), grid.index(1, 0), grid.index(2, 0), grid.index(3, 0)];
        let metadata = index(&[((0, 0), "2020-01-01"), ((1, 0), "2018-01-01"), ((3, 0), "2021-12-31")]);
        let range = DateRange::new(Some(date("2020-01-01")), Some(date("2021-12-31")));
        let present = grid.tile_name(3, 0);

        let plan = plan(&candidates, &metadata, Some(&range), &landing, |e| e.tile_name == present);

        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].tile, grid.index(0, 0));
        assert_eq!(
            plan.items[0].destination,
            PathBuf::from("/landing/nw/dtm_32_000_0000")
        );
        assert_eq!(plan.filtered.len(), 1);
        assert_eq!(plan.filtered[0].tile, grid.index(1, 0));
        assert_eq!(plan.unavailable, vec![grid.index(2, 0)]);
        assert_eq!(plan.skipped.len(), 1, "boundary date is in range, then present");
        assert_eq!(plan.candidate_count(), candidates.len());
    }

    #[test]
    fn test_no_range_keeps_order() {
        let grid = grid();
        let landing = Landing::new("/landing");
        let candidates = vec![grid.index(5, 1), grid.index(0, 2), grid.index(1, 2)];
        let metadata = index(&[((5, 1), "1990-01-01"), ((0, 2), "2030-01-01"), ((1, 2), "2000-01-01")]);
        let plan = plan(&candidates, &metadata, None, &landing, |_| false);
        let tiles: Vec<_> = plan.items.iter().map(|i| i.tile).collect();
        assert_eq!(tiles, candidates);
    }

    #[test]
    fn test_landing_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let landing = Landing::new(dir.path());
        let metadata = index(&[((0, 0), "2020-01-01")]);
        let entry = metadata.entries().next().unwrap().clone();
        assert!(!present_in(&landing)(&entry));

        let tile_dir = landing.tile_dir(StateCode::Nw, DataType::Dtm, &entry.tile_name);
        std::fs::create_dir_all(&tile_dir).unwrap();
        std::fs::write(tile_dir.join(landtiles_core::MANIFEST_NAME), b"{}").unwrap();
        assert!(present_in(&landing)(&entry));
    }
}
