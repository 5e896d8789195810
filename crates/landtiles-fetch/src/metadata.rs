//! Metadata reconciliation: from a state's feed to a tile-indexed catalogue.
//!
//! Every state publishes its catalogue differently (CSV listings, zipped CSV,
//! WFS GeoJSON, one XML document per tile). A [`StateAdapter`] knows how to
//! fetch and parse one state's feed into [`FeedRecord`]s keyed by the state's
//! native tile key. The [`Reconciler`] normalizes those keys onto the state's
//! grid, builds download URLs, resolves duplicates and counts malformed rows.

use crate::template::{self, TemplateVars};
use crate::{with_retry, CancelToken, FetchError, MetadataError, RetryPolicy, Transport};
use chrono::{Datelike, NaiveDate};
use landtiles_core::{DataType, SourceEntry, StateCode, TileGridSpec, TileIndex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A fetched feed document.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    /// URL the document came from.
    pub url: String,
    /// Tile the document describes, for per-tile feeds.
    pub key_hint: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

/// One row of a feed, before key normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    /// Native tile key as found in the feed.
    pub tile_key: String,
    /// Download URL, when the feed lists one.
    pub download_url: Option<String>,
    /// Last-modified date.
    pub last_modified: NaiveDate,
    /// SHA-256 of the tile file, when published.
    pub checksum: Option<String>,
    /// Size of the tile file, when published.
    pub size: Option<u64>,
}

impl FeedRecord {
    /// Record with key and date only.
    pub fn new(tile_key: impl Into<String>, last_modified: NaiveDate) -> Self {
        Self {
            tile_key: tile_key.into(),
            download_url: None,
            last_modified,
            checksum: None,
            size: None,
        }
    }
}

/// Documents of a feed, plus per-tile documents that could not be fetched.
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    /// Fetched documents.
    pub documents: Vec<FeedDocument>,
    /// URLs that still failed after retries. The tiles they describe are
    /// missing from the catalogue.
    pub failed: Vec<String>,
}

impl From<Vec<FeedDocument>> for FetchedFeed {
    fn from(documents: Vec<FeedDocument>) -> Self {
        Self {
            documents,
            failed: Vec::new(),
        }
    }
}

/// Outcome of parsing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Rows that parsed.
    pub records: Vec<FeedRecord>,
    /// Rows that were skipped as malformed.
    pub malformed: usize,
}

/// What an adapter may look at while fetching and parsing.
#[derive(Debug, Clone, Copy)]
pub struct FeedContext<'a> {
    /// The state's grid.
    pub grid: &'a TileGridSpec,
    /// The state's source entry.
    pub entry: &'a SourceEntry,
    /// Candidate tiles of this run, in derivation order.
    pub candidates: &'a [TileIndex],
}

impl FeedContext<'_> {
    /// Data type of the run.
    pub fn data_type(&self) -> DataType {
        self.grid.data_type
    }

    /// Metadata link of the source entry.
    pub fn meta_data_link(&self) -> Result<&str, MetadataError> {
        self.entry
            .links
            .meta_data_link
            .as_deref()
            .ok_or(MetadataError::MissingLink("meta_data_link"))
    }
}

/// Fetches feed documents with retry and cancellation.
#[derive(Clone)]
pub struct FeedFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    cancel: CancelToken,
}

impl FeedFetcher {
    /// Create a fetcher.
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, cancel: CancelToken) -> Self {
        Self {
            transport,
            policy,
            cancel,
        }
    }

    /// Fetch `url`, retrying transient failures.
    pub fn fetch(&self, url: &str, key_hint: Option<String>) -> Result<FeedDocument, FetchError> {
        let body = with_retry(&self.policy, &self.cancel, url, || self.transport.get(url))?;
        debug!(url, bytes = body.len(), "Fetched feed document");
        Ok(FeedDocument {
            url: url.to_string(),
            key_hint,
            body,
        })
    }

    /// Cancellation token of the run.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Map a whole-feed fetch failure onto the state's metadata error.
pub(crate) fn feed_unavailable(e: FetchError) -> MetadataError {
    match e {
        FetchError::Cancelled => MetadataError::Cancelled,
        other => MetadataError::Unavailable(other),
    }
}

/// Per-state feed logic.
pub trait StateAdapter: Send + Sync {
    /// State served by the adapter.
    fn state(&self) -> StateCode;

    /// Fetch the feed documents. The default fetches `meta_data_link` once.
    fn fetch_documents(
        &self,
        ctx: &FeedContext<'_>,
        fetcher: &FeedFetcher,
    ) -> Result<FetchedFeed, MetadataError> {
        let url = ctx.meta_data_link()?;
        fetcher
            .fetch(url, None)
            .map(|doc| vec![doc].into())
            .map_err(feed_unavailable)
    }

    /// Parse one document. Broken rows are counted, not fatal.
    fn parse(&self, ctx: &FeedContext<'_>, doc: &FeedDocument) -> Result<ParsedFeed, MetadataError>;

    /// Resolve a native feed key to a grid cell.
    fn resolve_key(&self, grid: &TileGridSpec, key: &str) -> Option<(i64, i64)> {
        grid.parse_tile_key(key)
    }

    /// Native key used as the first positional placeholder of download URLs.
    fn download_key(&self, grid: &TileGridSpec, col: i64, row: i64) -> String {
        grid.tile_name(col, row)
    }

    /// Build the download URL of a tile from the source's template.
    fn build_download_url(
        &self,
        ctx: &FeedContext<'_>,
        col: i64,
        row: i64,
        last_modified: NaiveDate,
    ) -> Result<String, MetadataError> {
        let template = ctx
            .entry
            .links
            .download_link
            .as_deref()
            .ok_or(MetadataError::MissingLink("download_link"))?;
        let (x_km, y_km) = ctx.grid.corner_km(col, row);
        let vars = TemplateVars {
            tile: ctx.grid.tile_name(col, row),
            key: self.download_key(ctx.grid, col, row),
            zone: ctx.grid.utm_zone,
            x_km,
            y_km,
            year: Some(last_modified.year()),
        };
        template::expand(template, &vars).map_err(|e| MetadataError::Document(e.to_string()))
    }
}

/// Reconciled catalogue entry of one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileMetadataEntry {
    /// Tile key.
    pub tile: TileIndex,
    /// Canonical tile name.
    pub tile_name: String,
    /// Where to download the tile.
    pub download_url: String,
    /// Last-modified date announced by the feed.
    pub last_modified: NaiveDate,
    /// Published SHA-256, lower-case hex.
    pub checksum: Option<String>,
    /// Published size in bytes.
    pub size: Option<u64>,
}

/// Counters of a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    /// Documents fetched.
    pub documents: usize,
    /// Rows that produced an entry (before de-duplication).
    pub parsed_rows: usize,
    /// Rows skipped as malformed.
    pub malformed_rows: usize,
    /// Rows superseded by another row for the same tile.
    pub duplicates: usize,
    /// Per-tile documents lost to fetch errors other than "not found".
    pub failed_documents: usize,
}

/// Tile-indexed catalogue of one state.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    entries: BTreeMap<TileIndex, TileMetadataEntry>,
    /// How the index came about.
    pub stats: FeedStats,
}

impl MetadataIndex {
    /// Entry of `tile`, if the feed knows it.
    pub fn get(&self, tile: &TileIndex) -> Option<&TileMetadataEntry> {
        self.entries.get(tile)
    }

    /// Number of tiles in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in tile order.
    pub fn entries(&self) -> impl Iterator<Item = &TileMetadataEntry> {
        self.entries.values()
    }

    /// Insert `entry`; the later `last_modified` wins, ties keep the first.
    ///
    /// Returns `true` when `entry` was stored.
    pub fn insert(&mut self, entry: TileMetadataEntry) -> bool {
        match self.entries.get(&entry.tile) {
            Some(existing) if existing.last_modified >= entry.last_modified => false,
            _ => {
                self.entries.insert(entry.tile, entry);
                true
            }
        }
    }
}

impl FromIterator<TileMetadataEntry> for MetadataIndex {
    fn from_iter<I: IntoIterator<Item = TileMetadataEntry>>(iter: I) -> Self {
        let mut index = MetadataIndex::default();
        for entry in iter {
            index.insert(entry);
        }
        index
    }
}

/// Turns a state's feed into a [`MetadataIndex`].
pub struct Reconciler {
    fetcher: FeedFetcher,
}

impl Reconciler {
    /// Create a reconciler using `fetcher` for all documents.
    pub fn new(fetcher: FeedFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch, parse and normalize a state's feed.
    pub fn reconcile(
        &self,
        adapter: &dyn StateAdapter,
        ctx: &FeedContext<'_>,
    ) -> Result<MetadataIndex, MetadataError> {
        let state = ctx.grid.state;
        let FetchedFeed { documents, failed } = adapter.fetch_documents(ctx, &self.fetcher)?;

        let mut index = MetadataIndex::default();
        index.stats.documents = documents.len();
        index.stats.failed_documents = failed.len();
        if !failed.is_empty() {
            warn!(state = %state, failed = failed.len(), "Some metadata documents could not be fetched");
        }

        for doc in &documents {
            let parsed = adapter.parse(ctx, doc)?;
            index.stats.malformed_rows += parsed.malformed;

            for record in parsed.records {
                let Some((col, row)) = adapter.resolve_key(ctx.grid, &record.tile_key) else {
                    debug!(state = %state, key = %record.tile_key, "Feed key does not resolve to a tile");
                    index.stats.malformed_rows += 1;
                    continue;
                };
                let download_url = match record.download_url {
                    Some(url) => url,
                    None => match adapter.build_download_url(ctx, col, row, record.last_modified) {
                        Ok(url) => url,
                        Err(e @ MetadataError::MissingLink(_)) => return Err(e),
                        Err(e) => {
                            warn!(state = %state, key = %record.tile_key, error = %e, "Cannot build download URL");
                            index.stats.malformed_rows += 1;
                            continue;
                        }
                    },
                };
                index.stats.parsed_rows += 1;
                index.insert(TileMetadataEntry {
                    tile: ctx.grid.index(col, row),
                    tile_name: ctx.grid.tile_name(col, row),
                    download_url,
                    last_modified: record.last_modified,
                    checksum: record.checksum.map(|c| c.to_ascii_lowercase()),
                    size: record.size,
                });
            }
        }
        index.stats.duplicates = index.stats.parsed_rows - index.len();

        if index.stats.parsed_rows == 0 && index.stats.malformed_rows > 0 {
            return Err(MetadataError::Unparseable {
                parsed_rows: 0,
                malformed_rows: index.stats.malformed_rows,
            });
        }

        info!(
            state = %state,
            tiles = index.len(),
            documents = index.stats.documents,
            malformed = index.stats.malformed_rows,
            duplicates = index.stats.duplicates,
            failed_documents = index.stats.failed_documents,
            "Reconciled metadata feed"
        );
        Ok(index)
    }
}
