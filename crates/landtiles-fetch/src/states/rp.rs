//! Rheinland-Pfalz: one ISO 19139 XML document per tile.
//!
//! The metadata link is a template filled with the tile's key, `350_5600`
//! for the DTM and `3505600` for the other products. DTM documents carry
//! the date in `<gco:DateTime>`, the others in `<Date>`.

use crate::template::{self, TemplateVars};
use crate::{
    FeedContext, FeedDocument, FeedFetcher, FeedRecord, FetchError, FetchedFeed, MetadataError,
    ParsedFeed, StateAdapter,
};
use landtiles_core::dates::parse_feed_date;
use landtiles_core::{DataType, StateCode, TileGridSpec};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

fn datetime_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<gco:DateTime>\s*([^<]+?)\s*</gco:DateTime>").expect("valid pattern"))
}

fn date_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<Date>\s*([^<]+?)\s*</Date>").expect("valid pattern"))
}

/// Adapter for the per-tile metadata of the LVermGeo.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpAdapter;

impl RpAdapter {
    /// Key of a tile in the metadata link.
    pub fn meta_key(grid: &TileGridSpec, col: i64, row: i64) -> String {
        let (x_km, y_km) = grid.corner_km(col, row);
        match grid.data_type {
            DataType::Dtm => format!("{x_km:03}_{y_km:04}"),
            DataType::Dsm | DataType::Dop => format!("{x_km:03}{y_km:04}"),
        }
    }
}

impl StateAdapter for RpAdapter {
    fn state(&self) -> StateCode {
        StateCode::Rp
    }

    fn fetch_documents(
        &self,
        ctx: &FeedContext<'_>,
        fetcher: &FeedFetcher,
    ) -> Result<FetchedFeed, MetadataError> {
        let link = ctx.meta_data_link()?;
        let mut feed = FetchedFeed {
            documents: Vec::with_capacity(ctx.candidates.len()),
            failed: Vec::new(),
        };
        let mut last_error = None;

        for tile in ctx.candidates {
            let tile_name = ctx.grid.tile_name(tile.col, tile.row);
            let (x_km, y_km) = ctx.grid.corner_km(tile.col, tile.row);
            let vars = TemplateVars {
                tile: tile_name.clone(),
                key: Self::meta_key(ctx.grid, tile.col, tile.row),
                zone: ctx.grid.utm_zone,
                x_km,
                y_km,
                year: None,
            };
            let url = template::expand(link, &vars).map_err(|e| MetadataError::Document(e.to_string()))?;

            match fetcher.fetch(&url, Some(tile_name)) {
                Ok(doc) => feed.documents.push(doc),
                Err(FetchError::Cancelled) => return Err(MetadataError::Cancelled),
                Err(FetchError::Status { status: 404, .. }) => {
                    debug!(url = %url, "No metadata document for tile");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to fetch tile metadata");
                    feed.failed.push(url);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if feed.documents.is_empty() => Err(MetadataError::Unavailable(e)),
            _ => Ok(feed),
        }
    }

    fn parse(&self, ctx: &FeedContext<'_>, doc: &FeedDocument) -> Result<ParsedFeed, MetadataError> {
        let key = doc
            .key_hint
            .clone()
            .ok_or_else(|| MetadataError::Document(format!("{}: document without tile", doc.url)))?;
        let text = String::from_utf8_lossy(&doc.body);
        let tag = match ctx.data_type() {
            DataType::Dtm => datetime_tag(),
            DataType::Dsm | DataType::Dop => date_tag(),
        };
        let date = tag
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_feed_date(m.as_str()));

        let mut parsed = ParsedFeed::default();
        match date {
            Some(date) => parsed.records.push(FeedRecord::new(key, date)),
            None => parsed.malformed += 1,
        }
        Ok(parsed)
    }
}
