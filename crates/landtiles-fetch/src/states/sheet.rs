//! Brandenburg and Berlin: semicolon CSV listing with `sheetnr` and
//! `creationdate` columns. Sheet numbers look like `33250-5886`.

use super::DelimitedTable;
use crate::{FeedContext, FeedDocument, FeedRecord, MetadataError, ParsedFeed, StateAdapter};
use landtiles_core::dates::parse_feed_date;
use landtiles_core::{StateCode, TileGridSpec};

/// Adapter for the sheet listings of the LGB (Brandenburg) and Berlin.
#[derive(Debug, Clone, Copy)]
pub struct SheetCsvAdapter {
    state: StateCode,
}

impl SheetCsvAdapter {
    /// Adapter for `state`.
    pub fn new(state: StateCode) -> Self {
        Self { state }
    }
}

impl StateAdapter for SheetCsvAdapter {
    fn state(&self) -> StateCode {
        self.state
    }

    fn parse(&self, _ctx: &FeedContext<'_>, doc: &FeedDocument) -> Result<ParsedFeed, MetadataError> {
        let text = String::from_utf8_lossy(&doc.body);
        let table = DelimitedTable::parse(&text, ';', 0)
            .ok_or_else(|| MetadataError::Document(format!("{} is empty", doc.url)))?;
        let (Some(key_col), Some(date_col)) = (
            table.column(&["sheetnr", "tile_nr"]),
            table.column(&["creationdate"]),
        ) else {
            return Err(MetadataError::Document(format!(
                "{} lacks sheetnr/creationdate columns",
                doc.url
            )));
        };

        let mut parsed = ParsedFeed::default();
        for (_, fields) in &table.rows {
            let key = fields.get(key_col).filter(|k| !k.is_empty());
            let date = fields.get(date_col).and_then(|d| parse_feed_date(d));
            match (key, date) {
                (Some(key), Some(date)) => parsed.records.push(FeedRecord::new(*key, date)),
                _ => parsed.malformed += 1,
            }
        }
        Ok(parsed)
    }

    fn download_key(&self, grid: &TileGridSpec, col: i64, row: i64) -> String {
        let (x_km, y_km) = grid.corner_km(col, row);
        format!("{}{:03}-{:04}", grid.utm_zone, x_km, y_km)
    }
}
