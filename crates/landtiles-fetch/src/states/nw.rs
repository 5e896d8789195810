//! Nordrhein-Westfalen: zipped semicolon CSV with five preamble lines and the
//! columns `Kachelname` and `Aktualitaet`.
//!
//! Tile names embed the key (`dgm1_32_350_5600_1_nw`); the image-based DSM
//! drops the first separator (`32350_5600`). DTM dates are months only and
//! are dated the 15th.

use super::DelimitedTable;
use crate::{FeedContext, FeedDocument, FeedRecord, MetadataError, ParsedFeed, StateAdapter};
use landtiles_core::dates::{parse_feed_date, parse_feed_date_with_day};
use landtiles_core::{DataType, StateCode, TileGridSpec};
use std::io::{Cursor, Read};

const PREAMBLE_LINES: usize = 5;
const MID_MONTH: u32 = 15;

/// Adapter for the OpenGeodata.NRW listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NwAdapter;

impl NwAdapter {
    /// Extract the listing from the feed archive. Plain CSV passes through.
    fn listing(doc: &FeedDocument) -> Result<String, MetadataError> {
        if !doc.body.starts_with(b"PK") {
            return Ok(String::from_utf8_lossy(&doc.body).into_owned());
        }
        let mut archive = zip::ZipArchive::new(Cursor::new(doc.body.as_slice()))
            .map_err(|e| MetadataError::Document(format!("{}: {e}", doc.url)))?;
        if archive.len() == 0 {
            return Err(MetadataError::Document(format!("{}: empty archive", doc.url)));
        }
        let mut file = archive
            .by_index(0)
            .map_err(|e| MetadataError::Document(format!("{}: {e}", doc.url)))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|e| MetadataError::Document(format!("{}: {e}", doc.url)))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl StateAdapter for NwAdapter {
    fn state(&self) -> StateCode {
        StateCode::Nw
    }

    fn parse(&self, ctx: &FeedContext<'_>, doc: &FeedDocument) -> Result<ParsedFeed, MetadataError> {
        let text = Self::listing(doc)?;
        let table = DelimitedTable::parse(&text, ';', PREAMBLE_LINES)
            .ok_or_else(|| MetadataError::Document(format!("{} is empty", doc.url)))?;
        let (Some(key_col), Some(date_col)) =
            (table.column(&["Kachelname"]), table.column(&["Aktualitaet"]))
        else {
            return Err(MetadataError::Document(format!(
                "{} lacks Kachelname/Aktualitaet columns",
                doc.url
            )));
        };

        let monthly = ctx.data_type() == DataType::Dtm;
        let mut parsed = ParsedFeed::default();
        for (_, fields) in &table.rows {
            let key = fields.get(key_col).filter(|k| !k.is_empty());
            let date = fields.get(date_col).and_then(|d| {
                if monthly {
                    parse_feed_date_with_day(d, MID_MONTH)
                } else {
                    parse_feed_date(d)
                }
            });
            match (key, date) {
                (Some(key), Some(date)) => parsed.records.push(FeedRecord::new(*key, date)),
                _ => parsed.malformed += 1,
            }
        }
        Ok(parsed)
    }

    fn download_key(&self, grid: &TileGridSpec, col: i64, row: i64) -> String {
        let name = grid.tile_name(col, row);
        if grid.data_type == DataType::Dsm {
            name.replacen('_', "", 1)
        } else {
            name
        }
    }
}
