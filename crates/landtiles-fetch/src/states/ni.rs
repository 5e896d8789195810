//! Niedersachsen: one GeoJSON tile index listing every tile with its date and
//! a direct download link per product.
//!
//! Tiles are keyed by `tile_id` in the compact form `323505600`; the links
//! sit in `rgbi` (DOP), `bdom` (DSM) and `dgm1` (DTM).

use crate::metadata::feed_unavailable;
use crate::{
    FeedContext, FeedDocument, FeedFetcher, FeedRecord, FetchedFeed, MetadataError, ParsedFeed,
    StateAdapter,
};
use landtiles_core::dates::parse_feed_date;
use landtiles_core::{DataType, StateCode};
use serde_json::Value;

/// Feature property holding the download link of `data_type`.
fn link_property(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Dop => "rgbi",
        DataType::Dsm => "bdom",
        DataType::Dtm => "dgm1",
    }
}

fn text(props: &Value, name: &str) -> Option<String> {
    props
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Adapter for the LGLN tile index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiAdapter;

impl StateAdapter for NiAdapter {
    fn state(&self) -> StateCode {
        StateCode::Ni
    }

    /// The index is served from `meta_data_link`, or from `download_link`
    /// when the source entry only names the index.
    fn fetch_documents(
        &self,
        ctx: &FeedContext<'_>,
        fetcher: &FeedFetcher,
    ) -> Result<FetchedFeed, MetadataError> {
        let url = match ctx.meta_data_link() {
            Ok(url) => url,
            Err(_) => ctx
                .entry
                .links
                .download_link
                .as_deref()
                .ok_or(MetadataError::MissingLink("meta_data_link"))?,
        };
        fetcher
            .fetch(url, None)
            .map(|doc| vec![doc].into())
            .map_err(feed_unavailable)
    }

    fn parse(&self, ctx: &FeedContext<'_>, doc: &FeedDocument) -> Result<ParsedFeed, MetadataError> {
        let json: Value = serde_json::from_slice(&doc.body)
            .map_err(|e| MetadataError::Document(format!("{}: {e}", doc.url)))?;
        let features = json
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| MetadataError::Document(format!("{}: no features", doc.url)))?;

        let link = link_property(ctx.data_type());
        let mut parsed = ParsedFeed::default();
        for props in features.iter().map(|f| f.get("properties").unwrap_or(&Value::Null)) {
            let key = text(props, "tile_id");
            let date = text(props, "Aktualitaet").and_then(|d| parse_feed_date(&d));
            let url = text(props, link);
            match (key, date, url) {
                (Some(key), Some(date), Some(url)) => {
                    let mut record = FeedRecord::new(key, date);
                    record.download_url = Some(url);
                    parsed.records.push(record);
                }
                _ => parsed.malformed += 1,
            }
        }
        Ok(parsed)
    }
}
