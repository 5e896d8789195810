//! Baden-Württemberg: WFS `GetFeature` request returning GeoJSON.

use crate::metadata::feed_unavailable;
use crate::{
    FeedContext, FeedDocument, FeedFetcher, FeedRecord, FetchedFeed, MetadataError, ParsedFeed,
    StateAdapter,
};
use landtiles_core::dates::parse_feed_date;
use landtiles_core::{DataType, StateCode};
use serde_json::Value;
use url::Url;

/// WFS layer and attribute names of one product.
struct Layer {
    type_name: &'static str,
    version: &'static str,
    key_property: &'static str,
    date_property: &'static str,
}

const DTM_LAYER: Layer = Layer {
    type_name: "verm:v_dgm_kacheln_als_2_2016_2021",
    version: "2.0.0",
    key_property: "dgm_kachel",
    date_property: "fortfuehrungsdatum",
};

const DOP_LAYER: Layer = Layer {
    type_name: "verm:v_dop_20_bildflugkacheln",
    version: "1.1.0",
    key_property: "dop_kachel",
    date_property: "befliegungsdatum",
};

fn layer(data_type: DataType) -> &'static Layer {
    match data_type {
        DataType::Dtm => &DTM_LAYER,
        DataType::Dsm | DataType::Dop => &DOP_LAYER,
    }
}

/// Adapter for the LGL tile index WFS.
#[derive(Debug, Clone, Copy, Default)]
pub struct BwAdapter;

impl BwAdapter {
    /// `GetFeature` URL of the product's tile layer.
    pub fn request_url(base: &str, data_type: DataType) -> Result<String, MetadataError> {
        let layer = layer(data_type);
        let url = Url::parse_with_params(
            base,
            &[
                ("service", "WFS"),
                ("version", layer.version),
                ("request", "GetFeature"),
                ("typeName", layer.type_name),
                ("outputFormat", "json"),
            ],
        )
        .map_err(|e| MetadataError::Document(format!("invalid WFS URL {base}: {e}")))?;
        Ok(url.into())
    }
}

/// Attribute value as text; epoch-millisecond dates arrive as numbers.
fn property_text(props: &Value, name: &str) -> Option<String> {
    match props.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl StateAdapter for BwAdapter {
    fn state(&self) -> StateCode {
        StateCode::Bw
    }

    fn fetch_documents(
        &self,
        ctx: &FeedContext<'_>,
        fetcher: &FeedFetcher,
    ) -> Result<FetchedFeed, MetadataError> {
        let url = Self::request_url(ctx.meta_data_link()?, ctx.data_type())?;
        fetcher
            .fetch(&url, None)
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

        let layer = layer(ctx.data_type());
        let mut parsed = ParsedFeed::default();
        for feature in features {
            let Some(props) = feature.get("properties") else {
                parsed.malformed += 1;
                continue;
            };
            let key = property_text(props, layer.key_property);
            let date = property_text(props, layer.date_property).and_then(|d| parse_feed_date(&d));
            match (key, date) {
                (Some(key), Some(date)) => parsed.records.push(FeedRecord::new(key, date)),
                _ => parsed.malformed += 1,
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use landtiles_core::{SourceEntry, SourceLinks, TileGridSpec, TileInfo};

    fn fixtures(data_type: DataType) -> (TileGridSpec, SourceEntry) {
        let grid = TileGridSpec::new(StateCode::Bw, data_type, 1000.0, 0.0, 0.0, 32).unwrap();
        let entry = SourceEntry {
            tile_info: TileInfo {
                tile_size: 1000.0,
                x: 0.0,
                y: 0.0,
                utm_zone: None,
                extent: None,
            },
            links: SourceLinks {
                download_link: Some("https://opengeodata.lgl-bw.de/dop20rgb_{}.zip".to_string()),
                meta_data_link: Some("https://owsproxy.lgl-bw.de/owsproxy/wfs/WFS_LGL-BW_ATKIS".to_string()),
                s3_path: None,
            },
        };
        (grid, entry)
    }

    #[test]
    fn test_request_url_per_product() {
        let url = BwAdapter::request_url("https://wfs.example/ows", DataType::Dtm).unwrap();
        assert!(url.starts_with("https://wfs.example/ows?service=WFS&version=2.0.0&request=GetFeature"));
        assert!(url.contains("typeName=verm%3Av_dgm_kacheln_als_2_2016_2021"));
        let url = BwAdapter::request_url("https://wfs.example/ows", DataType::Dop).unwrap();
        assert!(url.contains("version=1.1.0"));
        assert!(BwAdapter::request_url("not a url", DataType::Dop).is_err());
    }

    #[test]
    fn test_parse_features() {
        let (grid, entry) = fixtures(DataType::Dop);
        let ctx = FeedContext { grid: &grid, entry: &entry, candidates: &[] };
        let doc = FeedDocument {
            url: "wfs".to_string(),
            key_hint: None,
            body: br#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"dop_kachel": "324805400", "befliegungsdatum": "2022-07-12Z"}},
                {"type": "Feature", "properties": {"dop_kachel": "324815400", "befliegungsdatum": 1657584000000}},
                {"type": "Feature", "properties": {"dop_kachel": "324825400"}}
            ]}"#
            .to_vec(),
        };
        let parsed = BwAdapter.parse(&ctx, &doc).unwrap();
        assert_eq!(parsed.malformed, 1);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].last_modified, NaiveDate::from_ymd_opt(2022, 7, 12).unwrap());
        assert_eq!(parsed.records[1].last_modified, NaiveDate::from_ymd_opt(2022, 7, 12).unwrap());
        assert_eq!(BwAdapter.resolve_key(&grid, "324805400"), Some((480, 5400)));
    }

    #[test]
    fn test_not_json() {
        let (grid, entry) = fixtures(DataType::Dtm);
        let ctx = FeedContext { grid: &grid, entry: &entry, candidates: &[] };
        let doc = FeedDocument {
            url: "wfs".to_string(),
            key_hint: None,
            body: b"<ExceptionReport/>".to_vec(),
        };
        assert!(matches!(BwAdapter.parse(&ctx, &doc), Err(MetadataError::Document(_))));
    }
}
