//! End-to-end pipeline runs against a fake transport.

mod common;

use common::{file_set, nw_listing, write, FakeTransport, ORIGIN_AOI};
use landtiles_core::{DataType, RunConfig, SourcesConfig, StateCode};
use landtiles_fetch::{
    AdapterRegistry, CancelToken, DirectoryStore, ErrorKind, FetchError, Orchestrator, ResponseBody,
    StateStatus, TileStatus, Transport,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NW_META: &str = "https://nw.example/dgm1_meta.zip";
const NW_TILE: &str = "https://nw.example/dgm1_32_000_0000.tif";
const BB_META: &str = "https://bb.example/dgm_meta.csv";
const BB_TILE: &str = "https://bb.example/dgm_32000-0000.tif";

fn sources() -> SourcesConfig {
    serde_json::from_value(json!({
        "DTM": {
            "NW": {
                "tile_info": {"tile_size": 1000, "x": 0, "y": 0},
                "links": {
                    "download_link": "https://nw.example/dgm1_{tile}.tif",
                    "meta_data_link": NW_META,
                    "s3_path": "dtm/nw/"
                }
            },
            "BB": {
                "tile_info": {"tile_size": 1000, "x": 0, "y": 0, "utm_zone": 32},
                "links": {
                    "download_link": "https://bb.example/dgm_{}.tif",
                    "meta_data_link": BB_META
                }
            },
            "HE": null
        }
    }))
    .unwrap()
}

fn config(dir: &Path, states: &[&str], extra: serde_json::Value) -> RunConfig {
    let aoi = write(dir, "aoi.geojson", ORIGIN_AOI);
    let mut value = json!({
        "geojson_path": aoi,
        "data_type": "DTM",
        "selected_states": states,
        "meta_path": dir.join("meta/report.json"),
        "local_landing_path": dir.join("landing"),
        "date_range": {"begin": "2020-01-01", "end": "2020-12-31"},
        "workers": 2,
        "retry": {"max_attempts": 3, "initial_backoff_ms": 0, "max_backoff_ms": 0}
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (key, v) in extra {
            base.insert(key.clone(), v.clone());
        }
    }
    serde_json::from_value(value).unwrap()
}

fn nw_transport() -> Arc<FakeTransport> {
    let transport = Arc::new(FakeTransport::new());
    transport.serve(NW_META, nw_listing(&[("dgm1_32_000_0000_1_nw", "2020-05"), ("dgm1_32_001_0000_1_nw", "2020-05")]));
    transport.serve(NW_TILE, b"elevation".to_vec());
    transport
}

#[test]
fn test_origin_tile_downloads_once_then_skips() {
    let dir = tempfile::tempdir().unwrap();
    let transport = nw_transport();
    let landing = dir.path().join("landing");

    let first = Orchestrator::new(config(dir.path(), &["NW"], json!({})), sources(), transport.clone())
        .run()
        .unwrap();
    let nw = first.state(StateCode::Nw).unwrap();
    assert_eq!(nw.status, StateStatus::Completed);
    assert_eq!(nw.candidates, 1);
    assert_eq!(nw.counts.downloaded, 1);
    assert_eq!(nw.tiles[0].tile_name, "32_000_0000");
    assert_eq!(nw.tiles[0].last_modified.unwrap().to_string(), "2020-05-15");
    let files_after_first = file_set(&landing);
    assert_eq!(
        files_after_first,
        vec![
            "nw/dtm_32_000_0000/dgm1_32_000_0000.tif".to_string(),
            "nw/dtm_32_000_0000/tile.json".to_string(),
        ]
    );

    let second = Orchestrator::new(config(dir.path(), &["NW"], json!({})), sources(), transport.clone())
        .run()
        .unwrap();
    let nw = second.state(StateCode::Nw).unwrap();
    assert_eq!(nw.counts.downloaded, 0);
    assert_eq!(nw.counts.skipped, 1);
    assert_eq!(nw.tiles[0].status, TileStatus::Skipped);
    assert_eq!(transport.hits(NW_TILE), 1, "second run must not download again");
    assert_eq!(file_set(&landing), files_after_first);
    assert!(dir.path().join("meta/report.json").is_file());
}

#[test]
fn test_failing_feed_only_affects_its_state() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::new());
    transport.fail(NW_META, 503);
    transport.serve(BB_META, "sheetnr;creationdate\n32000-0000;2020-06-30\n");
    transport.serve(BB_TILE, b"brandenburg".to_vec());

    let report = Orchestrator::new(config(dir.path(), &["NW", "BB"], json!({})), sources(), transport.clone())
        .run()
        .unwrap();

    assert_eq!(transport.hits(NW_META), 3, "feed retried up to max_attempts");
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.status, StateStatus::MetadataUnavailable);
    assert!(nw.tiles.is_empty());
    let bb = report.state(StateCode::Bb).unwrap();
    assert_eq!(bb.status, StateStatus::Completed);
    assert_eq!(bb.counts.downloaded, 1);
    assert!(report.has_fatal_failures());
}

#[test]
fn test_date_range_and_unavailable_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::new());
    transport.serve(NW_META, nw_listing(&[("dgm1_32_000_0000_1_nw", "2019-12")]));

    let report = Orchestrator::new(config(dir.path(), &["NW"], json!({})), sources(), transport.clone())
        .run()
        .unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.counts.filtered, 1);
    assert_eq!(transport.hits(NW_TILE), 0);

    transport.serve(NW_META, nw_listing(&[("dgm1_32_005_0005_1_nw", "2020-05")]));
    let report = Orchestrator::new(config(dir.path(), &["NW"], json!({})), sources(), transport)
        .run()
        .unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.counts.unavailable, 1);
    assert_eq!(nw.counts.failed, 0, "missing metadata is never a failure");
}

#[test]
fn test_tile_failures_are_listed_with_kind() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::new());
    transport.serve(NW_META, nw_listing(&[("dgm1_32_000_0000_1_nw", "2020-05")]));
    transport.fail(NW_TILE, 502);

    let report = Orchestrator::new(config(dir.path(), &["NW"], json!({})), sources(), transport.clone())
        .run()
        .unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.counts.failed, 1);
    assert_eq!(nw.tiles[0].error.as_ref().unwrap().kind, ErrorKind::TransientFetch);
    assert_eq!(transport.hits(NW_TILE), 3);
    assert!(!report.has_fatal_failures(), "tile failures alone keep the exit status");
    assert!(report.to_string().contains("FAILED 32_000_0000 [transient fetch error]"));
    assert!(file_set(&dir.path().join("landing")).is_empty());
}

#[test]
fn test_plan_only_and_unconfigured_states() {
    let dir = tempfile::tempdir().unwrap();
    let transport = nw_transport();
    let config = config(dir.path(), &["NW", "HE", "SN"], json!({"download": false}));

    let report = Orchestrator::new(config, sources(), transport.clone()).run().unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.status, StateStatus::Planned);
    assert_eq!(nw.counts.planned, 1);
    assert_eq!(transport.hits(NW_TILE), 0);
    assert_eq!(report.state(StateCode::He).unwrap().status, StateStatus::NotConfigured);
    assert_eq!(report.state(StateCode::Sn).unwrap().status, StateStatus::NotConfigured);
}

#[test]
fn test_state_without_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let transport = nw_transport();
    let report = Orchestrator::new(config(dir.path(), &["NW"], json!({})), sources(), transport.clone())
        .with_registry(AdapterRegistry::empty())
        .run()
        .unwrap();
    assert_eq!(report.state(StateCode::Nw).unwrap().status, StateStatus::NoAdapter);
    assert_eq!(transport.hits(NW_META), 0);
}

#[test]
fn test_upload_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let bucket = tempfile::tempdir().unwrap();
    let transport = nw_transport();
    let config = config(dir.path(), &["NW"], json!({"upload_s3": true, "delete": true}));

    let report = Orchestrator::new(config, sources(), transport)
        .with_store(Arc::new(DirectoryStore::new(bucket.path())))
        .run()
        .unwrap();
    let tile = &report.state(StateCode::Nw).unwrap().tiles[0];
    assert_eq!(tile.status, TileStatus::Success);
    assert_eq!(tile.stored, vec!["dtm/nw/dtm_32_000_0000/dgm1_32_000_0000.tif".to_string()]);
    assert_eq!(
        file_set(&dir.path().join("landing")),
        vec!["nw/dtm_32_000_0000/tile.json".to_string()]
    );
    assert!(bucket.path().join("dtm/nw/dtm_32_000_0000/dgm1_32_000_0000.tif").is_file());
}

#[test]
fn test_configuration_errors_before_network() {
    let dir = tempfile::tempdir().unwrap();
    let transport = nw_transport();

    let upload = config(dir.path(), &["NW"], json!({"upload_s3": true}));
    let result = Orchestrator::new(upload, sources(), transport.clone()).run();
    assert!(result.is_err(), "upload_s3 without a store");

    let mut missing_aoi = config(dir.path(), &["NW"], json!({}));
    missing_aoi.aoi_path = dir.path().join("missing.geojson");
    assert!(Orchestrator::new(missing_aoi, sources(), transport.clone()).run().is_err());

    assert_eq!(transport.hits(NW_META), 0);
}

#[test]
fn test_cancelled_run_downloads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let transport = nw_transport();
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = Orchestrator::new(config(dir.path(), &["NW"], json!({})), sources(), transport.clone())
        .with_cancel_token(cancel)
        .run()
        .unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.status, StateStatus::Cancelled);
    assert_eq!(nw.counts.failed, 1);
    assert_eq!(nw.tiles[0].error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    assert!(report.cancelled);
    assert_eq!(transport.hits(NW_META), 0);
    assert_eq!(report.data_type, DataType::Dtm);
}

#[test]
fn test_report_path_directory_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let transport = nw_transport();
    let mut config = config(dir.path(), &["NW"], json!({}));
    std::fs::create_dir_all(dir.path().join("taken")).unwrap();
    config.meta_path = dir.path().join("taken");

    assert!(Orchestrator::new(config, sources(), transport.clone()).run().is_err());
    assert_eq!(transport.hits(NW_META), 0);
    assert_eq!(transport.hits(NW_TILE), 0);
}

/// Replaces the report file with a directory while the tile is transferred.
struct ReportClobber {
    inner: Arc<FakeTransport>,
    report: PathBuf,
}

impl Transport for ReportClobber {
    fn open(&self, url: &str) -> Result<ResponseBody, FetchError> {
        if url == NW_TILE {
            let _ = std::fs::remove_file(&self.report);
            std::fs::create_dir_all(&self.report).unwrap();
        }
        self.inner.open(url)
    }
}

#[test]
fn test_report_write_failure_keeps_run_result() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["NW"], json!({}));
    let transport = Arc::new(ReportClobber {
        inner: nw_transport(),
        report: config.meta_path.clone(),
    });

    let report = Orchestrator::new(config, sources(), transport).run().unwrap();
    assert_eq!(report.state(StateCode::Nw).unwrap().counts.downloaded, 1);
    assert!(report.write_error.is_some());
    assert!(!report.has_fatal_failures());
    assert!(report.to_string().contains("Report not written"));
}
