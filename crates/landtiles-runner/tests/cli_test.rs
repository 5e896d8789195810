//! End-to-end runs of the CLI against a local mirror (`file://` sources).

use clap::Parser;
use landtiles_core::StateCode;
use landtiles_fetch::{CancelToken, StateStatus, TileStatus};
use landtiles_runner::{execute, exit_code, Cli, EXIT_CONFIG_ERROR, EXIT_METADATA_FAILURE};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

struct Mirror {
    dir: tempfile::TempDir,
}

impl Mirror {
    /// Mirror with an NW DTM listing for the origin tile and the tile itself,
    /// plus a BB entry whose feed is missing.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("nw")).unwrap();
        fs::write(
            root.join("nw/dgm1_meta.csv"),
            "Metadaten\nDGM1\n\nGeobasis NRW\n---\nKachelname;Aktualitaet\ndgm1_32_000_0000_1_nw;2021-03\n",
        )
        .unwrap();
        fs::write(root.join("nw/dgm1_32_000_0000_1_nw_2021.tif"), b"elevation").unwrap();

        fs::write(
            root.join("aoi.geojson"),
            r#"{"type": "Feature", "crs": {"type": "name", "properties": {"name": "EPSG:25832"}},
                "properties": {}, "geometry": {"type": "Polygon",
                "coordinates": [[[200, 200], [800, 200], [800, 800], [200, 800], [200, 200]]]}}"#,
        )
        .unwrap();

        let url = |p: &str| format!("file://{}/{}", root.display(), p);
        let sources = format!(
            "DTM:\n  NW:\n    tile_info: {{ tile_size: 1000, x: 0, y: 0 }}\n    links:\n      download_link: \"{}\"\n      meta_data_link: \"{}\"\n  BB:\n    tile_info: {{ tile_size: 1000, x: 0, y: 0, utm_zone: 32 }}\n    links:\n      download_link: \"{}\"\n      meta_data_link: \"{}\"\n",
            url("nw/dgm1_{}_1_nw_{}.tif"),
            url("nw/dgm1_meta.csv"),
            url("bb/dgm_{}.tif"),
            url("bb/missing.csv"),
        );
        fs::write(root.join("sources.yaml"), sources).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn init(&self, states: &str) -> PathBuf {
        let content = format!(
            "geojson_path: {}\ndata_type: DTM\nselected_states: [{}]\nmeta_path: {}\nlocal_landing_path: {}\nretry: {{ max_attempts: 2, initial_backoff_ms: 0, max_backoff_ms: 0 }}\n",
            self.path("aoi.geojson").display(),
            states,
            self.path("out/report.json").display(),
            self.path("landing").display(),
        );
        let path = self.path("init.yaml");
        fs::write(&path, content).unwrap();
        path
    }
}

fn cli(args: &[&str], init: &Path, sources: &Path) -> Cli {
    let init = init.display().to_string();
    let sources = sources.display().to_string();
    let mut argv = vec!["landtiles"];
    argv.extend_from_slice(&args[..1]);
    argv.extend(["--init", init.as_str(), "--sources", sources.as_str()]);
    argv.extend_from_slice(&args[1..]);
    Cli::parse_from(argv)
}

#[test]
fn test_run_from_local_mirror_is_idempotent() {
    let mirror = Mirror::new();
    let init = mirror.init("NW");
    let sources = mirror.path("sources.yaml");

    let result = execute(&cli(&["run"], &init, &sources), &CancelToken::new());
    assert_eq!(exit_code(&result), ExitCode::SUCCESS);
    let report = result.unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.counts.downloaded, 1, "{report}");
    let tile = mirror.path("landing/nw/dtm_32_000_0000/dgm1_32_000_0000_1_nw_2021.tif");
    assert_eq!(fs::read(&tile).unwrap(), b"elevation");

    let report = execute(&cli(&["run"], &init, &sources), &CancelToken::new()).unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.counts.downloaded, 0);
    assert_eq!(nw.counts.skipped, 1);

    let written: serde_json::Value =
        serde_json::from_slice(&fs::read(mirror.path("out/report.json")).unwrap()).unwrap();
    assert_eq!(written["states"][0]["tiles"][0]["status"], "skipped");
}

#[test]
fn test_missing_feed_sets_exit_status() {
    let mirror = Mirror::new();
    let init = mirror.init("NW, BB");
    let sources = mirror.path("sources.yaml");

    let result = execute(&cli(&["run"], &init, &sources), &CancelToken::new());
    assert_eq!(exit_code(&result), ExitCode::from(EXIT_METADATA_FAILURE));
    let report = result.unwrap();
    assert_eq!(report.state(StateCode::Bb).unwrap().status, StateStatus::MetadataUnavailable);
    assert_eq!(report.state(StateCode::Nw).unwrap().counts.downloaded, 1);
}

#[test]
fn test_plan_and_store_dir() {
    let mirror = Mirror::new();
    let init = mirror.init("NW");
    let sources = mirror.path("sources.yaml");

    let report = execute(&cli(&["plan"], &init, &sources), &CancelToken::new()).unwrap();
    let nw = report.state(StateCode::Nw).unwrap();
    assert_eq!(nw.tiles[0].status, TileStatus::Planned);
    assert!(!mirror.path("landing/nw/dtm_32_000_0000").exists());

    let bucket = mirror.path("bucket");
    let bucket_arg = bucket.display().to_string();
    let report = execute(
        &cli(&["run", "--store-dir", &bucket_arg], &init, &sources),
        &CancelToken::new(),
    )
    .unwrap();
    let tile = &report.state(StateCode::Nw).unwrap().tiles[0];
    assert_eq!(tile.stored, vec!["dtm_32_000_0000/dgm1_32_000_0000_1_nw_2021.tif".to_string()]);
    assert!(bucket.join("dtm_32_000_0000/dgm1_32_000_0000_1_nw_2021.tif").is_file());
}

#[test]
fn test_bad_init_file() {
    let mirror = Mirror::new();
    let init = mirror.path("broken.yaml");
    fs::write(&init, "data_type: [not, a, type]\n").unwrap();
    let result = execute(&cli(&["run"], &init, &mirror.path("sources.yaml")), &CancelToken::new());
    assert_eq!(exit_code(&result), ExitCode::from(EXIT_CONFIG_ERROR));
}
