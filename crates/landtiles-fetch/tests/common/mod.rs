//! Shared fixtures for the pipeline tests.

#![allow(dead_code)]

use landtiles_fetch::{FetchError, ResponseBody, Transport};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Transport answering from a routing table. Unknown URLs are 404.
#[derive(Default)]
pub struct FakeTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u16>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    /// Answer `url` with `status` forever.
    pub fn fail(&self, url: &str, status: u16) {
        self.failures.lock().unwrap().insert(url.to_string(), status);
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Transport for FakeTransport {
    fn open(&self, url: &str) -> Result<ResponseBody, FetchError> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        if let Some(status) = self.failures.lock().unwrap().get(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            });
        }
        let body = self.bodies.lock().unwrap().get(url).cloned();
        match body {
            Some(body) => Ok(ResponseBody {
                content_length: Some(body.len() as u64),
                reader: Box::new(Cursor::new(body)),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// AOI covering the interior of the grid cell at the origin, in UTM 32.
pub const ORIGIN_AOI: &str = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::25832"}},
  "features": [{"type": "Feature", "properties": {}, "geometry": {"type": "Polygon",
    "coordinates": [[[100, 100], [900, 100], [900, 900], [100, 900], [100, 100]]]}}]
}"#;

/// NW listing with its five preamble lines.
pub fn nw_listing(rows: &[(&str, &str)]) -> String {
    let mut out = String::from("Metadaten\nDGM1\n\nGeobasis NRW\n---\nKachelname;Aktualitaet\n");
    for (key, date) in rows {
        out.push_str(&format!("{key};{date}\n"));
    }
    out
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Relative paths of all files below `dir`, sorted.
pub fn file_set(dir: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().display().to_string());
            }
        }
    }
    let mut out = Vec::new();
    if dir.exists() {
        walk(dir, dir, &mut out);
    }
    out.sort();
    out
}
