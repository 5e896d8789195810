//! Coordinate reference systems used by AOIs and state grids.
//!
//! German states publish their tiles in ETRS89 / UTM zone 32 (EPSG:25832) or
//! zone 33 (EPSG:25833). AOIs usually come as WGS84 GeoJSON. This module
//! provides the transverse Mercator forward and inverse series needed to move
//! AOI vertices between these systems. The ETRS89 and WGS84 datums are treated
//! as identical, which is well below the size of any tile.

use crate::{CoreError, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use std::fmt;

/// GRS80 semi-major axis in meters.
const SEMI_MAJOR: f64 = 6_378_137.0;
/// GRS80 flattening.
const FLATTENING: f64 = 1.0 / 298.257_222_101;
/// UTM scale factor on the central meridian.
const K0: f64 = 0.9996;
/// UTM false easting.
const FALSE_EASTING: f64 = 500_000.0;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// Geographic WGS84 / ETRS89 longitude-latitude in degrees.
    Wgs84,
    /// ETRS89 / UTM northern zone.
    Utm(u8),
}

impl Crs {
    /// Parse a GeoJSON `crs.properties.name` or plain EPSG reference.
    ///
    /// Understands `EPSG:4326`, `urn:ogc:def:crs:OGC:1.3:CRS84`,
    /// `EPSG:25832`/`EPSG:25833` (and the `urn:ogc:def:crs:EPSG::` forms) as
    /// well as the WGS84 UTM codes `32632`/`32633`.
    pub fn from_name(name: &str) -> Result<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let code = upper
            .rsplit(|c: char| c == ':' || c == '/')
            .next()
            .unwrap_or_default();
        match code {
            "4326" | "4258" | "CRS84" => Ok(Crs::Wgs84),
            "25832" | "32632" => Ok(Crs::Utm(32)),
            "25833" | "32633" => Ok(Crs::Utm(33)),
            _ => Err(CoreError::UnsupportedCrs(name.to_string())),
        }
    }

    /// Transform a single coordinate from `self` into `target`.
    pub fn transform(&self, target: Crs, coord: Coord<f64>) -> Coord<f64> {
        if *self == target {
            return coord;
        }
        let (lon, lat) = match self {
            Crs::Wgs84 => (coord.x, coord.y),
            Crs::Utm(zone) => utm_to_geographic(*zone, coord.x, coord.y),
        };
        match target {
            Crs::Wgs84 => Coord { x: lon, y: lat },
            Crs::Utm(zone) => {
                let (x, y) = geographic_to_utm(zone, lon, lat);
                Coord { x, y }
            }
        }
    }

    /// Transform every vertex of a multipolygon.
    pub fn transform_geometry(&self, target: Crs, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if *self == target {
            return geometry.clone();
        }
        let source = *self;
        geometry.map_coords(move |c| source.transform(target, c))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => f.write_str("EPSG:4326"),
            Crs::Utm(zone) => write!(f, "EPSG:258{zone}"),
        }
    }
}

fn central_meridian(zone: u8) -> f64 {
    (f64::from(zone) * 6.0 - 183.0).to_radians()
}

fn eccentricity_squared() -> f64 {
    FLATTENING * (2.0 - FLATTENING)
}

/// Meridional arc length from the equator to latitude `phi` (radians).
fn meridian_arc(phi: f64) -> f64 {
    let e2 = eccentricity_squared();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    SEMI_MAJOR
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Longitude/latitude in degrees to UTM easting/northing (northern hemisphere).
pub fn geographic_to_utm(zone: u8, lon: f64, lat: f64) -> (f64, f64) {
    let e2 = eccentricity_squared();
    let ep2 = e2 / (1.0 - e2);
    let phi = lat.to_radians();
    let lambda = lon.to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = SEMI_MAJOR / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lambda - central_meridian(zone));
    let m = meridian_arc(phi);

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING;
    let northing = K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));

    (easting, northing)
}

/// UTM easting/northing (northern hemisphere) to longitude/latitude in degrees.
pub fn utm_to_geographic(zone: u8, easting: f64, northing: f64) -> (f64, f64) {
    let e2 = eccentricity_squared();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);
    let sqrt_1_e2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);

    let m = northing / K0;
    let mu = m / (SEMI_MAJOR * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    // Footpoint latitude
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = SEMI_MAJOR / denom.sqrt();
    let r1 = SEMI_MAJOR * (1.0 - e2) / denom.powf(1.5);
    let d = (easting - FALSE_EASTING) / (n1 * K0);

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lambda = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
                / 120.0)
            / cos_phi1;

    (lambda.to_degrees(), phi.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_names() {
        assert_eq!(Crs::from_name("EPSG:25832").unwrap(), Crs::Utm(32));
        assert_eq!(Crs::from_name("urn:ogc:def:crs:EPSG::25833").unwrap(), Crs::Utm(33));
        assert_eq!(Crs::from_name("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(), Crs::Wgs84);
        assert_eq!(Crs::from_name("EPSG:4326").unwrap(), Crs::Wgs84);
        assert!(Crs::from_name("EPSG:3857").is_err());
    }

    #[test]
    fn test_central_meridian_maps_to_false_easting() {
        let (x, y) = geographic_to_utm(32, 9.0, 0.0);
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_known_point_cologne_cathedral() {
        // Cologne cathedral, approx. 50.9413N 6.9583E -> 356 km E, 5645 km N in zone 32
        let (x, y) = geographic_to_utm(32, 6.9583, 50.9413);
        assert!((x - 356_500.0).abs() < 1_000.0, "easting {x}");
        assert!((y - 5_645_500.0).abs() < 1_000.0, "northing {y}");
    }

    #[test]
    fn test_geographic_roundtrip() {
        for (lon, lat) in [(13.4, 52.5), (6.96, 50.94), (10.0, 47.5), (14.9, 54.1)] {
            let zone = if lon >= 12.0 { 33 } else { 32 };
            let (x, y) = geographic_to_utm(zone, lon, lat);
            let (lon2, lat2) = utm_to_geographic(zone, x, y);
            assert!((lon - lon2).abs() < 1e-7, "lon {lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-7, "lat {lat} -> {lat2}");
        }
    }

    #[test]
    fn test_zone_to_zone_roundtrip() {
        // Berlin, expressed in zone 32 and back
        let berlin = Coord { x: 391_000.0, y: 5_820_000.0 };
        let in_32 = Crs::Utm(33).transform(Crs::Utm(32), berlin);
        assert!(in_32.x > 750_000.0, "Berlin lies far east of zone 32's meridian");
        let back = Crs::Utm(32).transform(Crs::Utm(33), in_32);
        assert!((back.x - berlin.x).abs() < 0.05);
        assert!((back.y - berlin.y).abs() < 0.05);
    }
}
