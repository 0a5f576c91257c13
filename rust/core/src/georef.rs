// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coordinate reprojection to WGS84
//!
//! Only used to display a model's metadata extent, never while decomposing.
//! The [`Reprojector`] trait is the seam; [`BuiltinReprojector`] covers the
//! projections that need no grid files: WGS84 itself, Web Mercator and the
//! WGS84 UTM zones.

use crate::bbox::BBox;
use crate::error::{Error, Result};

/// WGS84 semi-major axis (meters)
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM central meridian scale factor
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Converts projected `[x, y]` pairs to WGS84 `[lon, lat]` in degrees
pub trait Reprojector: Send + Sync {
    fn to_wgs84(&self, crs: &str, xy: [f64; 2]) -> Result<[f64; 2]>;
}

/// Extract the EPSG code from `EPSG:N`, `urn:ogc:def:crs:EPSG::N` or an
/// opengis.net CRS URL
pub fn parse_epsg_code(crs: &str) -> Option<u32> {
    let upper = crs.to_ascii_uppercase();
    let at = upper.find("EPSG")?;
    upper[at + 4..]
        .split(|c: char| !c.is_ascii_digit())
        .filter(|t| !t.is_empty())
        .last()
        .and_then(|t| t.parse().ok())
}

/// Reprojector for EPSG:4326, EPSG:3857 and EPSG:326xx / 327xx
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinReprojector;

impl Reprojector for BuiltinReprojector {
    fn to_wgs84(&self, crs: &str, xy: [f64; 2]) -> Result<[f64; 2]> {
        let code = parse_epsg_code(crs).ok_or_else(|| Error::UnsupportedCrs(crs.to_string()))?;
        match code {
            4326 => Ok(xy),
            3857 | 900913 => Ok(web_mercator_to_wgs84(xy)),
            32601..=32660 => Ok(utm_to_wgs84(xy, code - 32600, true)),
            32701..=32760 => Ok(utm_to_wgs84(xy, code - 32700, false)),
            _ => Err(Error::UnsupportedCrs(crs.to_string())),
        }
    }
}

/// Inverse spherical mercator
pub fn web_mercator_to_wgs84([x, y]: [f64; 2]) -> [f64; 2] {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    [lon, lat]
}

/// Inverse transverse mercator for a WGS84 UTM zone (series expansion)
pub fn utm_to_wgs84([easting, northing]: [f64; 2], zone: u32, north: bool) -> [f64; 2] {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let x = easting - UTM_FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - UTM_FALSE_NORTHING_SOUTH
    };
    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let m = y / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    // Footpoint latitude
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1) = phi1.sin_cos();
    let tan1 = phi1.tan();
    let n1 = WGS84_A / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = tan1 * tan1;
    let c1 = ep2 * cos1 * cos1;
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

    [lon.to_degrees(), lat.to_degrees()]
}

/// South-west and north-east corners of an extent in WGS84
pub fn extent_to_wgs84(
    reprojector: &dyn Reprojector,
    crs: &str,
    extent: &BBox,
) -> Result<[[f64; 2]; 2]> {
    let sw = reprojector.to_wgs84(crs, [extent.min[0], extent.min[1]])?;
    let ne = reprojector.to_wgs84(crs, [extent.max[0], extent.max[1]])?;
    Ok([sw, ne])
}
