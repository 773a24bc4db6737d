//! Geographic transforms between WGS84, UTM and the local Cartesian frame.
//!
//! The UTM projection uses the Krüger series to third order in the third
//! flattening `n`, which keeps the forward/inverse pair well below a millimetre
//! inside a zone. The local frame is east-north-up: `x` east, `y` north, `z` up,
//! in metres from a fixed UTM origin. It is planar, so altitude does not feed `z`.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// WGS84 geographic position, degrees and metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Finite and inside the WGS84 latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.altitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    fn of(latitude: f64) -> Self {
        if latitude >= 0.0 {
            Hemisphere::North
        } else {
            Hemisphere::South
        }
    }

    fn false_northing(self) -> f64 {
        match self {
            Hemisphere::North => 0.0,
            Hemisphere::South => FALSE_NORTHING_SOUTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtmPoint {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub hemisphere: Hemisphere,
}

/// Position in the local east-north-up frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LocalPosition {
    pub const ZERO: LocalPosition = LocalPosition {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &LocalPosition) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Orientation quaternion, carried in the bridge's z-up convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation of `yaw` radians about the up axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw / 2.0;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    pub fn yaw(&self) -> f64 {
        let siny = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny.atan2(cosy)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalPose {
    pub position: LocalPosition,
    pub orientation: Quaternion,
}

/// Krüger series coefficients for the WGS84 ellipsoid.
struct Series {
    eccentricity: f64,
    rectifying_radius: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

impl Series {
    fn wgs84() -> Self {
        let f = FLATTENING;
        let n = f / (2.0 - f);
        let (n2, n3) = (n * n, n * n * n);
        Self {
            eccentricity: (f * (2.0 - f)).sqrt(),
            rectifying_radius: SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
                n2 / 48.0 + n3 / 15.0,
                17.0 * n3 / 480.0,
            ],
            delta: [
                2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
                7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
                56.0 * n3 / 15.0,
            ],
        }
    }
}

fn central_meridian(zone: u8) -> f64 {
    (zone as f64 * 6.0 - 183.0).to_radians()
}

fn wrap_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= TAU;
    }
    while angle < -PI {
        angle += TAU;
    }
    angle
}

/// UTM zone for a position, including the Norway and Svalbard exceptions.
pub fn utm_zone(latitude: f64, longitude: f64) -> u8 {
    let lon = (longitude + 180.0).rem_euclid(360.0) - 180.0;

    if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&lon) {
        return 32;
    }
    if (72.0..=84.0).contains(&latitude) && (0.0..42.0).contains(&lon) {
        return if lon < 9.0 {
            31
        } else if lon < 21.0 {
            33
        } else if lon < 33.0 {
            35
        } else {
            37
        };
    }

    let zone = ((lon + 180.0) / 6.0).floor() as i32 + 1;
    zone.clamp(1, 60) as u8
}

/// Project a geographic point into its own UTM zone.
pub fn geo_to_utm(point: &GeoPoint) -> UtmPoint {
    let zone = utm_zone(point.latitude, point.longitude);
    geo_to_utm_in_zone(point, zone, Hemisphere::of(point.latitude))
}

/// Project a geographic point into an explicit zone and hemisphere.
///
/// Used to keep points near a zone edge in the same grid as the local origin.
pub fn geo_to_utm_in_zone(point: &GeoPoint, zone: u8, hemisphere: Hemisphere) -> UtmPoint {
    let s = Series::wgs84();
    let e = s.eccentricity;
    let phi = point.latitude.to_radians();
    let dlam = wrap_angle(point.longitude.to_radians() - central_meridian(zone));

    let t = (phi.sin().atanh() - e * (e * phi.sin()).atanh()).sinh();
    let xi_p = t.atan2(dlam.cos());
    let eta_p = (dlam.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (j, a) in s.alpha.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
        eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
    }

    UtmPoint {
        easting: FALSE_EASTING + SCALE_FACTOR * s.rectifying_radius * eta,
        northing: hemisphere.false_northing() + SCALE_FACTOR * s.rectifying_radius * xi,
        zone,
        hemisphere,
    }
}

/// Inverse projection. Altitude is not part of UTM and comes back as zero;
/// callers that know the altitude set it on the result.
pub fn utm_to_geo(utm: &UtmPoint) -> GeoPoint {
    let s = Series::wgs84();
    let scale = SCALE_FACTOR * s.rectifying_radius;
    let xi = (utm.northing - utm.hemisphere.false_northing()) / scale;
    let eta = (utm.easting - FALSE_EASTING) / scale;

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, b) in s.beta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi_p -= b * (k * xi).sin() * (k * eta).cosh();
        eta_p -= b * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut phi = chi;
    for (j, d) in s.delta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        phi += d * (k * chi).sin();
    }
    let lambda = central_meridian(utm.zone) + eta_p.sinh().atan2(xi_p.cos());

    GeoPoint {
        latitude: phi.to_degrees(),
        longitude: wrap_angle(lambda).to_degrees(),
        altitude: 0.0,
    }
}

/// Offset of `utm` from `origin` in the local frame.
///
/// Points from another zone or hemisphere are reprojected into the origin's grid first.
pub fn utm_to_local(utm: &UtmPoint, origin: &UtmPoint) -> LocalPosition {
    let utm = if utm.zone == origin.zone && utm.hemisphere == origin.hemisphere {
        *utm
    } else {
        geo_to_utm_in_zone(&utm_to_geo(utm), origin.zone, origin.hemisphere)
    };
    LocalPosition::new(utm.easting - origin.easting, utm.northing - origin.northing, 0.0)
}

pub fn local_to_utm(local: &LocalPosition, origin: &UtmPoint) -> UtmPoint {
    UtmPoint {
        easting: origin.easting + local.x,
        northing: origin.northing + local.y,
        zone: origin.zone,
        hemisphere: origin.hemisphere,
    }
}

/// The local frame anchored at one UTM origin. Set once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: UtmPoint,
}

impl LocalFrame {
    pub fn new(origin: UtmPoint) -> Self {
        Self { origin }
    }

    pub fn from_geo(origin: &GeoPoint) -> Self {
        Self::new(geo_to_utm(origin))
    }

    pub fn origin(&self) -> &UtmPoint {
        &self.origin
    }

    /// Planar: altitude is dropped and `z` is always zero.
    pub fn geo_to_local(&self, point: &GeoPoint) -> LocalPosition {
        utm_to_local(&geo_to_utm(point), &self.origin)
    }

    /// The frame carries no height, so `local.z` is ignored and the returned
    /// altitude is zero.
    pub fn local_to_geo(&self, local: &LocalPosition) -> GeoPoint {
        utm_to_geo(&local_to_utm(local, &self.origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS_DEG: f64 = 1e-6;

    #[test]
    fn test_round_trip_within_epsilon() {
        let mut lat = -84.5;
        while lat < 85.0 {
            let mut lon = -179.5;
            while lon < 180.0 {
                let p = GeoPoint::new(lat, lon, 0.0);
                let back = utm_to_geo(&geo_to_utm(&p));
                assert!(
                    (back.latitude - p.latitude).abs() < EPS_DEG,
                    "latitude drift at {:?}: {:?}",
                    p,
                    back
                );
                assert!(
                    (back.longitude - p.longitude).abs() < EPS_DEG,
                    "longitude drift at {:?}: {:?}",
                    p,
                    back
                );
                lon += 7.3;
            }
            lat += 4.7;
        }
    }

    #[test]
    fn test_central_meridian_on_equator() {
        let utm = geo_to_utm(&GeoPoint::new(0.0, 3.0, 0.0));
        assert_eq!(utm.zone, 31);
        assert_eq!(utm.hemisphere, Hemisphere::North);
        assert!((utm.easting - 500_000.0).abs() < 1e-6);
        assert!(utm.northing.abs() < 1e-6);
    }

    #[test]
    fn test_northing_at_45_degrees_matches_meridian_arc() {
        // Meridian arc to 45N on WGS84 is 4 984 944.378 m.
        let utm = geo_to_utm(&GeoPoint::new(45.0, 9.0, 0.0));
        assert_eq!(utm.zone, 32);
        assert!((utm.easting - 500_000.0).abs() < 1e-6);
        assert!((utm.northing - 4_984_944.378 * SCALE_FACTOR).abs() < 0.5);
    }

    #[test]
    fn test_southern_hemisphere_false_northing() {
        let utm = geo_to_utm(&GeoPoint::new(-33.9, 18.4, 0.0));
        assert_eq!(utm.hemisphere, Hemisphere::South);
        assert!(utm.northing > 6_000_000.0 && utm.northing < FALSE_NORTHING_SOUTH);
        let back = utm_to_geo(&utm);
        assert!((back.latitude + 33.9).abs() < EPS_DEG);
    }

    #[test]
    fn test_zone_exceptions() {
        assert_eq!(utm_zone(60.0, 5.0), 32);
        assert_eq!(utm_zone(50.0, 5.0), 31);
        assert_eq!(utm_zone(78.0, 15.0), 33);
        assert_eq!(utm_zone(78.0, 8.0), 31);
        assert_eq!(utm_zone(10.0, 180.0), 1);
        assert_eq!(utm_zone(10.0, -180.0), 1);
        assert_eq!(utm_zone(10.0, 179.9), 60);
    }

    #[test]
    fn test_local_frame_origin_maps_to_zero() {
        let origin = GeoPoint::new(55.605, 12.59, 0.0);
        let frame = LocalFrame::from_geo(&origin);
        let local = frame.geo_to_local(&origin);
        assert!(local.distance(&LocalPosition::ZERO) < 1e-6);
    }

    #[test]
    fn test_local_frame_axes_are_east_north() {
        // On the zone 33 central meridian grid north and true north coincide.
        let frame = LocalFrame::from_geo(&GeoPoint::new(55.605, 15.0, 0.0));
        let north = frame.geo_to_local(&GeoPoint::new(55.606, 15.0, 0.0));
        assert!(north.y > 110.0 && north.y < 112.0);
        assert!(north.x.abs() < 1e-6);

        let east = frame.geo_to_local(&GeoPoint::new(55.605, 15.001, 0.0));
        assert!(east.x > 60.0 && east.x < 65.0);
        assert!(east.y.abs() < 1.0);
    }

    #[test]
    fn test_local_round_trip() {
        let frame = LocalFrame::from_geo(&GeoPoint::new(-12.0, -77.0, 0.0));
        let local = LocalPosition::new(153.2, -88.75, 0.0);
        let geo = frame.local_to_geo(&local);
        let back = frame.geo_to_local(&geo);
        assert!(back.distance(&local) < 1e-6);
    }

    #[test]
    fn test_local_frame_is_planar() {
        let frame = LocalFrame::from_geo(&GeoPoint::new(55.605, 15.0, 12.0));
        let high = frame.local_to_geo(&LocalPosition::new(3.0, 4.0, 7.5));
        let low = frame.local_to_geo(&LocalPosition::new(3.0, 4.0, 0.0));
        assert_eq!(high, low);
        assert_eq!(high.altitude, 0.0);

        let local = frame.geo_to_local(&GeoPoint::new(55.605, 15.0, 40.0));
        assert_eq!(local.z, 0.0);
        assert!(local.x.abs() < 1e-6 && local.y.abs() < 1e-6);
    }

    #[test]
    fn test_cross_zone_point_is_reprojected_into_origin_grid() {
        let origin = GeoPoint::new(45.0, 11.99, 0.0);
        let frame = LocalFrame::from_geo(&origin);
        assert_eq!(frame.origin().zone, 32);

        let p = GeoPoint::new(45.0, 12.01, 0.0);
        assert_eq!(geo_to_utm(&p).zone, 33);

        let via_own_zone = frame.geo_to_local(&p);
        let forced = utm_to_local(
            &geo_to_utm_in_zone(&p, 32, Hemisphere::North),
            frame.origin(),
        );
        assert!(via_own_zone.distance(&forced) < 1e-6);
        assert!(via_own_zone.x > 1_400.0 && via_own_zone.x < 1_700.0);
    }

    #[test]
    fn test_local_to_utm_keeps_origin_grid() {
        let origin = geo_to_utm(&GeoPoint::new(10.0, 10.0, 0.0));
        let utm = local_to_utm(&LocalPosition::new(5.0, -3.0, 2.0), &origin);
        assert_eq!(utm.zone, origin.zone);
        assert!((utm.easting - origin.easting - 5.0).abs() < 1e-9);
        assert!((utm.northing - origin.northing + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_quaternion_yaw() {
        let q = Quaternion::from_yaw(1.2);
        assert!((q.yaw() - 1.2).abs() < 1e-12);
        assert_eq!(Quaternion::default(), Quaternion::IDENTITY);
    }

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(45.0, 9.0, 10.0).is_valid());
        assert!(!GeoPoint::new(91.0, 9.0, 0.0).is_valid());
        assert!(!GeoPoint::new(45.0, f64::NAN, 0.0).is_valid());
    }
}
