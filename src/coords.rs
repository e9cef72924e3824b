//! Conversions between the three coordinate spaces of the workbench:
//! scene units (2D, y positive-down), geodetic degrees (lon, lat) and
//! Web Mercator metres (EPSG:3857).

use nalgebra_glm as glm;

/// A point in scene units.
pub type PtS = glm::DVec2;

/// Scene units per normalized world unit.
pub const SCENE_SCALE: f64 = 10.0;
/// Half-width of the world in normalized units.
pub const SCENE_HALF_WIDTH: f64 = 2000.0;

/// Latitude cutoff of the Web Mercator projection, degrees.
pub const MERCATOR_MAX_LAT: f64 = 85.051129;

/// WGS-84 semi-major axis, metres. Also the Web Mercator sphere radius.
pub const EARTH_RADIUS: f64 = 6378137.0;

fn half_world() -> f64 {
    SCENE_SCALE * SCENE_HALF_WIDTH
}

/// `ln(tan(pi/4 + lat/2))` with the latitude clamped to the Mercator-safe
/// band. Result is in [-pi, pi].
pub fn lat_to_mercator(lat: f64) -> f64 {
    if !lat.is_finite() {
        return 0.0;
    }
    let lat = lat.max(-MERCATOR_MAX_LAT).min(MERCATOR_MAX_LAT);
    let phi = lat.to_radians();
    (std::f64::consts::FRAC_PI_4 + phi / 2.0).tan().ln()
}

/// Inverse of [`lat_to_mercator`]. Clamps to the same latitude band, so
/// the pair is idempotent on extreme inputs.
pub fn mercator_to_lat(m: f64) -> f64 {
    if !m.is_finite() {
        return 0.0;
    }
    let lat = (2.0 * m.exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    lat.max(-MERCATOR_MAX_LAT).min(MERCATOR_MAX_LAT)
}

/// Scene position to (lon, lat) degrees.
pub fn scene_to_geodetic(p: PtS) -> (f64, f64) {
    if !p.x.is_finite() || !p.y.is_finite() {
        return (0.0, 0.0);
    }
    let w = half_world();
    let lon = p.x / w * 180.0;
    let lat = mercator_to_lat(-p.y / w * std::f64::consts::PI);
    if !lon.is_finite() || !lat.is_finite() {
        return (0.0, 0.0);
    }
    (wrap_longitude(lon), lat)
}

/// (lon, lat) degrees to scene position.
pub fn geodetic_to_scene(lon: f64, lat: f64) -> PtS {
    if !lon.is_finite() || !lat.is_finite() {
        return glm::vec2(0.0, 0.0);
    }
    let w = half_world();
    let x = lon / 180.0 * w;
    let y = -lat_to_mercator(lat) / std::f64::consts::PI * w;
    if !x.is_finite() || !y.is_finite() {
        return glm::vec2(0.0, 0.0);
    }
    glm::vec2(x, y)
}

/// (lon, lat) degrees to Web Mercator metres.
pub fn to_projected(lon: f64, lat: f64) -> (f64, f64) {
    if !lon.is_finite() || !lat.is_finite() {
        return (0.0, 0.0);
    }
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * lat_to_mercator(lat);
    if !x.is_finite() || !y.is_finite() {
        return (0.0, 0.0);
    }
    (x, y)
}

/// Web Mercator metres to (lon, lat) degrees, longitude wrapped
/// to (-180, 180].
pub fn to_geodetic(x: f64, y: f64) -> (f64, f64) {
    if !x.is_finite() || !y.is_finite() {
        return (0.0, 0.0);
    }
    let lon = wrap_longitude((x / EARTH_RADIUS).to_degrees());
    let lat = mercator_to_lat(y / EARTH_RADIUS);
    if !lon.is_finite() || !lat.is_finite() {
        return (0.0, 0.0);
    }
    (lon, lat)
}

pub fn wrap_longitude(lon: f64) -> f64 {
    if !lon.is_finite() {
        return 0.0;
    }
    let mut w = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if w == -180.0 {
        w = 180.0;
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_glm as glm;

    #[test]
    fn geodetic_scene_roundtrip() {
        for &(lon, lat) in &[
            (0.0, 0.0),
            (10.3, 59.9),
            (-122.4, 37.8),
            (179.5, -85.0),
            (-179.5, 85.0),
            (31.2, 30.0),
        ] {
            let p = geodetic_to_scene(lon, lat);
            let (lon2, lat2) = scene_to_geodetic(p);
            assert!((lon - lon2).abs() < 1e-6, "lon {} vs {}", lon, lon2);
            assert!((lat - lat2).abs() < 1e-6, "lat {} vs {}", lat, lat2);
        }
    }

    #[test]
    fn projected_roundtrip() {
        for &(x, y) in &[
            (0.0, 0.0),
            (1_000_000.0, 2_000_000.0),
            (-20_000_000.0, 19_000_000.0),
            (20_037_508.0, -20_037_508.0),
        ] {
            let (lon, lat) = to_geodetic(x, y);
            let (x2, y2) = to_projected(lon, lat);
            assert!((x - x2).abs() < 1e-3, "x {} vs {}", x, x2);
            assert!((y - y2).abs() < 1e-3, "y {} vs {}", y, y2);
        }
    }

    #[test]
    fn mercator_clamps_both_ways() {
        // lat beyond the cutoff projects to the cutoff value
        assert!((lat_to_mercator(90.0) - lat_to_mercator(MERCATOR_MAX_LAT)).abs() < 1e-12);
        // extreme mercator values come back clamped
        assert!((mercator_to_lat(50.0) - MERCATOR_MAX_LAT).abs() < 1e-9);
        assert!((mercator_to_lat(-50.0) + MERCATOR_MAX_LAT).abs() < 1e-9);
    }

    #[test]
    fn non_finite_inputs_are_zeroed() {
        assert_eq!(scene_to_geodetic(glm::vec2(std::f64::NAN, 0.0)), (0.0, 0.0));
        assert_eq!(to_projected(std::f64::INFINITY, 10.0), (0.0, 0.0));
        assert_eq!(to_geodetic(0.0, std::f64::NAN), (0.0, 0.0));
        let p = geodetic_to_scene(std::f64::NAN, std::f64::NAN);
        assert_eq!((p.x, p.y), (0.0, 0.0));
    }

    #[test]
    fn longitude_wrap() {
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert_eq!(wrap_longitude(-180.0), 180.0);
        assert!((wrap_longitude(190.0) + 170.0).abs() < 1e-9);
        assert!((wrap_longitude(540.0) - 180.0).abs() < 1e-9);
        assert!((wrap_longitude(-190.0) - 170.0).abs() < 1e-9);
    }

    #[test]
    fn scene_extent_is_symmetric() {
        let e = geodetic_to_scene(180.0, 0.0);
        let w = geodetic_to_scene(-180.0, 0.0);
        assert!((e.x + w.x).abs() < 1e-9);
        let n = geodetic_to_scene(0.0, MERCATOR_MAX_LAT);
        let s = geodetic_to_scene(0.0, -MERCATOR_MAX_LAT);
        // y positive-down: north pole edge is negative y
        assert!(n.y < 0.0 && s.y > 0.0);
        assert!((n.y + s.y).abs() < 1e-9);
        // the cutoff constant is rounded, so the vertical extent matches
        // the horizontal one only to within a fraction of a scene unit
        assert!((n.y.abs() - e.x.abs()).abs() < 1e-2);
    }
}
