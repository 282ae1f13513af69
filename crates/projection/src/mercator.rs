//! Spherical Mercator (Web Mercator when the radius is 6378137 m).

use std::f64::consts::FRAC_PI_4;

use trackgrid_common::crs::WEB_MERCATOR_RADIUS;

/// Latitude limit of the square Web Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone)]
pub struct Mercator {
    lon0: f64,
    radius: f64,
    x_0: f64,
    y_0: f64,
}

impl Default for Mercator {
    fn default() -> Self {
        Self::web()
    }
}

impl Mercator {
    pub fn new(lon_0: f64, radius: f64, x_0: f64, y_0: f64) -> Self {
        Self {
            lon0: lon_0.to_radians(),
            radius,
            x_0,
            y_0,
        }
    }

    /// EPSG:3857.
    pub fn web() -> Self {
        Self::new(0.0, WEB_MERCATOR_RADIUS, 0.0, 0.0)
    }

    /// Project longitude/latitude (degrees) to meters.
    ///
    /// Latitudes are clamped to ±[`MAX_LATITUDE`].
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = self.radius * (lon_deg.to_radians() - self.lon0);
        let y = self.radius * (FRAC_PI_4 + lat / 2.0).tan().ln();
        (self.x_0 + x, self.y_0 + y)
    }

    /// Unproject meters to longitude/latitude (degrees).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = (x - self.x_0) / self.radius + self.lon0;
        let lat = 2.0 * ((y - self.y_0) / self.radius).exp().atan() - std::f64::consts::FRAC_PI_2;
        (lon.to_degrees(), lat.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use test_utils::assert_coords_approx_eq;

    #[test]
    fn test_web_mercator_extent() {
        let merc = Mercator::web();
        let (x, y) = merc.forward(180.0, MAX_LATITUDE);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-6);
        assert!((y - 20_037_508.342_789_244).abs() < 1e-3);
    }

    #[test]
    fn test_round_trip() {
        let merc = Mercator::web();
        let (x, y) = merc.forward(-97.5, 38.5);
        let (lon, lat) = merc.inverse(x, y);
        assert!((lon + 97.5).abs() < 1e-9);
        assert!((lat - 38.5).abs() < 1e-9);
    }

    #[test]
    fn test_seeded_round_trip() {
        let merc = Mercator::web();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let lon_lat = (rng.gen_range(-179.9..179.9), rng.gen_range(-85.0..85.0));
            let (x, y) = merc.forward(lon_lat.0, lon_lat.1);
            assert_coords_approx_eq!(merc.inverse(x, y), lon_lat, 1e-9);
        }
    }

    #[test]
    fn test_poles_clamped() {
        let merc = Mercator::web();
        let (_, y) = merc.forward(0.0, 90.0);
        assert!(y.is_finite());
    }
}
