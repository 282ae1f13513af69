//! Lambert Conformal Conic projection on a sphere.
//!
//! Commonly used by regional weather models (HRRR, NAM). A cone tangent or
//! secant to the sphere along one or two standard parallels is unrolled onto
//! a plane. Coordinates are meters from the projection origin at
//! (`lat_0`, `lon_0`), shifted by the false easting and northing.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use trackgrid_common::crs::{ProjectionKind, ProjectionParams};
use trackgrid_common::{TrackGridError, TrackGridResult};

/// Lambert Conformal Conic projection.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    /// Central meridian in radians
    lon0: f64,
    /// Sphere radius (meters)
    radius: f64,
    /// False easting (meters)
    x_0: f64,
    /// False northing (meters)
    y_0: f64,
    /// Cone constant (n)
    n: f64,
    /// F constant
    f: f64,
    /// Rho at the latitude of origin
    rho0: f64,
}

impl LambertConformal {
    /// Build the projection from a parameter record.
    pub fn new(params: &ProjectionParams) -> TrackGridResult<Self> {
        if params.kind != ProjectionKind::LambertConformal {
            return Err(TrackGridError::Projection(format!(
                "{:?} parameters passed to Lambert Conformal",
                params.kind
            )));
        }

        let latin1 = params.lat_1.to_radians();
        let latin2 = params.lat_2.to_radians();
        let lat0 = params.lat_0.to_radians();

        // Tangent cone for a single standard parallel, secant otherwise.
        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            let ln_ratio = (latin1.cos() / latin2.cos()).ln();
            let tan_ratio =
                ((FRAC_PI_4 + latin2 / 2.0).tan() / (FRAC_PI_4 + latin1 / 2.0).tan()).ln();
            ln_ratio / tan_ratio
        };
        if !n.is_finite() || n.abs() < 1e-10 {
            return Err(TrackGridError::Projection(format!(
                "standard parallels {} / {} do not define a cone",
                params.lat_1, params.lat_2
            )));
        }

        let f = latin1.cos() * (FRAC_PI_4 + latin1 / 2.0).tan().powf(n) / n;
        let rho0 = params.radius * f / (FRAC_PI_4 + lat0 / 2.0).tan().powf(n);

        Ok(Self {
            lon0: params.lon_0.to_radians(),
            radius: params.radius,
            x_0: params.x_0,
            y_0: params.y_0,
            n,
            f,
            rho0,
        })
    }

    /// Project longitude/latitude (degrees) to x/y (meters).
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> TrackGridResult<(f64, f64)> {
        let lat = lat_deg.to_radians();

        // The pole opposite the cone apex maps to infinity.
        let t = (FRAC_PI_4 + lat / 2.0).tan();
        let rho = self.radius * self.f / t.powf(self.n);
        if t <= 0.0 || !rho.is_finite() || !lon_deg.is_finite() {
            return Err(TrackGridError::Projection(format!(
                "({}, {}) cannot be projected with Lambert Conformal",
                lon_deg, lat_deg
            )));
        }

        let dlon = wrap_radians(lon_deg.to_radians() - self.lon0);
        let theta = self.n * dlon;

        Ok((
            self.x_0 + rho * theta.sin(),
            self.y_0 + self.rho0 - rho * theta.cos(),
        ))
    }

    /// Unproject x/y (meters) to longitude/latitude (degrees).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.x_0;
        let dy = self.rho0 - (y - self.y_0);
        let sign = self.n.signum();

        let rho = sign * (dx * dx + dy * dy).sqrt();
        let theta = (sign * dx).atan2(sign * dy);

        let lat = if rho == 0.0 {
            sign * FRAC_PI_2
        } else {
            2.0 * (self.radius * self.f / rho).powf(1.0 / self.n).atan() - FRAC_PI_2
        };
        let lon = wrap_radians(self.lon0 + theta / self.n);

        (lon.to_degrees(), lat.to_degrees())
    }
}

/// Normalize an angle difference to [-π, π].
fn wrap_radians(mut a: f64) -> f64 {
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use test_utils::assert_coords_approx_eq;

    fn hrrr() -> LambertConformal {
        LambertConformal::new(&ProjectionParams::lambert(38.5, -97.5, 38.5, 38.5)).unwrap()
    }

    #[test]
    fn test_origin_maps_to_zero() {
        let proj = hrrr();
        let (x, y) = proj.forward(-97.5, 38.5).unwrap();
        assert!(x.abs() < 1e-6, "x should be 0, got {}", x);
        assert!(y.abs() < 1e-6, "y should be 0, got {}", y);
    }

    #[test]
    fn test_hrrr_first_grid_point() {
        let proj = hrrr();
        let (x, y) = proj.forward(-122.719528, 21.138123).unwrap();
        // HRRR's lower-left corner sits about 2700 km west and 1590 km south
        // of the origin.
        assert!((x + 2_697_500.0).abs() < 5_000.0, "x = {}", x);
        assert!((y + 1_587_300.0).abs() < 5_000.0, "y = {}", y);
    }

    #[test]
    fn test_round_trip() {
        let proj = hrrr();
        for &(lon, lat) in &[(-94.5, 39.0), (-120.0, 25.0), (-70.0, 50.0), (-97.5, 60.0)] {
            let (x, y) = proj.forward(lon, lat).unwrap();
            let (lon2, lat2) = proj.inverse(x, y);
            assert!((lon - lon2).abs() < 1e-9, "lon {} vs {}", lon, lon2);
            assert!((lat - lat2).abs() < 1e-9, "lat {} vs {}", lat, lat2);
        }
    }

    #[test]
    fn test_seeded_round_trip_over_conus() {
        let proj = hrrr();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let lon_lat = (rng.gen_range(-130.0..-60.0), rng.gen_range(15.0..60.0));
            let (x, y) = proj.forward(lon_lat.0, lon_lat.1).unwrap();
            assert_coords_approx_eq!(proj.inverse(x, y), lon_lat, 1e-8);
        }
    }

    #[test]
    fn test_secant_cone_round_trip() {
        let proj = LambertConformal::new(&ProjectionParams::lambert(25.0, -95.0, 25.0, 45.0)).unwrap();
        let (x, y) = proj.forward(-80.0, 40.0).unwrap();
        let (lon, lat) = proj.inverse(x, y);
        assert!((lon + 80.0).abs() < 1e-9);
        assert!((lat - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_south_pole_rejected() {
        assert!(hrrr().forward(0.0, -90.0).is_err());
    }
}
