//! Longitude helpers for geographic coordinates.

/// Wrap a longitude into [-180, 180).
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == 180.0 {
        -180.0
    } else {
        wrapped
    }
}

/// Wrap a longitude into [0, 360).
pub fn to_0_360(lon: f64) -> f64 {
    lon.rem_euclid(360.0)
}

/// True when a longitude axis uses the 0..360 convention.
pub fn is_0_360(lons: &[f64]) -> bool {
    lons.iter().any(|&lon| lon > 180.0) && lons.iter().all(|&lon| lon >= 0.0)
}
