//! Test support for the trackgrid workspace: synthetic GRIB2 messages,
//! track table fixtures, grid generators and Zarr store comparison.
//!
//! Pulled in as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod grib2;
pub mod store;

pub use fixtures::*;
pub use generators::*;
pub use grib2::{concat_messages, write_grib2_file, Grib2Builder};
pub use store::{array_names, assert_stores_equivalent, read_metadata, store_files};

/// Assert two numbers differ by at most `tol`. Both sides are widened to f64,
/// so f32 grid values compare against f64 literals.
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $tol:expr) => {{
        let (actual, expected, tol) = ($actual as f64, $expected as f64, $tol as f64);
        if !((actual - expected).abs() <= tol) {
            panic!(
                "{} = {} is not within {} of {}",
                stringify!($actual),
                actual,
                tol,
                expected
            );
        }
    }};
}

/// Assert two `(x, y)` tuples match coordinate-wise within `tol`.
#[macro_export]
macro_rules! assert_coords_approx_eq {
    ($actual:expr, $expected:expr, $tol:expr) => {{
        let ((ax, ay), (ex, ey)): ((f64, f64), (f64, f64)) = ($actual, $expected);
        let tol = $tol as f64;
        if !((ax - ex).abs() <= tol && (ay - ey).abs() <= tol) {
            panic!(
                "{} = ({}, {}) is not within {} of ({}, {})",
                stringify!($actual),
                ax,
                ay,
                tol,
                ex,
                ey
            );
        }
    }};
}
