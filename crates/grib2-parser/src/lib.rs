//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! Pure Rust reader for the subset of GRIB2 used by gridded environmental
//! layers: lat/lon and Lambert conformal grids, analysis/forecast products
//! and simple packing with optional bitmaps.

pub mod error;
pub mod grid;
pub mod reader;
pub mod sections;
pub mod tables;
pub mod unpacking;

pub use error::Grib2Error;
pub use grid::ScanMode;
pub use reader::{Grib2Message, Grib2Reader};
pub use sections::{GridDefinition, GridTemplate, LambertGrid, LatLonGrid};
pub use tables::{Grib2Tables, LevelDescription, ParameterInfo};
pub use unpacking::unpack_simple;

/// True if the buffer starts with the GRIB magic bytes.
pub fn is_grib(data: &[u8]) -> bool {
    data.starts_with(b"GRIB")
}
