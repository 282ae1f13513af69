//! Coordinate reference system transformations.
//!
//! Implements the spherical projections trackgrid needs from scratch,
//! without binding to PROJ.

pub mod geographic;
pub mod lambert;
pub mod mercator;
pub mod transform;

pub use lambert::LambertConformal;
pub use mercator::Mercator;
pub use transform::{densify_ring, transform_point, Projection, Transformer, DEFAULT_DENSIFY};
