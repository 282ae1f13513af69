//! Extent computation over geometry collections.

use tracing::debug;

use crate::bbox::BoundingBox;
use crate::crs_resolver::{CrsSource, DeclaredCrs};
use crate::error::{TrackGridError, TrackGridResult};
use crate::geometry::Geometry;

/// Compute the tight axis-aligned bounding box of a geometry collection.
///
/// The result carries the collection's CRS. An empty collection yields
/// `EmptyData`; mixed CRS tags yield `CrsMismatch`. The result does not
/// depend on the order of the geometries.
pub fn compute_extent(geometries: &[Geometry]) -> TrackGridResult<BoundingBox> {
    let crs = match geometries.declared_crs()? {
        DeclaredCrs::Tagged(crs) => crs,
        _ => {
            return Err(TrackGridError::EmptyData(
                "cannot compute the extent of an empty geometry collection".to_string(),
            ))
        }
    };

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for point in geometries.iter().flat_map(|g| g.coords()) {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    let extent = BoundingBox::new(min_x, min_y, max_x, max_y, crs)?;
    debug!(
        features = geometries.len(),
        extent = %extent,
        "Computed extent"
    );
    Ok(extent)
}
