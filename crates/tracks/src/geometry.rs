//! Point geometries from track fixes.

use tracing::{debug, info, warn};

use projection::Transformer;
use trackgrid_common::{Crs, CrsSource, DeclaredCrs, Geometry, TrackGridError, TrackGridResult};

use crate::reader::TrackTable;

/// Largest share of unusable rows tolerated by default.
pub const DEFAULT_MAX_DROPPED_FRACTION: f64 = 0.5;

/// Point geometries built from a track table, with drop accounting.
#[derive(Debug, Clone)]
pub struct PointSet {
    source: String,
    crs: Crs,
    points: Vec<Geometry>,
    dropped: usize,
    total: usize,
}

impl PointSet {
    pub fn points(&self) -> &[Geometry] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Geometry> {
        self.points
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl CrsSource for PointSet {
    fn source_name(&self) -> String {
        self.source.clone()
    }

    fn declared_crs(&self) -> TrackGridResult<DeclaredCrs<'_>> {
        self.points.as_slice().declared_crs()
    }
}

/// Turns track fixes into CRS-tagged points.
#[derive(Debug, Clone)]
pub struct GeometryBuilder {
    target_crs: Crs,
    max_dropped_fraction: f64,
}

impl Default for GeometryBuilder {
    fn default() -> Self {
        Self {
            target_crs: Crs::wgs84(),
            max_dropped_fraction: DEFAULT_MAX_DROPPED_FRACTION,
        }
    }
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_crs(mut self, crs: Crs) -> Self {
        self.target_crs = crs;
        self
    }

    /// Fraction in `[0, 1]`; values outside are clamped.
    pub fn with_max_dropped_fraction(mut self, fraction: f64) -> Self {
        self.max_dropped_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// One point per usable fix, in table order.
    ///
    /// Fixes without coordinates, with coordinates outside the valid
    /// lat/lon range, or that cannot be projected into the target CRS are
    /// dropped and counted.
    pub fn build(&self, table: &TrackTable) -> TrackGridResult<PointSet> {
        let total = table.len();
        if total == 0 {
            return Err(TrackGridError::EmptyData(table.source_name()));
        }

        let transformer = Transformer::new(Crs::wgs84(), self.target_crs)?;
        let mut points = Vec::with_capacity(total);
        let mut out_of_range = 0usize;
        let mut missing = 0usize;
        let mut unprojectable = 0usize;

        for fix in table.fixes() {
            let Some((lon, lat)) = fix.lon_lat() else {
                missing += 1;
                continue;
            };
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                out_of_range += 1;
                continue;
            }
            match transformer.transform_point(lon, lat) {
                Ok((x, y)) => points.push(Geometry::point(x, y, self.target_crs)),
                Err(e) => {
                    debug!(lon, lat, error = %e, "Fix cannot be projected");
                    unprojectable += 1;
                }
            }
        }

        let dropped = missing + out_of_range + unprojectable;
        if dropped > 0 {
            warn!(
                source = %table.source_name(),
                missing,
                out_of_range,
                unprojectable,
                total,
                "Dropped unusable fixes"
            );
        }

        if points.is_empty() || dropped as f64 / total as f64 > self.max_dropped_fraction {
            return Err(TrackGridError::DataQuality {
                dropped,
                total,
                max_fraction: self.max_dropped_fraction,
            });
        }

        info!(
            source = %table.source_name(),
            points = points.len(),
            dropped,
            crs = %self.target_crs,
            "Built point geometries"
        );

        Ok(PointSet {
            source: table.source_name(),
            crs: self.target_crs,
            points,
            dropped,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::reader::read_tracks_from_str;

    fn table(text: &str) -> TrackTable {
        read_tracks_from_str(text, Path::new("mem.csv")).unwrap()
    }

    #[test]
    fn test_points_keep_row_order_and_crs() {
        let set = GeometryBuilder::new()
            .build(&table("lat,lon\n10,10\n14,12\n9,8\n"))
            .unwrap();
        let coords: Vec<(f64, f64)> = set
            .points()
            .iter()
            .map(|g| (g.coords()[0].x, g.coords()[0].y))
            .collect();
        assert_eq!(coords, vec![(10.0, 10.0), (12.0, 14.0), (8.0, 9.0)]);
        assert!(set.points().iter().all(|g| g.crs() == Crs::wgs84()));
        assert_eq!((set.dropped(), set.total()), (0, 3));
    }

    #[test]
    fn test_dropped_fraction_at_limit_passes() {
        // 1 of 2 dropped is exactly 0.5
        let set = GeometryBuilder::new()
            .with_max_dropped_fraction(0.5)
            .build(&table("lat,lon\n10,10\n,10\n"))
            .unwrap();
        assert_eq!(set.points().len(), 1);
        assert_eq!((set.dropped(), set.total()), (1, 2));
    }

    #[test]
    fn test_one_more_drop_past_limit_fails() {
        let err = GeometryBuilder::new()
            .with_max_dropped_fraction(0.5)
            .build(&table("lat,lon\n10,10\n,10\nabc,10\n"))
            .unwrap_err();
        match err {
            TrackGridError::DataQuality { dropped, total, .. } => assert_eq!((dropped, total), (2, 3)),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_dropped_fraction_over_limit_fails() {
        let err = GeometryBuilder::new()
            .with_max_dropped_fraction(0.2)
            .build(&table("lat,lon\n10,10\n100,10\n10,10\n10,10\n"))
            .unwrap_err();
        match err {
            TrackGridError::DataQuality { dropped, total, .. } => assert_eq!((dropped, total), (1, 4)),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_no_usable_rows_always_fails() {
        let err = GeometryBuilder::new()
            .with_max_dropped_fraction(1.0)
            .build(&table("lat,lon\n91,0\n"))
            .unwrap_err();
        assert!(matches!(err, TrackGridError::DataQuality { .. }));
    }

    #[test]
    fn test_projected_target() {
        let set = GeometryBuilder::new()
            .with_target_crs(Crs::web_mercator())
            .build(&table("lat,lon\n0,0\n0,180\n"))
            .unwrap();
        let p = set.points()[1].coords()[0];
        assert!((p.x - 20037508.342789244).abs() < 1e-3);
        assert_eq!(set.crs(), Crs::web_mercator());
    }
}
