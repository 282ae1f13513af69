//! Coordinate transforms between tagged CRS values.
//!
//! Every supported CRS is spherical or WGS84-geographic, so a transform
//! goes through longitude/latitude: unproject from the source, then
//! project into the destination. Geographic CRS on different datums are
//! treated as interchangeable.

use tracing::trace;
use trackgrid_common::crs::{CrsCode, ProjectionKind};
use trackgrid_common::geometry::{Point, Shape};
use trackgrid_common::{BoundingBox, Crs, Geometry, TrackGridError, TrackGridResult};

use crate::lambert::LambertConformal;
use crate::mercator::Mercator;

/// Number of points sampled along each bounding box edge by default.
pub const DEFAULT_DENSIFY: usize = 21;

/// A concrete projection built from a [`Crs`].
#[derive(Debug, Clone)]
pub enum Projection {
    Geographic,
    Mercator(Mercator),
    Lambert(LambertConformal),
}

impl Projection {
    pub fn for_crs(crs: &Crs) -> TrackGridResult<Self> {
        Ok(match crs {
            Crs::Code(CrsCode::Epsg4326) | Crs::Code(CrsCode::Epsg4269) => Projection::Geographic,
            Crs::Code(CrsCode::Epsg3857) => Projection::Mercator(Mercator::web()),
            Crs::Params(p) => match p.kind {
                ProjectionKind::LongLat => Projection::Geographic,
                ProjectionKind::Mercator => {
                    Projection::Mercator(Mercator::new(p.lon_0, p.radius, p.x_0, p.y_0))
                }
                ProjectionKind::LambertConformal => {
                    Projection::Lambert(LambertConformal::new(p)?)
                }
            },
        })
    }

    /// Native coordinates to longitude/latitude.
    pub fn to_geographic(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (x, y),
            Projection::Mercator(m) => m.inverse(x, y),
            Projection::Lambert(l) => l.inverse(x, y),
        }
    }

    /// Longitude/latitude to native coordinates.
    pub fn from_geographic(&self, lon: f64, lat: f64) -> TrackGridResult<(f64, f64)> {
        match self {
            Projection::Geographic => Ok((lon, lat)),
            Projection::Mercator(m) => Ok(m.forward(lon, lat)),
            Projection::Lambert(l) => l.forward(lon, lat),
        }
    }
}

/// Transforms coordinates from one CRS to another.
#[derive(Debug, Clone)]
pub struct Transformer {
    src_crs: Crs,
    dst_crs: Crs,
    src: Projection,
    dst: Projection,
}

impl Transformer {
    pub fn new(src_crs: Crs, dst_crs: Crs) -> TrackGridResult<Self> {
        Ok(Self {
            src: Projection::for_crs(&src_crs)?,
            dst: Projection::for_crs(&dst_crs)?,
            src_crs,
            dst_crs,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.src_crs == self.dst_crs
            || (matches!(self.src, Projection::Geographic)
                && matches!(self.dst, Projection::Geographic))
    }

    pub fn dst_crs(&self) -> Crs {
        self.dst_crs
    }

    pub fn transform_point(&self, x: f64, y: f64) -> TrackGridResult<(f64, f64)> {
        if self.is_identity() {
            return Ok((x, y));
        }
        let (lon, lat) = self.src.to_geographic(x, y);
        let (tx, ty) = self.dst.from_geographic(lon, lat)?;
        if !tx.is_finite() || !ty.is_finite() {
            return Err(TrackGridError::Projection(format!(
                "({}, {}) in {} has no finite image in {}",
                x, y, self.src_crs, self.dst_crs
            )));
        }
        Ok((tx, ty))
    }

    pub fn transform_geometry(&self, geometry: &Geometry) -> TrackGridResult<Geometry> {
        if geometry.crs() != self.src_crs {
            return Err(TrackGridError::CrsMismatch {
                expected: self.src_crs.to_string(),
                found: geometry.crs().to_string(),
            });
        }
        match geometry.shape() {
            Shape::Point(p) => {
                let (x, y) = self.transform_point(p.x, p.y)?;
                Ok(Geometry::point(x, y, self.dst_crs))
            }
            Shape::Polygon(ring) => {
                let ring = ring
                    .iter()
                    .map(|p| self.transform_point(p.x, p.y).map(Point::from))
                    .collect::<TrackGridResult<Vec<_>>>()?;
                Geometry::polygon(ring, self.dst_crs)
            }
        }
    }

    /// Transform a bounding box, sampling `densify` points per edge so the
    /// result encloses the curved image of each edge.
    pub fn transform_bbox(&self, bbox: &BoundingBox, densify: usize) -> TrackGridResult<BoundingBox> {
        if bbox.crs != self.src_crs {
            return Err(TrackGridError::CrsMismatch {
                expected: self.src_crs.to_string(),
                found: bbox.crs.to_string(),
            });
        }
        if self.is_identity() {
            return BoundingBox::new(bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y, self.dst_crs);
        }

        let ring = densify_ring(bbox, densify.max(2));
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in &ring {
            let (x, y) = self.transform_point(p.x, p.y)?;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        trace!(
            src = %bbox,
            samples = ring.len(),
            dst_crs = %self.dst_crs,
            "Transformed bounding box"
        );
        BoundingBox::new(min_x, min_y, max_x, max_y, self.dst_crs)
    }
}

/// Points along the boundary of a bounding box, `per_edge` per side.
pub fn densify_ring(bbox: &BoundingBox, per_edge: usize) -> Vec<Point> {
    let steps = per_edge.max(2) - 1;
    let lerp = |a: f64, b: f64, i: usize| a + (b - a) * i as f64 / steps as f64;

    let mut ring = Vec::with_capacity(steps * 4 + 1);
    for i in 0..steps {
        ring.push(Point::new(lerp(bbox.min_x, bbox.max_x, i), bbox.min_y));
    }
    for i in 0..steps {
        ring.push(Point::new(bbox.max_x, lerp(bbox.min_y, bbox.max_y, i)));
    }
    for i in 0..steps {
        ring.push(Point::new(lerp(bbox.max_x, bbox.min_x, i), bbox.max_y));
    }
    for i in 0..steps {
        ring.push(Point::new(bbox.min_x, lerp(bbox.max_y, bbox.min_y, i)));
    }
    ring.push(Point::new(bbox.min_x, bbox.min_y));
    ring
}

/// Transform a single point between two CRS.
pub fn transform_point(src: Crs, dst: Crs, x: f64, y: f64) -> TrackGridResult<(f64, f64)> {
    Transformer::new(src, dst)?.transform_point(x, y)
}
