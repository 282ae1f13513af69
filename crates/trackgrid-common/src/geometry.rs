//! CRS-tagged geometries and clip polygons.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::crs::Crs;
use crate::crs_resolver::{CrsSource, DeclaredCrs};
use crate::error::{TrackGridError, TrackGridResult};

/// A bare coordinate pair (x = longitude/easting, y = latitude/northing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Shape of a geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Point(Point),
    /// Closed ring: first point repeated at the end.
    Polygon(Vec<Point>),
}

/// A point or polygon carrying the CRS its coordinates are expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    shape: Shape,
    crs: Crs,
}

impl Geometry {
    pub fn point(x: f64, y: f64, crs: Crs) -> Self {
        Self {
            shape: Shape::Point(Point::new(x, y)),
            crs,
        }
    }

    /// Build a polygon from a closed ring of at least four points.
    pub fn polygon(ring: Vec<Point>, crs: Crs) -> TrackGridResult<Self> {
        if ring.len() < 4 {
            return Err(TrackGridError::DegenerateGeometry(format!(
                "polygon ring needs at least 4 points, got {}",
                ring.len()
            )));
        }
        if ring.first() != ring.last() {
            return Err(TrackGridError::DegenerateGeometry(
                "polygon ring is not closed".to_string(),
            ));
        }
        Ok(Self {
            shape: Shape::Polygon(ring),
            crs,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// All coordinates of the geometry.
    pub fn coords(&self) -> &[Point] {
        match &self.shape {
            Shape::Point(p) => std::slice::from_ref(p),
            Shape::Polygon(ring) => ring,
        }
    }
}

impl CrsSource for [Geometry] {
    fn source_name(&self) -> String {
        format!("geometry collection ({} features)", self.len())
    }

    fn declared_crs(&self) -> TrackGridResult<DeclaredCrs<'_>> {
        let Some(first) = self.first() else {
            return Ok(DeclaredCrs::Undeclared);
        };
        if let Some(other) = self.iter().find(|g| g.crs != first.crs) {
            return Err(TrackGridError::CrsMismatch {
                expected: first.crs.to_string(),
                found: other.crs.to_string(),
            });
        }
        Ok(DeclaredCrs::Tagged(first.crs))
    }
}

/// A closed, counter-clockwise 5-point ring derived from a bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPolygon {
    ring: [Point; 5],
    crs: Crs,
}

impl ClipPolygon {
    /// Convert a bounding box into a clip polygon, optionally buffered.
    ///
    /// The ring starts at the lower-left corner and runs counter-clockwise:
    /// `(min_x, min_y) → (max_x, min_y) → (max_x, max_y) → (min_x, max_y) → (min_x, min_y)`.
    pub fn from_bbox(bbox: &BoundingBox, buffer: Option<f64>) -> TrackGridResult<Self> {
        let bbox = match buffer {
            Some(distance) if distance != 0.0 => bbox.expand(distance)?,
            _ => *bbox,
        };

        Ok(Self {
            ring: [
                Point::new(bbox.min_x, bbox.min_y),
                Point::new(bbox.max_x, bbox.min_y),
                Point::new(bbox.max_x, bbox.max_y),
                Point::new(bbox.min_x, bbox.max_y),
                Point::new(bbox.min_x, bbox.min_y),
            ],
            crs: bbox.crs,
        })
    }

    pub fn ring(&self) -> &[Point; 5] {
        &self.ring
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Recompute the axis-aligned extent of the ring.
    pub fn extent(&self) -> BoundingBox {
        let (min_x, min_y, max_x, max_y) = self.ring.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        );
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
            crs: self.crs,
        }
    }

    /// Twice the signed ring area; positive for counter-clockwise rings.
    pub fn signed_area2(&self) -> f64 {
        self.ring
            .windows(2)
            .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
            .sum()
    }

    pub fn to_geometry(&self) -> Geometry {
        Geometry {
            shape: Shape::Polygon(self.ring.to_vec()),
            crs: self.crs,
        }
    }
}

/// Convert a bounding box into a closed clip polygon.
pub fn bbox_to_polygon(bbox: &BoundingBox, buffer: Option<f64>) -> TrackGridResult<ClipPolygon> {
    ClipPolygon::from_bbox(bbox, buffer)
}
