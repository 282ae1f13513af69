//! Bounding box types and operations.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crs::Crs;
use crate::error::{TrackGridError, TrackGridResult};

/// An axis-aligned bounding box tagged with its CRS.
///
/// For geographic CRS (EPSG:4326), coordinates are in degrees.
/// For projected CRS (EPSG:3857, etc.), coordinates are in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: Crs,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    ///
    /// Zero-area boxes are accepted but logged, since they usually
    /// lead to empty subsets.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Crs) -> TrackGridResult<Self> {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(TrackGridError::DegenerateGeometry(format!(
                "non-finite bounds ({}, {}, {}, {})",
                min_x, min_y, max_x, max_y
            )));
        }
        if min_x > max_x || min_y > max_y {
            return Err(TrackGridError::DegenerateGeometry(format!(
                "inverted bounds ({}, {}, {}, {})",
                min_x, min_y, max_x, max_y
            )));
        }

        let bbox = Self {
            min_x,
            min_y,
            max_x,
            max_y,
            crs,
        };
        if bbox.is_degenerate() {
            warn!(bbox = %bbox, "Degenerate bounding box (zero area)");
        }
        Ok(bbox)
    }

    /// Parse a "minx,miny,maxx,maxy" string.
    pub fn from_bbox_string(s: &str, crs: Crs) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .trim()
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        Self::new(values[0], values[1], values[2], values[3], crs)
            .map_err(|e| BboxParseError::InvalidBounds(e.to_string()))
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when the box has zero width or zero height.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    /// Grow every side outward by `buffer` coordinate units.
    ///
    /// A negative buffer shrinks the box and fails if it would collapse
    /// to zero or negative width or height.
    pub fn expand(&self, buffer: f64) -> TrackGridResult<Self> {
        if !buffer.is_finite() {
            return Err(TrackGridError::DegenerateGeometry(format!(
                "non-finite buffer {}",
                buffer
            )));
        }
        if buffer < 0.0 && (self.width() + 2.0 * buffer <= 0.0 || self.height() + 2.0 * buffer <= 0.0) {
            return Err(TrackGridError::DegenerateGeometry(format!(
                "buffer {} collapses {}",
                buffer, self
            )));
        }

        Ok(Self {
            min_x: self.min_x - buffer,
            min_y: self.min_y - buffer,
            max_x: self.max_x + buffer,
            max_y: self.max_y + buffer,
            crs: self.crs,
        })
    }

    /// Check if this bbox touches or overlaps another (edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Compute the intersection of two bounding boxes in the same CRS.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if self.crs != other.crs || !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
            crs: self.crs,
        })
    }

    /// Check if a point is contained within this bbox (boundary inclusive).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Check if another box lies entirely inside this one.
    pub fn contains_bbox(&self, other: &BoundingBox) -> bool {
        self.crs == other.crs
            && other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Corner coordinates as `[min_x, min_y, max_x, max_y]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {})-({}, {}) [{}]",
            self.min_x, self.min_y, self.max_x, self.max_y, self.crs
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid BBOX format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),

    #[error("Invalid BBOX bounds: {0}")]
    InvalidBounds(String),
}
