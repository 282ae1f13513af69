//! Common types shared across the trackgrid workspace: CRS tags, bounding
//! boxes, geometries and the pipeline error type.

pub mod bbox;
pub mod crs;
pub mod crs_resolver;
pub mod error;
pub mod extent;
pub mod geometry;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::{Crs, CrsCode, ProjectionKind, ProjectionParams};
pub use crs_resolver::{CrsOrigin, CrsResolver, CrsSource, DeclaredCrs};
pub use error::{TrackGridError, TrackGridResult};
pub use extent::compute_extent;
pub use geometry::{bbox_to_polygon, ClipPolygon, Geometry, Point, Shape};
pub use time::{parse_timestamp, TimeRange};
