//! Tracking-table input: reads delimited fix files into a [`TrackTable`]
//! and turns the fixes into CRS-tagged point geometries.

pub mod geometry;
pub mod reader;

pub use geometry::{GeometryBuilder, PointSet, DEFAULT_MAX_DROPPED_FRACTION};
pub use reader::{read_tracks, read_tracks_from_str, ColumnMapping, Fix, TrackTable};
