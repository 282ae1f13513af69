//! Spatial and temporal subsetting of gridded datasets.
//!
//! A clip region selects whole grid columns and rows: a cell is kept when
//! its centre lies inside the region's extent, boundary included. The grid
//! itself is never resampled or reprojected; only the clip region is moved
//! into the dataset CRS when the two differ.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::{debug, info};

use projection::geographic::{is_0_360, normalize_longitude};
use projection::{Transformer, DEFAULT_DENSIFY};
use trackgrid_common::{
    BoundingBox, ClipPolygon, Crs, CrsResolver, TimeRange, TrackGridError, TrackGridResult,
};

use crate::reader::read_store;
use crate::types::GriddedDataset;
use crate::writer::{ensure_target_available, ZarrWriteResult, ZarrWriter};

/// Region a dataset is clipped to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipRegion {
    Polygon(ClipPolygon),
    BBox(BoundingBox),
}

impl ClipRegion {
    pub fn crs(&self) -> Crs {
        match self {
            ClipRegion::Polygon(p) => p.crs(),
            ClipRegion::BBox(b) => b.crs,
        }
    }

    /// Axis-aligned extent in the region's own CRS.
    pub fn extent(&self) -> BoundingBox {
        match self {
            ClipRegion::Polygon(p) => p.extent(),
            ClipRegion::BBox(b) => *b,
        }
    }
}

impl From<ClipPolygon> for ClipRegion {
    fn from(polygon: ClipPolygon) -> Self {
        ClipRegion::Polygon(polygon)
    }
}

impl From<BoundingBox> for ClipRegion {
    fn from(bbox: BoundingBox) -> Self {
        ClipRegion::BBox(bbox)
    }
}

/// Outcome of [`subset_store`].
#[derive(Debug, Clone)]
pub struct SubsetSummary {
    pub input: PathBuf,
    pub dataset_crs: Crs,
    /// Clip extent as applied, in the dataset CRS.
    pub applied_bbox: BoundingBox,
    pub input_dims: Vec<(String, usize)>,
    pub write: ZarrWriteResult,
}

/// Clip `dataset` to `clip` and, when both exist, to `time_range`.
///
/// `dataset_crs` is the dataset's resolved CRS. The returned dataset keeps
/// every variable and the source attributes, adds `subset_bbox`,
/// `subset_crs` and `subset_time_range`, and declares `dataset_crs`.
pub fn subset(
    dataset: &GriddedDataset,
    dataset_crs: Crs,
    clip: &ClipRegion,
    time_range: Option<&TimeRange>,
) -> TrackGridResult<GriddedDataset> {
    let bbox = clip_extent_in(clip, dataset_crs)?;

    let x_indices = select_columns(dataset.x(), &bbox, dataset_crs);
    if x_indices.is_empty() {
        return Err(TrackGridError::EmptySubset(format!(
            "{}: no x coordinate within [{}, {}]",
            dataset.source(),
            bbox.min_x,
            bbox.max_x
        )));
    }

    let y_indices: Vec<usize> = dataset
        .y()
        .iter()
        .enumerate()
        .filter(|(_, &y)| y >= bbox.min_y && y <= bbox.max_y)
        .map(|(j, _)| j)
        .collect();
    if y_indices.is_empty() {
        return Err(TrackGridError::EmptySubset(format!(
            "{}: no y coordinate within [{}, {}]",
            dataset.source(),
            bbox.min_y,
            bbox.max_y
        )));
    }

    let (time, t_indices) = match (dataset.time(), time_range) {
        (Some(times), Some(range)) => {
            let t_indices: Vec<usize> = times
                .iter()
                .enumerate()
                .filter(|(_, t)| range.contains(**t))
                .map(|(t, _)| t)
                .collect();
            if t_indices.is_empty() {
                return Err(TrackGridError::EmptySubset(format!(
                    "{}: no timestep within {}",
                    dataset.source(),
                    range
                )));
            }
            (Some(t_indices.iter().map(|&t| times[t]).collect()), t_indices)
        }
        (times, range) => {
            if range.is_some() {
                debug!(source = %dataset.source(), "Dataset has no time axis; ignoring time range");
            }
            (times.map(<[_]>::to_vec), (0..dataset.nt()).collect())
        }
    };

    let x: Vec<f64> = x_indices.iter().map(|&(_, lon)| lon).collect();
    let y: Vec<f64> = y_indices.iter().map(|&j| dataset.y()[j]).collect();

    let mut out = GriddedDataset::new(dataset.source(), x, y, time)?.with_crs(dataset_crs.to_string());
    for (key, value) in dataset.attributes() {
        out.set_attribute(key.clone(), value.clone());
    }
    out.set_attribute("subset_bbox", json!(bbox.to_array()));
    out.set_attribute("subset_crs", json!(dataset_crs.to_string()));
    if let (Some(range), Some(_)) = (time_range, dataset.time()) {
        out.set_attribute("subset_time_range", json!(range.to_string()));
    }

    for (name, variable) in dataset.variables() {
        let mut data = Vec::with_capacity(t_indices.len() * y_indices.len() * x_indices.len());
        for &t in &t_indices {
            for &j in &y_indices {
                let row = dataset.index(t, j, 0);
                data.extend(x_indices.iter().map(|&(i, _)| variable.data[row + i]));
            }
        }
        out.add_variable(name.clone(), data, variable.attributes.clone())?;
    }

    debug!(
        source = %dataset.source(),
        bbox = %bbox,
        input_dims = ?dataset.dims(),
        output_dims = ?out.dims(),
        "Subset dataset"
    );
    Ok(out)
}

/// Read the store at `input`, subset it and write the result to `output`.
///
/// Fails with `FileExists` before reading anything when `output` exists and
/// `overwrite` is false.
pub fn subset_store(
    input: &Path,
    output: &Path,
    clip: &ClipRegion,
    time_range: Option<&TimeRange>,
    resolver: &CrsResolver,
    writer: &ZarrWriter,
    overwrite: bool,
) -> TrackGridResult<SubsetSummary> {
    ensure_target_available(output, overwrite)?;

    let dataset = read_store(input)?;
    let dataset_crs = resolver.resolve(&dataset)?;
    let applied_bbox = clip_extent_in(clip, dataset_crs)?;

    let mut subset = subset(&dataset, dataset_crs, clip, time_range)?;
    subset.set_attribute(
        "date_created",
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    let write = writer.write(&subset, output, overwrite)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        dims = ?write.dims,
        "Wrote subset store"
    );

    Ok(SubsetSummary {
        input: input.to_path_buf(),
        dataset_crs,
        applied_bbox,
        input_dims: dataset
            .dims()
            .into_iter()
            .map(|(name, len)| (name.to_string(), len))
            .collect(),
        write,
    })
}

/// Extent of `clip` expressed in `dataset_crs`.
fn clip_extent_in(clip: &ClipRegion, dataset_crs: Crs) -> TrackGridResult<BoundingBox> {
    let extent = clip.extent();
    let transformer = Transformer::new(clip.crs(), dataset_crs)?;
    if transformer.is_identity() {
        return BoundingBox::new(extent.min_x, extent.min_y, extent.max_x, extent.max_y, dataset_crs);
    }
    let projected = transformer.transform_bbox(&extent, DEFAULT_DENSIFY)?;
    debug!(clip = %extent, projected = %projected, "Reprojected clip region");
    Ok(projected)
}

/// Column indices inside `bbox` with the longitude to emit for each.
///
/// A geographic axis in 0..360 is matched in -180..180 (unless the clip
/// itself reaches past 180) and the selected columns come back ordered by
/// normalized longitude.
fn select_columns(x: &[f64], bbox: &BoundingBox, crs: Crs) -> Vec<(usize, f64)> {
    let normalize = crs.is_geographic() && bbox.max_x <= 180.0 && is_0_360(x);
    let mut selected: Vec<(usize, f64)> = x
        .iter()
        .enumerate()
        .map(|(i, &lon)| (i, if normalize { normalize_longitude(lon) } else { lon }))
        .filter(|&(_, lon)| lon >= bbox.min_x && lon <= bbox.max_x)
        .collect();
    if normalize {
        selected.sort_by(|a, b| a.1.total_cmp(&b.1));
    }
    selected
}
