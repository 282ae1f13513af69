//! End-to-end clip pipeline.
//!
//! ```text
//! tracks.csv ─► read_tracks ─► GeometryBuilder ─► compute_extent ─► bbox_to_polygon ─┐
//!                                                                                    ▼
//! grid file ─► describe ─► (GRIB2? GridConverter) ─► Zarr store ─► subset_store ─► output.zarr
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use grib2_parser::Grib2Tables;
use grid_processor::{
    describe_store, ensure_target_available, is_zarr_store, subset_store, ClipRegion, SubsetSummary,
    ZarrWriter,
};
use trackgrid_common::{
    bbox_to_polygon, compute_extent, BoundingBox, ClipPolygon, Crs, CrsResolver, TimeRange,
    TrackGridError, TrackGridResult,
};
use tracks::{read_tracks, GeometryBuilder};

use crate::config::PipelineConfig;
use crate::convert::{ConversionReport, GridConverter};
use crate::file_info::{describe, FileDescriptor, FileFormat};
use crate::tables::tables_for;

/// What a pipeline run did.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub tracks_path: PathBuf,
    pub fixes: usize,
    pub points: usize,
    pub dropped: usize,
    pub track_crs: Crs,
    /// Extent of the usable points, before buffering.
    pub extent: BoundingBox,
    pub clip: ClipPolygon,
    pub time_range: Option<TimeRange>,
    pub grid: FileDescriptor,
    /// Set when the grid file was converted from GRIB2.
    pub conversion: Option<ConversionReport>,
    pub subset: SubsetSummary,
}

impl PipelineReport {
    pub fn output(&self) -> &Path {
        &self.subset.write.path
    }
}

/// Runs tracks + grid through extent, conversion and subsetting.
#[derive(Debug, Clone)]
pub struct ClipPipeline {
    config: PipelineConfig,
    tables: Arc<Grib2Tables>,
}

impl ClipPipeline {
    /// Validate `config` and load the GRIB2 tables it names.
    pub fn new(config: PipelineConfig) -> TrackGridResult<Self> {
        config.validate()?;
        let tables = tables_for(config.tables_path.as_deref())?;
        Ok(Self { config, tables })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// CRS resolver configured from the pipeline settings.
    pub fn resolver(&self) -> TrackGridResult<CrsResolver> {
        let mut resolver = CrsResolver::new().assume_default(self.config.assume_default_crs);
        if let Some(crs) = self.config.crs_override()? {
            resolver = resolver.with_override(crs);
        }
        Ok(resolver)
    }

    pub fn converter(&self) -> GridConverter {
        GridConverter::new(self.tables.clone(), self.writer())
    }

    pub fn writer(&self) -> ZarrWriter {
        ZarrWriter::new(self.config.zarr.clone())
    }

    /// Clip the grid at `grid_path` to the tracks at `tracks_path` and write
    /// the result to `output_path`.
    pub fn run(
        &self,
        tracks_path: &Path,
        grid_path: &Path,
        output_path: &Path,
    ) -> TrackGridResult<PipelineReport> {
        ensure_target_available(output_path, self.config.overwrite)?;
        let resolver = self.resolver()?;

        // Clip geometry from the tracks
        let table = read_tracks(tracks_path)?;
        let points = GeometryBuilder::new()
            .with_target_crs(self.config.target_crs()?)
            .with_max_dropped_fraction(self.config.max_dropped_fraction)
            .build(&table)?;
        let track_crs = resolver.resolve(&points)?;
        let extent = compute_extent(points.points())?;
        let buffer = (self.config.buffer != 0.0).then_some(self.config.buffer);
        let clip = bbox_to_polygon(&extent, buffer)?;

        let time_range = if self.config.clip_by_time {
            let span = table.time_span();
            if span.is_none() {
                warn!(
                    tracks = %tracks_path.display(),
                    "No parseable timestamps; subsetting without a time range"
                );
            }
            span
        } else {
            None
        };

        info!(
            tracks = %tracks_path.display(),
            fixes = table.len(),
            points = points.points().len(),
            crs = %track_crs,
            extent = %extent,
            "Built clip region"
        );

        // Environmental data, converted when needed
        let grid = describe(grid_path)?;
        let scratch;
        let (store_path, conversion) = match grid.format {
            FileFormat::ZarrStore => (grid_path.to_path_buf(), None),
            FileFormat::Grib2 | FileFormat::Grib2Gz => {
                let work_dir = match &self.config.work_dir {
                    Some(dir) => {
                        std::fs::create_dir_all(dir).map_err(|e| TrackGridError::io(dir, e))?;
                        dir.clone()
                    }
                    None => {
                        scratch = tempfile::tempdir()
                            .map_err(|e| TrackGridError::io(std::env::temp_dir(), e))?;
                        scratch.path().to_path_buf()
                    }
                };
                let store_path = work_dir.join(converted_store_name(grid_path));
                if converted_from(&store_path, grid_path) {
                    info!(store = %store_path.display(), "Reusing converted store");
                    (store_path, None)
                } else {
                    let converted =
                        self.converter().convert(grid_path, &store_path, self.config.overwrite);
                    match converted {
                        Ok(report) => (store_path, Some(report)),
                        // another run finished the same conversion first
                        Err(_) if converted_from(&store_path, grid_path) => {
                            info!(store = %store_path.display(), "Reusing converted store");
                            (store_path, None)
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            other => {
                return Err(TrackGridError::Format {
                    path: grid_path.to_path_buf(),
                    reason: format!("expected a GRIB2 file or Zarr store, found {}", other),
                })
            }
        };

        let subset = subset_store(
            &store_path,
            output_path,
            &ClipRegion::from(clip.clone()),
            time_range.as_ref(),
            &resolver,
            &self.writer(),
            self.config.overwrite,
        )?;

        info!(
            output = %output_path.display(),
            dims = ?subset.write.dims,
            converted = conversion.is_some(),
            "Pipeline finished"
        );

        Ok(PipelineReport {
            tracks_path: tracks_path.to_path_buf(),
            fixes: table.len(),
            points: points.points().len(),
            dropped: points.dropped(),
            track_crs,
            extent,
            clip,
            time_range,
            grid,
            conversion,
            subset,
        })
    }
}

/// Whether `store` is a readable store converted from a file named like `grid_path`.
fn converted_from(store: &Path, grid_path: &Path) -> bool {
    if !is_zarr_store(store) {
        return false;
    }
    let Some(name) = grid_path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    match describe_store(store) {
        Ok(summary) => summary.attributes.get("source").and_then(|v| v.as_str()) == Some(name.as_ref()),
        Err(e) => {
            warn!(store = %store.display(), error = %e, "Unreadable store in work directory");
            false
        }
    }
}

/// `gfs.t00z.grib2.gz` -> `gfs.t00z.zarr`
fn converted_store_name(grid_path: &Path) -> String {
    let name = grid_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "grid".to_string());
    let lower = name.to_lowercase();
    let stem_len = [".grib2.gz", ".grb2.gz", ".grib.gz", ".grib2", ".grb2", ".grib", ".gz"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map_or(name.len(), |ext| name.len() - ext.len());
    format!("{}.zarr", &name[..stem_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converted_store_name() {
        assert_eq!(converted_store_name(Path::new("/d/gfs.t00z.grib2")), "gfs.t00z.zarr");
        assert_eq!(converted_store_name(Path::new("mrms.GRIB2.gz")), "mrms.zarr");
        assert_eq!(converted_store_name(Path::new("blob")), "blob.zarr");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            max_dropped_fraction: -0.1,
            ..Default::default()
        };
        assert!(matches!(ClipPipeline::new(config), Err(TrackGridError::Config(_))));
    }
}
