//! Tracks + grid through the whole clip pipeline.

use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;

use grid_processor::read_store;
use ingestion::{ClipPipeline, FileFormat, GridConverter, PipelineConfig};
use test_utils::{
    assert_approx_eq, read_metadata, tracks, walking_track_csv, write_fixture, write_grib2_file,
    Grib2Builder,
};
use trackgrid_common::{Crs, TrackGridError};

/// 21 x 21 one-degree grid over 0-20E, 0-20N with 24 hourly steps.
fn write_grid(dir: &Path) -> PathBuf {
    let messages = (0..24).map(|hour| {
        Grib2Builder::new_latlon(21, 21, 20.0, 0.0, 1.0, 1.0)
            .with_forecast_hour(hour)
            .with_gradient(270.0, 300.0)
            .build()
    });
    let path = dir.join("forecast.grib2");
    write_grib2_file(&path, messages).unwrap();
    path
}

fn config() -> PipelineConfig {
    PipelineConfig {
        buffer: 0.5,
        ..Default::default()
    }
}

// ============================================================================
// Full runs
// ============================================================================

#[test]
fn test_grib_input_is_converted_and_clipped() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = write_grid(dir.path());
    let output = dir.path().join("clip.zarr");

    let report = ClipPipeline::new(config()).unwrap().run(&tracks, &grid, &output).unwrap();
    assert_eq!(report.fixes, 3);
    assert_eq!(report.points, 3);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.track_crs, Crs::wgs84());
    assert_eq!(
        (report.extent.min_x, report.extent.min_y, report.extent.max_x, report.extent.max_y),
        (8.0, 9.0, 12.0, 14.0)
    );
    assert_eq!(report.grid.format, FileFormat::Grib2);
    assert!(report.conversion.is_some());
    assert!(report.time_range.is_none());
    assert_eq!(report.output(), output.as_path());

    let ds = read_store(&output).unwrap();
    assert_eq!((ds.nt(), ds.ny(), ds.nx()), (24, 6, 5));
    assert_approx_eq!(ds.x()[0], 8.0, 1e-6);
    assert_approx_eq!(ds.x()[4], 12.0, 1e-6);
    // rows keep the north-first order of the source
    assert_approx_eq!(ds.y()[0], 14.0, 1e-6);
    assert_approx_eq!(ds.y()[5], 9.0, 1e-6);
    assert_eq!(ds.crs(), Some("EPSG:4326"));
    assert!(ds.attributes().contains_key("subset_bbox"));
}

#[test]
fn test_clip_by_time_limits_to_fix_span() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = write_grid(dir.path());
    let output = dir.path().join("clip.zarr");

    let pipeline = ClipPipeline::new(PipelineConfig {
        clip_by_time: true,
        ..config()
    })
    .unwrap();
    let report = pipeline.run(&tracks, &grid, &output).unwrap();
    assert!(report.time_range.is_some());

    // fixes at 00, 06 and 12 UTC select hours 0 through 12 inclusive
    let ds = read_store(&output).unwrap();
    assert_eq!(ds.nt(), 13);
    assert!(read_metadata(&output, "")["attributes"]["subset_time_range"].is_string());
}

#[test]
fn test_short_walk_keeps_small_window() {
    let dir = TempDir::new().unwrap();
    let csv = walking_track_csv(12, 5.0, 5.0);
    let tracks = write_fixture(dir.path(), "walk.csv", &csv);
    let grid = write_grid(dir.path());
    let output = dir.path().join("clip.zarr");

    let pipeline = ClipPipeline::new(PipelineConfig {
        clip_by_time: true,
        ..config()
    })
    .unwrap();
    let report = pipeline.run(&tracks, &grid, &output).unwrap();
    assert_eq!(report.points, 12);

    // x 4.5..6.05 and y 4.5..5.83 after buffering, hours 0..11
    let ds = read_store(&output).unwrap();
    assert_eq!((ds.nt(), ds.ny(), ds.nx()), (12, 1, 2));
}

#[test]
fn test_zarr_input_is_used_directly() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = write_grid(dir.path());
    let store = dir.path().join("forecast.zarr");
    GridConverter::with_defaults().convert(&grid, &store, false).unwrap();

    let output = dir.path().join("clip.zarr");
    let report = ClipPipeline::new(config()).unwrap().run(&tracks, &store, &output).unwrap();
    assert_eq!(report.grid.format, FileFormat::ZarrStore);
    assert!(report.conversion.is_none());
    assert_eq!(report.subset.write.dims[1], ("y".to_string(), 6));
    assert_eq!(report.subset.write.dims[2], ("x".to_string(), 5));
}

#[test]
fn test_work_dir_keeps_converted_store() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = write_grid(dir.path());
    let work = dir.path().join("work");

    let pipeline = ClipPipeline::new(PipelineConfig {
        work_dir: Some(work.clone()),
        ..config()
    })
    .unwrap();
    pipeline.run(&tracks, &grid, &dir.path().join("clip.zarr")).unwrap();

    let converted = work.join("forecast.zarr");
    assert_eq!(read_metadata(&converted, "")["attributes"]["crs"], json!("EPSG:4326"));
    assert_eq!(read_store(&converted).unwrap().nx(), 21);
}

#[test]
fn test_rerun_with_new_output_reuses_work_dir_store() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = write_grid(dir.path());

    let pipeline = ClipPipeline::new(PipelineConfig {
        work_dir: Some(dir.path().join("work")),
        ..config()
    })
    .unwrap();
    let first = pipeline.run(&tracks, &grid, &dir.path().join("a.zarr")).unwrap();
    let second = pipeline.run(&tracks, &grid, &dir.path().join("b.zarr")).unwrap();

    assert!(first.conversion.is_some());
    assert!(second.conversion.is_none());
    assert_eq!(first.subset.write.dims, second.subset.write.dims);
}

#[test]
fn test_unrelated_store_in_work_dir_is_not_reused() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = write_grid(dir.path());
    let work = dir.path().join("work");
    std::fs::create_dir(&work).unwrap();
    std::fs::create_dir(work.join("forecast.zarr")).unwrap();

    let pipeline = ClipPipeline::new(PipelineConfig {
        work_dir: Some(work.clone()),
        ..config()
    })
    .unwrap();
    let err = pipeline.run(&tracks, &grid, &dir.path().join("a.zarr")).unwrap_err();
    assert!(matches!(err, TrackGridError::FileExists(_)));

    let pipeline = ClipPipeline::new(PipelineConfig {
        work_dir: Some(work),
        overwrite: true,
        ..config()
    })
    .unwrap();
    let report = pipeline.run(&tracks, &grid, &dir.path().join("a.zarr")).unwrap();
    assert!(report.conversion.is_some());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_existing_output_fails_before_work() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = write_grid(dir.path());
    let output = dir.path().join("clip.zarr");
    std::fs::create_dir(&output).unwrap();

    let err = ClipPipeline::new(config()).unwrap().run(&tracks, &grid, &output).unwrap_err();
    assert!(matches!(err, TrackGridError::FileExists(_)));
}

#[test]
fn test_unknown_grid_format() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "storks.csv", tracks::EXAMPLE_FIXES_CSV);
    let grid = dir.path().join("forecast.nc");
    std::fs::write(&grid, b"CDF\x01 not supported").unwrap();
    let output = dir.path().join("clip.zarr");

    let err = ClipPipeline::new(config()).unwrap().run(&tracks, &grid, &output).unwrap_err();
    assert!(matches!(err, TrackGridError::Format { .. }));
    assert!(!output.exists());
}

#[test]
fn test_tracks_outside_grid_is_empty_subset() {
    let dir = TempDir::new().unwrap();
    let csv = "timestamp,longitude,latitude\n2024-06-01T00:00:00Z,100.0,-50.0\n";
    let tracks = write_fixture(dir.path(), "far.csv", csv);
    let grid = write_grid(dir.path());
    let output = dir.path().join("clip.zarr");

    let err = ClipPipeline::new(config()).unwrap().run(&tracks, &grid, &output).unwrap_err();
    assert!(matches!(err, TrackGridError::EmptySubset(_)));
    assert!(!output.exists());
}

#[test]
fn test_tracks_without_coordinates() {
    let dir = TempDir::new().unwrap();
    let tracks = write_fixture(dir.path(), "none.csv", tracks::NO_COORDS_CSV);
    let grid = write_grid(dir.path());

    let err = ClipPipeline::new(config())
        .unwrap()
        .run(&tracks, &grid, &dir.path().join("clip.zarr"))
        .unwrap_err();
    assert!(matches!(
        err,
        TrackGridError::Format { .. } | TrackGridError::EmptyData(_) | TrackGridError::DataQuality { .. }
    ));
}
