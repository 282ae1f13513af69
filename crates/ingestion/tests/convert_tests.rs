//! GRIB2 to Zarr conversion over synthetic GRIB2 files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use tempfile::TempDir;

use grid_processor::{read_store, ZarrWriter};
use ingestion::{load_tables, GridConverter};
use test_utils::{assert_approx_eq, 
    array_names, assert_stores_equivalent, create_precipitation_grid, create_temperature_grid,
    read_metadata, write_grib2_file, Grib2Builder,
};
use trackgrid_common::{Crs, ProjectionKind, TrackGridError};

const TABLES_YAML: &str = r#"
parameters:
  - { discipline: 0, category: 0, number: 0, name: temp, units: K }
  - { discipline: 0, category: 1, number: 8, name: precip, units: "kg m-2" }
"#;

const SIZE: usize = 100;
const HOURS: u32 = 24;

fn converter(dir: &Path) -> GridConverter {
    let path = dir.join("tables.yaml");
    std::fs::write(&path, TABLES_YAML).unwrap();
    GridConverter::new(Arc::new(load_tables(&path).unwrap()), ZarrWriter::default())
}

/// 24 hourly `temp` and `precip` fields on a 100 x 100 quarter-degree grid.
fn write_example_grib(dir: &Path) -> PathBuf {
    let grid = || Grib2Builder::new_latlon(SIZE as u32, SIZE as u32, 50.0, 250.0, 0.25, 0.25);
    let mut messages = Vec::new();
    for hour in 0..HOURS {
        messages.push(
            grid()
                .with_parameter(0, 0, 0)
                .with_level(103, 2)
                .with_forecast_hour(hour)
                .with_data(create_temperature_grid(SIZE, SIZE, hour as usize))
                .build(),
        );
        messages.push(
            grid()
                .with_parameter(0, 1, 8)
                .with_level(1, 0)
                .with_forecast_hour(hour)
                .with_data(create_precipitation_grid(SIZE, SIZE, hour))
                .build(),
        );
    }
    let path = dir.join("example.grib2");
    write_grib2_file(&path, messages).unwrap();
    path
}

// ============================================================================
// Example conversion
// ============================================================================

#[test]
fn test_example_converts_to_temp_and_precip() {
    let dir = TempDir::new().unwrap();
    let input = write_example_grib(dir.path());
    let output = dir.path().join("example.zarr");

    let report = converter(dir.path()).convert(&input, &output, false).unwrap();
    assert_eq!(report.messages, 48);
    assert_eq!(report.crs, Crs::wgs84());
    assert_eq!(report.store.variables, vec!["precip", "temp"]);
    assert_eq!(
        report.store.dims,
        vec![
            ("time".to_string(), 24),
            ("y".to_string(), 100),
            ("x".to_string(), 100)
        ]
    );

    assert_eq!(array_names(&output), vec!["precip", "temp", "time", "x", "y"]);
    let temp = read_metadata(&output, "temp");
    assert_eq!(temp["shape"], json!([24, 100, 100]));
    assert_eq!(temp["attributes"]["units"], json!("K"));
    assert_eq!(temp["attributes"]["level"], json!("2 m above ground"));
    assert_eq!(temp["attributes"]["grib2_category"], json!(0));

    let root = read_metadata(&output, "");
    assert_eq!(root["attributes"]["crs"], json!("EPSG:4326"));
    assert_eq!(root["attributes"]["source"], json!("example.grib2"));
    assert_eq!(root["attributes"]["reference_time"], json!("2024-06-01T00:00:00Z"));
    assert!(root["attributes"]["date_created"].is_string());
}

#[test]
fn test_example_values_survive_packing() {
    let dir = TempDir::new().unwrap();
    let input = write_example_grib(dir.path());
    let output = dir.path().join("example.zarr");
    converter(dir.path()).convert(&input, &output, false).unwrap();

    let ds = read_store(&output).unwrap();
    let times = ds.time().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    assert_eq!(times[0], t0);
    assert_eq!(times[23], t0 + Duration::hours(23));

    let expected = create_temperature_grid(SIZE, SIZE, 5);
    for (j, i) in [(0, 0), (10, 90), (99, 99), (50, 3)] {
        let got = ds.value("temp", 5, j, i).unwrap();
        let want = expected[j * SIZE + i];
        assert!((got - want).abs() < 0.01, "temp[5,{},{}] = {} != {}", j, i, got, want);
    }

    assert_approx_eq!(ds.x()[1], 250.25, 1e-9);
    assert_approx_eq!(ds.y()[1], 49.75, 1e-9);
}

#[test]
fn test_rerun_without_overwrite_is_file_exists() {
    let dir = TempDir::new().unwrap();
    let input = write_example_grib(dir.path());
    let output = dir.path().join("example.zarr");
    let converter = converter(dir.path());

    converter.convert(&input, &output, false).unwrap();
    let err = converter.convert(&input, &output, false).unwrap_err();
    assert!(matches!(err, TrackGridError::FileExists(ref p) if p == &output));

    converter.convert(&input, &output, true).unwrap();
}

#[test]
fn test_conversion_is_idempotent_modulo_date_created() {
    let dir = TempDir::new().unwrap();
    let input = write_example_grib(dir.path());
    let a = dir.path().join("a.zarr");
    let b = dir.path().join("b.zarr");
    let converter = converter(dir.path());

    converter.convert(&input, &a, false).unwrap();
    converter.convert(&input, &b, false).unwrap();
    assert_stores_equivalent(&a, &b);
}

// ============================================================================
// Other inputs
// ============================================================================

#[test]
fn test_gzipped_input() {
    let dir = TempDir::new().unwrap();
    let raw = Grib2Builder::new_gfs().with_gradient(270.0, 300.0).build();
    let plain = dir.path().join("gfs.grib2");
    std::fs::write(&plain, &raw).unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    let gz = dir.path().join("gfs.grib2.gz");
    std::fs::write(&gz, encoder.finish().unwrap()).unwrap();

    let converter = GridConverter::with_defaults();
    let from_plain = converter.read_dataset(&plain).unwrap();
    let from_gz = converter.read_dataset(&gz).unwrap();
    assert_eq!(from_plain.variable("TMP"), from_gz.variable("TMP"));
    assert_eq!(from_plain.x(), from_gz.x());
}

#[test]
fn test_missing_timestep_is_nan_filled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gappy.grib2");
    write_grib2_file(
        &path,
        vec![
            Grib2Builder::new_gfs().with_forecast_hour(0).build(),
            Grib2Builder::new_gfs().with_forecast_hour(3).build(),
            Grib2Builder::new_gfs()
                .with_parameter(0, 2, 2)
                .with_level(103, 10)
                .with_forecast_hour(3)
                .with_constant_value(4.0)
                .build(),
        ],
    )
    .unwrap();

    let ds = GridConverter::with_defaults().read_dataset(&path).unwrap();
    assert_eq!(ds.nt(), 2);
    assert!(ds.value("UGRD", 0, 0, 0).unwrap().is_nan());
    assert_approx_eq!(ds.value("UGRD", 1, 4, 4).unwrap(), 4.0, 1e-3);
    assert_approx_eq!(ds.value("TMP", 0, 0, 0).unwrap(), 288.15, 0.01);
}

#[test]
fn test_lambert_grid_gets_projected_axes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hrrr.grib2");
    write_grib2_file(&path, [Grib2Builder::new_lambert(12, 8, 3000.0).build()]).unwrap();

    let ds = GridConverter::with_defaults().read_dataset(&path).unwrap();
    let crs = Crs::parse(ds.crs().unwrap()).unwrap();
    match crs {
        Crs::Params(params) => {
            assert_eq!(params.kind, ProjectionKind::LambertConformal);
            assert_approx_eq!(params.lon_0, -97.5, 1e-6);
            assert_approx_eq!(params.lat_1, 38.5, 1e-6);
        }
        other => panic!("expected Lambert parameters, got {}", other),
    }

    assert_eq!((ds.nx(), ds.ny()), (12, 8));
    assert!((ds.x()[1] - ds.x()[0] - 3000.0).abs() < 1e-6);
    // scanning mode 0x40: rows run north
    assert!(ds.y()[1] > ds.y()[0]);
}

#[test]
fn test_empty_file_is_conversion_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.grib2");
    std::fs::write(&path, b"").unwrap();
    let output = dir.path().join("empty.zarr");

    let err = GridConverter::with_defaults().convert(&path, &output, false).unwrap_err();
    assert!(matches!(err, TrackGridError::Conversion { .. }));
    assert!(!output.exists());
}
