//! Subsetter behaviour over in-memory datasets and on-disk stores.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map};
use tempfile::TempDir;

use grid_processor::{
    read_store, subset, subset_store, ClipRegion, GriddedDataset, ZarrWriter,
};
use test_utils::fixtures::bbox;
use test_utils::{create_temperature_grid, read_metadata};
use trackgrid_common::{bbox_to_polygon, BoundingBox, Crs, CrsResolver, TimeRange, TrackGridError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// 1-degree grid over x 0..=19, y 14..=0 with 24 hourly steps.
fn hourly_grid() -> GriddedDataset {
    let (nx, ny, nt) = (20, 15, 24);
    let x: Vec<f64> = (0..nx).map(|i| i as f64).collect();
    let y: Vec<f64> = (0..ny).rev().map(|j| j as f64).collect();
    let times = (0..nt).map(|h| t0() + Duration::hours(h as i64)).collect();

    let mut ds = GriddedDataset::new("hourly", x, y, Some(times))
        .unwrap()
        .with_crs("EPSG:4326");
    ds.set_attribute("title", json!("hourly test grid"));
    let data = (0..nt).flat_map(|t| create_temperature_grid(nx, ny, t)).collect();
    let mut attrs = Map::new();
    attrs.insert("units".to_string(), json!("K"));
    ds.add_variable("temp", data, attrs).unwrap();
    ds
}

fn wgs84_box((min_x, min_y, max_x, max_y): (f64, f64, f64, f64)) -> ClipRegion {
    BoundingBox::new(min_x, min_y, max_x, max_y, Crs::wgs84())
        .unwrap()
        .into()
}

fn position(axis: &[f64], value: f64) -> usize {
    axis.iter().position(|&v| v == value).unwrap()
}

// ============================================================================
// Contraction
// ============================================================================

#[test]
fn test_subset_contraction_over_random_boxes() {
    let ds = hourly_grid();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let (a, b) = (rng.gen_range(-5.0..25.0), rng.gen_range(-5.0..25.0));
        let (c, d) = (rng.gen_range(-5.0..20.0), rng.gen_range(-5.0..20.0));
        let clip = wgs84_box((f64::min(a, b), f64::min(c, d), f64::max(a, b), f64::max(c, d)));
        let extent = clip.extent();

        let out = match subset(&ds, Crs::wgs84(), &clip, None) {
            Ok(out) => out,
            Err(TrackGridError::EmptySubset(_)) => continue,
            Err(e) => panic!("unexpected error {:?}", e),
        };

        assert!(out.cell_count() <= ds.cell_count());
        assert!(out.x().iter().all(|&x| x >= extent.min_x && x <= extent.max_x));
        assert!(out.y().iter().all(|&y| y >= extent.min_y && y <= extent.max_y));

        for t in 0..out.nt() {
            for (j, &y) in out.y().iter().enumerate() {
                for (i, &x) in out.x().iter().enumerate() {
                    let src = ds.value("temp", t, position(ds.y(), y), position(ds.x(), x));
                    assert_eq!(out.value("temp", t, j, i), src);
                }
            }
        }
    }
}

#[test]
fn test_source_dataset_untouched() {
    let ds = hourly_grid();
    let before = ds.clone();
    let range = TimeRange::parse("2024-06-01T03:00:00Z/2024-06-01T05:00:00Z").unwrap();
    subset(&ds, Crs::wgs84(), &wgs84_box((2.0, 2.0, 5.0, 5.0)), Some(&range)).unwrap();
    assert_eq!(ds, before);
}

#[test]
fn test_polygon_clip_matches_its_extent() {
    let ds = hourly_grid();
    let extent = BoundingBox::new(8.0, 9.0, 12.0, 14.0, Crs::wgs84()).unwrap();
    let polygon = bbox_to_polygon(&extent, Some(0.5)).unwrap();

    let out = subset(&ds, Crs::wgs84(), &polygon.into(), None).unwrap();
    assert_eq!(out.x(), &[8.0, 9.0, 10.0, 11.0, 12.0]);
    assert_eq!(out.y(), &[14.0, 13.0, 12.0, 11.0, 10.0, 9.0]);
    assert_eq!(out.nt(), 24);
    assert_eq!(out.attributes().get("title"), Some(&json!("hourly test grid")));
    assert_eq!(out.attributes().get("subset_bbox"), Some(&json!([7.5, 8.5, 12.5, 14.5])));
    assert_eq!(out.crs(), Some("EPSG:4326"));
}

// ============================================================================
// Empty results
// ============================================================================

#[test]
fn test_disjoint_clip_is_empty_subset() {
    let ds = hourly_grid();
    let err = subset(&ds, Crs::wgs84(), &wgs84_box(bbox::DISJOINT), None).unwrap_err();
    assert!(matches!(err, TrackGridError::EmptySubset(_)));
}

#[test]
fn test_disjoint_time_range_is_empty_subset() {
    let ds = hourly_grid();
    let range = TimeRange::parse("2024-07-01T00:00:00Z/2024-07-02T00:00:00Z").unwrap();
    let err = subset(&ds, Crs::wgs84(), &wgs84_box(bbox::GLOBAL), Some(&range)).unwrap_err();
    assert!(matches!(err, TrackGridError::EmptySubset(_)));
}

// ============================================================================
// Time and CRS handling
// ============================================================================

#[test]
fn test_time_range_is_inclusive() {
    let ds = hourly_grid();
    let range = TimeRange::parse("2024-06-01T06:00:00Z/2024-06-01T12:00:00Z").unwrap();
    let out = subset(&ds, Crs::wgs84(), &wgs84_box(bbox::GLOBAL), Some(&range)).unwrap();

    let times = out.time().unwrap();
    assert_eq!(times.len(), 7);
    assert_eq!(times[0], t0() + Duration::hours(6));
    assert_eq!(times[6], t0() + Duration::hours(12));
    assert_eq!(out.value("temp", 0, 0, 0), ds.value("temp", 6, 0, 0));
    assert_eq!(
        out.attributes().get("subset_time_range"),
        Some(&json!(range.to_string()))
    );
}

#[test]
fn test_geographic_clip_on_mercator_grid() {
    let x: Vec<f64> = (-4..=4).map(|i| i as f64 * 500_000.0).collect();
    let y: Vec<f64> = (0..=4).rev().map(|j| j as f64 * 500_000.0).collect();
    let mut ds = GriddedDataset::new("merc", x, y, None).unwrap().with_crs("EPSG:3857");
    ds.add_variable("v", (0..45).map(|v| v as f32).collect(), Map::new())
        .unwrap();

    // lon ±10 projects to about ±1.11e6 m, lat 10 to about 1.12e6 m
    let out = subset(&ds, Crs::web_mercator(), &wgs84_box((-10.0, -5.0, 10.0, 10.0)), None).unwrap();
    assert_eq!(out.x(), &[-1_000_000.0, -500_000.0, 0.0, 500_000.0, 1_000_000.0]);
    assert_eq!(out.y(), &[1_000_000.0, 500_000.0, 0.0]);
    assert_eq!(out.crs(), Some("EPSG:3857"));
    assert_eq!(out.value("v", 0, 0, 0), ds.value("v", 0, 2, 3));
}

#[test]
fn test_0_360_grid_with_negative_clip() {
    let x: Vec<f64> = (0..360).step_by(10).map(f64::from).collect();
    let mut ds = GriddedDataset::new("gfs", x, vec![10.0, 0.0], None)
        .unwrap()
        .with_crs("EPSG:4326");
    ds.add_variable("v", (0..72).map(|v| v as f32).collect(), Map::new())
        .unwrap();

    let out = subset(&ds, Crs::wgs84(), &wgs84_box((-20.0, 0.0, 20.0, 10.0)), None).unwrap();
    assert_eq!(out.x(), &[-20.0, -10.0, 0.0, 10.0, 20.0]);
    // x = 340 is column 34 of the source row 0
    assert_eq!(out.value("v", 0, 0, 0), Some(34.0));
    assert_eq!(out.value("v", 0, 0, 2), Some(0.0));
}

// ============================================================================
// Store subsetting
// ============================================================================

#[test]
fn test_subset_store_writes_new_store() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.zarr");
    let output = dir.path().join("out.zarr");
    ZarrWriter::default().write(&hourly_grid(), &input, false).unwrap();

    let range = TimeRange::parse("2024-06-01T00:00:00Z/2024-06-01T02:00:00Z").unwrap();
    let summary = subset_store(
        &input,
        &output,
        &wgs84_box(bbox::EXAMPLE_FIXES),
        Some(&range),
        &CrsResolver::new(),
        &ZarrWriter::default(),
        false,
    )
    .unwrap();

    assert_eq!(summary.dataset_crs, Crs::wgs84());
    assert_eq!(
        summary.write.dims,
        vec![
            ("time".to_string(), 3),
            ("y".to_string(), 6),
            ("x".to_string(), 5)
        ]
    );

    let root = read_metadata(&output, "");
    assert_eq!(root["attributes"]["subset_bbox"], json!([8.0, 9.0, 12.0, 14.0]));
    assert_eq!(root["attributes"]["subset_crs"], json!("EPSG:4326"));
    assert!(root["attributes"]["date_created"].is_string());

    let back = read_store(&output).unwrap();
    assert_eq!(back.variable_names(), vec!["temp"]);

    let err = subset_store(
        &input,
        &output,
        &wgs84_box(bbox::EXAMPLE_FIXES),
        None,
        &CrsResolver::new(),
        &ZarrWriter::default(),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, TrackGridError::FileExists(_)));
}

#[test]
fn test_subset_store_without_crs_needs_resolver_help() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bare.zarr");
    let mut ds = GriddedDataset::new("bare", vec![0.0, 1.0], vec![1.0, 0.0], None).unwrap();
    ds.add_variable("v", vec![1.0, 2.0, 3.0, 4.0], Map::new()).unwrap();
    ZarrWriter::default().write(&ds, &input, false).unwrap();

    let clip = wgs84_box((0.0, 0.0, 1.0, 1.0));
    let writer = ZarrWriter::default();

    let err = subset_store(
        &input,
        &dir.path().join("a.zarr"),
        &clip,
        None,
        &CrsResolver::new(),
        &writer,
        false,
    )
    .unwrap_err();
    assert!(matches!(err, TrackGridError::UnresolvableCrs { .. }));
    assert!(!dir.path().join("a.zarr").exists());

    let summary = subset_store(
        &input,
        &dir.path().join("b.zarr"),
        &clip,
        None,
        &CrsResolver::new().assume_default(true),
        &writer,
        false,
    )
    .unwrap();
    assert_eq!(summary.dataset_crs, Crs::wgs84());
}
