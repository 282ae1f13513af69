//! Common test fixtures for trackgrid tests.
//!
//! Track tables are written as delimited text into a caller-owned
//! directory (usually a `tempfile::TempDir`).

use std::path::{Path, PathBuf};

/// Common bounding box definitions for testing, as `(min_x, min_y, max_x, max_y)`.
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Continental United States bounding box
    pub const CONUS: (f64, f64, f64, f64) = (-130.0, 20.0, -60.0, 55.0);

    /// Box covering the three example fixes
    pub const EXAMPLE_FIXES: (f64, f64, f64, f64) = (8.0, 9.0, 12.0, 14.0);

    /// Far from every fixture grid
    pub const DISJOINT: (f64, f64, f64, f64) = (100.0, -60.0, 110.0, -50.0);
}

/// Common CRS identifiers.
pub mod crs {
    pub const EPSG_4326: &str = "EPSG:4326";
    pub const EPSG_3857: &str = "EPSG:3857";
    pub const CRS_84: &str = "CRS:84";
    pub const OGC_URN_4326: &str = "urn:ogc:def:crs:EPSG::4326";
    pub const PROJ_LONGLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";
    pub const WKT_4326: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]]"#;
}

/// Common time values for testing.
pub mod time {
    /// Reference time used by GRIB2 fixtures (2024-06-01T00:00:00Z)
    pub const REFERENCE_TIME: &str = "2024-06-01T00:00:00Z";

    /// Hourly steps of the one-day forecast fixture
    pub const FORECAST_HOURS: std::ops::Range<u32> = 0..24;
}

/// Track table fixtures.
pub mod tracks {
    /// The three example fixes in Movebank column naming.
    pub const EXAMPLE_FIXES_CSV: &str = "\
event-id,timestamp,location-long,location-lat,individual-local-identifier,ground-speed
1,2024-06-01 00:00:00.000,10.0,10.0,stork-1,2.5
2,2024-06-01 06:00:00.000,12.0,14.0,stork-1,3.0
3,2024-06-01 12:00:00.000,8.0,9.0,stork-2,1.2
";

    /// Generic naming, semicolon separated, one row without coordinates.
    pub const SEMICOLON_CSV: &str = "\
Time ; Lat ; Lon ; Animal_ID
2024-06-02T03:00:00Z;45.5;-120.25;elk-7
2024-06-02T04:00:00Z;;;elk-7
2024-06-02T05:00:00Z;46.0;-119.5;elk-7
";

    /// Mostly unusable coordinates.
    pub const MOSTLY_BAD_CSV: &str = "\
timestamp,lat,lon
2024-06-01,95.0,10.0
2024-06-01,not-a-number,10.0
2024-06-01,,
2024-06-01,10.0,10.0
";

    /// No recognisable coordinate columns.
    pub const NO_COORDS_CSV: &str = "\
timestamp,x_pos,y_pos
2024-06-01,1.0,2.0
";

    /// Header only.
    pub const HEADER_ONLY_CSV: &str = "timestamp,latitude,longitude\n";
}

/// Write `contents` to `dir/name` and return the path.
pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Err(e) = std::fs::write(&path, contents) {
        panic!("failed to write fixture {}: {}", path.display(), e);
    }
    path
}

/// CSV with `n` fixes on a slow diagonal walk from `(lon0, lat0)`, one per hour.
pub fn walking_track_csv(n: usize, lon0: f64, lat0: f64) -> String {
    let mut csv = String::from("timestamp,location-long,location-lat,individual-local-identifier\n");
    for i in 0..n {
        csv.push_str(&format!(
            "2024-06-01T{:02}:00:00Z,{:.4},{:.4},walker\n",
            i % 24,
            lon0 + i as f64 * 0.05,
            lat0 + i as f64 * 0.03
        ));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_fixes_shape() {
        let lines: Vec<_> = tracks::EXAMPLE_FIXES_CSV.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("location-lat"));
    }

    #[test]
    fn test_walking_track_csv() {
        let csv = walking_track_csv(3, -100.0, 40.0);
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.contains("-99.9000,40.0600"));
    }

    #[test]
    fn test_write_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "a.csv", "x\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x\n");
    }
}
