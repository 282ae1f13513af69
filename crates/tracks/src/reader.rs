//! Delimited track-file reader.
//!
//! Column roles are found through alias tables checked in priority order,
//! case-insensitively and ignoring surrounding whitespace. Columns that play
//! no role are kept per fix as extra attributes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use trackgrid_common::{
    parse_timestamp, Crs, CrsSource, DeclaredCrs, TimeRange, TrackGridError, TrackGridResult,
};

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "datetime", "date_time", "time", "date", "t"];
const LATITUDE_ALIASES: &[&str] = &["location-lat", "location_lat", "latitude", "lat"];
const LONGITUDE_ALIASES: &[&str] = &[
    "location-long",
    "location_long",
    "longitude",
    "long",
    "lon",
    "lng",
];
const GROUP_ALIASES: &[&str] = &[
    "individual-local-identifier",
    "individual_local_identifier",
    "individual_id",
    "animal_id",
    "tag-local-identifier",
    "tag_id",
    "id",
];

/// Candidate delimiters, in tie-break order.
const DELIMITERS: &[u8] = b",;\t|";

/// Which header column plays which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub headers: Vec<String>,
    pub timestamp: Option<usize>,
    pub latitude: usize,
    pub longitude: usize,
    pub group: Option<usize>,
}

impl ColumnMapping {
    /// Resolve column roles from a header row.
    fn resolve(headers: &[String], path: &Path) -> TrackGridResult<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut claimed: Vec<usize> = Vec::new();

        let mut find = |aliases: &[&str]| -> Option<usize> {
            let idx = aliases.iter().find_map(|alias| {
                normalized
                    .iter()
                    .enumerate()
                    .position(|(i, h)| h == alias && !claimed.contains(&i))
            })?;
            claimed.push(idx);
            Some(idx)
        };

        let latitude = find(LATITUDE_ALIASES);
        let longitude = find(LONGITUDE_ALIASES);
        let timestamp = find(TIMESTAMP_ALIASES);
        let group = find(GROUP_ALIASES);

        let (latitude, longitude) = match (latitude, longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            (lat, _) => {
                let missing = if lat.is_none() { "latitude" } else { "longitude" };
                return Err(TrackGridError::Format {
                    path: path.to_path_buf(),
                    reason: format!(
                        "no {} column among headers [{}]",
                        missing,
                        headers.join(", ")
                    ),
                });
            }
        };

        Ok(Self {
            headers: headers.to_vec(),
            timestamp,
            latitude,
            longitude,
            group,
        })
    }

    fn header(&self, idx: Option<usize>) -> Option<&str> {
        idx.and_then(|i| self.headers.get(i)).map(|h| h.trim())
    }

    pub fn timestamp_column(&self) -> Option<&str> {
        self.header(self.timestamp)
    }

    pub fn latitude_column(&self) -> &str {
        self.headers[self.latitude].trim()
    }

    pub fn longitude_column(&self) -> &str {
        self.headers[self.longitude].trim()
    }

    pub fn group_column(&self) -> Option<&str> {
        self.header(self.group)
    }

    fn is_role(&self, idx: usize) -> bool {
        idx == self.latitude
            || idx == self.longitude
            || Some(idx) == self.timestamp
            || Some(idx) == self.group
    }
}

/// One tracking fix. Coordinates that were missing or unparseable are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub group_id: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl Fix {
    /// `(lon, lat)` when both are present.
    pub fn lon_lat(&self) -> Option<(f64, f64)> {
        Some((self.longitude?, self.latitude?))
    }
}

/// Parsed tracking table.
#[derive(Debug, Clone, Serialize)]
pub struct TrackTable {
    source: PathBuf,
    delimiter: char,
    columns: ColumnMapping,
    fixes: Vec<Fix>,
}

impl TrackTable {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn columns(&self) -> &ColumnMapping {
        &self.columns
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Earliest and latest parsed timestamp.
    pub fn time_span(&self) -> Option<TimeRange> {
        TimeRange::spanning(self.fixes.iter().filter_map(|f| f.timestamp))
    }

    /// Distinct group ids in first-seen order.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for id in self.fixes.iter().filter_map(|f| f.group_id.as_deref()) {
            if !groups.contains(&id) {
                groups.push(id);
            }
        }
        groups
    }

    /// Table restricted to the fixes of one group.
    pub fn filter_group(&self, group_id: &str) -> TrackTable {
        TrackTable {
            source: self.source.clone(),
            delimiter: self.delimiter,
            columns: self.columns.clone(),
            fixes: self
                .fixes
                .iter()
                .filter(|f| f.group_id.as_deref() == Some(group_id))
                .cloned()
                .collect(),
        }
    }
}

/// Latitude/longitude columns are WGS84 degrees by definition.
impl CrsSource for TrackTable {
    fn source_name(&self) -> String {
        self.source.display().to_string()
    }

    fn declared_crs(&self) -> TrackGridResult<DeclaredCrs<'_>> {
        Ok(DeclaredCrs::Tagged(Crs::wgs84()))
    }
}

/// Read a delimited track file.
pub fn read_tracks(path: &Path) -> TrackGridResult<TrackTable> {
    let bytes = std::fs::read(path).map_err(|e| TrackGridError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    read_tracks_from_str(&text, path)
}

/// Parse track text already in memory; `path` is only used in errors and logs.
pub fn read_tracks_from_str(text: &str, path: &Path) -> TrackGridResult<TrackTable> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(header_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Err(TrackGridError::Format {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    };

    let delimiter = sniff_delimiter(header_line);
    debug!(path = %path.display(), delimiter = %(delimiter as char), "Sniffed delimiter");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();
    let columns = ColumnMapping::resolve(&headers, path)?;

    let mut fixes = Vec::new();
    let mut bad_timestamps = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| format_error(path, e))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let field = |idx: usize| record.get(idx).filter(|v| !v.is_empty());

        let timestamp = match columns.timestamp.and_then(field) {
            Some(raw) => match parse_timestamp(raw) {
                Ok(t) => Some(t),
                Err(_) => {
                    bad_timestamps += 1;
                    None
                }
            },
            None => None,
        };

        let attributes = record
            .iter()
            .enumerate()
            .filter(|(i, _)| !columns.is_role(*i))
            .filter_map(|(i, value)| Some((headers.get(i)?.trim().to_string(), value.to_string())))
            .collect();

        fixes.push(Fix {
            timestamp,
            latitude: field(columns.latitude).and_then(parse_coordinate),
            longitude: field(columns.longitude).and_then(parse_coordinate),
            group_id: columns.group.and_then(field).map(str::to_string),
            attributes,
        });
    }

    if fixes.is_empty() {
        return Err(TrackGridError::EmptyData(path.display().to_string()));
    }

    if bad_timestamps > 0 {
        warn!(
            path = %path.display(),
            unparseable = bad_timestamps,
            rows = fixes.len(),
            "Some timestamps could not be parsed"
        );
    }

    info!(
        path = %path.display(),
        rows = fixes.len(),
        latitude = columns.latitude_column(),
        longitude = columns.longitude_column(),
        "Read track table"
    );

    Ok(TrackTable {
        source: path.to_path_buf(),
        delimiter: delimiter as char,
        columns,
        fixes,
    })
}

/// The candidate occurring most often in the header line; `,` when none does.
fn sniff_delimiter(header_line: &str) -> u8 {
    DELIMITERS
        .iter()
        .map(|&d| (d, header_line.bytes().filter(|&b| b == d).count()))
        .fold((b',', 0), |best, (d, count)| if count > best.1 { (d, count) } else { best })
        .0
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_error(path: &Path, err: csv::Error) -> TrackGridError {
    TrackGridError::Format {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
