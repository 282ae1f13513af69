//! Core types for gridded environmental data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use trackgrid_common::{BoundingBox, Crs, CrsSource, DeclaredCrs, TrackGridError, TrackGridResult};

/// Name of the time dimension and coordinate array.
pub const TIME_DIM: &str = "time";
/// Name of the northing/latitude dimension and coordinate array.
pub const Y_DIM: &str = "y";
/// Name of the easting/longitude dimension and coordinate array.
pub const X_DIM: &str = "x";

/// A gridded variable: `f32` values over the dataset's `[time?, y, x]`
/// dimensions, row-major, `NaN` for missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub data: Vec<f32>,
    pub attributes: Map<String, Value>,
}

/// Gridded dataset with shared coordinate axes.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedDataset {
    source: String,
    x: Vec<f64>,
    y: Vec<f64>,
    time: Option<Vec<DateTime<Utc>>>,
    crs: Option<String>,
    attributes: Map<String, Value>,
    variables: BTreeMap<String, Variable>,
}

impl GriddedDataset {
    /// Create a dataset with the given cell-centre coordinates and no variables.
    pub fn new(
        source: impl Into<String>,
        x: Vec<f64>,
        y: Vec<f64>,
        time: Option<Vec<DateTime<Utc>>>,
    ) -> TrackGridResult<Self> {
        let source = source.into();
        if x.is_empty() || y.is_empty() {
            return Err(TrackGridError::InvalidDataset(format!(
                "{}: empty coordinate axis (x={}, y={})",
                source,
                x.len(),
                y.len()
            )));
        }
        if x.iter().chain(&y).any(|v| !v.is_finite()) {
            return Err(TrackGridError::InvalidDataset(format!(
                "{}: non-finite coordinate",
                source
            )));
        }
        if matches!(&time, Some(t) if t.is_empty()) {
            return Err(TrackGridError::InvalidDataset(format!(
                "{}: empty time axis",
                source
            )));
        }

        Ok(Self {
            source,
            x,
            y,
            time,
            crs: None,
            attributes: Map::new(),
            variables: BTreeMap::new(),
        })
    }

    /// Attach the CRS declaration found in the source (unparsed).
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Add a variable; its length must equal the product of the dimensions.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        data: Vec<f32>,
        attributes: Map<String, Value>,
    ) -> TrackGridResult<()> {
        let name = name.into();
        if name.is_empty()
            || name.contains('/')
            || name.starts_with('.')
            || [TIME_DIM, Y_DIM, X_DIM].contains(&name.as_str())
        {
            return Err(TrackGridError::InvalidDataset(format!(
                "invalid variable name '{}'",
                name
            )));
        }
        if data.len() != self.cell_count() {
            return Err(TrackGridError::InvalidDataset(format!(
                "variable '{}' has {} values, dimensions {:?} need {}",
                name,
                data.len(),
                self.dims(),
                self.cell_count()
            )));
        }
        self.variables.insert(name, Variable { data, attributes });
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn time(&self) -> Option<&[DateTime<Utc>]> {
        self.time.as_deref()
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    /// Number of timesteps; 1 for datasets without a time axis.
    pub fn nt(&self) -> usize {
        self.time.as_ref().map_or(1, Vec::len)
    }

    pub fn ny(&self) -> usize {
        self.y.len()
    }

    pub fn nx(&self) -> usize {
        self.x.len()
    }

    /// Dimension names and lengths, outermost first.
    pub fn dims(&self) -> Vec<(&'static str, usize)> {
        let mut dims = Vec::with_capacity(3);
        if let Some(time) = &self.time {
            dims.push((TIME_DIM, time.len()));
        }
        dims.push((Y_DIM, self.y.len()));
        dims.push((X_DIM, self.x.len()));
        dims
    }

    /// Shape of every variable, outermost dimension first.
    pub fn variable_shape(&self) -> Vec<u64> {
        self.dims().into_iter().map(|(_, len)| len as u64).collect()
    }

    /// Values per variable.
    pub fn cell_count(&self) -> usize {
        self.nt() * self.ny() * self.nx()
    }

    /// Flat index of cell `(t, j, i)`.
    pub fn index(&self, t: usize, j: usize, i: usize) -> usize {
        (t * self.ny() + j) * self.nx() + i
    }

    /// Value of a variable at `(t, j, i)`.
    pub fn value(&self, name: &str, t: usize, j: usize, i: usize) -> Option<f32> {
        if t >= self.nt() || j >= self.ny() || i >= self.nx() {
            return None;
        }
        let idx = self.index(t, j, i);
        self.variables.get(name).and_then(|v| v.data.get(idx).copied())
    }

    /// Coordinate extent, in the dataset's resolved CRS.
    pub fn extent(&self, crs: Crs) -> TrackGridResult<BoundingBox> {
        let (min_x, max_x) = min_max(&self.x);
        let (min_y, max_y) = min_max(&self.y);
        BoundingBox::new(min_x, min_y, max_x, max_y, crs)
    }
}

impl CrsSource for GriddedDataset {
    fn source_name(&self) -> String {
        self.source.clone()
    }

    fn declared_crs(&self) -> TrackGridResult<DeclaredCrs<'_>> {
        Ok(match self.crs.as_deref() {
            Some(text) if !text.trim().is_empty() => DeclaredCrs::Text(text),
            _ => DeclaredCrs::Undeclared,
        })
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trackgrid_common::CrsResolver;

    fn dataset() -> GriddedDataset {
        let times = vec![
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 1, 0, 0).unwrap(),
        ];
        GriddedDataset::new("test", vec![0.0, 1.0, 2.0], vec![10.0, 9.0], Some(times)).unwrap()
    }

    #[test]
    fn test_dims_and_indexing() {
        let mut ds = dataset();
        assert_eq!(ds.dims(), vec![("time", 2), ("y", 2), ("x", 3)]);
        assert_eq!(ds.cell_count(), 12);

        ds.add_variable("t2m", (0..12).map(|v| v as f32).collect(), Map::new())
            .unwrap();
        assert_eq!(ds.value("t2m", 1, 0, 2), Some(8.0));
        assert_eq!(ds.value("t2m", 2, 0, 0), None);
        assert_eq!(ds.value("missing", 0, 0, 0), None);
    }

    #[test]
    fn test_mismatched_variable_rejected() {
        let mut ds = dataset();
        let err = ds.add_variable("t2m", vec![0.0; 5], Map::new()).unwrap_err();
        assert!(matches!(err, TrackGridError::InvalidDataset(_)));
        assert!(ds.add_variable("x", vec![0.0; 12], Map::new()).is_err());
        assert!(ds.add_variable("a/b", vec![0.0; 12], Map::new()).is_err());
    }

    #[test]
    fn test_empty_axis_rejected() {
        assert!(GriddedDataset::new("e", vec![], vec![1.0], None).is_err());
        assert!(GriddedDataset::new("e", vec![1.0], vec![1.0], Some(vec![])).is_err());
    }

    #[test]
    fn test_extent_and_crs_source() {
        let ds = dataset();
        let bbox = ds.extent(Crs::wgs84()).unwrap();
        assert_eq!(bbox.to_array(), [0.0, 9.0, 2.0, 10.0]);

        assert!(CrsResolver::new().resolve(&ds).is_err());
        let ds = ds.with_crs("EPSG:4326");
        assert_eq!(CrsResolver::new().resolve(&ds).unwrap(), Crs::wgs84());
    }
}
