//! GRIB2 parameter and level tables extended from YAML.
//!
//! A tables file overrides or adds entries on top of
//! [`Grib2Tables::standard`]:
//!
//! ```yaml
//! parameters:
//!   - { discipline: 0, category: 0, number: 0, name: temp, units: K }
//!   - { discipline: 0, category: 1, number: 8, name: precip }
//! levels:
//!   - { level_type: 103, description: "{value} m above ground" }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use grib2_parser::{Grib2Tables, LevelDescription};
use trackgrid_common::{TrackGridError, TrackGridResult};

/// Contents of a tables file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablesFile {
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default)]
    pub levels: Vec<LevelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterEntry {
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub name: String,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelEntry {
    pub level_type: u8,
    /// Static text, or a template containing `{value}` / `{value_mb}`.
    pub description: String,
}

impl TablesFile {
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Add every entry to `tables`, replacing existing codes.
    pub fn apply(&self, tables: &mut Grib2Tables) {
        for p in &self.parameters {
            match &p.units {
                Some(units) => tables.add_parameter_with_units(
                    p.discipline,
                    p.category,
                    p.number,
                    p.name.clone(),
                    units.clone(),
                ),
                None => tables.add_parameter(p.discipline, p.category, p.number, p.name.clone()),
            }
        }
        for level in &self.levels {
            let description = if level.description.contains("{value") {
                LevelDescription::Template(level.description.clone())
            } else {
                LevelDescription::Static(level.description.clone())
            };
            tables.add_level(level.level_type, description);
        }
    }
}

/// Standard tables extended with the entries of the YAML file at `path`.
pub fn load_tables(path: &Path) -> TrackGridResult<Grib2Tables> {
    let text = std::fs::read_to_string(path).map_err(|e| TrackGridError::io(path, e))?;
    let file = TablesFile::from_yaml_str(&text).map_err(|e| {
        TrackGridError::Config(format!("invalid GRIB2 tables file {}: {}", path.display(), e))
    })?;

    validate_entries(&file, path)?;

    let mut tables = Grib2Tables::standard();
    file.apply(&mut tables);
    debug!(
        path = %path.display(),
        parameters = file.parameters.len(),
        levels = file.levels.len(),
        "Loaded GRIB2 tables"
    );
    Ok(tables)
}

/// Tables for a pipeline: the file at `path` when given, else the standard set.
pub fn tables_for(path: Option<&Path>) -> TrackGridResult<Arc<Grib2Tables>> {
    let tables = match path {
        Some(path) => load_tables(path)?,
        None => Grib2Tables::standard(),
    };
    Ok(Arc::new(tables))
}

fn validate_entries(file: &TablesFile, path: &Path) -> TrackGridResult<()> {
    for p in &file.parameters {
        let name = p.name.trim();
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(TrackGridError::Config(format!(
                "{}: parameter ({}, {}, {}) has invalid name '{}'",
                path.display(),
                p.discipline,
                p.category,
                p.number,
                p.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TABLES: &str = r#"
parameters:
  - name: temp
    discipline: 0
    category: 0
    number: 0
    units: K
  - name: precip
    discipline: 0
    category: 1
    number: 8
levels:
  - level_type: 1
    description: "ground"
  - level_type: 100
    description: "{value_mb} hPa"
"#;

    #[test]
    fn test_load_overrides_standard_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tables.yaml");
        std::fs::write(&path, TABLES).unwrap();

        let tables = load_tables(&path).unwrap();
        assert_eq!(tables.get_parameter_name(0, 0, 0), "temp");
        assert_eq!(tables.get_units(0, 0, 0), Some("K"));
        assert_eq!(tables.get_parameter_name(0, 1, 8), "precip");
        assert_eq!(tables.get_units(0, 1, 8), None);
        assert_eq!(tables.get_level_description(1, 0.0), "ground");
        assert_eq!(tables.get_level_description(100, 50000.0), "500 hPa");

        // untouched standard entries survive
        assert_eq!(tables.get_parameter_name(0, 0, 6), "DPT");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tables.yaml");
        std::fs::write(&path, "parameters: []\nmodels: []\n").unwrap();
        assert!(matches!(load_tables(&path), Err(TrackGridError::Config(_))));
    }

    #[test]
    fn test_bad_name_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tables.yaml");
        std::fs::write(
            &path,
            "parameters:\n  - { discipline: 0, category: 0, number: 0, name: 'a/b' }\n",
        )
        .unwrap();
        assert!(matches!(load_tables(&path), Err(TrackGridError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = load_tables(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, TrackGridError::Io { .. }));
    }

    #[test]
    fn test_no_path_gives_standard_tables() {
        let tables = tables_for(None).unwrap();
        assert_eq!(tables.get_parameter_name(0, 0, 0), "TMP");
    }
}
