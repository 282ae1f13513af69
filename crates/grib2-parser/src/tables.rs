//! GRIB2 parameter and level lookup tables.
//!
//! Translates numeric codes into parameter short names, units and level
//! descriptions. Tables start from [`Grib2Tables::standard`] or empty and
//! can be extended from configuration (see `ingestion::tables`).

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Level description - either static text or a template with {value} placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum LevelDescription {
    /// Static description (e.g., "surface", "mean sea level")
    Static(String),
    /// Template with `{value}` or `{value_mb}` placeholders
    Template(String),
}

impl LevelDescription {
    /// Format the description, substituting placeholders for templates.
    ///
    /// `{value}` is the level value, `{value_mb}` the value converted from Pa.
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t
                .replace("{value}", &format_number(value))
                .replace("{value_mb}", &format_number(value / 100.0)),
        }
    }
}

/// Name and units of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub units: Option<String>,
}

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: HashMap<ParamKey, ParameterInfo>,
    levels: HashMap<u8, LevelDescription>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Common WMO discipline-0 parameters and level types.
    pub fn standard() -> Self {
        let mut tables = Self::new();
        let params: &[(ParamKey, &str, &str)] = &[
            ((0, 0, 0), "TMP", "K"),
            ((0, 0, 6), "DPT", "K"),
            ((0, 1, 0), "SPFH", "kg kg-1"),
            ((0, 1, 1), "RH", "%"),
            ((0, 1, 3), "PWAT", "kg m-2"),
            ((0, 1, 7), "PRATE", "kg m-2 s-1"),
            ((0, 1, 8), "APCP", "kg m-2"),
            ((0, 1, 11), "SNOD", "m"),
            ((0, 2, 0), "WDIR", "degree"),
            ((0, 2, 1), "WIND", "m s-1"),
            ((0, 2, 2), "UGRD", "m s-1"),
            ((0, 2, 3), "VGRD", "m s-1"),
            ((0, 2, 22), "GUST", "m s-1"),
            ((0, 3, 0), "PRES", "Pa"),
            ((0, 3, 1), "PRMSL", "Pa"),
            ((0, 3, 5), "HGT", "gpm"),
            ((0, 4, 7), "DSWRF", "W m-2"),
            ((0, 6, 1), "TCDC", "%"),
            ((0, 19, 0), "VIS", "m"),
            ((2, 0, 0), "LAND", "Proportion"),
            ((2, 0, 22), "SOILW", "Proportion"),
            ((10, 3, 0), "WTMP", "K"),
        ];
        for &((d, c, n), name, units) in params {
            tables.add_parameter_with_units(d, c, n, name.to_string(), units.to_string());
        }

        let levels: &[(u8, LevelDescription)] = &[
            (1, LevelDescription::Static("surface".to_string())),
            (100, LevelDescription::Template("{value_mb} mb".to_string())),
            (101, LevelDescription::Static("mean sea level".to_string())),
            (102, LevelDescription::Template("{value} m above MSL".to_string())),
            (103, LevelDescription::Template("{value} m above ground".to_string())),
            (106, LevelDescription::Template("{value} m below surface".to_string())),
            (200, LevelDescription::Static("entire atmosphere".to_string())),
        ];
        for (level_type, description) in levels {
            tables.add_level(*level_type, description.clone());
        }
        tables
    }

    /// Add a parameter mapping
    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.parameters
            .insert((discipline, category, number), ParameterInfo { name, units: None });
    }

    /// Add a parameter mapping with units
    pub fn add_parameter_with_units(
        &mut self,
        discipline: u8,
        category: u8,
        number: u8,
        name: String,
        units: String,
    ) {
        self.parameters.insert(
            (discipline, category, number),
            ParameterInfo {
                name,
                units: Some(units),
            },
        );
    }

    /// Add a level description mapping
    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    /// Look up parameter short name by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    pub fn get_units(&self, discipline: u8, category: u8, number: u8) -> Option<&str> {
        self.parameters
            .get(&(discipline, category, number))
            .and_then(|p| p.units.as_deref())
    }

    /// Look up level description by type code and value.
    ///
    /// Returns "Level type {type} value {value}" if not found.
    pub fn get_level_description(&self, level_type: u8, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!("Level type {} value {}", level_type, format_number(level_value)),
        }
    }

    /// Compact level label usable in a variable name (e.g. `2m`, `500mb`, `sfc`).
    pub fn level_token(level_type: u8, level_value: f64) -> String {
        match level_type {
            1 => "sfc".to_string(),
            100 => format!("{}mb", format_number(level_value / 100.0)),
            101 => "msl".to_string(),
            102 => format!("{}m_msl", format_number(level_value)),
            103 => format!("{}m", format_number(level_value)),
            106 => format!("{}m_bgl", format_number(level_value)),
            200 => "atmos".to_string(),
            other => format!("l{}_{}", other, format_number(level_value)),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}

/// Integers print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
