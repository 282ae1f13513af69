//! Pipeline configuration.
//!
//! Loaded from defaults, a YAML file and `TRACKGRID_*` / `ZARR_*`
//! environment variables, in that order of precedence (environment last).

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use grid_processor::ZarrConfig;
use trackgrid_common::{Crs, TrackGridError, TrackGridResult};
use tracks::DEFAULT_MAX_DROPPED_FRACTION;

/// Settings for [`crate::pipeline::ClipPipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Distance added around the track extent, in track CRS units.
    pub buffer: f64,

    /// Largest tolerated share of unusable fixes (0.0 - 1.0).
    pub max_dropped_fraction: f64,

    /// CRS the track points are built in.
    pub target_crs: String,

    /// CRS used for inputs that declare none.
    pub crs_override: Option<String>,

    /// Fall back to EPSG:4326 when an input declares no CRS and no
    /// override is set.
    pub assume_default_crs: bool,

    /// Replace existing output stores.
    pub overwrite: bool,

    /// Restrict the subset to the time span of the fixes.
    pub clip_by_time: bool,

    /// Where converted GRIB2 stores are kept and reused across runs. A
    /// temporary directory is used (and removed) when unset.
    pub work_dir: Option<PathBuf>,

    /// YAML file extending the GRIB2 parameter tables.
    pub tables_path: Option<PathBuf>,

    /// Output store settings.
    pub zarr: ZarrConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer: 0.0,
            max_dropped_fraction: DEFAULT_MAX_DROPPED_FRACTION,
            target_crs: "EPSG:4326".to_string(),
            crs_override: None,
            assume_default_crs: false,
            overwrite: false,
            clip_by_time: false,
            work_dir: None,
            tables_path: None,
            zarr: ZarrConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> TrackGridResult<Self> {
        Self::default().apply_env()
    }

    /// Load configuration from a YAML file. Missing keys take defaults.
    pub fn from_yaml(path: &Path) -> TrackGridResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TrackGridError::io(path, e))?;
        Self::from_yaml_str(&text)
            .map_err(|e| TrackGridError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Apply `TRACKGRID_*` and `ZARR_*` environment overrides on top of `self`.
    pub fn apply_env(mut self) -> TrackGridResult<Self> {
        if let Ok(val) = env::var("TRACKGRID_BUFFER") {
            self.buffer = parse_env("TRACKGRID_BUFFER", &val)?;
        }
        if let Ok(val) = env::var("TRACKGRID_MAX_DROPPED_FRACTION") {
            self.max_dropped_fraction = parse_env("TRACKGRID_MAX_DROPPED_FRACTION", &val)?;
        }
        if let Ok(val) = env::var("TRACKGRID_TARGET_CRS") {
            self.target_crs = val;
        }
        if let Ok(val) = env::var("TRACKGRID_CRS_OVERRIDE") {
            self.crs_override = non_empty(val);
        }
        if let Ok(val) = env::var("TRACKGRID_ASSUME_DEFAULT_CRS") {
            self.assume_default_crs = parse_bool(&val);
        }
        if let Ok(val) = env::var("TRACKGRID_OVERWRITE") {
            self.overwrite = parse_bool(&val);
        }
        if let Ok(val) = env::var("TRACKGRID_CLIP_BY_TIME") {
            self.clip_by_time = parse_bool(&val);
        }
        if let Ok(val) = env::var("TRACKGRID_WORK_DIR") {
            self.work_dir = non_empty(val).map(PathBuf::from);
        }
        if let Ok(val) = env::var("TRACKGRID_TABLES_PATH") {
            self.tables_path = non_empty(val).map(PathBuf::from);
        }

        self.zarr = self.zarr.apply_env()?;
        Ok(self)
    }

    pub fn validate(&self) -> TrackGridResult<()> {
        if !self.buffer.is_finite() {
            return Err(TrackGridError::Config(format!("buffer must be finite, got {}", self.buffer)));
        }
        if !(0.0..=1.0).contains(&self.max_dropped_fraction) {
            return Err(TrackGridError::Config(format!(
                "max_dropped_fraction must be within 0-1, got {}",
                self.max_dropped_fraction
            )));
        }
        self.target_crs()?;
        self.crs_override()?;
        self.zarr.validate()
    }

    pub fn target_crs(&self) -> TrackGridResult<Crs> {
        parse_crs("target_crs", &self.target_crs)
    }

    pub fn crs_override(&self) -> TrackGridResult<Option<Crs>> {
        self.crs_override
            .as_deref()
            .map(|text| parse_crs("crs_override", text))
            .transpose()
    }
}

fn parse_crs(key: &str, text: &str) -> TrackGridResult<Crs> {
    Crs::parse(text).map_err(|e| TrackGridError::Config(format!("{}: {}", key, e)))
}

fn parse_env<T: FromStr>(key: &str, val: &str) -> TrackGridResult<T> {
    val.trim()
        .parse()
        .map_err(|_| TrackGridError::Config(format!("{}: invalid value '{}'", key, val)))
}

fn parse_bool(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(val: String) -> Option<String> {
    if val.trim().is_empty() {
        None
    } else {
        Some(val)
    }
}
