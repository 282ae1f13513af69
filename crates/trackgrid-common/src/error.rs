//! Error types shared by every trackgrid stage.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using TrackGridError.
pub type TrackGridResult<T> = Result<T, TrackGridError>;

/// Primary error type for the extent / conversion / subsetting pipeline.
///
/// Errors are raised where they are detected and travel to the caller
/// unchanged; no stage rewraps another stage's error.
#[derive(Debug, Error)]
pub enum TrackGridError {
    // === Input Errors ===
    #[error("Unrecognized track file format in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("No data rows in {0}")]
    EmptyData(String),

    #[error("Data quality check failed: dropped {dropped} of {total} rows (limit {max_fraction:.2})")]
    DataQuality {
        dropped: usize,
        total: usize,
        max_fraction: f64,
    },

    // === Coordinate Reference System Errors ===
    #[error("CRS mismatch: expected {expected}, found {found}")]
    CrsMismatch { expected: String, found: String },

    #[error("Unresolvable CRS for {source_name}: {reason}")]
    UnresolvableCrs { source_name: String, reason: String },

    // === Geometry Errors ===
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Projection error: {0}")]
    Projection(String),

    // === Grid Errors ===
    #[error("Conversion of {path} failed: {reason}")]
    Conversion { path: PathBuf, reason: String },

    #[error("Output already exists: {0}")]
    FileExists(PathBuf),

    #[error("Subset is empty: {0}")]
    EmptySubset(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    // === Infrastructure Errors ===
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrackGridError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a Conversion error.
    pub fn conversion(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnresolvableCrs error.
    pub fn unresolvable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvableCrs {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Short name of the pipeline stage that raises this kind of error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Format { .. } | Self::EmptyData(_) => "track-reader",
            Self::DataQuality { .. } => "geometry-builder",
            Self::CrsMismatch { .. } | Self::UnresolvableCrs { .. } => "crs",
            Self::DegenerateGeometry(_) | Self::Projection(_) => "geometry",
            Self::Conversion { .. } => "grid-converter",
            Self::EmptySubset(_) | Self::InvalidDataset(_) => "subsetter",
            Self::FileExists(_) | Self::Io { .. } | Self::Storage(_) => "io",
            Self::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for TrackGridError {
    fn from(err: serde_json::Error) -> Self {
        TrackGridError::InvalidDataset(format!("JSON error: {}", err))
    }
}
