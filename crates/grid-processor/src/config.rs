//! Configuration for Zarr store output.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trackgrid_common::{TrackGridError, TrackGridResult};

/// Chunking and compression of written Zarr arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZarrConfig {
    /// Chunk edge along y and x (time is chunked one step at a time).
    pub chunk_size: usize,

    /// Compression codec for Zarr files.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,
}

impl Default for ZarrConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl ZarrConfig {
    /// Apply `ZARR_*` environment overrides on top of `self`.
    pub fn apply_env(mut self) -> TrackGridResult<Self> {
        if let Ok(val) = std::env::var("ZARR_CHUNK_SIZE") {
            self.chunk_size = parse_env("ZARR_CHUNK_SIZE", &val)?;
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            self.compression = val.parse()?;
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            self.compression_level = parse_env("ZARR_COMPRESSION_LEVEL", &val)?;
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            self.shuffle = val.eq_ignore_ascii_case("true") || val == "1";
        }

        Ok(self)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> TrackGridResult<Self> {
        Self::default().apply_env()
    }

    pub fn validate(&self) -> TrackGridResult<()> {
        if self.chunk_size == 0 {
            return Err(TrackGridError::Config("zarr chunk_size must be > 0".to_string()));
        }

        if self.compression != ZarrCompression::None
            && (self.compression_level == 0 || self.compression_level > 9)
        {
            return Err(TrackGridError::Config(
                "zarr compression_level must be 1-9".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, val: &str) -> TrackGridResult<T> {
    val.trim()
        .parse()
        .map_err(|_| TrackGridError::Config(format!("{}: invalid value '{}'", key, val)))
}

/// Compression codec for Zarr files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl FromStr for ZarrCompression {
    type Err = TrackGridError;

    /// Case-insensitive; `lz4` and `zstd` are accepted as Blosc shorthands.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" | "blosc_lz4" => Ok(Self::BloscLz4),
            "zstd" | "blosc_zstd" => Ok(Self::BloscZstd),
            other => Err(TrackGridError::Config(format!(
                "unknown zarr compression '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        ZarrConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ZarrConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ZarrConfig {
            compression_level: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ZarrConfig {
            compression: ZarrCompression::None,
            compression_level: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compression_parsing() {
        assert_eq!("ZSTD".parse::<ZarrCompression>().unwrap(), ZarrCompression::BloscZstd);
        assert_eq!("blosc_lz4".parse::<ZarrCompression>().unwrap(), ZarrCompression::BloscLz4);
        assert_eq!("none".parse::<ZarrCompression>().unwrap(), ZarrCompression::None);
        assert!("brotli".parse::<ZarrCompression>().is_err());
    }

    #[test]
    fn test_yaml_uses_snake_case() {
        let json = serde_json::to_string(&ZarrCompression::BloscLz4).unwrap();
        assert_eq!(json, "\"blosc_lz4\"");
    }
}
