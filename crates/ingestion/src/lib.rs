//! Conversion and pipeline layer.
//!
//! - [`GridConverter`]: GRIB2 (optionally gzipped) to Zarr V3
//! - [`tables`]: GRIB2 parameter tables extended from YAML
//! - [`describe`]: file format detection for pipeline inputs
//! - [`ClipPipeline`]: tracks + grid to clipped store, end to end
//! - [`PipelineConfig`]: defaults, YAML and environment configuration

pub mod config;
pub mod convert;
pub mod file_info;
pub mod pipeline;
pub mod tables;

pub use config::PipelineConfig;
pub use convert::{load_grib_bytes, ConversionReport, GridAxes, GridConverter};
pub use file_info::{describe, format_from_extension, FileDescriptor, FileFormat, FormatSummary};
pub use pipeline::{ClipPipeline, PipelineReport};
pub use tables::{load_tables, tables_for, TablesFile};
