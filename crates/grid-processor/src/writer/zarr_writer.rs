//! Zarr V3 writer for gridded datasets.
//!
//! A dataset becomes one store: a root group carrying the dataset
//! attributes, one array per coordinate axis and one array per variable.
//! Every array records its dimension names in `_ARRAY_DIMENSIONS`.
//!
//! Stores are staged in a hidden sibling directory and renamed into place
//! only once every array has been written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;
use zarrs::array::{Array, ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use trackgrid_common::{Crs, TrackGridError, TrackGridResult};

use crate::config::{ZarrCompression, ZarrConfig};
use crate::types::{GriddedDataset, TIME_DIM, X_DIM, Y_DIM};

/// Attribute naming an array's dimensions, outermost first.
pub const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";
/// Root attribute holding the dataset CRS declaration.
pub const CRS_ATTRIBUTE: &str = "crs";
/// Encoding of the time coordinate.
pub const TIME_UNITS: &str = "seconds since 1970-01-01T00:00:00Z";

/// Result of writing a store.
#[derive(Debug, Clone, PartialEq)]
pub struct ZarrWriteResult {
    pub path: PathBuf,
    pub variables: Vec<String>,
    pub dims: Vec<(String, usize)>,
    /// Uncompressed payload size.
    pub bytes_written: u64,
}

/// Writes [`GriddedDataset`]s as Zarr V3 stores on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct ZarrWriter {
    config: ZarrConfig,
}

impl ZarrWriter {
    pub fn new(config: ZarrConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ZarrConfig {
        &self.config
    }

    /// Write `dataset` to a new store at `path`.
    ///
    /// Fails with `FileExists` if `path` exists and `overwrite` is false.
    /// Nothing is left at `path` when writing fails.
    pub fn write(
        &self,
        dataset: &GriddedDataset,
        path: &Path,
        overwrite: bool,
    ) -> TrackGridResult<ZarrWriteResult> {
        self.config.validate()?;
        ensure_target_available(path, overwrite)?;

        let staging = staging_path(path)?;
        debug!(target = %path.display(), staging = %staging.display(), "Staging Zarr store");

        let bytes_written = match self.write_store(dataset, &staging) {
            Ok(bytes) => bytes,
            Err(e) => {
                discard(&staging);
                return Err(e);
            }
        };

        if let Err(e) = commit(&staging, path, overwrite) {
            discard(&staging);
            return Err(e);
        }

        info!(
            path = %path.display(),
            variables = dataset.variables().len(),
            dims = ?dataset.dims(),
            compression = %self.config.compression,
            "Wrote Zarr store"
        );

        Ok(ZarrWriteResult {
            path: path.to_path_buf(),
            variables: dataset.variable_names().into_iter().map(str::to_string).collect(),
            dims: dataset
                .dims()
                .into_iter()
                .map(|(name, len)| (name.to_string(), len))
                .collect(),
            bytes_written,
        })
    }

    fn write_store(&self, dataset: &GriddedDataset, root: &Path) -> TrackGridResult<u64> {
        std::fs::create_dir_all(root).map_err(|e| TrackGridError::io(root, e))?;
        let store = Arc::new(FilesystemStore::new(root).map_err(storage_error)?);

        let mut root_attrs = dataset.attributes().clone();
        if let Some(crs) = dataset.crs() {
            root_attrs.insert(CRS_ATTRIBUTE.to_string(), json!(crs));
        }
        let group = GroupBuilder::new()
            .attributes(root_attrs)
            .build(store.clone(), "/")
            .map_err(storage_error)?;
        group.store_metadata().map_err(storage_error)?;

        let axis_attrs = axis_attributes(dataset.crs());
        let mut bytes = 0u64;

        bytes += self.write_array(
            &store,
            X_DIM,
            &[X_DIM],
            vec![dataset.nx() as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            axis_attrs.0,
            dataset.x(),
        )?;
        bytes += self.write_array(
            &store,
            Y_DIM,
            &[Y_DIM],
            vec![dataset.ny() as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            axis_attrs.1,
            dataset.y(),
        )?;

        if let Some(time) = dataset.time() {
            let seconds: Vec<i64> = time.iter().map(|t| t.timestamp()).collect();
            let mut attrs = Map::new();
            attrs.insert("standard_name".to_string(), json!("time"));
            attrs.insert("units".to_string(), json!(TIME_UNITS));
            attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
            bytes += self.write_array(
                &store,
                TIME_DIM,
                &[TIME_DIM],
                vec![seconds.len() as u64],
                DataType::Int64,
                FillValue::from(i64::MIN),
                attrs,
                &seconds,
            )?;
        }

        let dim_names: Vec<&str> = dataset.dims().into_iter().map(|(name, _)| name).collect();
        for (name, variable) in dataset.variables() {
            bytes += self.write_array(
                &store,
                name,
                &dim_names,
                dataset.variable_shape(),
                DataType::Float32,
                FillValue::from(f32::NAN),
                variable.attributes.clone(),
                &variable.data,
            )?;
        }

        Ok(bytes)
    }

    /// Write one array whose shape follows `dims`.
    #[allow(clippy::too_many_arguments)]
    fn write_array<T: Element>(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
        dims: &[&str],
        shape: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        mut attrs: Map<String, Value>,
        data: &[T],
    ) -> TrackGridResult<u64> {
        let chunk_shape = self.chunk_shape(&shape);

        attrs.insert(ARRAY_DIMENSIONS.to_string(), json!(dims));

        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .try_into()
            .map_err(|e| TrackGridError::Config(format!("invalid chunk shape: {:?}", e)))?;

        let mut builder = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value);
        builder.attributes(attrs);
        if self.config.compression != ZarrCompression::None {
            let codec = self.create_compression_codec(std::mem::size_of::<T>())?;
            builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array: Array<FilesystemStore> = builder
            .build(store.clone(), &format!("/{}", name))
            .map_err(storage_error)?;
        array.store_metadata().map_err(storage_error)?;

        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)
            .map_err(storage_error)?;
        array
            .store_array_subset_elements(&subset, data)
            .map_err(storage_error)?;

        Ok(std::mem::size_of_val(data) as u64)
    }

    /// One timestep per chunk; y and x are tiled by `chunk_size`.
    fn chunk_shape(&self, shape: &[u64]) -> Vec<u64> {
        let edge = self.config.chunk_size as u64;
        match shape.len() {
            1 => vec![shape[0].max(1)],
            n => shape
                .iter()
                .enumerate()
                .map(|(axis, &len)| {
                    if axis + 2 < n {
                        1
                    } else {
                        len.clamp(1, edge)
                    }
                })
                .collect(),
        }
    }

    /// Create the compression codec based on configuration. `element_size`
    /// is the byte width the shuffle filter groups by.
    fn create_compression_codec(
        &self,
        element_size: usize,
    ) -> TrackGridResult<Arc<dyn BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| TrackGridError::Config("invalid compression level".to_string()))?;

        let (shuffle, typesize) = if self.config.shuffle {
            (BloscShuffleMode::Shuffle, Some(element_size))
        } else {
            (BloscShuffleMode::NoShuffle, None)
        };

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(TrackGridError::Config("no compression configured".to_string()))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| TrackGridError::Config(e.to_string()))?;
        Ok(Arc::new(codec))
    }
}

/// Fail with `FileExists` when `path` exists and may not be replaced.
pub fn ensure_target_available(path: &Path, overwrite: bool) -> TrackGridResult<()> {
    if !overwrite && path.exists() {
        return Err(TrackGridError::FileExists(path.to_path_buf()));
    }
    Ok(())
}

/// Hidden sibling of `path` used while a store is being written.
fn staging_path(path: &Path) -> TrackGridResult<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        TrackGridError::Config(format!("output path {} has no file name", path.display()))
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| TrackGridError::io(&parent, e))?;
    Ok(parent.join(format!(
        ".{}.tmp-{}",
        name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}

/// Move a staged store into place.
fn commit(staging: &Path, path: &Path, overwrite: bool) -> TrackGridResult<()> {
    if path.exists() {
        if !overwrite {
            return Err(TrackGridError::FileExists(path.to_path_buf()));
        }
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        removed.map_err(|e| TrackGridError::io(path, e))?;
    }
    std::fs::rename(staging, path).map_err(|e| TrackGridError::io(path, e))
}

fn discard(staging: &Path) {
    if staging.exists() {
        if let Err(e) = std::fs::remove_dir_all(staging) {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
        }
    }
}

/// CF-style attributes for the x and y coordinate arrays.
fn axis_attributes(crs: Option<&str>) -> (Map<String, Value>, Map<String, Value>) {
    let mut x = Map::new();
    let mut y = Map::new();
    match crs.and_then(|c| Crs::parse(c).ok()) {
        Some(crs) if crs.is_geographic() => {
            x.insert("standard_name".to_string(), json!("longitude"));
            x.insert("units".to_string(), json!("degrees_east"));
            y.insert("standard_name".to_string(), json!("latitude"));
            y.insert("units".to_string(), json!("degrees_north"));
        }
        Some(_) => {
            x.insert("standard_name".to_string(), json!("projection_x_coordinate"));
            x.insert("units".to_string(), json!("m"));
            y.insert("standard_name".to_string(), json!("projection_y_coordinate"));
            y.insert("units".to_string(), json!("m"));
        }
        None => {}
    }
    (x, y)
}

pub(crate) fn storage_error(err: impl std::fmt::Display) -> TrackGridError {
    TrackGridError::storage(err.to_string())
}
