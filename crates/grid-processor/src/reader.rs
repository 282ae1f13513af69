//! Zarr V3 store reader.
//!
//! Reads stores laid out by [`crate::writer::ZarrWriter`]: a root group,
//! `x`/`y` (and optional `time`) coordinate arrays and one array per
//! variable.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};
use zarrs::array::{Array, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

use trackgrid_common::{TrackGridError, TrackGridResult};

use crate::types::{GriddedDataset, TIME_DIM, X_DIM, Y_DIM};
use crate::writer::{storage_error, ARRAY_DIMENSIONS, CRS_ATTRIBUTE};

/// Variables and dimensions of a store, read from metadata only.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub variables: Vec<String>,
    pub dims: Vec<(String, usize)>,
    pub attributes: Map<String, Value>,
}

/// True when `path` is a directory holding a Zarr V3 root `zarr.json`.
pub fn is_zarr_store(path: &Path) -> bool {
    path.is_dir() && path.join("zarr.json").is_file()
}

/// Read a whole store into memory.
pub fn read_store(path: &Path) -> TrackGridResult<GriddedDataset> {
    let store = open_filesystem(path)?;
    let root_attrs = read_root_attributes(&store, path)?;

    let x: Vec<f64> = read_coordinate(&store, X_DIM)?;
    let y: Vec<f64> = read_coordinate(&store, Y_DIM)?;
    let time = if path.join(TIME_DIM).join("zarr.json").is_file() {
        let seconds: Vec<i64> = read_coordinate(&store, TIME_DIM)?;
        Some(
            seconds
                .into_iter()
                .map(|s| decode_time(s, path))
                .collect::<TrackGridResult<Vec<DateTime<Utc>>>>()?,
        )
    } else {
        None
    };

    let mut dataset = GriddedDataset::new(path.display().to_string(), x, y, time)?;
    for (key, value) in root_attrs {
        match (key.as_str(), value) {
            (CRS_ATTRIBUTE, Value::String(crs)) => dataset = dataset.with_crs(crs),
            (_, value) => dataset.set_attribute(key, value),
        }
    }

    let expected_shape = dataset.variable_shape();
    for name in list_variables(path)? {
        let array = open_array(&store, &name)?;
        if array.shape() != expected_shape.as_slice() {
            return Err(TrackGridError::InvalidDataset(format!(
                "{}: variable '{}' has shape {:?}, dataset dimensions are {:?}",
                path.display(),
                name,
                array.shape(),
                dataset.dims()
            )));
        }
        let data: Vec<f32> = retrieve_all(&array)?;
        let mut attributes = array.attributes().clone();
        attributes.remove(ARRAY_DIMENSIONS);
        debug!(variable = %name, cells = data.len(), "Read variable");
        dataset.add_variable(name, data, attributes)?;
    }

    info!(
        path = %path.display(),
        variables = dataset.variables().len(),
        dims = ?dataset.dims(),
        "Read Zarr store"
    );
    Ok(dataset)
}

/// Summarize a store from its metadata without reading chunk data.
pub fn describe_store(path: &Path) -> TrackGridResult<StoreSummary> {
    let store = open_filesystem(path)?;
    let attributes = read_root_attributes(&store, path)?;

    let mut dims = Vec::new();
    for dim in [TIME_DIM, Y_DIM, X_DIM] {
        if path.join(dim).join("zarr.json").is_file() {
            let array = open_array(&store, dim)?;
            let len = array.shape().first().copied().unwrap_or(0);
            dims.push((dim.to_string(), len as usize));
        }
    }

    Ok(StoreSummary {
        variables: list_variables(path)?,
        dims,
        attributes,
    })
}

/// Names of the variable arrays in a store, sorted.
pub fn list_variables(path: &Path) -> TrackGridResult<Vec<String>> {
    let entries = std::fs::read_dir(path).map_err(|e| TrackGridError::io(path, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TrackGridError::io(path, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || [TIME_DIM, Y_DIM, X_DIM].contains(&name.as_str()) {
            continue;
        }
        if entry.path().join("zarr.json").is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn open_filesystem(path: &Path) -> TrackGridResult<Arc<FilesystemStore>> {
    if !is_zarr_store(path) {
        return Err(TrackGridError::InvalidDataset(format!(
            "{} is not a Zarr V3 store",
            path.display()
        )));
    }
    Ok(Arc::new(FilesystemStore::new(path).map_err(storage_error)?))
}

fn read_root_attributes(
    store: &Arc<FilesystemStore>,
    path: &Path,
) -> TrackGridResult<Map<String, Value>> {
    let group = Group::open(store.clone(), "/")
        .map_err(|e| TrackGridError::storage(format!("{}: {}", path.display(), e)))?;
    Ok(group.attributes().clone())
}

fn open_array(store: &Arc<FilesystemStore>, name: &str) -> TrackGridResult<Array<FilesystemStore>> {
    Array::open(store.clone(), &format!("/{}", name))
        .map_err(|e| TrackGridError::storage(format!("array '{}': {}", name, e)))
}

fn read_coordinate<T: ElementOwned>(
    store: &Arc<FilesystemStore>,
    name: &str,
) -> TrackGridResult<Vec<T>> {
    let array = open_array(store, name)?;
    if array.shape().len() != 1 {
        return Err(TrackGridError::InvalidDataset(format!(
            "coordinate '{}' is not one-dimensional",
            name
        )));
    }
    retrieve_all(&array)
}

fn retrieve_all<T: ElementOwned>(array: &Array<FilesystemStore>) -> TrackGridResult<Vec<T>> {
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements::<T>(&subset)
        .map_err(storage_error)
}

fn decode_time(seconds: i64, path: &Path) -> TrackGridResult<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
        TrackGridError::InvalidDataset(format!(
            "{}: time value {} is out of range",
            path.display(),
            seconds
        ))
    })
}
