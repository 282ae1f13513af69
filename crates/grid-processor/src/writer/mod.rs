//! Zarr writer for gridded datasets.
//!
//! Used by the converter and the subsetter to persist results as Zarr V3
//! stores.

mod zarr_writer;

pub(crate) use zarr_writer::storage_error;
pub use zarr_writer::{
    ensure_target_available, ZarrWriteResult, ZarrWriter, ARRAY_DIMENSIONS, CRS_ATTRIBUTE,
    TIME_UNITS,
};
