//! Gridded environmental datasets backed by Zarr V3 stores.
//!
//! - [`GriddedDataset`]: shared `x`/`y`/`time` axes plus named `f32` variables
//! - [`ZarrWriter`] and [`read_store`]: atomic store output and full reads
//! - [`subset`]: clip a dataset to a region and an optional time range
//!
//! # Store layout
//!
//! ```text
//! out.zarr/
//! ├── zarr.json        root group, dataset attributes and `crs`
//! ├── x/               f64 cell centres
//! ├── y/               f64 cell centres
//! ├── time/            i64 seconds since the Unix epoch (optional)
//! └── <variable>/      f32 [time?, y, x], NaN fill
//! ```

pub mod config;
pub mod reader;
pub mod subset;
pub mod types;
pub mod writer;

pub use config::{ZarrCompression, ZarrConfig};
pub use reader::{describe_store, is_zarr_store, list_variables, read_store, StoreSummary};
pub use subset::{subset, subset_store, ClipRegion, SubsetSummary};
pub use types::{GriddedDataset, Variable, TIME_DIM, X_DIM, Y_DIM};
pub use writer::{ensure_target_available, ZarrWriteResult, ZarrWriter};
