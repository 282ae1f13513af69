//! File format detection and cheap summaries of pipeline inputs.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use grid_processor::{describe_store, is_zarr_store};
use trackgrid_common::{TrackGridError, TrackGridResult};

/// Detected input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// GRIB2 (GFS, HRRR, ...)
    Grib2,
    /// Gzip-compressed GRIB2
    Grib2Gz,
    /// Zarr V3 store directory
    ZarrStore,
    /// Delimited animal-tracking table
    TrackTable,
    Unknown,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Grib2 => "grib2",
            FileFormat::Grib2Gz => "grib2.gz",
            FileFormat::ZarrStore => "zarr",
            FileFormat::TrackTable => "track-table",
            FileFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variables and dimension lengths, when known without reading data.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSummary {
    pub variables: Vec<String>,
    pub dims: Vec<(String, usize)>,
}

/// Read-only description of an input path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Bytes on disk; the sum of all files for a store directory.
    pub size: u64,
    pub format: FileFormat,
    pub summary: Option<FormatSummary>,
}

impl FileDescriptor {
    /// Whether the file must go through the GRIB2 converter before subsetting.
    pub fn needs_conversion(&self) -> bool {
        matches!(self.format, FileFormat::Grib2 | FileFormat::Grib2Gz)
    }
}

/// Describe the file or store at `path`.
///
/// Format comes from magic bytes when they are conclusive, else from the
/// file extension.
pub fn describe(path: &Path) -> TrackGridResult<FileDescriptor> {
    let metadata = std::fs::metadata(path).map_err(|e| TrackGridError::io(path, e))?;

    let descriptor = if metadata.is_dir() {
        if is_zarr_store(path) {
            let store = describe_store(path)?;
            FileDescriptor {
                path: path.to_path_buf(),
                size: directory_size(path),
                format: FileFormat::ZarrStore,
                summary: Some(FormatSummary {
                    variables: store.variables,
                    dims: store.dims,
                }),
            }
        } else {
            FileDescriptor {
                path: path.to_path_buf(),
                size: directory_size(path),
                format: FileFormat::Unknown,
                summary: None,
            }
        }
    } else {
        let format = match sniff_magic(path)? {
            Some(format) => format,
            None => format_from_extension(path),
        };
        FileDescriptor {
            path: path.to_path_buf(),
            size: metadata.len(),
            format,
            summary: None,
        }
    };

    debug!(
        path = %path.display(),
        format = %descriptor.format,
        size = descriptor.size,
        "Described input"
    );
    Ok(descriptor)
}

/// Detect file type from path alone.
pub fn format_from_extension(path: &Path) -> FileFormat {
    let lower = path.to_string_lossy().to_lowercase();

    if lower.ends_with(".grib2.gz") || lower.ends_with(".grb2.gz") || lower.ends_with(".grib.gz") {
        FileFormat::Grib2Gz
    } else if lower.ends_with(".grib2") || lower.ends_with(".grb2") || lower.ends_with(".grib") {
        FileFormat::Grib2
    } else if lower.ends_with(".zarr") {
        FileFormat::ZarrStore
    } else if lower.ends_with(".csv") || lower.ends_with(".tsv") || lower.ends_with(".txt") {
        FileFormat::TrackTable
    } else {
        FileFormat::Unknown
    }
}

fn sniff_magic(path: &Path) -> TrackGridResult<Option<FileFormat>> {
    let mut file = std::fs::File::open(path).map_err(|e| TrackGridError::io(path, e))?;
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TrackGridError::io(path, e)),
        }
    }

    let head = &head[..filled];
    Ok(if grib2_parser::is_grib(head) {
        Some(FileFormat::Grib2)
    } else if head.starts_with(&[0x1f, 0x8b]) {
        Some(FileFormat::Grib2Gz)
    } else {
        None
    })
}

fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
