//! GRIB2 to Zarr conversion.
//!
//! Every message of a GRIB2 file becomes one timestep of one variable. All
//! messages must share a single grid. Variables are named after the
//! parameter short name; a parameter present at several levels gets one
//! variable per level, named `{name}_{level}`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use grib2_parser::{Grib2Error, Grib2Message, Grib2Reader, Grib2Tables, GridDefinition, GridTemplate};
use grid_processor::{ensure_target_available, GriddedDataset, ZarrWriteResult, ZarrWriter};
use projection::geographic::normalize_longitude;
use projection::LambertConformal;
use trackgrid_common::{Crs, ProjectionParams, TrackGridError, TrackGridResult};

/// gzip magic number.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Converts GRIB2 files into Zarr V3 stores.
#[derive(Debug, Clone)]
pub struct GridConverter {
    tables: Arc<Grib2Tables>,
    writer: ZarrWriter,
}

/// Outcome of a conversion.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub source: PathBuf,
    pub messages: usize,
    pub reference_time: DateTime<Utc>,
    pub crs: Crs,
    pub store: ZarrWriteResult,
}

impl GridConverter {
    pub fn new(tables: Arc<Grib2Tables>, writer: ZarrWriter) -> Self {
        Self { tables, writer }
    }

    /// Standard parameter tables and default store settings.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(Grib2Tables::standard()), ZarrWriter::default())
    }

    pub fn tables(&self) -> &Grib2Tables {
        &self.tables
    }

    /// Convert the GRIB2 file at `input` into a new store at `output`.
    ///
    /// The target is checked before the source is read, so an existing
    /// `output` fails fast with `FileExists` unless `overwrite` is set.
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        overwrite: bool,
    ) -> TrackGridResult<ConversionReport> {
        ensure_target_available(output, overwrite)?;

        let decoded = self.decode(input)?;
        let mut dataset = decoded.dataset;
        dataset.set_attribute(
            "date_created",
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        let store = self.writer.write(&dataset, output, overwrite)?;
        info!(
            source = %input.display(),
            output = %output.display(),
            messages = decoded.messages,
            variables = ?store.variables,
            dims = ?store.dims,
            "Converted GRIB2 file"
        );

        Ok(ConversionReport {
            source: input.to_path_buf(),
            messages: decoded.messages,
            reference_time: decoded.reference_time,
            crs: decoded.crs,
            store,
        })
    }

    /// Decode the GRIB2 file at `input` into an in-memory dataset.
    ///
    /// The result carries every attribute of a converted store except
    /// `date_created`.
    pub fn read_dataset(&self, input: &Path) -> TrackGridResult<GriddedDataset> {
        Ok(self.decode(input)?.dataset)
    }

    fn decode(&self, input: &Path) -> TrackGridResult<Decoded> {
        let data = load_grib_bytes(input)?;
        let messages = Grib2Reader::new(data, self.tables.clone())
            .read_all()
            .map_err(|e| grib_error(input, e))?;
        let Some(first) = messages.first() else {
            return Err(TrackGridError::conversion(input, "no GRIB2 messages found"));
        };

        for (index, message) in messages.iter().enumerate().skip(1) {
            if !same_grid(&first.grid_definition, &message.grid_definition) {
                return Err(TrackGridError::conversion(
                    input,
                    format!(
                        "message {} ({}) is on a different grid than message 0",
                        index,
                        message.parameter()
                    ),
                ));
            }
        }

        let grid = GridAxes::from_definition(&first.grid_definition)
            .map_err(|e| TrackGridError::conversion(input, e.to_string()))?;

        let valid_times = messages
            .iter()
            .map(|m| m.valid_time().map_err(|e| grib_error(input, e)))
            .collect::<TrackGridResult<Vec<_>>>()?;
        let times: Vec<DateTime<Utc>> = valid_times
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let names = variable_names(&messages);
        let reference_time = first.reference_time();

        let mut dataset = GriddedDataset::new(
            source_name(input),
            grid.x.clone(),
            grid.y.clone(),
            Some(times.clone()),
        )
        .map_err(|e| TrackGridError::conversion(input, e.to_string()))?
        .with_crs(grid.crs.to_string());

        dataset.set_attribute("source", json!(source_name(input)));
        dataset.set_attribute(
            "reference_time",
            json!(reference_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        dataset.set_attribute("grib2_center", json!(first.identification.center));
        dataset.set_attribute("grid_template", json!(first.grid_definition.template_number));

        let (nx, ny) = (grid.x.len(), grid.y.len());
        let cells = nx * ny;
        let mut fields: BTreeMap<String, (Vec<f32>, Map<String, Value>)> = BTreeMap::new();

        for ((message, name), valid_time) in messages.iter().zip(&names).zip(&valid_times) {
            let t = times.binary_search(valid_time).map_err(|_| {
                TrackGridError::conversion(input, format!("valid time {} missing from axis", valid_time))
            })?;

            let values = message.unpack_rows().map_err(|e| grib_error(input, e))?;
            if values.len() != cells {
                return Err(TrackGridError::conversion(
                    input,
                    format!(
                        "{} unpacked to {} values, grid has {}",
                        name,
                        values.len(),
                        cells
                    ),
                ));
            }

            let (data, _) = fields.entry(name.clone()).or_insert_with(|| {
                (vec![f32::NAN; times.len() * cells], variable_attributes(message))
            });
            let slot = &mut data[t * cells..(t + 1) * cells];
            if slot.iter().any(|v| !v.is_nan()) {
                warn!(
                    variable = %name,
                    valid_time = %valid_time,
                    offset = message.offset,
                    "Duplicate field for timestep; keeping the first"
                );
                continue;
            }
            slot.copy_from_slice(&values);
            debug!(variable = %name, valid_time = %valid_time, "Decoded field");
        }

        for (name, (data, attributes)) in fields {
            dataset
                .add_variable(name, data, attributes)
                .map_err(|e| TrackGridError::conversion(input, e.to_string()))?;
        }

        Ok(Decoded {
            dataset,
            messages: messages.len(),
            reference_time,
            crs: grid.crs,
        })
    }
}

struct Decoded {
    dataset: GriddedDataset,
    messages: usize,
    reference_time: DateTime<Utc>,
    crs: Crs,
}

/// Cell-centre coordinates of a GRIB2 grid, in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub crs: Crs,
}

impl GridAxes {
    pub fn from_definition(grid: &GridDefinition) -> TrackGridResult<Self> {
        let scan = grid.scan_mode();
        let i_step = if scan.i_negative { -1.0 } else { 1.0 };
        let j_step = if scan.j_positive { 1.0 } else { -1.0 };

        match &grid.template {
            GridTemplate::LatLon(g) => Ok(Self {
                x: (0..g.ni).map(|i| g.lo1 + i as f64 * g.di * i_step).collect(),
                y: (0..g.nj).map(|j| g.la1 + j as f64 * g.dj * j_step).collect(),
                crs: Crs::wgs84(),
            }),
            GridTemplate::LambertConformal(g) => {
                let params =
                    ProjectionParams::lambert(g.latin1, normalize_longitude(g.lov), g.latin1, g.latin2);
                let (x0, y0) = LambertConformal::new(&params)?.forward(g.lo1, g.la1)?;
                Ok(Self {
                    x: (0..g.nx).map(|i| x0 + i as f64 * g.dx * i_step).collect(),
                    y: (0..g.ny).map(|j| y0 + j as f64 * g.dy * j_step).collect(),
                    crs: Crs::Params(params),
                })
            }
        }
    }
}

/// Read a GRIB2 file, inflating it first when it is gzip-compressed.
pub fn load_grib_bytes(path: &Path) -> TrackGridResult<Bytes> {
    let raw = std::fs::read(path).map_err(|e| TrackGridError::io(path, e))?;
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(Bytes::from(raw));
    }

    let mut decoder = flate2::read::GzDecoder::new(raw.as_slice());
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| TrackGridError::conversion(path, format!("gzip decompression failed: {}", e)))?;
    debug!(
        path = %path.display(),
        compressed = raw.len(),
        decompressed = decompressed.len(),
        "Inflated gzip GRIB2 file"
    );
    Ok(Bytes::from(decompressed))
}

/// Variable name for each message, in message order.
fn variable_names(messages: &[Grib2Message]) -> Vec<String> {
    let mut levels: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for message in messages {
        levels
            .entry(message.parameter())
            .or_default()
            .insert(message.level_token());
    }

    messages
        .iter()
        .map(|message| {
            let name = message.parameter();
            if levels.get(&name).map_or(0, BTreeSet::len) > 1 {
                format!("{}_{}", name, message.level_token())
            } else {
                name
            }
        })
        .collect()
}

fn variable_attributes(message: &Grib2Message) -> Map<String, Value> {
    let (discipline, category, number) = message.parameter_codes();
    let product = &message.product_definition;

    let mut attrs = Map::new();
    attrs.insert("grib2_parameter".to_string(), json!(message.parameter()));
    if let Some(units) = message.units() {
        attrs.insert("units".to_string(), json!(units));
    }
    attrs.insert("grib2_discipline".to_string(), json!(discipline));
    attrs.insert("grib2_category".to_string(), json!(category));
    attrs.insert("grib2_number".to_string(), json!(number));
    attrs.insert("level".to_string(), json!(message.level_description()));
    attrs.insert("level_type".to_string(), json!(product.level_type));
    attrs.insert("level_value".to_string(), json!(product.level_value()));
    attrs.insert("product_template".to_string(), json!(product.template_number));
    attrs
}

fn same_grid(a: &GridDefinition, b: &GridDefinition) -> bool {
    a.template == b.template && a.earth_shape == b.earth_shape
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn grib_error(path: &Path, err: Grib2Error) -> TrackGridError {
    TrackGridError::conversion(path, err.to_string())
}
