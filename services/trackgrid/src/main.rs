//! trackgrid command line.
//!
//! Computes track extents, converts GRIB2 files to Zarr, subsets stores and
//! runs the full tracks-to-clipped-store pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use grid_processor::{subset_store, ClipRegion};
use ingestion::{describe, ClipPipeline, PipelineConfig};
use trackgrid_common::{bbox_to_polygon, compute_extent, BoundingBox, Crs, TimeRange};
use tracks::{read_tracks, GeometryBuilder};

#[derive(Parser, Debug)]
#[command(name = "trackgrid")]
#[command(about = "Clip gridded environmental data to animal tracks")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "TRACKGRID_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "TRACKGRID_LOG_JSON")]
    log_json: bool,

    /// Replace existing outputs
    #[arg(long, global = true)]
    overwrite: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the extent and clip polygon of a track file
    Extent {
        tracks: PathBuf,

        /// Distance added around the extent, in track CRS units
        #[arg(long)]
        buffer: Option<f64>,
    },

    /// Convert a GRIB2 file into a Zarr store
    Convert { input: PathBuf, output: PathBuf },

    /// Cut a Zarr store down to a bounding box and optional time range
    Subset {
        input: PathBuf,
        output: PathBuf,

        /// minx,miny,maxx,maxy
        #[arg(long)]
        bbox: String,

        /// CRS of --bbox
        #[arg(long, default_value = "EPSG:4326")]
        bbox_crs: String,

        /// `start/end` or a single instant
        #[arg(long)]
        time: Option<String>,
    },

    /// Print format, size and contents of an input
    Describe { path: PathBuf },

    /// Clip a grid file to the extent of a track file
    Run {
        tracks: PathBuf,
        grid: PathBuf,
        output: PathBuf,

        #[arg(long)]
        buffer: Option<f64>,

        /// Restrict the output to the time span of the fixes
        #[arg(long)]
        clip_by_time: bool,

        /// Keep converted GRIB2 stores here
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    let mut config = load_config(args.config.as_deref())?;
    if args.overwrite {
        config.overwrite = true;
    }

    let output = match args.command {
        Command::Extent { tracks, buffer } => {
            if let Some(buffer) = buffer {
                config.buffer = buffer;
            }
            extent(&config, &tracks)?
        }
        Command::Convert { input, output } => {
            let pipeline = ClipPipeline::new(config)?;
            let report = pipeline
                .converter()
                .convert(&input, &output, pipeline.config().overwrite)?;
            json!({
                "source": report.source,
                "output": report.store.path,
                "messages": report.messages,
                "reference_time": report.reference_time,
                "crs": report.crs.to_string(),
                "variables": report.store.variables,
                "dims": dims_json(&report.store.dims),
                "bytes_written": report.store.bytes_written,
            })
        }
        Command::Subset {
            input,
            output,
            bbox,
            bbox_crs,
            time,
        } => {
            let crs = Crs::parse(&bbox_crs).with_context(|| format!("--bbox-crs {}", bbox_crs))?;
            let bbox = BoundingBox::from_bbox_string(&bbox, crs)
                .with_context(|| format!("--bbox {}", bbox))?;
            let time_range = time
                .as_deref()
                .map(TimeRange::parse)
                .transpose()
                .context("--time")?;

            let pipeline = ClipPipeline::new(config)?;
            let summary = subset_store(
                &input,
                &output,
                &ClipRegion::from(bbox),
                time_range.as_ref(),
                &pipeline.resolver()?,
                &pipeline.writer(),
                pipeline.config().overwrite,
            )?;
            json!({
                "input": summary.input,
                "output": summary.write.path,
                "dataset_crs": summary.dataset_crs.to_string(),
                "applied_bbox": summary.applied_bbox.to_array(),
                "input_dims": dims_json(&summary.input_dims),
                "dims": dims_json(&summary.write.dims),
                "variables": summary.write.variables,
            })
        }
        Command::Describe { path } => {
            let descriptor = describe(&path)?;
            let summary = descriptor.summary.as_ref().map(|s| {
                json!({
                    "variables": s.variables,
                    "dims": dims_json(&s.dims),
                })
            });
            json!({
                "path": descriptor.path,
                "format": descriptor.format.as_str(),
                "size": descriptor.size,
                "needs_conversion": descriptor.needs_conversion(),
                "summary": summary,
            })
        }
        Command::Run {
            tracks,
            grid,
            output,
            buffer,
            clip_by_time,
            work_dir,
        } => {
            if let Some(buffer) = buffer {
                config.buffer = buffer;
            }
            config.clip_by_time |= clip_by_time;
            if work_dir.is_some() {
                config.work_dir = work_dir;
            }

            let report = ClipPipeline::new(config)?.run(&tracks, &grid, &output)?;
            json!({
                "tracks": report.tracks_path,
                "fixes": report.fixes,
                "points": report.points,
                "dropped": report.dropped,
                "track_crs": report.track_crs.to_string(),
                "extent": report.extent.to_array(),
                "clip": report.clip.extent().to_array(),
                "time_range": report.time_range,
                "grid_format": report.grid.format.as_str(),
                "converted": report.conversion.is_some(),
                "output": report.output(),
                "dims": dims_json(&report.subset.write.dims),
                "variables": report.subset.write.variables,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_yaml(path)?,
        None => PipelineConfig::default(),
    };
    let config = config.apply_env()?;
    info!(config = ?config, "Loaded configuration");
    Ok(config)
}

fn extent(config: &PipelineConfig, tracks: &Path) -> Result<Value> {
    let table = read_tracks(tracks)?;
    let points = GeometryBuilder::new()
        .with_target_crs(config.target_crs()?)
        .with_max_dropped_fraction(config.max_dropped_fraction)
        .build(&table)?;
    let extent = compute_extent(points.points())?;
    let buffer = (config.buffer != 0.0).then_some(config.buffer);
    let polygon = bbox_to_polygon(&extent, buffer)?;

    Ok(json!({
        "tracks": tracks,
        "fixes": table.len(),
        "points": points.points().len(),
        "dropped": points.dropped(),
        "crs": extent.crs.to_string(),
        "extent": extent.to_array(),
        "polygon": polygon.ring().iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
        "time_range": table.time_span(),
    }))
}

fn dims_json(dims: &[(String, usize)]) -> Value {
    Value::Object(
        dims.iter()
            .map(|(name, len)| (name.clone(), json!(len)))
            .collect(),
    )
}
