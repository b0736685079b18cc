//! Command-line front end for stellar spectral grids.
//!
//! Creates grids from YAML layouts or the built-in model axes, prints grid
//! summaries, interpolates spectra, rebuilds validity indexes and resamples
//! whole grids onto new wavelength grids.

mod commands;
mod transform;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use resampling::ResamplerKind;
use stellar_grid::{GridStoreConfig, ModelAxes, ParamRange, StorageFormat, StorageMode};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use commands::{BuildOptions, GridSource, Method};
use transform::WaveRange;

#[derive(Parser, Debug)]
#[command(name = "gridtool")]
#[command(about = "Create, inspect and interpolate stellar spectral grids", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage mode: eager or lazy (default from GRID_STORAGE_MODE)
    #[arg(long, global = true)]
    storage_mode: Option<StorageMode>,

    /// Storage format: zarr or packed (default from GRID_STORAGE_FORMAT)
    #[arg(long, global = true)]
    format: Option<StorageFormat>,

    /// Log level
    #[arg(long, global = true, env = "GRIDTOOL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

/// Grid file and the description of its axes and value arrays.
#[derive(Args, Debug, Clone)]
struct GridArgs {
    /// Grid file (Zarr directory or packed file)
    path: PathBuf,

    /// YAML layout declaring axes and value arrays
    #[arg(long, conflicts_with = "model")]
    layout: Option<PathBuf>,

    /// Built-in model atmosphere axes: kurucz or test
    #[arg(long)]
    model: Option<ModelAxes>,

    /// Wavelength bins per spectrum of the built-in model
    #[arg(long, default_value_t = 1000)]
    wave_count: usize,
}

impl GridArgs {
    fn source(&self) -> GridSource {
        match (&self.layout, &self.model) {
            (Some(path), _) => GridSource::Layout(path.clone()),
            (None, model) => GridSource::Model {
                axes: model.unwrap_or_default(),
                wave_count: self.wave_count,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty grid
    Create {
        #[command(flatten)]
        grid: GridArgs,

        /// Allocate every value array up front
        #[arg(long)]
        allocate: bool,
    },

    /// Print axes, shapes and valid point counts
    Info {
        #[command(flatten)]
        grid: GridArgs,

        /// Restrict to a parameter range, e.g. T_eff=4000,6000 or log_g=4.5
        #[arg(long = "param", value_name = "NAME=LO[,HI]")]
        params: Vec<ParamRange>,
    },

    /// Interpolate a value and print it as JSON
    Interpolate {
        #[command(flatten)]
        grid: GridArgs,

        /// Target parameter, e.g. T_eff=5800
        #[arg(long = "at", value_name = "NAME=VALUE", required = true)]
        at: Vec<ParamRange>,

        /// Value array to interpolate (default from GridStoreConfig)
        #[arg(long)]
        value: Option<String>,

        #[arg(long, value_enum, default_value = "linear")]
        method: Method,

        /// Axis to fit the spline along
        #[arg(long)]
        free_axis: Option<String>,
    },

    /// Rebuild validity indexes from the stored values
    Reindex {
        #[command(flatten)]
        grid: GridArgs,

        /// Replace existing indexes
        #[arg(long)]
        rebuild: bool,
    },

    /// Resample the spectra of a grid into a new grid
    Build {
        #[command(flatten)]
        grid: GridArgs,

        /// Output grid file
        #[arg(short, long)]
        output: PathBuf,

        /// Restrict the input to a parameter range
        #[arg(long = "param", value_name = "NAME=LO[,HI]")]
        params: Vec<ParamRange>,

        /// Value arrays to resample (default from GridStoreConfig)
        #[arg(long = "value")]
        values: Vec<String>,

        /// Process at most this many points
        #[arg(long)]
        top: Option<usize>,

        /// Resampler: flux-conserving, pchip, interp1d or reference
        #[arg(long, default_value = "flux-conserving")]
        resampler: ResamplerKind,

        /// Wavelength range of the input spectra: start,stop
        #[arg(long)]
        source_wave: WaveRange,

        /// Target wavelength grid: start,stop,count
        #[arg(long)]
        target_wave: WaveRange,

        /// Wavelengths are spaced evenly in log
        #[arg(long)]
        log_wave: bool,
    },
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr; stdout carries command output.
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn store_config(cli: &Cli) -> Result<GridStoreConfig> {
    let mut config = GridStoreConfig::from_env();
    if let Some(mode) = cli.storage_mode {
        config.storage_mode = mode;
    }
    if let Some(format) = cli.format {
        config.storage_format = format;
    }
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json)?;

    let store = store_config(&cli)?;
    info!(
        mode = %store.storage_mode,
        format = %store.storage_format,
        "Starting gridtool"
    );

    match &cli.command {
        Commands::Create { grid, allocate } => commands::create(&grid.path, &store, &grid.source(), *allocate),
        Commands::Info { grid, params } => commands::show(&grid.path, &store, &grid.source(), params),
        Commands::Interpolate {
            grid,
            at,
            value,
            method,
            free_axis,
        } => {
            let name = value.as_deref().unwrap_or(&store.default_value_name);
            commands::interpolate(
                &grid.path,
                &store,
                &grid.source(),
                name,
                at,
                *method,
                free_axis.as_deref(),
            )
        }
        Commands::Reindex { grid, rebuild } => commands::reindex(&grid.path, &store, &grid.source(), *rebuild),
        Commands::Build {
            grid,
            output,
            params,
            values,
            top,
            resampler,
            source_wave,
            target_wave,
            log_wave,
        } => {
            let opts = BuildOptions {
                output: output.clone(),
                names: values.clone(),
                top: *top,
                resampler: *resampler,
                source_wave: *source_wave,
                target_wave: *target_wave,
                log_wave: *log_wave,
            };
            commands::build(&grid.path, &store, &grid.source(), params, &opts)
        }
    }
}
