//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use resampling::ResamplerKind;
use serde_json::json;
use stellar_grid::storage::create_storage;
use stellar_grid::{
    ArrayGrid, Coords, GridBuilder, GridConfig, GridLayout, GridStoreConfig, GridTransform, ModelAxes, ParamRange,
    PersistentGrid, StellarModelConfig, StorageMode,
};
use tracing::{info, warn};

use crate::transform::{ResampleTransform, WaveRange};

/// Where the axes and value arrays of a grid are declared.
#[derive(Debug, Clone)]
pub enum GridSource {
    Layout(PathBuf),
    Model { axes: ModelAxes, wave_count: usize },
}

impl GridSource {
    pub fn load(&self) -> Result<Arc<dyn GridConfig>> {
        Ok(match self {
            GridSource::Layout(path) => Arc::new(
                GridLayout::from_file(path).with_context(|| format!("Failed to load layout {:?}", path))?,
            ),
            GridSource::Model { axes, wave_count } => Arc::new(StellarModelConfig::new(*axes, *wave_count)),
        })
    }
}

fn open_grid(
    path: &Path,
    store: &GridStoreConfig,
    source: &GridSource,
    ranges: &[ParamRange],
) -> Result<ArrayGrid> {
    let config = source.load()?;
    ArrayGrid::open(path, store, Some(config), ranges).with_context(|| format!("Failed to open grid {:?}", path))
}

/// Create an empty grid, optionally allocating every value array.
pub fn create(path: &Path, store: &GridStoreConfig, source: &GridSource, allocate: bool) -> Result<()> {
    let config = source.load()?;
    let mut grid = ArrayGrid::create(path, store, Some(config))
        .with_context(|| format!("Failed to create grid {:?}", path))?;
    if allocate {
        grid.allocate_values()?;
    }
    grid.save()?;

    println!("Created grid {}", path.display());
    print_summary(&grid)?;
    Ok(())
}

/// Print axes, shapes and valid point counts.
pub fn show(path: &Path, store: &GridStoreConfig, source: &GridSource, ranges: &[ParamRange]) -> Result<()> {
    let grid = open_grid(path, store, source, ranges)?;
    println!("Grid {}", path.display());
    print_summary(&grid)
}

fn print_summary(grid: &ArrayGrid) -> Result<()> {
    println!("  Mode: {}", grid.storage_mode());
    println!("  Shape: {:?}", grid.get_shape(false));
    if grid.slice().is_some() {
        println!("  Sliced shape: {:?}", grid.get_sliced_shape(false));
    }
    println!("  Axes:");
    for axis in grid.axes().values() {
        println!(
            "    {:<10} {:>4} values  [{}, {}]",
            axis.name(),
            axis.len(),
            axis.min(),
            axis.max()
        );
    }
    println!("  Values:");
    let names: Vec<String> = grid.value_names().map(str::to_string).collect();
    for name in names {
        let valid = grid.get_valid_value_count(&name)?;
        println!(
            "    {:<10} shape {:?}  valid {}",
            name,
            grid.value_shape(&name)?,
            valid
        );
    }
    Ok(())
}

/// How `interpolate` computes the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Method {
    Nearest,
    Linear,
    Spline,
}

/// Interpolate a value at the given parameters and print it as JSON.
pub fn interpolate(
    path: &Path,
    store: &GridStoreConfig,
    source: &GridSource,
    name: &str,
    at: &[ParamRange],
    method: Method,
    free_axis: Option<&str>,
) -> Result<()> {
    let grid = open_grid(path, store, source, &[])?;
    let mut params = Coords::new();
    for p in at {
        match p.values.as_slice() {
            [v] => {
                params.insert(p.name.clone(), *v);
            }
            _ => bail!("parameter {} takes exactly one value", p.name),
        }
    }

    let result = match method {
        Method::Nearest => match grid.get_nearest_value(name, &params)? {
            Some(v) => Some((v, grid.point_coords(&nearest_point(&grid, &params)?))),
            None => None,
        },
        Method::Linear => grid
            .interpolate_value_linear(name, &params)?
            .map(|r| (r.value, r.params)),
        Method::Spline => {
            let Some(axis) = free_axis else {
                bail!("spline interpolation needs --free-axis");
            };
            grid.interpolate_value_spline(name, axis, &params)?
                .map(|r| (r.value, r.params))
        }
    };

    let output = match result {
        Some((value, used)) => json!({
            "value": name,
            "method": format!("{:?}", method).to_lowercase(),
            "params": used,
            "data": value.iter().copied().collect::<Vec<f64>>(),
        }),
        None => {
            warn!(value = %name, params = ?params, "No value at the requested parameters");
            json!({ "value": name, "params": params, "data": null })
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn nearest_point(grid: &ArrayGrid, params: &Coords) -> Result<Vec<usize>> {
    let idx = grid.get_nearest_index(params)?;
    idx.as_point()
        .context("every axis needs a parameter for nearest lookup")
}

/// Rebuild validity indexes from the stored values.
pub fn reindex(path: &Path, store: &GridStoreConfig, source: &GridSource, rebuild: bool) -> Result<()> {
    if store.storage_mode != StorageMode::Eager {
        warn!("Indexes can only be built from resident values, opening eagerly");
    }
    let store = GridStoreConfig {
        storage_mode: StorageMode::Eager,
        ..store.clone()
    };
    let mut grid = open_grid(path, &store, source, &[])?;
    grid.build_value_indexes(rebuild)?;
    grid.save()?;

    let names: Vec<String> = grid.value_names().map(str::to_string).collect();
    for name in names {
        info!(value = %name, valid = grid.get_valid_value_count(&name)?, "Indexed");
    }
    Ok(())
}

/// Options of the `build` subcommand.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub output: PathBuf,
    pub names: Vec<String>,
    pub top: Option<usize>,
    pub resampler: ResamplerKind,
    pub source_wave: WaveRange,
    pub target_wave: WaveRange,
    pub log_wave: bool,
}

/// Resample the spectra of the sliced input grid into a new grid.
pub fn build(
    input_path: &Path,
    store: &GridStoreConfig,
    source: &GridSource,
    ranges: &[ParamRange],
    opts: &BuildOptions,
) -> Result<()> {
    let input = open_grid(input_path, store, source, ranges)?;
    let names = if opts.names.is_empty() {
        vec![store.default_value_name.clone()]
    } else {
        opts.names.clone()
    };

    let source_count = match input.value_shape(&names[0])? {
        [n] => *n,
        other => bail!("value {} has shape {:?}, expected a spectrum", names[0], other),
    };
    let Some(target_count) = opts.target_wave.count else {
        bail!("--target-wave needs a bin count: start,stop,count");
    };
    let source_wave = opts.source_wave.to_wave(source_count, opts.log_wave);
    let target_wave = opts.target_wave.to_wave(target_count, opts.log_wave);

    let mut transform = ResampleTransform::new(opts.resampler, names.clone(), source_wave, target_wave)?;
    let mut output = GridBuilder::create_output_grid(&input, &transform.output_values())?;
    output
        .grid_mut()
        .attach_storage(create_storage(&opts.output, &GridStoreConfig {
            storage_mode: StorageMode::Eager,
            ..store.clone()
        })?);

    let mut builder = GridBuilder::new(input, output, names[0].clone()).with_top(opts.top);
    builder.open()?;
    let result = builder.run(&mut transform)?;
    let (_, mut output) = builder.into_grids();
    output.save()?;

    println!(
        "Built {} from {}: {} points written, {} skipped",
        opts.output.display(),
        input_path.display(),
        result.processed,
        result.skipped
    );
    Ok(())
}
