//! N-dimensional parameter grid holding named value arrays.
//!
//! An [`ArrayGrid`] combines an ordered set of axes with any number of named
//! value arrays. Every value array has the grid shape as leading dimensions
//! and a per-point value shape (scalar or vector) as trailing dimensions.
//! Each array carries a boolean validity index over the full grid; a value is
//! only ever returned at points where that index is true.
//!
//! # Storage modes
//!
//! - **Eager**: value arrays are resident in memory. When a slice is active
//!   only the sliced region is resident, while axes keep their full extent.
//!   Indexes stay in full-grid coordinates; points outside the resident
//!   region read as missing and cannot be written.
//! - **Lazy**: every value access reads or writes the selected region
//!   through the attached storage, which must support random access.
//!
//! # Interpolation
//!
//! Three methods are available, all returning `Ok(None)` when the requested
//! point cannot be interpolated (out of bounds, invalid neighbours):
//! - linear along the single free axis of the grid
//! - multilinear over the free (multi-valued) axes
//! - natural cubic spline along one chosen axis, other axes held at their
//!   nearest grid value

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Dimension, IxDyn, Zip};
use tracing::{debug, info, warn};

use crate::axis::GridAxis;
use crate::config::{GridStoreConfig, StorageMode};
use crate::error::{GridError, Result};
use crate::grid::{Grid, PersistentGrid};
use crate::index::{AxisIndex, Coords, GridIndex, GridSlice, IndexMode, ParamRange};
use crate::interpolation::{fraction, multilinear, CubicSpline, Interpolated};
use crate::policy::{default_validity, GridConfig};
use crate::storage::{create_storage, open_storage, ItemType, ItemView};

/// Coordinate system of [`ArrayGrid::axis_points`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointMode {
    /// Positional indices along each axis.
    #[default]
    Ijk,
    /// Axis values.
    Xyz,
}

/// A declared value array.
#[derive(Debug, Clone, Default)]
struct ValueArray {
    /// Per-point shape.
    shape: Vec<usize>,
    /// Resident values (eager mode), covering `origin`.
    data: Option<ArrayD<f64>>,
    /// Grid region covered by `data`.
    origin: Vec<Range<usize>>,
    /// Validity over the full grid.
    index: Option<ArrayD<bool>>,
}

/// Grid of named value arrays over named parameter axes.
pub struct ArrayGrid {
    grid: Grid,
    config: Option<Arc<dyn GridConfig>>,
    mode: StorageMode,
    values: IndexMap<String, ValueArray>,
    slice: Option<GridSlice>,
}

impl std::fmt::Debug for ArrayGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayGrid")
            .field("grid", &self.grid)
            .field("mode", &self.mode)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("slice", &self.slice)
            .finish()
    }
}

impl Default for ArrayGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayGrid {
    /// Empty eager grid without axes, values or storage.
    pub fn new() -> Self {
        Self {
            grid: Grid::new(),
            config: None,
            mode: StorageMode::Eager,
            values: IndexMap::new(),
            slice: None,
        }
    }

    /// Eager grid over the given axes.
    pub fn from_axes(axes: IndexMap<String, GridAxis>) -> Result<Self> {
        let mut grid = Self::new();
        for (_, axis) in axes {
            grid.add_axis(axis)?;
        }
        Ok(grid)
    }

    /// Grid with axes and value arrays declared by a configuration.
    pub fn with_config(config: Arc<dyn GridConfig>) -> Result<Self> {
        let mut grid = Self::new();
        config.init_axes(&mut grid)?;
        config.init_values(&mut grid)?;
        grid.config = Some(config);
        Ok(grid)
    }

    /// Create a new grid file at `path`.
    ///
    /// Value arrays are allocated on first write or by
    /// [`ArrayGrid::allocate_values`].
    pub fn create(
        path: impl AsRef<Path>,
        store_config: &GridStoreConfig,
        config: Option<Arc<dyn GridConfig>>,
    ) -> Result<Self> {
        Self::check_store_config(store_config)?;
        let mut grid = match config {
            Some(c) => Self::with_config(c)?,
            None => Self::new(),
        };
        grid.mode = store_config.storage_mode;
        grid.grid.attach_storage(create_storage(&path, store_config)?);
        info!(
            path = %path.as_ref().display(),
            mode = %grid.mode,
            format = %store_config.storage_format,
            "Created grid"
        );
        Ok(grid)
    }

    /// Open an existing grid file, restrict it to the given parameter ranges
    /// and load it.
    pub fn open(
        path: impl AsRef<Path>,
        store_config: &GridStoreConfig,
        config: Option<Arc<dyn GridConfig>>,
        ranges: &[ParamRange],
    ) -> Result<Self> {
        Self::check_store_config(store_config)?;
        let mut grid = match config {
            Some(c) => Self::with_config(c)?,
            None => Self::new(),
        };
        grid.mode = store_config.storage_mode;
        grid.grid.attach_storage(open_storage(&path, store_config)?);
        grid.grid.load_axes()?;
        grid.init_from_args(ranges)?;
        grid.load_values()?;
        info!(
            path = %path.as_ref().display(),
            mode = %grid.mode,
            shape = ?grid.get_shape(false),
            sliced = ?grid.get_sliced_shape(false),
            "Opened grid"
        );
        Ok(grid)
    }

    fn check_store_config(config: &GridStoreConfig) -> Result<()> {
        if config.storage_mode == StorageMode::Lazy && !config.storage_format.supports_random_access() {
            return Err(GridError::storage_mode(format!(
                "lazy loading is not supported by the {} format",
                config.storage_format
            )));
        }
        config.validate().map_err(GridError::config)
    }

    pub fn config(&self) -> Option<&Arc<dyn GridConfig>> {
        self.config.as_ref()
    }

    pub fn set_config(&mut self, config: Arc<dyn GridConfig>) {
        self.config = Some(config);
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.mode
    }

    pub fn set_storage_mode(&mut self, mode: StorageMode) -> Result<()> {
        self.mode = mode;
        if self.grid.has_storage() {
            self.ensure_lazy_load()?;
        }
        Ok(())
    }

    /// Fail if lazy mode is requested without random-access storage.
    pub fn ensure_lazy_load(&self) -> Result<()> {
        if self.mode.is_eager() {
            return Ok(());
        }
        match self.grid.storage() {
            Ok(s) if s.supports_random_access() => Ok(()),
            Ok(s) => Err(GridError::storage_mode(format!(
                "lazy loading is not supported by the {} format",
                s.format()
            ))),
            Err(_) => Err(GridError::storage_mode("lazy grid has no storage attached")),
        }
    }

    // ------------------------------------------------------------------------
    // Axes, shape and slicing
    // ------------------------------------------------------------------------

    /// Declare an axis and build its exact value lookup.
    pub fn add_axis(&mut self, mut axis: GridAxis) -> Result<()> {
        axis.build_index()?;
        self.grid.add_axis(axis)
    }

    pub fn axes(&self) -> &IndexMap<String, GridAxis> {
        self.grid.axes()
    }

    pub fn axis(&self, name: &str) -> Result<&GridAxis> {
        self.grid.axis(name)
    }

    pub fn rank(&self) -> usize {
        self.grid.rank()
    }

    /// Full grid shape; `squeeze` drops single-valued axes.
    pub fn get_shape(&self, squeeze: bool) -> Vec<usize> {
        self.grid.get_shape(None, squeeze)
    }

    /// Grid shape restricted to the active slice.
    pub fn get_sliced_shape(&self, squeeze: bool) -> Vec<usize> {
        self.grid.get_shape(self.slice.as_ref(), squeeze)
    }

    pub fn slice(&self) -> Option<&GridSlice> {
        self.slice.as_ref()
    }

    /// Set or clear the active slice.
    ///
    /// An eager grid cannot change its slice once values are resident.
    pub fn set_slice(&mut self, slice: Option<GridSlice>) -> Result<()> {
        let shape = self.get_shape(false);
        if let Some(s) = &slice {
            s.to_index().check_bounds(&shape)?;
            if s.ranges().iter().any(|r| r.is_empty()) {
                return Err(GridError::config(format!("empty slice {:?}", s)));
            }
        }

        let origin = Self::origin_of(slice.as_ref(), &shape);
        if self.mode.is_eager()
            && self
                .values
                .values()
                .any(|v| v.data.is_some() && v.origin != origin)
        {
            return Err(GridError::config("cannot change the slice of an eager grid with resident values"));
        }

        debug!(slice = ?slice, "Set grid slice");
        self.slice = slice;
        Ok(())
    }

    /// Slice selected by parameter ranges, `None` if no axis is restricted.
    ///
    /// One value pins the axis to the grid point at or below it; two values
    /// select the grid points bracketing `[min, max]`. Ranges naming unknown
    /// axes are ignored.
    pub fn get_slice_from_args(&self, ranges: &[ParamRange]) -> Result<Option<GridSlice>> {
        let mut restricted = false;
        let mut out = Vec::with_capacity(self.rank());
        for axis in self.grid.axes().values() {
            let range = match ranges.iter().find(|p| p.name == axis.name()) {
                None => 0..axis.len(),
                Some(p) => {
                    restricted = true;
                    match p.values.as_slice() {
                        [v] => {
                            let i = axis.digitize_point(*v);
                            i..i + 1
                        }
                        [lo, hi] => axis.digitize_range(*lo, *hi),
                        other => {
                            return Err(GridError::config(format!(
                                "parameter {} takes one or two values, got {}",
                                p.name,
                                other.len()
                            )))
                        }
                    }
                }
            };
            out.push(range);
        }
        Ok(restricted.then_some(GridSlice(out)))
    }

    /// Set the active slice from parameter ranges.
    pub fn init_from_args(&mut self, ranges: &[ParamRange]) -> Result<()> {
        let slice = self.get_slice_from_args(ranges)?;
        self.set_slice(slice)
    }

    /// Axes restricted to the active slice.
    pub fn sliced_axes(&self) -> IndexMap<String, GridAxis> {
        self.grid
            .axes()
            .iter()
            .enumerate()
            .map(|(i, (name, axis))| {
                let axis = match &self.slice {
                    Some(s) => axis.slice(s.ranges()[i].clone()),
                    None => axis.clone(),
                };
                (name.clone(), axis)
            })
            .collect()
    }

    fn origin_of(slice: Option<&GridSlice>, shape: &[usize]) -> Vec<Range<usize>> {
        match slice {
            Some(s) => s.ranges().to_vec(),
            None => shape.iter().map(|&n| 0..n).collect(),
        }
    }

    /// Region of the grid covered by the active slice.
    fn origin(&self) -> Vec<Range<usize>> {
        Self::origin_of(self.slice.as_ref(), &self.get_shape(false))
    }

    /// Extend every multi-valued axis by `size` points on each side,
    /// continuing the spacing at its edges.
    pub fn pad_axes(axes: &IndexMap<String, GridAxis>, size: usize) -> IndexMap<String, GridAxis> {
        axes.iter()
            .map(|(name, axis)| {
                let v = axis.values();
                let n = v.len();
                if n < 2 || size == 0 {
                    return (name.clone(), axis.clone());
                }
                let lo_step = v[1] - v[0];
                let hi_step = v[n - 1] - v[n - 2];
                let mut padded = Vec::with_capacity(n + 2 * size);
                padded.extend((1..=size).rev().map(|i| v[0] - i as f64 * lo_step));
                padded.extend_from_slice(v);
                padded.extend((1..=size).map(|i| v[n - 1] + i as f64 * hi_step));
                (name.clone(), GridAxis::new(name.clone(), padded))
            })
            .collect()
    }

    /// Grid points along every axis, optionally padded and squeezed.
    ///
    /// In [`PointMode::Ijk`] padded points get negative or past-the-end
    /// positions relative to the original axis.
    pub fn axis_points(&self, padding: usize, squeeze: bool, mode: PointMode) -> IndexMap<String, Array1<f64>> {
        let padded = Self::pad_axes(self.grid.axes(), padding);
        padded
            .into_iter()
            .zip(self.grid.axes().values())
            .filter(|((_, axis), _)| !squeeze || axis.len() > 1)
            .map(|((name, axis), orig)| {
                let offset = (axis.len() - orig.len()) / 2;
                let points = match mode {
                    PointMode::Xyz => axis.to_array(),
                    PointMode::Ijk => (0..axis.len()).map(|i| i as f64 - offset as f64).collect(),
                };
                (name, points)
            })
            .collect()
    }

    /// Coordinate arrays of every grid point, one per axis (`ij` indexing).
    pub fn meshgrid_points(&self, padding: usize, squeeze: bool, mode: PointMode) -> Vec<ArrayD<f64>> {
        let points: Vec<Array1<f64>> = self
            .axis_points(padding, squeeze, mode)
            .into_values()
            .collect();
        let shape: Vec<usize> = points.iter().map(|p| p.len()).collect();
        points
            .iter()
            .enumerate()
            .map(|(j, p)| ArrayD::from_shape_fn(IxDyn(&shape), |d| p[d[j]]))
            .collect()
    }

    /// Axis values at a grid point.
    pub fn point_coords(&self, point: &[usize]) -> Coords {
        self.grid
            .axes()
            .values()
            .zip(point)
            .map(|(axis, &i)| (axis.name().to_string(), axis.value(i)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Value array declarations
    // ------------------------------------------------------------------------

    /// Declare a value array with the given per-point shape.
    pub fn init_value(&mut self, name: &str, shape: &[usize]) -> Result<()> {
        if shape.len() > 1 {
            return Err(GridError::config(format!(
                "value {} has shape {:?}, only scalars and vectors are supported",
                name, shape
            )));
        }
        debug!(name = %name, shape = ?shape, "Declared value array");
        self.values.insert(
            name.to_string(),
            ValueArray {
                shape: shape.to_vec(),
                ..Default::default()
            },
        );
        Ok(())
    }

    pub fn value_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    fn value_array(&self, name: &str) -> Result<&ValueArray> {
        self.values
            .get(name)
            .ok_or_else(|| GridError::UnknownValue(name.to_string()))
    }

    fn value_array_mut(&mut self, name: &str) -> Result<&mut ValueArray> {
        self.values
            .get_mut(name)
            .ok_or_else(|| GridError::UnknownValue(name.to_string()))
    }

    /// Per-point shape of a value array.
    pub fn value_shape(&self, name: &str) -> Result<&[usize]> {
        Ok(&self.value_array(name)?.shape)
    }

    pub fn value_rank(&self, name: &str) -> Result<usize> {
        Ok(self.value_array(name)?.shape.len())
    }

    /// Sliced grid shape followed by the per-point shape.
    pub fn get_value_shape(&self, name: &str) -> Result<Vec<usize>> {
        let mut shape = self.get_sliced_shape(false);
        shape.extend_from_slice(self.value_shape(name)?);
        Ok(shape)
    }

    pub fn get_value_path(&self, name: &str) -> String {
        Grid::array_path(name, "value")
    }

    pub fn get_index_path(&self, name: &str) -> String {
        Grid::array_path(name, "index")
    }

    /// Chunk shape hint for a value array of the given full shape.
    pub fn get_chunk_shape(&self, name: &str, shape: &[usize]) -> Option<Vec<usize>> {
        self.config
            .as_ref()
            .and_then(|c| c.get_chunk_shape(self, name, shape, self.slice.as_ref()))
    }

    /// Allocate storage for a value array and an all-false index.
    ///
    /// Eager grids allocate the sliced region in memory; lazy grids allocate
    /// the full extent in storage.
    pub fn allocate_value(&mut self, name: &str) -> Result<()> {
        let vshape = self.value_shape(name)?.to_vec();
        let full = self.get_shape(false);

        match self.mode {
            StorageMode::Eager => {
                let origin = self.origin();
                let mut shape: Vec<usize> = origin.iter().map(|r| r.len()).collect();
                shape.extend_from_slice(&vshape);
                let va = self.value_array_mut(name)?;
                va.data = Some(ArrayD::from_elem(IxDyn(&shape), f64::NAN));
                va.origin = origin;
                va.index = Some(ArrayD::from_elem(IxDyn(&full), false));
                debug!(name = %name, shape = ?shape, "Allocated value array in memory");
            }
            StorageMode::Lazy => {
                self.ensure_lazy_load()?;
                let mut shape = full.clone();
                shape.extend_from_slice(&vshape);
                let chunks = self.get_chunk_shape(name, &shape);
                let index_chunks = chunks.as_ref().map(|c| c[..full.len()].to_vec());
                let vpath = self.get_value_path(name);
                let ipath = self.get_index_path(name);

                let storage = self.grid.storage_mut()?;
                storage.allocate_item(&vpath, &shape, ItemType::Float64, chunks.as_deref())?;
                storage.allocate_item(&ipath, &full, ItemType::Bool, index_chunks.as_deref())?;

                let va = self.value_array_mut(name)?;
                va.data = None;
                va.origin = full.iter().map(|&n| 0..n).collect();
                va.index = Some(ArrayD::from_elem(IxDyn(&full), false));
                debug!(name = %name, shape = ?shape, chunks = ?chunks, "Allocated value array in storage");
            }
        }
        Ok(())
    }

    /// Allocate every declared value array.
    pub fn allocate_values(&mut self) -> Result<()> {
        let names: Vec<String> = self.values.keys().cloned().collect();
        for name in names {
            self.allocate_value(&name)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Validity indexes
    // ------------------------------------------------------------------------

    /// Validity of every grid point covered by `value`, as decided by the
    /// grid configuration (default: no NaN in the per-point value).
    pub fn is_value_valid(&self, name: &str, value: &ArrayViewD<'_, f64>) -> Result<ArrayD<bool>> {
        let rank = self.value_rank(name)?;
        Ok(match &self.config {
            Some(c) => c.is_value_valid(self, name, value),
            None => default_validity(value, rank),
        })
    }

    /// Build the validity index of every value array.
    pub fn build_value_indexes(&mut self, rebuild: bool) -> Result<()> {
        let names: Vec<String> = self.values.keys().cloned().collect();
        for name in names {
            self.build_value_index(&name, rebuild)?;
        }
        Ok(())
    }

    /// Build a validity index by scanning the resident values.
    ///
    /// An existing index is kept unless `rebuild` is set. Lazy grids cannot
    /// scan their values and fail with a storage mode error.
    pub fn build_value_index(&mut self, name: &str, rebuild: bool) -> Result<()> {
        let va = self.value_array(name)?;
        if va.index.is_some() && !rebuild {
            return Ok(());
        }
        if !self.mode.is_eager() {
            return Err(GridError::storage_mode(format!(
                "cannot build the index of {} on lazy storage",
                name
            )));
        }
        let data = va
            .data
            .as_ref()
            .ok_or_else(|| GridError::config(format!("value array {} is not loaded", name)))?;

        let region = GridIndex(va.origin.iter().cloned().map(AxisIndex::Range).collect());
        let valid = self.is_value_valid(name, &data.view())?;
        let mut index = ArrayD::from_elem(IxDyn(&self.get_shape(false)), false);
        region.assign(&mut index, &valid.view())?;

        let count = index.iter().filter(|&&b| b).count();
        self.value_array_mut(name)?.index = Some(index);
        info!(name = %name, valid = count, "Built value index");
        Ok(())
    }

    pub fn has_value_index(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| v.index.is_some())
    }

    /// Validity index restricted to the active slice.
    pub fn get_value_index(&self, name: &str) -> Result<Option<ArrayD<bool>>> {
        let va = self.value_array(name)?;
        Ok(va.index.as_ref().map(|index| match &self.slice {
            Some(s) => s.to_index().select(index).to_owned(),
            None => index.clone(),
        }))
    }

    /// Validity index over the full grid, false outside `slice` if given.
    pub fn get_value_index_unsliced(&self, name: &str, slice: Option<&GridSlice>) -> Result<Option<ArrayD<bool>>> {
        let va = self.value_array(name)?;
        let Some(index) = &va.index else {
            return Ok(None);
        };
        let mut index = index.clone();
        if slice.is_some() {
            let mask = self.slice_mask(slice);
            Zip::from(&mut index).and(&mask).for_each(|i, &m| *i = *i && m);
        }
        Ok(Some(index))
    }

    /// Full-grid mask, true inside the active slice.
    pub fn get_mask_unsliced(&self) -> ArrayD<bool> {
        self.slice_mask(self.slice.as_ref())
    }

    fn slice_mask(&self, slice: Option<&GridSlice>) -> ArrayD<bool> {
        let shape = self.get_shape(false);
        ArrayD::from_shape_fn(IxDyn(&shape), |d| slice.map_or(true, |s| s.contains(d.slice())))
    }

    /// Number of valid points inside the active slice.
    pub fn get_valid_value_count(&self, name: &str) -> Result<usize> {
        Ok(self
            .get_value_index(name)?
            .map(|index| index.iter().filter(|&&b| b).count())
            .unwrap_or(0))
    }

    /// Whether the value array holds data: resident values in eager mode,
    /// a stored item in lazy mode.
    pub fn has_value(&self, name: &str) -> bool {
        match self.values.get(name) {
            None => false,
            Some(va) if self.mode.is_eager() => va.data.is_some(),
            Some(_) => self
                .grid
                .storage()
                .is_ok_and(|s| s.has_item(&self.get_value_path(name))),
        }
    }

    /// Error arrays are not tracked by grids.
    pub fn has_error(&self, _name: &str) -> bool {
        false
    }

    // ------------------------------------------------------------------------
    // Index resolution
    // ------------------------------------------------------------------------

    fn check_coords(&self, coords: &Coords) -> Result<()> {
        for (name, v) in coords {
            if !self.grid.axes().contains_key(name) {
                return Err(GridError::UnknownAxis(name.clone()));
            }
            if !v.is_finite() {
                return Err(GridError::config(format!("coordinate {} = {} is not finite", name, v)));
            }
        }
        Ok(())
    }

    /// Exact index of the given coordinates.
    ///
    /// Axes without a coordinate select the active slice range, or the
    /// whole axis.
    pub fn get_index(&self, coords: &Coords) -> Result<GridIndex> {
        self.check_coords(coords)?;
        let mut out = Vec::with_capacity(self.rank());
        for (i, (name, axis)) in self.grid.axes().iter().enumerate() {
            out.push(match coords.get(name) {
                Some(&v) => AxisIndex::At(axis.get_index(v)?),
                None => match &self.slice {
                    Some(s) => AxisIndex::Range(s.ranges()[i].clone()),
                    None => AxisIndex::Full,
                },
            });
        }
        Ok(GridIndex(out))
    }

    /// Nearest grid point of the given coordinates; axes without a coordinate
    /// select the whole axis.
    pub fn get_nearest_index(&self, coords: &Coords) -> Result<GridIndex> {
        self.check_coords(coords)?;
        Ok(GridIndex(
            self.grid
                .axes()
                .iter()
                .map(|(name, axis)| match coords.get(name) {
                    Some(&v) => AxisIndex::At(axis.get_nearest_index(v)),
                    None => AxisIndex::Full,
                })
                .collect(),
        ))
    }

    /// Lower and upper grid positions bracketing the coordinates.
    ///
    /// Single-valued axes bracket to their only point. Returns `None` when a
    /// bracket would fall off the grid, including a target exactly on the
    /// last axis value.
    pub fn get_nearby_indexes(&self, coords: &Coords) -> Result<Option<(Vec<usize>, Vec<usize>)>> {
        self.check_coords(coords)?;
        let mut lower = Vec::with_capacity(self.rank());
        let mut upper = Vec::with_capacity(self.rank());
        for (name, axis) in self.grid.axes() {
            let n = axis.len();
            if n == 1 {
                lower.push(0);
                upper.push(0);
                continue;
            }
            let x = *coords
                .get(name)
                .ok_or_else(|| GridError::config(format!("no coordinate given for axis {}", name)))?;
            let i = axis.get_nearest_index(x);
            let v = axis.value(i);
            let (lo, hi) = if x < v {
                match i.checked_sub(1) {
                    Some(lo) => (lo, i),
                    None => return Ok(None),
                }
            } else {
                (i, i + 1)
            };
            if hi >= n {
                return Ok(None);
            }
            lower.push(lo);
            upper.push(hi);
        }
        Ok(Some((lower, upper)))
    }

    /// Restrict an index to a region, `None` if nothing is left.
    fn clip_index(idx: &GridIndex, region: &[Range<usize>], shape: &[usize]) -> Option<GridIndex> {
        let mut out = Vec::with_capacity(idx.rank());
        for ((a, r), &n) in idx.axes().iter().zip(region).zip(shape) {
            out.push(match a {
                AxisIndex::At(i) if r.contains(i) => AxisIndex::At(*i),
                AxisIndex::At(_) => return None,
                _ => {
                    let s = a.to_range(n);
                    let clipped = s.start.max(r.start)..s.end.min(r.end);
                    if clipped.is_empty() {
                        return None;
                    }
                    AxisIndex::Range(clipped)
                }
            });
        }
        Some(GridIndex(out))
    }

    // ------------------------------------------------------------------------
    // Reading and writing values
    // ------------------------------------------------------------------------

    /// Whether the index marks the selected points as valid.
    ///
    /// In eager mode points outside the resident region are never valid.
    pub fn has_value_at(&self, name: &str, idx: &GridIndex, mode: IndexMode) -> Result<bool> {
        let va = self.value_array(name)?;
        let shape = self.get_shape(false);
        idx.check_bounds(&shape)?;
        let Some(index) = &va.index else {
            return Ok(false);
        };

        let effective = if self.mode.is_eager() {
            if va.data.is_none() {
                return Ok(false);
            }
            if mode == IndexMode::All && !GridSlice(va.origin.clone()).covers(idx, &shape) {
                return Ok(false);
            }
            match Self::clip_index(idx, &va.origin, &shape) {
                Some(clipped) => clipped,
                None => return Ok(false),
            }
        } else {
            idx.clone()
        };

        let selected = effective.select(index);
        Ok(match mode {
            IndexMode::Any => selected.iter().any(|&b| b),
            IndexMode::All => !selected.is_empty() && selected.iter().all(|&b| b),
        })
    }

    /// Values at `idx` if any selected point is valid.
    pub fn get_value_at(&self, name: &str, idx: &GridIndex) -> Result<Option<ArrayD<f64>>> {
        if !self.has_value_at(name, idx, IndexMode::Any)? {
            return Ok(None);
        }
        let va = self.value_array(name)?;

        if self.mode.is_eager() {
            let shape = self.get_shape(false);
            let data = va
                .data
                .as_ref()
                .ok_or_else(|| GridError::config(format!("value array {} is not loaded", name)))?;
            let relative = Self::clip_index(idx, &va.origin, &shape)
                .and_then(|clipped| clipped.relative_to(&va.origin));
            Ok(relative.map(|r| r.select(data).to_owned()))
        } else {
            let data = self
                .grid
                .storage()?
                .load_item(&self.get_value_path(name), ItemType::Float64, Some(idx))?
                .into_f64()?;
            Ok(Some(data))
        }
    }

    /// Write values at `idx` and update the validity index.
    ///
    /// `value` must hold the selected points' values in row-major order.
    /// Validity is computed by the grid configuration unless `valid` is given.
    pub fn set_value_at(
        &mut self,
        name: &str,
        idx: &GridIndex,
        value: &ArrayViewD<'_, f64>,
        valid: Option<bool>,
    ) -> Result<()> {
        let full = self.get_shape(false);
        idx.check_bounds(&full)?;
        let vshape = self.value_shape(name)?.to_vec();
        let expected = idx.selected_shape(&full, &vshape);
        if value.len() != expected.iter().product::<usize>() {
            return Err(GridError::shape_mismatch(&expected, value.shape()));
        }
        let value = ArrayD::from_shape_vec(IxDyn(&expected), value.iter().copied().collect())
            .map_err(|_| GridError::shape_mismatch(&expected, value.shape()))?;

        let validity = match valid {
            Some(v) => ArrayD::from_elem(IxDyn(&idx.selected_shape(&full, &[])), v),
            None => self.is_value_valid(name, &value.view())?,
        };

        match self.mode {
            StorageMode::Eager => {
                if self.value_array(name)?.data.is_none() {
                    self.allocate_value(name)?;
                }
                let va = self.value_array_mut(name)?;
                let relative = idx.relative_to(&va.origin).ok_or_else(|| {
                    GridError::config(format!("index {:?} lies outside the resident slice", idx))
                })?;
                if let Some(data) = va.data.as_mut() {
                    relative.assign(data, &value.view())?;
                }
                let index = va
                    .index
                    .get_or_insert_with(|| ArrayD::from_elem(IxDyn(&full), false));
                idx.assign(index, &validity.view())?;
            }
            StorageMode::Lazy => {
                self.ensure_lazy_load()?;
                let vpath = self.get_value_path(name);
                let ipath = self.get_index_path(name);
                if !self.grid.storage()?.has_item(&vpath) {
                    self.allocate_value(name)?;
                }

                // The in-memory index follows the store only after both writes succeed.
                let storage = self.grid.storage_mut()?;
                storage.save_item(&vpath, ItemView::Float64(value.view()), Some(idx))?;
                storage.save_item(&ipath, ItemView::Bool(validity.view()), Some(idx))?;

                let va = self.value_array_mut(name)?;
                let index = va
                    .index
                    .get_or_insert_with(|| ArrayD::from_elem(IxDyn(&full), false));
                idx.assign(index, &validity.view())?;
            }
        }
        Ok(())
    }

    /// Write several value arrays at `idx`.
    pub fn set_values_at(&mut self, idx: &GridIndex, values: &IndexMap<String, ArrayD<f64>>, valid: Option<bool>) -> Result<()> {
        for (name, value) in values {
            self.set_value_at(name, idx, &value.view(), valid)?;
        }
        Ok(())
    }

    /// Write a value at exact coordinates.
    pub fn set_value(&mut self, name: &str, coords: &Coords, value: &ArrayViewD<'_, f64>, valid: Option<bool>) -> Result<()> {
        let idx = self.get_index(coords)?;
        self.set_value_at(name, &idx, value, valid)
    }

    pub fn set_values(&mut self, coords: &Coords, values: &IndexMap<String, ArrayD<f64>>, valid: Option<bool>) -> Result<()> {
        let idx = self.get_index(coords)?;
        self.set_values_at(&idx, values, valid)
    }

    /// Value at exact coordinates.
    pub fn get_value(&self, name: &str, coords: &Coords) -> Result<Option<ArrayD<f64>>> {
        self.get_value_at(name, &self.get_index(coords)?)
    }

    /// Values of several arrays at `idx`; arrays without data are left out.
    /// All declared arrays are read when `names` is `None`.
    pub fn get_values_at(&self, idx: &GridIndex, names: Option<&[&str]>) -> Result<IndexMap<String, ArrayD<f64>>> {
        let names: Vec<&str> = match names {
            Some(n) => n.to_vec(),
            None => self.value_names().collect(),
        };
        let mut out = IndexMap::new();
        for name in names {
            if let Some(v) = self.get_value_at(name, idx)? {
                out.insert(name.to_string(), v);
            }
        }
        Ok(out)
    }

    pub fn get_values(&self, coords: &Coords, names: Option<&[&str]>) -> Result<IndexMap<String, ArrayD<f64>>> {
        self.get_values_at(&self.get_index(coords)?, names)
    }

    /// Value at the grid point nearest to the coordinates.
    pub fn get_nearest_value(&self, name: &str, coords: &Coords) -> Result<Option<ArrayD<f64>>> {
        self.get_value_at(name, &self.get_nearest_index(coords)?)
    }

    pub fn get_nearest_values(&self, coords: &Coords, names: Option<&[&str]>) -> Result<IndexMap<String, ArrayD<f64>>> {
        self.get_values_at(&self.get_nearest_index(coords)?, names)
    }

    // ------------------------------------------------------------------------
    // Interpolation
    // ------------------------------------------------------------------------

    /// Linear interpolation: 1-D if the grid has a single free axis,
    /// multilinear otherwise.
    pub fn interpolate_value_linear(&self, name: &str, coords: &Coords) -> Result<Option<Interpolated>> {
        if self.get_shape(true).len() == 1 {
            self.interpolate_value_linear1d(name, coords)
        } else {
            self.interpolate_value_linear_nd(name, coords)
        }
    }

    /// Parameters of the lower bracketing point with the free axes set to
    /// the requested coordinates.
    fn interpolated_params(&self, lower: &[usize], free: &[usize], coords: &Coords) -> Coords {
        let mut params = self.point_coords(lower);
        for &k in free {
            let name = self.grid.axes()[k].name();
            if let Some(&x) = coords.get(name) {
                params.insert(name.to_string(), x);
            }
        }
        params
    }

    fn free_axes(&self) -> Vec<usize> {
        self.grid.enumerate_axes(true).map(|(i, _)| i).collect()
    }

    /// Linear interpolation along the only multi-valued axis of the grid.
    pub fn interpolate_value_linear1d(&self, name: &str, coords: &Coords) -> Result<Option<Interpolated>> {
        self.value_array(name)?;
        let free = self.free_axes();
        let [k] = free.as_slice() else {
            return Err(GridError::config(format!(
                "linear 1-d interpolation needs exactly one free axis, grid has {}",
                free.len()
            )));
        };

        let Some((lower, upper)) = self.get_nearby_indexes(coords)? else {
            return Ok(None);
        };
        let Some(a) = self.get_value_at(name, &GridIndex::point(&lower))? else {
            return Ok(None);
        };
        let Some(b) = self.get_value_at(name, &GridIndex::point(&upper))? else {
            return Ok(None);
        };

        let axis = &self.grid.axes()[*k];
        let x = coords[axis.name()];
        let xa = axis.value(lower[*k]);
        let xb = axis.value(upper[*k]);
        let value = &a + &((&b - &a) * ((x - xa) / (xb - xa)));

        Ok(Some(Interpolated::new(
            value,
            self.interpolated_params(&lower, &free, coords),
        )))
    }

    /// Multilinear interpolation over the free axes.
    ///
    /// Every corner of the bracketing hypercube must be valid.
    pub fn interpolate_value_linear_nd(&self, name: &str, coords: &Coords) -> Result<Option<Interpolated>> {
        self.value_array(name)?;
        let Some((lower, upper)) = self.get_nearby_indexes(coords)? else {
            return Ok(None);
        };
        let free = self.free_axes();

        let mut corners = Vec::with_capacity(1 << free.len());
        for c in 0..(1usize << free.len()) {
            let mut point = lower.clone();
            for (j, &k) in free.iter().enumerate() {
                if c >> j & 1 == 1 {
                    point[k] = upper[k];
                }
            }
            match self.get_value_at(name, &GridIndex::point(&point))? {
                Some(v) => corners.push(v),
                None => return Ok(None),
            }
        }

        let t: Vec<f64> = free
            .iter()
            .map(|&k| {
                let axis = &self.grid.axes()[k];
                fraction(axis.value(lower[k]), axis.value(upper[k]), coords[axis.name()])
            })
            .collect();

        Ok(multilinear(&corners, &t)
            .map(|value| Interpolated::new(value, self.interpolated_params(&lower, &free, coords))))
    }

    /// Natural cubic spline along `free_axis` through its valid points, all
    /// other axes held at their grid point nearest to `coords`.
    ///
    /// Needs at least two valid points and a target strictly inside their
    /// span. Every component of vector values is fitted separately.
    pub fn interpolate_value_spline(&self, name: &str, free_axis: &str, coords: &Coords) -> Result<Option<Interpolated>> {
        self.value_array(name)?;
        self.check_coords(coords)?;
        let k = self.grid.axis_position(free_axis)?;
        let x = *coords
            .get(free_axis)
            .ok_or_else(|| GridError::config(format!("no coordinate given for axis {}", free_axis)))?;

        let mut point = Vec::with_capacity(self.rank());
        for (i, (axis_name, axis)) in self.grid.axes().iter().enumerate() {
            let p = match coords.get(axis_name) {
                _ if i == k => 0,
                Some(&v) => axis.get_nearest_index(v),
                None if axis.len() == 1 => 0,
                None => {
                    return Err(GridError::config(format!(
                        "no coordinate given for axis {}",
                        axis_name
                    )))
                }
            };
            point.push(p);
        }

        let axis = &self.grid.axes()[k];
        let mut xs = Vec::new();
        let mut rows = Vec::new();
        for p in 0..axis.len() {
            point[k] = p;
            if let Some(v) = self.get_value_at(name, &GridIndex::point(&point))? {
                xs.push(axis.value(p));
                rows.push(v);
            }
        }

        let (Some(&first), Some(&last)) = (xs.first(), xs.last()) else {
            return Ok(None);
        };
        if xs.len() < 2 || x <= first || x >= last {
            debug!(name = %name, axis = %free_axis, x, valid = xs.len(), "Spline target outside valid span");
            return Ok(None);
        }

        let vshape = rows[0].shape().to_vec();
        let width = rows[0].len();
        let mut ys = Array2::<f64>::zeros((xs.len(), width));
        for (r, row) in rows.iter().enumerate() {
            for (j, &y) in row.iter().enumerate() {
                ys[[r, j]] = y;
            }
        }

        let spline = CubicSpline::natural(&xs, ys.view())?;
        let value = spline
            .evaluate(x)
            .into_shape(IxDyn(&vshape))
            .map_err(|_| GridError::shape_mismatch(&vshape, &[width]))?;

        let mut params = self.point_coords(&point);
        params.insert(free_axis.to_string(), x);
        Ok(Some(Interpolated::new(value, params)))
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Read indexes and, in eager mode, the sliced region of every value
    /// array. Arrays missing from storage are left unloaded.
    fn load_values(&mut self) -> Result<()> {
        self.ensure_lazy_load()?;
        let full = self.get_shape(false);
        let rank = full.len();
        let origin = self.origin();
        let region = GridIndex(origin.iter().cloned().map(AxisIndex::Range).collect());
        let eager = self.mode.is_eager();

        let names: Vec<String> = self.values.keys().cloned().collect();
        for name in names {
            let vpath = self.get_value_path(&name);
            let ipath = self.get_index_path(&name);
            let storage = self.grid.storage()?;

            let Some(item_shape) = storage.get_item_shape(&vpath)? else {
                warn!(name = %name, "Value array not found in storage");
                continue;
            };
            if item_shape.len() < rank || item_shape.len() > rank + 1 || item_shape[..rank] != full[..] {
                return Err(GridError::shape_mismatch(&full, &item_shape));
            }

            let index = if storage.has_item(&ipath) {
                let index = storage.load_item(&ipath, ItemType::Bool, None)?.into_bool()?;
                if index.shape() != full.as_slice() {
                    return Err(GridError::shape_mismatch(&full, index.shape()));
                }
                Some(index)
            } else {
                None
            };

            let data = if eager {
                Some(storage.load_item(&vpath, ItemType::Float64, Some(&region))?.into_f64()?)
            } else {
                None
            };

            let va = self.value_array_mut(&name)?;
            va.shape = item_shape[rank..].to_vec();
            va.data = data;
            va.origin = origin.clone();
            let has_index = index.is_some();
            va.index = index;
            debug!(name = %name, shape = ?item_shape, indexed = has_index, "Loaded value array");

            if eager && !has_index {
                self.build_value_index(&name, false)?;
            }
        }
        Ok(())
    }
}

impl PersistentGrid for ArrayGrid {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// Write axes, indexes and values.
    ///
    /// Eager grids write their resident region into a full-extent item;
    /// lazy grids only make sure their items exist, values having been
    /// written on every update.
    fn save_items(&mut self) -> Result<()> {
        self.ensure_lazy_load()?;
        self.grid.save_axes()?;
        let full = self.get_shape(false);

        let names: Vec<String> = self.values.keys().cloned().collect();
        for name in &names {
            let vpath = self.get_value_path(name);
            let ipath = self.get_index_path(name);

            if !self.mode.is_eager() && !self.grid.storage()?.has_item(&vpath) {
                self.allocate_value(name)?;
            }

            let mut shape = full.clone();
            shape.extend_from_slice(self.value_shape(name)?);
            let chunks = self.get_chunk_shape(name, &shape);

            let va = self
                .values
                .get(name.as_str())
                .ok_or_else(|| GridError::UnknownValue(name.clone()))?;
            let storage = self.grid.storage_mut()?;

            if let Some(data) = &va.data {
                let region = GridIndex(va.origin.iter().cloned().map(AxisIndex::Range).collect());
                // Keep stored values outside the resident region.
                if storage.get_item_shape(&vpath)?.as_deref() != Some(shape.as_slice()) {
                    storage.allocate_item(&vpath, &shape, ItemType::Float64, chunks.as_deref())?;
                }
                storage.save_item(&vpath, ItemView::Float64(data.view()), Some(&region))?;
            }
            if let Some(index) = &va.index {
                storage.save_item(&ipath, ItemView::Bool(index.view()), None)?;
            }
        }

        info!(values = ?names, shape = ?full, mode = %self.mode, "Saved grid");
        Ok(())
    }

    fn load_items(&mut self) -> Result<()> {
        self.grid.load_axes()?;
        self.load_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageFormat;
    use crate::index::coords;
    use ndarray::{arr0, array};

    /// T_eff x log_g grid with scalar values f = 1, 3, 2, 4 at the corners.
    fn bilinear_grid() -> ArrayGrid {
        let mut grid = ArrayGrid::new();
        grid.add_axis(GridAxis::new("T_eff", vec![3500.0, 4000.0])).unwrap();
        grid.add_axis(GridAxis::new("log_g", vec![4.0, 4.5])).unwrap();
        grid.init_value("flux", &[]).unwrap();
        for (t, g, f) in [
            (3500.0, 4.0, 1.0),
            (4000.0, 4.0, 3.0),
            (3500.0, 4.5, 2.0),
            (4000.0, 4.5, 4.0),
        ] {
            let c = coords([("T_eff", t), ("log_g", g)]);
            grid.set_value("flux", &c, &arr0(f).into_dyn().view(), None).unwrap();
        }
        grid
    }

    /// Grid with a single free axis T_eff and vector values.
    fn line_grid() -> ArrayGrid {
        let mut grid = ArrayGrid::new();
        grid.add_axis(GridAxis::new("Fe_H", vec![0.0])).unwrap();
        grid.add_axis(GridAxis::new("T_eff", vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        grid.init_value("flux", &[2]).unwrap();
        for (i, t) in [1.0, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
            let value = array![10.0 * i as f64, t * t].into_dyn();
            grid.set_value("flux", &coords([("Fe_H", 0.0), ("T_eff", t)]), &value.view(), None)
                .unwrap();
        }
        grid
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut grid = line_grid();
        let c = coords([("Fe_H", 0.0), ("T_eff", 3.0)]);
        let value = array![7.0, 8.0].into_dyn();
        grid.set_value("flux", &c, &value.view(), None).unwrap();

        assert_eq!(grid.get_value("flux", &c).unwrap(), Some(value));
        let idx = grid.get_index(&c).unwrap();
        assert!(grid.has_value_at("flux", &idx, IndexMode::All).unwrap());
    }

    #[test]
    fn test_invalid_point_reads_none() {
        let mut grid = line_grid();
        let c = coords([("Fe_H", 0.0), ("T_eff", 2.0)]);
        let bad = array![1.0, f64::NAN].into_dyn();
        grid.set_value("flux", &c, &bad.view(), None).unwrap();
        assert_eq!(grid.get_value("flux", &c).unwrap(), None);

        // Explicit validity overrides the NaN rule.
        grid.set_value("flux", &c, &bad.view(), Some(true)).unwrap();
        assert!(grid.get_value("flux", &c).unwrap().is_some());
    }

    #[test]
    fn test_unknown_names() {
        let grid = bilinear_grid();
        assert!(matches!(
            grid.get_index(&coords([("M_H", 0.0)])),
            Err(GridError::UnknownAxis(_))
        ));
        assert!(matches!(
            grid.get_value("cont", &coords([("T_eff", 3500.0), ("log_g", 4.0)])),
            Err(GridError::UnknownValue(_))
        ));
        assert!(matches!(
            grid.get_index(&coords([("T_eff", 3600.0)])),
            Err(GridError::LookupFailed { .. })
        ));
    }

    #[test]
    fn test_get_index_defaults() {
        let mut grid = bilinear_grid();
        assert_eq!(grid.get_index(&Coords::new()).unwrap(), GridIndex::full(2));

        let mut grid2 = ArrayGrid::new();
        grid2.add_axis(GridAxis::new("T_eff", vec![3500.0, 4000.0, 4500.0])).unwrap();
        grid2.add_axis(GridAxis::new("log_g", vec![4.0, 4.5])).unwrap();
        grid2
            .set_slice(Some(GridSlice(vec![1..3, 0..2])))
            .unwrap();
        assert_eq!(
            grid2.get_index(&Coords::new()).unwrap(),
            GridIndex(vec![AxisIndex::Range(1..3), AxisIndex::Range(0..2)])
        );

        // Slice bounds are checked.
        assert!(grid.set_slice(Some(GridSlice(vec![0..3, 0..2]))).is_err());
    }

    #[test]
    fn test_nearby_indexes() {
        let grid = line_grid();
        let (lo, hi) = grid
            .get_nearby_indexes(&coords([("T_eff", 2.4)]))
            .unwrap()
            .unwrap();
        assert_eq!(lo, vec![0, 1]);
        assert_eq!(hi, vec![0, 2]);

        let (lo, hi) = grid
            .get_nearby_indexes(&coords([("T_eff", 2.6)]))
            .unwrap()
            .unwrap();
        assert_eq!((lo[1], hi[1]), (1, 2));

        let (lo, hi) = grid
            .get_nearby_indexes(&coords([("T_eff", 4.0)]))
            .unwrap()
            .unwrap();
        assert_eq!((lo[1], hi[1]), (3, 4));

        // The last axis value has no upper neighbour.
        assert!(grid.get_nearby_indexes(&coords([("T_eff", 5.0)])).unwrap().is_none());
        assert!(grid
            .interpolate_value_linear1d("flux", &coords([("T_eff", 5.0)]))
            .unwrap()
            .is_none());
        assert!(grid.get_nearby_indexes(&coords([("T_eff", 0.5)])).unwrap().is_none());
        assert!(grid.get_nearby_indexes(&coords([("T_eff", 5.5)])).unwrap().is_none());
        assert!(matches!(
            grid.get_nearby_indexes(&Coords::new()),
            Err(GridError::ConfigError(_))
        ));
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let grid = line_grid();
        for x in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let c = coords([("T_eff", x)]);
            assert!(matches!(grid.get_nearby_indexes(&c), Err(GridError::ConfigError(_))));
            assert!(matches!(grid.get_nearest_index(&c), Err(GridError::ConfigError(_))));
            assert!(matches!(
                grid.interpolate_value_linear1d("flux", &c),
                Err(GridError::ConfigError(_))
            ));
            assert!(matches!(
                grid.interpolate_value_spline("flux", "T_eff", &c),
                Err(GridError::ConfigError(_))
            ));
        }
    }

    #[test]
    fn test_bilinear_midpoint() {
        let grid = bilinear_grid();
        let result = grid
            .interpolate_value_linear("flux", &coords([("T_eff", 3750.0), ("log_g", 4.25)]))
            .unwrap()
            .unwrap();
        assert!((result.value[[]] - 2.5).abs() < 1e-12);
        assert_eq!(result.params["T_eff"], 3750.0);
        assert_eq!(result.params["log_g"], 4.25);
    }

    #[test]
    fn test_linear_nd_invalid_corner() {
        let mut grid = bilinear_grid();
        let c = coords([("T_eff", 4000.0), ("log_g", 4.5)]);
        grid.set_value("flux", &c, &arr0(f64::NAN).into_dyn().view(), None)
            .unwrap();
        let result = grid
            .interpolate_value_linear_nd("flux", &coords([("T_eff", 3750.0), ("log_g", 4.25)]))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_linear1d() {
        let grid = line_grid();
        let result = grid
            .interpolate_value_linear1d("flux", &coords([("T_eff", 2.5)]))
            .unwrap()
            .unwrap();
        assert!((result.value[[0]] - 15.0).abs() < 1e-12);
        assert!((result.value[[1]] - 6.5).abs() < 1e-12);
        assert_eq!(result.params["Fe_H"], 0.0);

        // Dispatch picks the 1-d routine for a single free axis.
        let same = grid
            .interpolate_value_linear("flux", &coords([("T_eff", 2.5)]))
            .unwrap()
            .unwrap();
        assert_eq!(same.value, result.value);
    }

    #[test]
    fn test_linear1d_invalid_bracket() {
        let mut grid = line_grid();
        let c = coords([("Fe_H", 0.0), ("T_eff", 3.0)]);
        grid.set_value("flux", &c, &array![f64::NAN, 0.0].into_dyn().view(), None)
            .unwrap();
        let result = grid
            .interpolate_value_linear1d("flux", &coords([("T_eff", 2.5)]))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_linear1d_needs_single_free_axis() {
        let grid = bilinear_grid();
        assert!(matches!(
            grid.interpolate_value_linear1d("flux", &coords([("T_eff", 3750.0)])),
            Err(GridError::ConfigError(_))
        ));
    }

    #[test]
    fn test_spline_inside_and_outside() {
        let mut grid = line_grid();
        // Knock out the first point; valid span becomes [2, 5].
        let c = coords([("Fe_H", 0.0), ("T_eff", 1.0)]);
        grid.set_value("flux", &c, &array![0.0, 0.0].into_dyn().view(), Some(false))
            .unwrap();

        let result = grid
            .interpolate_value_spline("flux", "T_eff", &coords([("T_eff", 3.0)]))
            .unwrap()
            .unwrap();
        assert!((result.value[[1]] - 9.0).abs() < 1e-10);
        assert!((result.value[[0]] - 20.0).abs() < 1e-10);
        assert_eq!(result.params["Fe_H"], 0.0);

        for x in [1.5, 2.0, 5.0, 6.0] {
            assert!(grid
                .interpolate_value_spline("flux", "T_eff", &coords([("T_eff", x)]))
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn test_spline_holds_nearest() {
        let grid = bilinear_grid();
        // T_eff snaps to 4000, leaving the two points 3.0 and 4.0 along log_g.
        let result = grid
            .interpolate_value_spline(
                "flux",
                "log_g",
                &coords([("T_eff", 3900.0), ("log_g", 4.25)]),
            )
            .unwrap()
            .unwrap();
        assert!((result.value[[]] - 3.5).abs() < 1e-12);
        assert_eq!(result.params["T_eff"], 4000.0);

        assert!(matches!(
            grid.interpolate_value_spline("flux", "log_g", &coords([("log_g", 4.25)])),
            Err(GridError::ConfigError(_))
        ));
    }

    #[test]
    fn test_pad_axes() {
        let mut axes = IndexMap::new();
        axes.insert("a".to_string(), GridAxis::new("a", vec![1.0, 2.0, 3.0]));
        axes.insert("b".to_string(), GridAxis::new("b", vec![7.0]));
        let padded = ArrayGrid::pad_axes(&axes, 1);
        assert_eq!(padded["a"].values(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(padded["b"].values(), &[7.0]);
    }

    #[test]
    fn test_axis_points() {
        let grid = line_grid();
        let ijk = grid.axis_points(1, true, PointMode::Ijk);
        assert_eq!(ijk.len(), 1);
        assert_eq!(ijk["T_eff"].to_vec(), vec![-1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        let xyz = grid.axis_points(0, false, PointMode::Xyz);
        assert_eq!(xyz["Fe_H"].to_vec(), vec![0.0]);

        let mesh = bilinear_grid().meshgrid_points(0, false, PointMode::Xyz);
        assert_eq!(mesh.len(), 2);
        assert_eq!(mesh[0].shape(), &[2, 2]);
        assert_eq!(mesh[0][[1, 0]], 4000.0);
        assert_eq!(mesh[1][[1, 0]], 4.0);
    }

    #[test]
    fn test_slice_from_args() {
        let mut grid = ArrayGrid::new();
        grid.add_axis(GridAxis::new("T_eff", vec![3500.0, 3750.0, 4000.0, 4250.0, 4500.0]))
            .unwrap();
        grid.add_axis(GridAxis::new("log_g", vec![4.0, 4.5, 5.0])).unwrap();

        assert_eq!(grid.get_slice_from_args(&[]).unwrap(), None);

        let slice = grid
            .get_slice_from_args(&[
                ParamRange::new("T_eff", vec![3800.0, 4300.0]),
                ParamRange::new("log_g", vec![4.5]),
                ParamRange::new("unused", vec![1.0]),
            ])
            .unwrap()
            .unwrap();
        assert_eq!(slice, GridSlice(vec![1..4, 1..2]));

        assert!(matches!(
            grid.get_slice_from_args(&[ParamRange::new("T_eff", vec![1.0, 2.0, 3.0])]),
            Err(GridError::ConfigError(_))
        ));

        grid.set_slice(Some(slice)).unwrap();
        assert_eq!(grid.get_sliced_shape(false), vec![3, 1]);
        assert_eq!(grid.get_sliced_shape(true), vec![3]);
        assert_eq!(grid.sliced_axes()["T_eff"].values(), &[3750.0, 4000.0, 4250.0]);
    }

    #[test]
    fn test_eager_slice_region() {
        let mut grid = ArrayGrid::new();
        grid.add_axis(GridAxis::new("T_eff", vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        grid.init_value("flux", &[]).unwrap();
        grid.set_slice(Some(GridSlice(vec![1..3]))).unwrap();
        grid.allocate_value("flux").unwrap();

        // Axes keep their full extent, values only cover the slice.
        assert_eq!(grid.axis("T_eff").unwrap().len(), 4);
        assert_eq!(grid.get_value_shape("flux").unwrap(), vec![2]);

        let inside = coords([("T_eff", 2.0)]);
        grid.set_value("flux", &inside, &arr0(5.0).into_dyn().view(), None).unwrap();
        assert_eq!(grid.get_value("flux", &inside).unwrap().unwrap()[[]], 5.0);

        let outside = coords([("T_eff", 4.0)]);
        assert!(grid.get_value("flux", &outside).unwrap().is_none());
        assert!(matches!(
            grid.set_value("flux", &outside, &arr0(1.0).into_dyn().view(), None),
            Err(GridError::ConfigError(_))
        ));
        assert!(grid.set_slice(None).is_err());

        assert_eq!(grid.get_value_index("flux").unwrap().unwrap().shape(), &[2]);
        let unsliced = grid.get_value_index_unsliced("flux", None).unwrap().unwrap();
        assert_eq!(unsliced.shape(), &[4]);
        assert!(unsliced[[1]]);
        assert_eq!(grid.get_valid_value_count("flux").unwrap(), 1);
        assert_eq!(
            grid.get_mask_unsliced().iter().copied().collect::<Vec<_>>(),
            vec![false, true, true, false]
        );
    }

    #[test]
    fn test_build_value_index() {
        let mut grid = line_grid();
        {
            let va = grid.value_array_mut("flux").unwrap();
            if let Some(data) = va.data.as_mut() {
                data[[0, 0, 1]] = f64::NAN;
            }
        }
        // Existing index is kept without rebuild.
        grid.build_value_index("flux", false).unwrap();
        assert_eq!(grid.get_valid_value_count("flux").unwrap(), 5);

        grid.build_value_indexes(true).unwrap();
        assert_eq!(grid.get_valid_value_count("flux").unwrap(), 4);
        assert!(!grid.has_value_index("cont"));
        assert!(!grid.has_error("flux"));
    }

    #[test]
    fn test_value_shape_rank() {
        let mut grid = ArrayGrid::new();
        assert!(grid.init_value("img", &[2, 2]).is_err());
        assert!(grid.init_value("flux", &[10]).is_ok());
    }

    #[test]
    fn test_lazy_grid_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.zarr");
        let config = GridStoreConfig {
            storage_mode: StorageMode::Lazy,
            ..Default::default()
        };

        let mut grid = ArrayGrid::create(&path, &config, None).unwrap();
        grid.add_axis(GridAxis::new("T_eff", vec![1.0, 2.0, 3.0])).unwrap();
        grid.init_value("flux", &[3]).unwrap();
        let c = coords([("T_eff", 2.0)]);
        grid.set_value("flux", &c, &array![1.0, 2.0, 3.0].into_dyn().view(), None)
            .unwrap();
        assert_eq!(
            grid.get_value("flux", &c).unwrap(),
            Some(array![1.0, 2.0, 3.0].into_dyn())
        );
        assert!(grid.get_value("flux", &coords([("T_eff", 1.0)])).unwrap().is_none());
        assert!(matches!(
            grid.build_value_index("flux", true),
            Err(GridError::StorageMode(_))
        ));
        grid.save().unwrap();
        assert!(grid.has_value("flux"));
    }

    #[test]
    fn test_lazy_failed_write_keeps_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.zarr");
        let config = GridStoreConfig {
            storage_mode: StorageMode::Lazy,
            ..Default::default()
        };

        let mut grid = ArrayGrid::create(&path, &config, None).unwrap();
        grid.add_axis(GridAxis::new("T_eff", vec![1.0, 2.0, 3.0])).unwrap();
        grid.init_value("flux", &[3]).unwrap();
        let value = array![1.0, 2.0, 3.0].into_dyn();
        grid.set_value("flux", &coords([("T_eff", 1.0)]), &value.view(), None)
            .unwrap();

        let index_dir = path.join(grid.get_index_path("flux").trim_start_matches('/'));
        std::fs::remove_dir_all(&index_dir).unwrap();

        let c = coords([("T_eff", 2.0)]);
        assert!(grid.set_value("flux", &c, &value.view(), None).is_err());
        assert!(grid.get_value("flux", &c).unwrap().is_none());
        assert_eq!(grid.get_valid_value_count("flux").unwrap(), 1);
    }

    #[test]
    fn test_lazy_packed_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = GridStoreConfig {
            storage_mode: StorageMode::Lazy,
            storage_format: StorageFormat::Packed,
            ..Default::default()
        };
        let path = dir.path().join("grid.pack");
        assert!(matches!(
            ArrayGrid::create(&path, &config, None),
            Err(GridError::StorageMode(_))
        ));
        assert!(!path.exists());
    }
}
