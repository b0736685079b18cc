//! Building one grid from another.
//!
//! A [`GridBuilder`] walks the valid points of an input grid inside its
//! active slice, hands each one to a [`GridTransform`] and writes the
//! transform's outputs to the matching point of an output grid spanning the
//! input's sliced axes.

use indexmap::IndexMap;
use ndarray::{ArrayD, Dimension};
use tracing::{debug, info};

use crate::array_grid::ArrayGrid;
use crate::error::{GridError, Result};
use crate::index::{Coords, GridIndex};

/// Per-dataset processing step run by a [`GridBuilder`].
pub trait GridTransform {
    /// Value arrays produced, with their per-point shapes.
    fn output_values(&self) -> Vec<(String, Vec<usize>)>;

    /// Process one input point.
    ///
    /// `point` is the position in the full input grid and `params` the axis
    /// values there. Returning `None` skips the point.
    fn process(
        &mut self,
        input: &ArrayGrid,
        point: &[usize],
        params: &Coords,
    ) -> Result<Option<IndexMap<String, ArrayD<f64>>>>;
}

/// Outcome of a [`GridBuilder::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    /// Points written to the output grid.
    pub processed: usize,
    /// Points the transform skipped.
    pub skipped: usize,
}

/// Maps the valid, sliced points of an input grid onto an output grid.
#[derive(Debug)]
pub struct GridBuilder {
    input: ArrayGrid,
    output: ArrayGrid,
    /// Value array whose index selects the points to process.
    value_name: String,
    /// Process at most this many points.
    top: Option<usize>,
    /// Points to process, in full input grid coordinates.
    input_grid_index: Vec<Vec<usize>>,
    /// Matching points in output (sliced) coordinates.
    output_grid_index: Vec<Vec<usize>>,
    grid_shape: Vec<usize>,
}

impl GridBuilder {
    pub fn new(input: ArrayGrid, output: ArrayGrid, value_name: impl Into<String>) -> Self {
        Self {
            input,
            output,
            value_name: value_name.into(),
            top: None,
            input_grid_index: Vec::new(),
            output_grid_index: Vec::new(),
            grid_shape: Vec::new(),
        }
    }

    pub fn with_top(mut self, top: Option<usize>) -> Self {
        self.top = top;
        self
    }

    pub fn input(&self) -> &ArrayGrid {
        &self.input
    }

    pub fn output(&self) -> &ArrayGrid {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut ArrayGrid {
        &mut self.output
    }

    /// Give back the input and output grids.
    pub fn into_grids(self) -> (ArrayGrid, ArrayGrid) {
        (self.input, self.output)
    }

    /// Full shape of the input grid, recorded by [`GridBuilder::open`].
    pub fn grid_shape(&self) -> &[usize] {
        &self.grid_shape
    }

    pub fn input_grid_index(&self) -> &[Vec<usize>] {
        &self.input_grid_index
    }

    pub fn output_grid_index(&self) -> &[Vec<usize>] {
        &self.output_grid_index
    }

    /// Output grid over the input's sliced axes with the given value arrays.
    pub fn create_output_grid(input: &ArrayGrid, values: &[(String, Vec<usize>)]) -> Result<ArrayGrid> {
        let mut output = ArrayGrid::from_axes(input.sliced_axes())?;
        for (name, shape) in values {
            output.init_value(name, shape)?;
        }
        Ok(output)
    }

    /// Resolve the points to process from the input grid's index.
    ///
    /// Both lists enumerate the same points in row-major order, so entry `i`
    /// of the input list maps to entry `i` of the output list.
    pub fn open(&mut self) -> Result<()> {
        let unsliced = self
            .input
            .get_value_index_unsliced(&self.value_name, self.input.slice())?
            .ok_or_else(|| GridError::config(format!("input grid has no index for {}", self.value_name)))?;
        let sliced = self
            .input
            .get_value_index(&self.value_name)?
            .ok_or_else(|| GridError::config(format!("input grid has no index for {}", self.value_name)))?;

        self.input_grid_index = true_positions(&unsliced);
        self.output_grid_index = true_positions(&sliced);
        self.grid_shape = self.input.get_shape(false);

        if self.output.get_shape(false) != self.input.get_sliced_shape(false) {
            return Err(GridError::shape_mismatch(
                &self.input.get_sliced_shape(false),
                &self.output.get_shape(false),
            ));
        }

        info!(
            value = %self.value_name,
            grid_shape = ?self.grid_shape,
            valid = self.input_grid_index.len(),
            top = ?self.top,
            "Opened grid builder"
        );
        Ok(())
    }

    /// Number of points a run processes.
    pub fn get_input_count(&self) -> usize {
        let count = self.input_grid_index.len();
        match self.top {
            Some(top) => top.min(count),
            None => count,
        }
    }

    /// Process the first [`GridBuilder::get_input_count`] points.
    pub fn run<T: GridTransform + ?Sized>(&mut self, transform: &mut T) -> Result<BuildResult> {
        let count = self.get_input_count();
        let step = (count / 10).max(1);
        let mut result = BuildResult::default();

        for i in 0..count {
            let point = &self.input_grid_index[i];
            let params = self.input.point_coords(point);
            match transform.process(&self.input, point, &params)? {
                Some(values) => {
                    let idx = GridIndex::point(&self.output_grid_index[i]);
                    self.output.set_values_at(&idx, &values, None)?;
                    result.processed += 1;
                }
                None => {
                    debug!(point = ?point, "Transform skipped point");
                    result.skipped += 1;
                }
            }

            if (i + 1) % step == 0 || i + 1 == count {
                info!(done = i + 1, total = count, "Building grid");
            }
        }

        info!(
            processed = result.processed,
            skipped = result.skipped,
            "Grid build complete"
        );
        Ok(result)
    }
}

/// Positions of the true entries, in row-major order.
fn true_positions(index: &ArrayD<bool>) -> Vec<Vec<usize>> {
    index
        .indexed_iter()
        .filter(|(_, &v)| v)
        .map(|(d, _)| d.slice().to_vec())
        .collect()
}
