//! Grid configuration policies.
//!
//! A [`GridConfig`] declares the axes and value arrays of a grid and decides
//! which stored values count as valid. Two implementations are provided:
//! - [`StellarModelConfig`]: the Kurucz-style model atmosphere grids
//! - [`GridLayout`]: a layout read from a YAML file

use std::fs;
use std::path::Path;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::array_grid::ArrayGrid;
use crate::axis::GridAxis;
use crate::error::{GridError, Result};
use crate::index::GridSlice;

/// Per-dataset grid configuration.
pub trait GridConfig: Send + Sync {
    /// Declare the grid axes.
    fn init_axes(&self, grid: &mut ArrayGrid) -> Result<()>;

    /// Declare the value arrays and their per-point shapes.
    fn init_values(&self, grid: &mut ArrayGrid) -> Result<()>;

    /// Validity of every grid point covered by `value`.
    ///
    /// The default treats a point as valid when its trailing value holds no NaN.
    fn is_value_valid(&self, grid: &ArrayGrid, name: &str, value: &ArrayViewD<'_, f64>) -> ArrayD<bool> {
        let rank = grid.value_rank(name).unwrap_or(0);
        default_validity(value, rank)
    }

    /// Chunk shape hint for a value array of the given full shape.
    fn get_chunk_shape(
        &self,
        _grid: &ArrayGrid,
        _name: &str,
        _shape: &[usize],
        _slice: Option<&GridSlice>,
    ) -> Option<Vec<usize>> {
        None
    }
}

/// A point is valid when its trailing value contains no NaN.
///
/// `trailing_rank` is the number of trailing (per-point) dimensions of `value`;
/// the result has the remaining leading shape.
pub fn default_validity(value: &ArrayViewD<'_, f64>, trailing_rank: usize) -> ArrayD<bool> {
    if trailing_rank == 0 {
        return value.mapv(|v| !v.is_nan());
    }
    if value.ndim() <= trailing_rank {
        let ok = value.iter().all(|v| !v.is_nan());
        return ArrayD::from_elem(IxDyn(&[]), ok);
    }
    let last = value.ndim() - 1;
    value.map_axis(Axis(last), |lane| lane.iter().all(|v| !v.is_nan()))
}

/// Chunk shape storing one grid point per chunk.
pub fn per_point_chunks(grid_rank: usize, shape: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .map(|(i, &n)| if i < grid_rank { 1 } else { n.max(1) })
        .collect()
}

// ============================================================================
// Stellar model grids
// ============================================================================

const KURUCZ_T_EFF: [f64; 61] = [
    3500., 3750., 4000., 4250., 4500., 4750., 5000., 5250., 5500., 5750., 6000., 6250., 6500.,
    6750., 7000., 7250., 7500., 7750., 8000., 8250., 8500., 8750., 9000., 9250., 9500., 9750.,
    10000., 10500., 11000., 11500., 12000., 12500., 13000., 14000., 15000., 16000., 17000.,
    18000., 19000., 20000., 21000., 22000., 23000., 24000., 25000., 26000., 27000., 28000.,
    29000., 30000., 31000., 32000., 33000., 34000., 35000., 37500., 40000., 42500., 45000.,
    47500., 50000.,
];

const KURUCZ_FE_H: [f64; 18] = [
    -5.0, -4.5, -3.5, -3.0, -2.5, -2.0, -1.5, -1.0, -0.5, -0.3, -0.2, -0.1, 0.0, 0.1, 0.2, 0.3,
    0.5, 1.0,
];

/// Which set of model atmosphere axes to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelAxes {
    /// Two metallicities, for tests.
    Test,
    /// The full Kurucz grid.
    #[default]
    Kurucz,
}

impl std::str::FromStr for ModelAxes {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "kurucz" => Ok(Self::Kurucz),
            _ => Err(GridError::config(format!("unknown model axes: {}", s))),
        }
    }
}

/// Model atmosphere grid: `Fe_H`, `T_eff`, `log_g` axes with `flux` and
/// `cont` spectra sampled on a common wavelength grid.
#[derive(Debug, Clone)]
pub struct StellarModelConfig {
    pub axes: ModelAxes,
    /// Number of wavelength bins per spectrum.
    pub wave_count: usize,
    /// Whether to declare the continuum array.
    pub continuum: bool,
}

impl StellarModelConfig {
    pub fn new(axes: ModelAxes, wave_count: usize) -> Self {
        Self {
            axes,
            wave_count,
            continuum: true,
        }
    }

    fn log_g() -> Vec<f64> {
        (0..=10).map(|i| i as f64 * 0.5).collect()
    }
}

impl GridConfig for StellarModelConfig {
    fn init_axes(&self, grid: &mut ArrayGrid) -> Result<()> {
        let fe_h = match self.axes {
            ModelAxes::Test => vec![0.0, 0.1],
            ModelAxes::Kurucz => KURUCZ_FE_H.to_vec(),
        };
        grid.add_axis(GridAxis::new("Fe_H", fe_h))?;
        grid.add_axis(GridAxis::new("T_eff", KURUCZ_T_EFF.to_vec()))?;
        grid.add_axis(GridAxis::new("log_g", Self::log_g()))?;
        Ok(())
    }

    fn init_values(&self, grid: &mut ArrayGrid) -> Result<()> {
        grid.init_value("flux", &[self.wave_count])?;
        if self.continuum {
            grid.init_value("cont", &[self.wave_count])?;
        }
        Ok(())
    }

    fn get_chunk_shape(
        &self,
        grid: &ArrayGrid,
        _name: &str,
        shape: &[usize],
        _slice: Option<&GridSlice>,
    ) -> Option<Vec<usize>> {
        Some(per_point_chunks(grid.rank(), shape))
    }
}

// ============================================================================
// YAML layouts
// ============================================================================

/// Grid layout described in a YAML file.
///
/// ```yaml
/// axes:
///   - name: T_eff
///     values: [3500, 3750, 4000]
///   - name: log_g
///     range: { start: 0.0, stop: 5.0, step: 0.5 }
/// values:
///   - name: flux
///     shape: [1000]
/// chunk_per_point: true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLayout {
    pub axes: Vec<AxisLayout>,
    pub values: Vec<ValueLayout>,
    /// Store every grid point in its own chunk.
    #[serde(default)]
    pub chunk_per_point: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisLayout {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<AxisRange>,
}

/// Evenly spaced axis values; `stop` is included when it falls on the grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueLayout {
    pub name: String,
    #[serde(default)]
    pub shape: Vec<usize>,
}

impl AxisRange {
    pub fn values(&self) -> Result<Vec<f64>> {
        if self.step.is_nan() || self.step <= 0.0 || self.stop < self.start {
            return Err(GridError::config(format!(
                "invalid axis range {}..{} step {}",
                self.start, self.stop, self.step
            )));
        }
        let count = ((self.stop - self.start) / self.step + 1e-9).floor() as usize + 1;
        Ok((0..count).map(|i| self.start + i as f64 * self.step).collect())
    }
}

impl AxisLayout {
    pub fn to_axis(&self) -> Result<GridAxis> {
        let values = match (&self.values, &self.range) {
            (Some(v), None) => v.clone(),
            (None, Some(r)) => r.values()?,
            _ => {
                return Err(GridError::config(format!(
                    "axis {} needs exactly one of `values` or `range`",
                    self.name
                )))
            }
        };
        Ok(GridAxis::new(self.name.clone(), values))
    }
}

impl GridLayout {
    /// Parse a layout from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let layout: Self =
            serde_yaml::from_str(text).map_err(|e| GridError::config(format!("invalid layout: {}", e)))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load a layout from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| GridError::config(format!("cannot read layout {}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.axes.is_empty() {
            return Err(GridError::config("layout declares no axes"));
        }
        if self.values.is_empty() {
            return Err(GridError::config("layout declares no value arrays"));
        }
        for axis in &self.axes {
            axis.to_axis()?;
        }
        Ok(())
    }
}

impl GridConfig for GridLayout {
    fn init_axes(&self, grid: &mut ArrayGrid) -> Result<()> {
        for axis in &self.axes {
            grid.add_axis(axis.to_axis()?)?;
        }
        Ok(())
    }

    fn init_values(&self, grid: &mut ArrayGrid) -> Result<()> {
        for value in &self.values {
            grid.init_value(&value.name, &value.shape)?;
        }
        Ok(())
    }

    fn get_chunk_shape(
        &self,
        grid: &ArrayGrid,
        _name: &str,
        shape: &[usize],
        _slice: Option<&GridSlice>,
    ) -> Option<Vec<usize>> {
        self.chunk_per_point
            .then(|| per_point_chunks(grid.rank(), shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_default_validity_vector() {
        let v = array![[1.0, 2.0], [f64::NAN, 1.0], [0.0, 0.0]].into_dyn();
        let valid = default_validity(&v.view(), 1);
        assert_eq!(valid.shape(), &[3]);
        assert_eq!(valid.iter().copied().collect::<Vec<_>>(), vec![true, false, true]);
    }

    #[test]
    fn test_default_validity_scalar() {
        let v = array![[1.0, f64::NAN], [2.0, 3.0]].into_dyn();
        let valid = default_validity(&v.view(), 0);
        assert_eq!(valid.shape(), &[2, 2]);
        assert!(!valid[[0, 1]]);
        assert!(valid[[1, 0]]);
    }

    #[test]
    fn test_default_validity_single_point() {
        let v = array![1.0, 2.0, f64::NAN].into_dyn();
        let valid = default_validity(&v.view(), 1);
        assert_eq!(valid.ndim(), 0);
        assert!(!valid[[]]);
    }

    #[test]
    fn test_axis_range_inclusive() {
        let r = AxisRange {
            start: 0.0,
            stop: 5.0,
            step: 0.5,
        };
        let v = r.values().unwrap();
        assert_eq!(v.len(), 11);
        assert_eq!(v[10], 5.0);
    }

    #[test]
    fn test_layout_from_yaml() {
        let yaml = r#"
axes:
  - name: T_eff
    values: [3500, 3750, 4000]
  - name: log_g
    range: { start: 4.0, stop: 5.0, step: 0.5 }
values:
  - name: flux
    shape: [10]
  - name: teff_est
chunk_per_point: true
"#;
        let layout = GridLayout::from_yaml(yaml).unwrap();
        assert_eq!(layout.axes.len(), 2);
        assert_eq!(layout.axes[1].to_axis().unwrap().values(), &[4.0, 4.5, 5.0]);
        assert!(layout.values[1].shape.is_empty());
        assert!(layout.chunk_per_point);
    }

    #[test]
    fn test_layout_rejects_ambiguous_axis() {
        let yaml = r#"
axes:
  - name: T_eff
values:
  - name: flux
"#;
        assert!(matches!(GridLayout::from_yaml(yaml), Err(GridError::ConfigError(_))));
    }

    #[test]
    fn test_model_axes_from_str() {
        assert_eq!("TEST".parse::<ModelAxes>().unwrap(), ModelAxes::Test);
        assert_eq!("kurucz".parse::<ModelAxes>().unwrap(), ModelAxes::Kurucz);
        assert!(matches!("phoenx".parse::<ModelAxes>(), Err(GridError::ConfigError(_))));
    }
}
