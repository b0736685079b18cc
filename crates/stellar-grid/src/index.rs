//! Index tuples, slices and parameter ranges over grid axes.
//!
//! A [`GridIndex`] selects one entry per grid axis: a single position, a
//! position range, or the full axis. Selecting a region of an array with it
//! follows numpy basic indexing: axes selected by a single position are
//! dropped from the result, ranges are kept.

use std::ops::Range;

use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, Axis, Slice};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// Coordinates keyed by axis name, in any order.
pub type Coords = IndexMap<String, f64>;

/// Build [`Coords`] from `(name, value)` pairs.
pub fn coords<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Coords {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Selection along a single axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisIndex {
    /// A single position; the axis is dropped from selected regions.
    At(usize),
    /// A half-open position range.
    Range(Range<usize>),
    /// The whole axis.
    Full,
}

impl AxisIndex {
    /// Resolve to a concrete position range for an axis of length `len`.
    pub fn to_range(&self, len: usize) -> Range<usize> {
        match self {
            Self::At(i) => *i..*i + 1,
            Self::Range(r) => r.start.min(len)..r.end.min(len),
            Self::Full => 0..len,
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Self::At(_))
    }
}

/// Per-axis selection tuple, in axis declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridIndex(pub Vec<AxisIndex>);

impl GridIndex {
    /// Index selecting every axis in full.
    pub fn full(rank: usize) -> Self {
        Self(vec![AxisIndex::Full; rank])
    }

    /// Index selecting a single grid point.
    pub fn point(positions: &[usize]) -> Self {
        Self(positions.iter().map(|&i| AxisIndex::At(i)).collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn axes(&self) -> &[AxisIndex] {
        &self.0
    }

    /// Positions if every axis selects a single point.
    pub fn as_point(&self) -> Option<Vec<usize>> {
        self.0
            .iter()
            .map(|a| match a {
                AxisIndex::At(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    /// Resolve every axis to a position range for the given grid shape.
    pub fn ranges(&self, shape: &[usize]) -> Vec<Range<usize>> {
        self.0
            .iter()
            .zip(shape)
            .map(|(a, &n)| a.to_range(n))
            .collect()
    }

    /// Check every single-position entry and range against the grid shape.
    pub fn check_bounds(&self, shape: &[usize]) -> Result<()> {
        if self.rank() != shape.len() {
            return Err(GridError::config(format!(
                "index of rank {} used on grid of rank {}",
                self.rank(),
                shape.len()
            )));
        }
        for (a, &n) in self.0.iter().zip(shape) {
            let bad = match a {
                AxisIndex::At(i) => *i >= n,
                AxisIndex::Range(r) => r.start > r.end || r.end > n,
                AxisIndex::Full => false,
            };
            if bad {
                return Err(GridError::config(format!(
                    "index {:?} out of bounds for axis of length {}",
                    a, n
                )));
            }
        }
        Ok(())
    }

    /// Shape of the region selected from an array whose leading dimensions
    /// are `shape`, with the given trailing dimensions appended.
    pub fn selected_shape(&self, shape: &[usize], trailing: &[usize]) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .0
            .iter()
            .zip(shape)
            .filter(|(a, _)| !a.is_point())
            .map(|(a, &n)| a.to_range(n).len())
            .collect();
        out.extend_from_slice(trailing);
        out
    }

    /// Number of grid points selected.
    pub fn point_count(&self, shape: &[usize]) -> usize {
        self.ranges(shape).iter().map(|r| r.len()).product()
    }

    /// Shift the index into the coordinate frame of a sub-region starting at
    /// `origin`. Returns `None` if the index reaches outside `extent`.
    pub fn relative_to(&self, origin: &[Range<usize>]) -> Option<GridIndex> {
        let mut out = Vec::with_capacity(self.rank());
        for (a, o) in self.0.iter().zip(origin) {
            let rel = match a {
                AxisIndex::At(i) => {
                    if !o.contains(i) {
                        return None;
                    }
                    AxisIndex::At(i - o.start)
                }
                AxisIndex::Range(r) => {
                    if r.start < o.start || r.end > o.end {
                        return None;
                    }
                    AxisIndex::Range(r.start - o.start..r.end - o.start)
                }
                AxisIndex::Full => AxisIndex::Range(0..o.len()),
            };
            out.push(rel);
        }
        Some(GridIndex(out))
    }

    /// View of the region selected from `array`. Leading axes of `array`
    /// are matched with the index; trailing axes are taken in full.
    pub fn select<'a, T>(&self, array: &'a ArrayD<T>) -> ArrayViewD<'a, T> {
        let ranges = self.ranges(array.shape());
        let mut view = array.slice_each_axis(|ax| match ranges.get(ax.axis.index()) {
            Some(r) => Slice::from(r.clone()),
            None => Slice::from(..),
        });
        for (k, a) in self.0.iter().enumerate().rev() {
            if a.is_point() {
                view = view.index_axis_move(Axis(k), 0);
            }
        }
        view
    }

    /// Assign `value` to the region selected from `array`.
    ///
    /// `value` must hold exactly as many elements as the selected region, in
    /// row-major order; dimensions of length one are not significant.
    pub fn assign<T: Clone>(&self, array: &mut ArrayD<T>, value: &ArrayViewD<'_, T>) -> Result<()> {
        let ranges = self.ranges(array.shape());
        let trailing: Vec<usize> = array.shape()[self.rank().min(array.ndim())..].to_vec();
        let expected = self.selected_shape(array.shape(), &trailing);
        let mut view = array.slice_each_axis_mut(|ax| match ranges.get(ax.axis.index()) {
            Some(r) => Slice::from(r.clone()),
            None => Slice::from(..),
        });
        if view.len() != value.len() {
            return Err(GridError::shape_mismatch(&expected, value.shape()));
        }
        view.iter_mut()
            .zip(value.iter())
            .for_each(|(d, s)| *d = s.clone());
        Ok(())
    }
}

impl From<Vec<AxisIndex>> for GridIndex {
    fn from(v: Vec<AxisIndex>) -> Self {
        Self(v)
    }
}

/// Axis-aligned restriction of a grid, one position range per axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSlice(pub Vec<Range<usize>>);

impl GridSlice {
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.0
    }

    /// Shape of the sliced region.
    pub fn shape(&self) -> Vec<usize> {
        self.0.iter().map(|r| r.len()).collect()
    }

    /// The slice as an index selecting its whole region.
    pub fn to_index(&self) -> GridIndex {
        GridIndex(self.0.iter().cloned().map(AxisIndex::Range).collect())
    }

    /// Whether a grid point lies inside the slice.
    pub fn contains(&self, point: &[usize]) -> bool {
        self.0.iter().zip(point).all(|(r, i)| r.contains(i))
    }

    /// Whether every point selected by `idx` lies inside the slice.
    pub fn covers(&self, idx: &GridIndex, shape: &[usize]) -> bool {
        idx.ranges(shape)
            .iter()
            .zip(&self.0)
            .all(|(r, s)| r.is_empty() || (r.start >= s.start && r.end <= s.end))
    }
}

/// Whether a multi-point index test requires any or all points to be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    #[default]
    Any,
    All,
}

/// A parameter limit given on the command line: one value pins the axis,
/// two values give a `[min, max]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub name: String,
    pub values: Vec<f64>,
}

impl ParamRange {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Parse `name=value` or `name=min,max`.
    ///
    /// The number of values is not checked here; slice derivation rejects
    /// anything other than one or two values.
    pub fn parse(s: &str) -> Result<Self> {
        let (name, rest) = s
            .split_once('=')
            .ok_or_else(|| GridError::config(format!("expected name=value[,value], got {}", s)))?;
        let values = rest
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| GridError::config(format!("invalid value {:?} for {}: {}", v, name, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name.trim(), values))
    }
}

impl std::str::FromStr for ParamRange {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn sample() -> ArrayD<f64> {
        // shape (2, 3, 4): value = 100*i + 10*j + k
        ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |d| (100 * d[0] + 10 * d[1] + d[2]) as f64)
    }

    #[test]
    fn test_select_point_drops_axes() {
        let a = sample();
        let idx = GridIndex::point(&[1, 2]);
        let v = idx.select(&a);
        assert_eq!(v.shape(), &[4]);
        assert_eq!(v[[3]], 123.0);
    }

    #[test]
    fn test_select_mixed() {
        let a = sample();
        let idx = GridIndex(vec![AxisIndex::Full, AxisIndex::At(1)]);
        let v = idx.select(&a);
        assert_eq!(v.shape(), &[2, 4]);
        assert_eq!(v[[1, 2]], 112.0);

        let idx = GridIndex(vec![AxisIndex::Range(1..2), AxisIndex::Range(0..2)]);
        assert_eq!(idx.select(&a).shape(), &[1, 2, 4]);
        assert_eq!(idx.selected_shape(&[2, 3], &[4]), vec![1, 2, 4]);
    }

    #[test]
    fn test_assign() {
        let mut a = sample();
        let idx = GridIndex::point(&[0, 1]);
        let value = ndarray::Array1::from(vec![-1.0, -2.0, -3.0, -4.0]).into_dyn();
        idx.assign(&mut a, &value.view()).unwrap();
        assert_eq!(a[[0, 1, 2]], -3.0);
        assert_eq!(a[[0, 2, 2]], 22.0);

        let short = ndarray::Array1::from(vec![1.0]).into_dyn();
        assert!(matches!(
            idx.assign(&mut a, &short.view()),
            Err(GridError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_relative_to() {
        let origin = vec![1..3, 0..2];
        let idx = GridIndex::point(&[2, 1]);
        assert_eq!(idx.relative_to(&origin), Some(GridIndex::point(&[1, 1])));
        assert_eq!(GridIndex::point(&[0, 1]).relative_to(&origin), None);
        assert_eq!(
            GridIndex::full(2).relative_to(&origin),
            Some(GridIndex(vec![AxisIndex::Range(0..2), AxisIndex::Range(0..2)]))
        );
    }

    #[test]
    fn test_check_bounds() {
        assert!(GridIndex::point(&[1, 2]).check_bounds(&[2, 3]).is_ok());
        assert!(GridIndex::point(&[2, 0]).check_bounds(&[2, 3]).is_err());
        assert!(GridIndex::point(&[0]).check_bounds(&[2, 3]).is_err());
    }

    #[test]
    fn test_slice_covers() {
        let s = GridSlice(vec![1..3, 0..2]);
        assert!(s.contains(&[1, 1]));
        assert!(!s.contains(&[0, 1]));
        assert!(s.covers(&GridIndex::point(&[2, 0]), &[4, 4]));
        assert!(!s.covers(&GridIndex::full(2), &[4, 4]));
        assert_eq!(s.shape(), vec![2, 2]);
    }

    #[test]
    fn test_param_range_parse() {
        let p: ParamRange = "T_eff=3500,5000".parse().unwrap();
        assert_eq!(p.name, "T_eff");
        assert_eq!(p.values, vec![3500.0, 5000.0]);

        let p = ParamRange::parse("log_g = 4.5").unwrap();
        assert_eq!(p.name, "log_g");
        assert_eq!(p.values, vec![4.5]);

        assert!(ParamRange::parse("T_eff").is_err());
        assert!(ParamRange::parse("T_eff=abc").is_err());
    }
}
