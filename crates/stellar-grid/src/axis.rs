//! Named parameter axes of a grid.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// One named, ordered parameter axis of a grid (e.g. `T_eff`).
///
/// Values are expected to be strictly ascending. The interpolation routines
/// rely on this but it is not checked at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    name: String,
    values: Vec<f64>,
    /// Exact value lookup: (value, position) pairs sorted by value.
    #[serde(skip)]
    index: Option<Vec<(f64, usize)>>,
}

impl GridAxis {
    /// Create a new axis. The value index is not built until
    /// [`GridAxis::build_index`] is called.
    pub fn new(name: impl Into<String>, values: impl Into<Vec<f64>>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
            index: None,
        }
    }

    /// Create an axis and build its index right away.
    pub fn indexed(name: impl Into<String>, values: impl Into<Vec<f64>>) -> Result<Self> {
        let mut axis = Self::new(name, values);
        axis.build_index()?;
        Ok(axis)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Axis values as an ndarray vector.
    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.values.clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Value at a position.
    pub fn value(&self, i: usize) -> f64 {
        self.values[i]
    }

    /// Whether the exact value lookup has been built.
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Build the exact value → position lookup.
    ///
    /// Fails if the axis is empty or any value occurs more than once.
    pub fn build_index(&mut self) -> Result<()> {
        if self.values.is_empty() {
            return Err(GridError::config(format!("axis {} has no values", self.name)));
        }

        let mut pairs: Vec<(f64, usize)> = self
            .values
            .iter()
            .copied()
            .enumerate()
            .map(|(i, v)| (v, i))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(GridError::config(format!(
                "axis {} has duplicate value {}",
                self.name, w[0].0
            )));
        }

        self.index = Some(pairs);
        Ok(())
    }

    /// Position of a value that is exactly on the axis.
    pub fn get_index(&self, value: f64) -> Result<usize> {
        let found = match &self.index {
            Some(pairs) => {
                let i = pairs.partition_point(|(v, _)| *v < value);
                pairs.get(i).filter(|(v, _)| *v == value).map(|(_, p)| *p)
            }
            None => self.values.iter().position(|v| *v == value),
        };

        found.ok_or_else(|| GridError::LookupFailed {
            axis: self.name.clone(),
            value,
        })
    }

    /// Position of the axis value closest to `value`.
    ///
    /// Ties resolve to the lower position. Always returns a valid position.
    pub fn get_nearest_index(&self, value: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, v) in self.values.iter().enumerate() {
            let dist = (v - value).abs();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        best
    }

    /// Positions `[lo, hi)` of the values covered by a parameter range, using
    /// `digitize` semantics so the range is widened to the bracketing points.
    pub fn digitize_range(&self, lo: f64, hi: f64) -> std::ops::Range<usize> {
        let start = self.digitize(lo).saturating_sub(1);
        let end = self.digitize(hi).max(start + 1).min(self.len());
        start..end
    }

    /// Position of the grid point at or just below `value`, clamped to the axis.
    pub fn digitize_point(&self, value: f64) -> usize {
        self.digitize(value).saturating_sub(1).min(self.len() - 1)
    }

    /// Number of axis values `<= value` (numpy `digitize` for ascending bins).
    fn digitize(&self, value: f64) -> usize {
        self.values.partition_point(|v| *v <= value)
    }

    /// Copy of the axis restricted to a position range.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        let mut axis = Self::new(self.name.clone(), self.values[range].to_vec());
        if self.index.is_some() {
            // Sub-ranges of a valid axis cannot introduce duplicates.
            let _ = axis.build_index();
        }
        axis
    }
}
