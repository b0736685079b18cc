//! Natural cubic splines over several curves sharing the same knots.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{GridError, Result};

/// A natural cubic spline fitted independently to every column of `ys`.
///
/// All columns share the knots `xs`; second derivatives vanish at both ends.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    /// Strictly increasing knots.
    xs: Vec<f64>,
    /// Values at the knots, one row per knot.
    ys: Array2<f64>,
    /// Second derivatives at the knots.
    y2s: Array2<f64>,
}

impl CubicSpline {
    /// Fit a natural spline through `(xs[i], ys[i, j])` for every column `j`.
    pub fn natural(xs: &[f64], ys: ArrayView2<'_, f64>) -> Result<Self> {
        let n = xs.len();
        if n < 2 {
            return Err(GridError::config("spline needs at least 2 knots"));
        }
        if ys.nrows() != n {
            return Err(GridError::shape_mismatch(&[n, ys.ncols()], ys.shape()));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GridError::config("spline knots must be strictly increasing"));
        }

        let m = ys.ncols();
        let mut y2s = Array2::<f64>::zeros((n, m));
        let mut u = Array2::<f64>::zeros((n, m));

        // Forward sweep of the tridiagonal system
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            for j in 0..m {
                let p = sig * y2s[[i - 1, j]] + 2.0;
                y2s[[i, j]] = (sig - 1.0) / p;
                let d = (ys[[i + 1, j]] - ys[[i, j]]) / (xs[i + 1] - xs[i])
                    - (ys[[i, j]] - ys[[i - 1, j]]) / (xs[i] - xs[i - 1]);
                u[[i, j]] = (6.0 * d / (xs[i + 1] - xs[i - 1]) - sig * u[[i - 1, j]]) / p;
            }
        }

        // Back substitution, natural boundary y2[n-1] = 0
        for k in (0..n - 1).rev() {
            for j in 0..m {
                y2s[[k, j]] = y2s[[k, j]] * y2s[[k + 1, j]] + u[[k, j]];
            }
        }

        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_owned(),
            y2s,
        })
    }

    /// Number of curves.
    pub fn curves(&self) -> usize {
        self.ys.ncols()
    }

    /// Evaluate every curve at `x`.
    ///
    /// Outside the knot range the boundary polynomial is extended.
    pub fn evaluate(&self, x: f64) -> Array1<f64> {
        let n = self.xs.len();
        let hi = self.xs.partition_point(|&v| v <= x).clamp(1, n - 1);
        let lo = hi - 1;

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        let ylo = self.ys.index_axis(Axis(0), lo);
        let yhi = self.ys.index_axis(Axis(0), hi);
        let clo = self.y2s.index_axis(Axis(0), lo);
        let chi = self.y2s.index_axis(Axis(0), hi);

        let mut out = Array1::<f64>::zeros(self.curves());
        for j in 0..self.curves() {
            out[j] = a * ylo[j]
                + b * yhi[j]
                + ((a * a * a - a) * clo[j] + (b * b * b - b) * chi[j]) * h * h / 6.0;
        }
        out
    }
}
