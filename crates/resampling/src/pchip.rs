//! Piecewise cubic Hermite interpolation preserving monotonicity
//! (Fritsch-Carlson derivatives with shape-preserving end conditions).

use ndarray::{Array1, ArrayView1};

use crate::error::{ResampleError, Result};
use crate::resampler::{check_ascending, check_len, partition_point};

#[derive(Debug, Clone)]
pub struct Pchip {
    xs: Array1<f64>,
    ys: Array1<f64>,
    ds: Array1<f64>,
}

impl Pchip {
    pub fn new(xs: ArrayView1<'_, f64>, ys: ArrayView1<'_, f64>) -> Result<Self> {
        check_len("interpolant values", xs.len(), ys.len())?;
        check_ascending("interpolant knots", xs)?;
        if xs.len() < 2 {
            return Err(ResampleError::invalid_wave("PCHIP needs at least two knots"));
        }
        let ds = derivatives(xs, ys);
        Ok(Self {
            xs: xs.to_owned(),
            ys: ys.to_owned(),
            ds,
        })
    }

    /// Interpolated value at `x`; NaN outside the knot range.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x.is_nan() || x < self.xs[0] || x > self.xs[n - 1] {
            return f64::NAN;
        }
        let i = partition_point(self.xs.view(), x).clamp(1, n - 1);
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let h = x1 - x0;
        let t = (x - x0) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * self.ys[i - 1] + h10 * h * self.ds[i - 1] + h01 * self.ys[i] + h11 * h * self.ds[i]
    }
}

fn derivatives(xs: ArrayView1<'_, f64>, ys: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = xs.len();
    let h: Vec<f64> = (0..n - 1).map(|k| xs[k + 1] - xs[k]).collect();
    let m: Vec<f64> = (0..n - 1).map(|k| (ys[k + 1] - ys[k]) / h[k]).collect();
    let mut d = Array1::zeros(n);

    if n == 2 {
        d[0] = m[0];
        d[1] = m[0];
        return d;
    }

    for k in 1..n - 1 {
        if m[k - 1] * m[k] <= 0.0 {
            d[k] = 0.0;
        } else {
            // Weighted harmonic mean
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / m[k - 1] + w2 / m[k]);
        }
    }

    d[0] = edge_derivative(h[0], h[1], m[0], m[1]);
    d[n - 1] = edge_derivative(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

/// One-sided three-point estimate, clipped to keep the end interval monotone.
fn edge_derivative(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if d.signum() != m0.signum() || m0 == 0.0 {
        0.0
    } else if m0.signum() != m1.signum() && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}
