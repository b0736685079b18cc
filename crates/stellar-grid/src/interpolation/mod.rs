//! Interpolation kernels used by [`ArrayGrid`](crate::ArrayGrid).
//!
//! The grid-level routines (bracketing, validity checks, axis bookkeeping)
//! live on the grid itself; this module only holds the numerical parts.

pub mod spline;

pub use spline::CubicSpline;

use ndarray::ArrayD;

use crate::index::Coords;

/// Result of an interpolation: the interpolated value and the parameters it
/// was computed at.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    pub value: ArrayD<f64>,
    pub params: Coords,
}

impl Interpolated {
    pub fn new(value: ArrayD<f64>, params: Coords) -> Self {
        Self { value, params }
    }
}

/// Fractional position of `x` between `lo` and `hi`.
pub fn fraction(lo: f64, hi: f64, x: f64) -> f64 {
    if hi == lo {
        0.0
    } else {
        (x - lo) / (hi - lo)
    }
}

/// Linear interpolation between two values at fraction `t`.
pub fn lerp(a: &ArrayD<f64>, b: &ArrayD<f64>, t: f64) -> ArrayD<f64> {
    a * (1.0 - t) + b * t
}

/// Multilinear blend of the `2^k` corners of a hypercube.
///
/// Bit `j` of a corner's position in `corners` selects the upper (1) or lower
/// (0) end along free axis `j`; `t[j]` is the fractional position along it.
pub fn multilinear(corners: &[ArrayD<f64>], t: &[f64]) -> Option<ArrayD<f64>> {
    if corners.len() != 1 << t.len() {
        return None;
    }

    let mut out: Option<ArrayD<f64>> = None;
    for (c, value) in corners.iter().enumerate() {
        let weight: f64 = t
            .iter()
            .enumerate()
            .map(|(j, &tj)| if c >> j & 1 == 1 { tj } else { 1.0 - tj })
            .product();
        out = Some(match out {
            Some(acc) => acc + &(value * weight),
            None => value * weight,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, Array1};

    #[test]
    fn test_fraction() {
        assert_eq!(fraction(10.0, 20.0, 15.0), 0.5);
        assert_eq!(fraction(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_lerp_vector() {
        let a = Array1::from(vec![0.0, 10.0]).into_dyn();
        let b = Array1::from(vec![1.0, 20.0]).into_dyn();
        let v = lerp(&a, &b, 0.25);
        assert!((v[[0]] - 0.25).abs() < 1e-12);
        assert!((v[[1]] - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_bilinear_weights() {
        // f(x, y) = x + 2y on the unit square
        let corners = vec![
            arr0(0.0).into_dyn(),
            arr0(1.0).into_dyn(),
            arr0(2.0).into_dyn(),
            arr0(3.0).into_dyn(),
        ];
        let v = multilinear(&corners, &[0.5, 0.25]).unwrap();
        assert!((v[[]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_multilinear_zero_axes() {
        let corners = vec![arr0(7.0).into_dyn()];
        assert_eq!(multilinear(&corners, &[]).unwrap()[[]], 7.0);
        assert!(multilinear(&corners, &[0.5]).is_none());
    }
}
