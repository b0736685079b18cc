//! Flux-conserving resampling.
//!
//! The source density is integrated over the source bins, the cumulative
//! integral is interpolated at the target bin edges and differenced back into
//! a density. The integral of the spectrum over any range spanned by both
//! grids is preserved.

use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::pchip::Pchip;
use crate::resampler::{
    check_ascending, check_len, interp_linear, interp_nearest, source_edges, Resampled, Resampler, TargetGrid,
};

/// Interpolant of the cumulative integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntegralKind {
    /// Piecewise linear; equivalent to exact binning of a piecewise
    /// constant source density.
    #[default]
    Linear,
    /// Monotone cubic; smoother densities, never negative for a
    /// non-negative source.
    Pchip,
}

impl IntegralKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegralKind::Linear => "linear",
            IntegralKind::Pchip => "pchip",
        }
    }
}

impl std::fmt::Display for IntegralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FluxConservingResampler {
    kind: IntegralKind,
    target: Option<TargetGrid>,
}

impl FluxConservingResampler {
    pub fn new(kind: IntegralKind) -> Self {
        Self { kind, target: None }
    }

    pub fn kind(&self) -> IntegralKind {
        self.kind
    }

    /// Cumulative integral of `value` at the source edges, starting at zero.
    fn cumulative_integral(edges: ArrayView1<'_, f64>, value: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut cs = Array1::zeros(edges.len());
        let mut total = 0.0;
        for i in 0..value.len() {
            total += value[i] * (edges[i + 1] - edges[i]);
            cs[i + 1] = total;
        }
        cs
    }

    /// Integral at the target edges: 0 below the source range, the total
    /// above it.
    fn integral_at(&self, edges: ArrayView1<'_, f64>, cs: ArrayView1<'_, f64>, at: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let n = edges.len();
        let (lo, hi, total) = (edges[0], edges[n - 1], cs[n - 1]);
        let inside = match self.kind {
            IntegralKind::Linear => interp_linear(edges, cs, at),
            IntegralKind::Pchip => {
                let p = Pchip::new(edges, cs)?;
                at.mapv(|x| p.evaluate(x))
            }
        };
        let mut out = inside;
        Zip::from(&mut out).and(at).for_each(|v, &x| {
            if x < lo {
                *v = 0.0;
            } else if x > hi {
                *v = total;
            }
        });
        Ok(out)
    }
}

impl Resampler for FluxConservingResampler {
    fn init(&mut self, wave: ArrayView1<'_, f64>, wave_edges: Option<ArrayView1<'_, f64>>) -> Result<()> {
        let target = TargetGrid::new(wave, wave_edges)?;
        debug!(kind = %self.kind, bins = target.len(), "Initialized flux-conserving resampler");
        self.target = Some(target);
        Ok(())
    }

    fn reset(&mut self) {
        self.target = None;
    }

    fn target(&self) -> Option<&TargetGrid> {
        self.target.as_ref()
    }

    fn resample_value(
        &self,
        wave: ArrayView1<'_, f64>,
        wave_edges: Option<ArrayView1<'_, f64>>,
        value: Option<ArrayView1<'_, f64>>,
        error: Option<ArrayView1<'_, f64>>,
    ) -> Result<Resampled> {
        let target = self.require_target()?;
        check_ascending("source wavelength", wave)?;

        let value = match value {
            Some(value) => {
                check_len("value", wave.len(), value.len())?;
                let edges = source_edges(wave, wave_edges)?;
                let cs = Self::cumulative_integral(edges.view(), value);
                let ip = self.integral_at(edges.view(), cs.view(), target.wave_edges())?;

                let t = target.wave_edges();
                let n = target.len();
                Some(Array1::from_shape_fn(n, |i| (ip[i + 1] - ip[i]) / (t[i + 1] - t[i])))
            }
            None => None,
        };

        // TODO: propagate errors through the integral instead of nearest lookup
        let error = match error {
            Some(error) => {
                check_len("error", wave.len(), error.len())?;
                Some(interp_nearest(wave, error, target.wave()))
            }
            None => None,
        };

        Ok(Resampled { value, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResampleError;
    use ndarray::array;

    fn centers(edges: &Array1<f64>) -> Array1<f64> {
        Array1::from_shape_fn(edges.len() - 1, |i| 0.5 * (edges[i] + edges[i + 1]))
    }

    #[test]
    fn test_not_initialized() {
        let r = FluxConservingResampler::default();
        let wave = array![1.0, 2.0];
        let result = r.resample_value(wave.view(), None, Some(wave.view()), None);
        assert_eq!(result, Err(ResampleError::NotInitialized));
    }

    #[test]
    fn test_constant_density_preserved() {
        let edges = Array1::linspace(1000.0, 2000.0, 101);
        let wave = centers(&edges);
        let value = Array1::from_elem(wave.len(), 3.0);

        let target_edges = Array1::linspace(1100.0, 1900.0, 9);
        let target = centers(&target_edges);

        for kind in [IntegralKind::Linear, IntegralKind::Pchip] {
            let mut r = FluxConservingResampler::new(kind);
            r.init(target.view(), Some(target_edges.view())).unwrap();
            let out = r
                .resample_value(wave.view(), Some(edges.view()), Some(value.view()), None)
                .unwrap();
            for v in out.value.unwrap().iter() {
                assert!((v - 3.0).abs() < 1e-9, "{}: {}", kind, v);
            }
        }
    }

    #[test]
    fn test_outside_source_is_zero() {
        let edges = array![0.0, 1.0, 2.0];
        let wave = centers(&edges);
        let value = array![1.0, 1.0];

        let mut r = FluxConservingResampler::new(IntegralKind::Linear);
        // Bins [-1, 0] and [2.5, 3] lie entirely outside; [1.5, 2.5] half.
        r.init(array![-0.5, 0.75, 2.0, 2.75].view(), Some(array![-1.0, 0.0, 1.5, 2.5, 3.0].view()))
            .unwrap();
        let out = r
            .resample_value(wave.view(), Some(edges.view()), Some(value.view()), None)
            .unwrap()
            .value
            .unwrap();
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 1.0).abs() < 1e-12);
        assert!((out[2] - 0.5).abs() < 1e-12);
        assert_eq!(out[3], 0.0);
    }

    #[test]
    fn test_error_uses_nearest() {
        let wave = array![1.0, 2.0, 3.0, 4.0];
        let error = array![0.1, 0.2, 0.3, 0.4];
        let mut r = FluxConservingResampler::default();
        r.init(array![1.4, 2.6, 3.5].view(), None).unwrap();
        let out = r.resample_value(wave.view(), None, None, Some(error.view())).unwrap();
        assert!(out.value.is_none());
        assert_eq!(out.error.unwrap(), array![0.1, 0.3, 0.3]);
    }

    #[test]
    fn test_reset_clears_target() {
        let mut r = FluxConservingResampler::default();
        r.init(array![1.0, 2.0].view(), None).unwrap();
        assert!(r.is_initialized());
        r.reset();
        assert!(!r.is_initialized());
    }
}
