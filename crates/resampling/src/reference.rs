//! Exact overlap-weighted binning, used to cross-check the fast resamplers.
//!
//! Every source bin is treated as a constant density; a target bin receives
//! the overlap-weighted sum of the source bins it covers, divided by its
//! width. Density outside the source range is zero. The cost is
//! O(source × target) in the worst case.

use ndarray::{Array1, ArrayView1};
use tracing::debug;

use crate::error::Result;
use crate::resampler::{check_ascending, check_len, source_edges, Resampled, Resampler, TargetGrid};

#[derive(Debug, Clone, Default)]
pub struct ReferenceResampler {
    target: Option<TargetGrid>,
}

impl ReferenceResampler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Resampler for ReferenceResampler {
    fn init(&mut self, wave: ArrayView1<'_, f64>, wave_edges: Option<ArrayView1<'_, f64>>) -> Result<()> {
        let target = TargetGrid::new(wave, wave_edges)?;
        debug!(bins = target.len(), "Initialized reference resampler");
        self.target = Some(target);
        Ok(())
    }

    fn reset(&mut self) {
        self.target = None;
    }

    fn target(&self) -> Option<&TargetGrid> {
        self.target.as_ref()
    }

    /// Errors are not propagated.
    fn resample_value(
        &self,
        wave: ArrayView1<'_, f64>,
        wave_edges: Option<ArrayView1<'_, f64>>,
        value: Option<ArrayView1<'_, f64>>,
        _error: Option<ArrayView1<'_, f64>>,
    ) -> Result<Resampled> {
        let target = self.require_target()?;
        check_ascending("source wavelength", wave)?;

        let value = match value {
            Some(v) => {
                check_len("value", wave.len(), v.len())?;
                let edges = source_edges(wave, wave_edges)?;
                Some(bin_average(edges.view(), v, target.wave_edges()))
            }
            None => None,
        };
        Ok(Resampled { value, error: None })
    }
}

fn bin_average(src: ArrayView1<'_, f64>, value: ArrayView1<'_, f64>, dst: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut out = Array1::zeros(dst.len() - 1);
    // First source bin that may overlap the current target bin.
    let mut first = 0;
    for j in 0..out.len() {
        let (lo, hi) = (dst[j], dst[j + 1]);
        while first < value.len() && src[first + 1] <= lo {
            first += 1;
        }
        let mut sum = 0.0;
        for i in first..value.len() {
            if src[i] >= hi {
                break;
            }
            let overlap = src[i + 1].min(hi) - src[i].max(lo);
            if overlap > 0.0 {
                sum += value[i] * overlap;
            }
        }
        out[j] = sum / (hi - lo);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_bin_average_overlaps() {
        let src = array![0.0, 1.0, 2.0, 3.0];
        let value = array![1.0, 2.0, 3.0];
        let dst = array![-1.0, 0.5, 2.5, 4.0];
        let out = bin_average(src.view(), value.view(), dst.view());
        // [-1, 0.5]: 0.5 * 1 over 1.5
        assert!((out[0] - 0.5 / 1.5).abs() < 1e-12);
        // [0.5, 2.5]: 0.5 * 1 + 2 + 0.5 * 3 over 2
        assert!((out[1] - 2.0).abs() < 1e-12);
        // [2.5, 4]: 0.5 * 3 over 1.5
        assert!((out[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_error_output() {
        let wave = array![1.0, 2.0, 3.0];
        let mut r = ReferenceResampler::new();
        r.init(array![1.5, 2.5].view(), None).unwrap();
        let out = r
            .resample_value(wave.view(), None, Some(wave.view()), Some(wave.view()))
            .unwrap();
        assert!(out.error.is_none());
        assert_eq!(out.value.unwrap().len(), 2);
    }
}
