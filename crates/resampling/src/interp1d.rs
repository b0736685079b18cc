//! Resampling by linear interpolation at the target bin centers.
//!
//! Fast but not flux conserving; suited to targets much finer than the
//! source.

use ndarray::ArrayView1;
use tracing::debug;

use crate::error::Result;
use crate::resampler::{check_ascending, check_len, interp_linear, interp_nearest, Resampled, Resampler, TargetGrid};

#[derive(Debug, Clone, Default)]
pub struct Interp1dResampler {
    target: Option<TargetGrid>,
}

impl Interp1dResampler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Resampler for Interp1dResampler {
    fn init(&mut self, wave: ArrayView1<'_, f64>, wave_edges: Option<ArrayView1<'_, f64>>) -> Result<()> {
        let target = TargetGrid::new(wave, wave_edges)?;
        debug!(bins = target.len(), "Initialized interp1d resampler");
        self.target = Some(target);
        Ok(())
    }

    fn reset(&mut self) {
        self.target = None;
    }

    fn target(&self) -> Option<&TargetGrid> {
        self.target.as_ref()
    }

    /// Source bin edges are not used.
    fn resample_value(
        &self,
        wave: ArrayView1<'_, f64>,
        _wave_edges: Option<ArrayView1<'_, f64>>,
        value: Option<ArrayView1<'_, f64>>,
        error: Option<ArrayView1<'_, f64>>,
    ) -> Result<Resampled> {
        let target = self.require_target()?;
        check_ascending("source wavelength", wave)?;

        let value = match value {
            Some(v) => {
                check_len("value", wave.len(), v.len())?;
                Some(interp_linear(wave, v, target.wave()))
            }
            None => None,
        };
        let error = match error {
            Some(e) => {
                check_len("error", wave.len(), e.len())?;
                Some(interp_nearest(wave, e, target.wave()))
            }
            None => None,
        };
        Ok(Resampled { value, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_resample_value_shapes() {
        let wave_edges: Array1<f64> = Array1::linspace(3000.0, 9000.0, 6001);
        let wave = Array1::from_shape_fn(6000, |i| 0.5 * (wave_edges[i] + wave_edges[i + 1]));
        let value = wave.mapv(|w: f64| (w / 500.0).sin().abs());
        let sigma = Array1::linspace(3.0, 5.0, 6000);

        let nwave_edges = Array1::from_shape_fn(1201, |i| wave_edges[5 * i]);
        let nwave = Array1::from_shape_fn(1200, |i| 0.5 * (nwave_edges[i] + nwave_edges[i + 1]));

        let mut r = Interp1dResampler::new();
        r.init(nwave.view(), Some(nwave_edges.view())).unwrap();
        let out = r
            .resample_value(wave.view(), Some(wave_edges.view()), Some(value.view()), Some(sigma.view()))
            .unwrap();
        r.reset();

        assert_eq!(out.value.unwrap().len(), nwave.len());
        assert_eq!(out.error.unwrap().len(), nwave.len());
    }

    #[test]
    fn test_linear_at_centers() {
        let wave = array![1.0, 2.0, 3.0];
        let value = array![10.0, 20.0, 40.0];
        let mut r = Interp1dResampler::new();
        r.init(array![1.5, 2.5, 3.5].view(), None).unwrap();
        let v = r
            .resample_value(wave.view(), None, Some(value.view()), None)
            .unwrap()
            .value
            .unwrap();
        assert_eq!(v[0], 15.0);
        assert_eq!(v[1], 30.0);
        assert!(v[2].is_nan());
    }

    #[test]
    fn test_mask_nearest() {
        let wave = array![1.0, 2.0, 3.0];
        let mask = array![false, true, false];
        let mut r = Interp1dResampler::new();
        r.init(array![1.2, 1.8, 2.9].view(), None).unwrap();
        let m = r.resample_mask(wave.view(), mask.view()).unwrap();
        assert_eq!(m, array![false, true, false]);
    }
}
