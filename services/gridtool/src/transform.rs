//! Grid transform resampling spectra onto a new wavelength grid.

use indexmap::IndexMap;
use ndarray::{Array1, ArrayD, Ix1};
use resampling::{create_resampler, ResampleError, Resampler, ResamplerKind};
use stellar_grid::{ArrayGrid, Coords, GridError, GridIndex, GridTransform};

/// Wavelength limits given as `start,stop` or `start,stop,count`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveRange {
    pub start: f64,
    pub stop: f64,
    pub count: Option<usize>,
}

impl WaveRange {
    /// Evenly spaced wavelengths, in log space if `log` is set.
    pub fn to_wave(&self, count: usize, log: bool) -> Array1<f64> {
        if log {
            Array1::linspace(self.start.ln(), self.stop.ln(), count).mapv(f64::exp)
        } else {
            Array1::linspace(self.start, self.stop, count)
        }
    }
}

impl std::str::FromStr for WaveRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let number = |p: &str| p.parse::<f64>().map_err(|e| format!("invalid wavelength {:?}: {}", p, e));
        let (start, stop, count) = match parts.as_slice() {
            [a, b] => (number(a)?, number(b)?, None),
            [a, b, n] => (
                number(a)?,
                number(b)?,
                Some(n.parse::<usize>().map_err(|e| format!("invalid count {:?}: {}", n, e))?),
            ),
            _ => return Err(format!("expected start,stop[,count], got {}", s)),
        };
        if !(start > 0.0 && stop > start) {
            return Err(format!("wavelength range {} must be positive and ascending", s));
        }
        if count.is_some_and(|n| n < 2) {
            return Err("wavelength count must be at least 2".to_string());
        }
        Ok(Self { start, stop, count })
    }
}

/// Resamples the named spectra at every input point onto a common target
/// wavelength grid.
pub struct ResampleTransform {
    names: Vec<String>,
    source_wave: Array1<f64>,
    target_len: usize,
    resampler: Box<dyn Resampler>,
}

impl ResampleTransform {
    pub fn new(
        kind: ResamplerKind,
        names: Vec<String>,
        source_wave: Array1<f64>,
        target_wave: Array1<f64>,
    ) -> Result<Self, ResampleError> {
        let mut resampler = create_resampler(kind);
        resampler.init(target_wave.view(), None)?;
        Ok(Self {
            names,
            source_wave,
            target_len: target_wave.len(),
            resampler,
        })
    }
}

impl GridTransform for ResampleTransform {
    fn output_values(&self) -> Vec<(String, Vec<usize>)> {
        self.names
            .iter()
            .map(|n| (n.clone(), vec![self.target_len]))
            .collect()
    }

    fn process(
        &mut self,
        input: &ArrayGrid,
        point: &[usize],
        _params: &Coords,
    ) -> stellar_grid::Result<Option<IndexMap<String, ArrayD<f64>>>> {
        let idx = GridIndex::point(point);
        let mut out = IndexMap::new();
        for name in &self.names {
            let Some(value) = input.get_value_at(name, &idx)? else {
                return Ok(None);
            };
            let shape = value.shape().to_vec();
            let value = value
                .into_dimensionality::<Ix1>()
                .map_err(|_| GridError::shape_mismatch(&[self.source_wave.len()], &shape))?;
            if value.len() != self.source_wave.len() {
                return Err(GridError::shape_mismatch(&[self.source_wave.len()], &shape));
            }

            let resampled = self
                .resampler
                .resample_value(self.source_wave.view(), None, Some(value.view()), None)
                .map_err(|e| GridError::config(e.to_string()))?;
            match resampled.value {
                Some(v) => {
                    out.insert(name.clone(), v.into_dyn());
                }
                None => return Ok(None),
            }
        }
        Ok(Some(out))
    }
}
