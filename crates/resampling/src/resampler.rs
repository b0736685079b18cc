//! Shared resampler lifecycle and wavelength helpers.

use ndarray::{Array1, ArrayView1};

use crate::error::{ResampleError, Result};

/// Target wavelength grid cached by a resampler between `init` and `reset`.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    wave: Array1<f64>,
    wave_edges: Array1<f64>,
}

impl TargetGrid {
    /// Target grid from bin centers and, optionally, bin edges.
    ///
    /// Edges are derived with [`find_wave_edges`] when not given.
    pub fn new(wave: ArrayView1<'_, f64>, wave_edges: Option<ArrayView1<'_, f64>>) -> Result<Self> {
        check_ascending("target wavelength", wave)?;
        let wave_edges = match wave_edges {
            Some(edges) => {
                check_edges(wave.len(), edges)?;
                edges.to_owned()
            }
            None => find_wave_edges(wave)?,
        };
        Ok(Self {
            wave: wave.to_owned(),
            wave_edges,
        })
    }

    pub fn wave(&self) -> ArrayView1<'_, f64> {
        self.wave.view()
    }

    pub fn wave_edges(&self) -> ArrayView1<'_, f64> {
        self.wave_edges.view()
    }

    pub fn len(&self) -> usize {
        self.wave.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wave.is_empty()
    }
}

/// Resampled value and error vectors, aligned to the target grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Resampled {
    pub value: Option<Array1<f64>>,
    /// Best-effort; not every resampler propagates errors.
    pub error: Option<Array1<f64>>,
}

/// Resamples spectra onto a target wavelength grid set by [`Resampler::init`].
pub trait Resampler: Send {
    /// Cache the target grid.
    fn init(&mut self, wave: ArrayView1<'_, f64>, wave_edges: Option<ArrayView1<'_, f64>>) -> Result<()>;

    /// Drop the cached target grid.
    fn reset(&mut self);

    fn target(&self) -> Option<&TargetGrid>;

    /// Resample a spectrum given at `wave` (with optional source bin edges).
    fn resample_value(
        &self,
        wave: ArrayView1<'_, f64>,
        wave_edges: Option<ArrayView1<'_, f64>>,
        value: Option<ArrayView1<'_, f64>>,
        error: Option<ArrayView1<'_, f64>>,
    ) -> Result<Resampled>;

    /// Resample a pixel mask; a target pixel takes the mask of the nearest
    /// source pixel.
    fn resample_mask(&self, wave: ArrayView1<'_, f64>, mask: ArrayView1<'_, bool>) -> Result<Array1<bool>> {
        let target = self.require_target()?;
        check_len("mask", wave.len(), mask.len())?;
        Ok(target
            .wave()
            .mapv(|x| nearest_position(wave, x).map_or(true, |i| mask[i])))
    }

    fn is_initialized(&self) -> bool {
        self.target().is_some()
    }

    fn require_target(&self) -> Result<&TargetGrid> {
        self.target().ok_or(ResampleError::NotInitialized)
    }
}

/// Bin edges halfway between the wavelength centers, with the outer edges
/// extrapolated by half a bin.
pub fn find_wave_edges(wave: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    let n = wave.len();
    if n < 2 {
        return Err(ResampleError::invalid_wave(
            "at least two wavelengths are needed to derive bin edges",
        ));
    }
    let mut edges = Array1::zeros(n + 1);
    edges[0] = wave[0] - 0.5 * (wave[1] - wave[0]);
    for i in 1..n {
        edges[i] = 0.5 * (wave[i - 1] + wave[i]);
    }
    edges[n] = wave[n - 1] + 0.5 * (wave[n - 1] - wave[n - 2]);
    Ok(edges)
}

/// Source edges as given or derived from the centers.
pub(crate) fn source_edges(wave: ArrayView1<'_, f64>, wave_edges: Option<ArrayView1<'_, f64>>) -> Result<Array1<f64>> {
    match wave_edges {
        Some(edges) => {
            check_edges(wave.len(), edges)?;
            Ok(edges.to_owned())
        }
        None => find_wave_edges(wave),
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ResampleError::length_mismatch(what, expected, actual));
    }
    Ok(())
}

fn check_edges(count: usize, edges: ArrayView1<'_, f64>) -> Result<()> {
    check_len("wavelength edges", count + 1, edges.len())?;
    check_ascending("wavelength edges", edges)
}

pub(crate) fn check_ascending(what: &str, values: ArrayView1<'_, f64>) -> Result<()> {
    if values.is_empty() {
        return Err(ResampleError::invalid_wave(format!("{} is empty", what)));
    }
    let ascending = values
        .iter()
        .zip(values.iter().skip(1))
        .all(|(a, b)| a < b);
    if !ascending {
        return Err(ResampleError::invalid_wave(format!("{} must be strictly ascending", what)));
    }
    Ok(())
}

/// Position of the source point closest to `x`, ties toward the lower one.
/// `None` outside `[xs[0], xs[n-1]]`.
pub(crate) fn nearest_position(xs: ArrayView1<'_, f64>, x: f64) -> Option<usize> {
    let n = xs.len();
    if n == 0 || x.is_nan() || x < xs[0] || x > xs[n - 1] {
        return None;
    }
    let i = partition_point(xs, x);
    if i == 0 {
        return Some(0);
    }
    if i == n {
        return Some(n - 1);
    }
    Some(if x - xs[i - 1] <= xs[i] - x { i - 1 } else { i })
}

/// Nearest-neighbour lookup of `ys` at every `x`; NaN outside the source range.
pub(crate) fn interp_nearest(xs: ArrayView1<'_, f64>, ys: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
    x.mapv(|x| nearest_position(xs, x).map_or(f64::NAN, |i| ys[i]))
}

/// Piecewise linear interpolation of `ys` at every `x`; NaN outside the
/// source range.
pub(crate) fn interp_linear(xs: ArrayView1<'_, f64>, ys: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = xs.len();
    x.mapv(|x| {
        if n == 0 || x.is_nan() || x < xs[0] || x > xs[n - 1] {
            return f64::NAN;
        }
        if n == 1 {
            return ys[0];
        }
        let i = partition_point(xs, x).clamp(1, n - 1);
        let t = (x - xs[i - 1]) / (xs[i] - xs[i - 1]);
        ys[i - 1] + t * (ys[i] - ys[i - 1])
    })
}

/// Number of values `<= x`.
pub(crate) fn partition_point(xs: ArrayView1<'_, f64>, x: f64) -> usize {
    match xs.as_slice() {
        Some(s) => s.partition_point(|v| *v <= x),
        None => xs.iter().take_while(|v| **v <= x).count(),
    }
}
