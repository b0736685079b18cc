//! Test data generators for synthetic stellar spectra and grids.
//!
//! These generators create predictable, verifiable data that can be used
//! across the test suite without model atmosphere files.

/// Creates `count` evenly spaced wavelengths from `start` to `stop` inclusive.
///
/// # Example
///
/// ```
/// use test_utils::create_linear_wave;
///
/// let wave = create_linear_wave(4000.0, 5000.0, 11);
/// assert_eq!(wave.len(), 11);
/// assert_eq!(wave[1], 4100.0);
/// ```
pub fn create_linear_wave(start: f64, stop: f64, count: usize) -> Vec<f64> {
    if count < 2 {
        return vec![start; count];
    }
    let step = (stop - start) / (count - 1) as f64;
    (0..count).map(|i| start + i as f64 * step).collect()
}

/// Creates `count` logarithmically spaced wavelengths from `start` to `stop`
/// inclusive, i.e. constant resolving power.
pub fn create_log_wave(start: f64, stop: f64, count: usize) -> Vec<f64> {
    create_linear_wave(start.ln(), stop.ln(), count)
        .into_iter()
        .map(f64::exp)
        .collect()
}

/// Bin edges halfway between wavelengths, with the end bins mirrored.
pub fn create_bin_edges(wave: &[f64]) -> Vec<f64> {
    let n = wave.len();
    if n < 2 {
        return Vec::new();
    }
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(wave[0] - 0.5 * (wave[1] - wave[0]));
    edges.extend(wave.windows(2).map(|w| 0.5 * (w[0] + w[1])));
    edges.push(wave[n - 1] + 0.5 * (wave[n - 1] - wave[n - 2]));
    edges
}

/// Planck black body spectral radiance per unit wavelength.
///
/// `wave` is in Angstrom, the result is in arbitrary but consistent units.
pub fn create_blackbody_flux(wave: &[f64], t_eff: f64) -> Vec<f64> {
    // hc/k in Angstrom Kelvin
    const HC_K: f64 = 1.438_777e8;
    wave.iter()
        .map(|&w| {
            let x = HC_K / (w * t_eff);
            1e20 / (w.powi(5) * x.exp_m1())
        })
        .collect()
}

/// Creates a synthetic stellar spectrum: a black body with Gaussian
/// absorption lines whose depth grows with metallicity and surface gravity.
///
/// The same parameters always produce the same spectrum.
pub fn create_synthetic_spectrum(wave: &[f64], t_eff: f64, log_g: f64, fe_h: f64) -> Vec<f64> {
    const LINES: [f64; 5] = [4101.7, 4340.5, 4861.3, 5175.0, 6562.8];
    let depth = (0.3 + 0.1 * fe_h + 0.02 * log_g).clamp(0.0, 0.9);
    let width = 2.0 + 0.5 * log_g;

    create_blackbody_flux(wave, t_eff)
        .into_iter()
        .zip(wave)
        .map(|(f, &w)| {
            let absorption: f64 = LINES
                .iter()
                .map(|&l| depth * (-0.5 * ((w - l) / width).powi(2)).exp())
                .sum();
            f * (1.0 - absorption.min(0.95))
        })
        .collect()
}

/// Linear function of grid parameters: `sum(coeffs[i] * params[i])` plus
/// `offset`. Multilinear interpolation reproduces it exactly.
pub fn linear_field(coeffs: &[f64], offset: f64, params: &[f64]) -> f64 {
    offset + coeffs.iter().zip(params).map(|(c, p)| c * p).sum::<f64>()
}

/// Row-major grid point positions for a grid of the given shape.
///
/// # Example
///
/// ```
/// use test_utils::grid_points;
///
/// let points = grid_points(&[2, 3]);
/// assert_eq!(points.len(), 6);
/// assert_eq!(points[4], vec![1, 1]);
/// ```
pub fn grid_points(shape: &[usize]) -> Vec<Vec<usize>> {
    let total: usize = shape.iter().product();
    (0..total)
        .map(|mut flat| {
            let mut point = vec![0; shape.len()];
            for (k, &n) in shape.iter().enumerate().rev() {
                point[k] = flat % n;
                flat /= n;
            }
            point
        })
        .collect()
}

/// Deterministic pattern of missing grid points.
///
/// Returns true for roughly one point in `every`, chosen by a hash of the
/// position and `seed`.
pub fn is_hole(point: &[usize], every: usize, seed: u32) -> bool {
    if every == 0 {
        return false;
    }
    let mut h: u32 = seed.wrapping_mul(2_654_435_761);
    for &i in point {
        h ^= (i as u32).wrapping_add(0x9e37_79b9).wrapping_add(h << 6).wrapping_add(h >> 2);
    }
    (h as usize) % every == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;

    #[test]
    fn test_linear_wave() {
        let wave = create_linear_wave(3000.0, 4000.0, 5);
        assert_eq!(wave, vec![3000.0, 3250.0, 3500.0, 3750.0, 4000.0]);
        assert_eq!(create_linear_wave(1.0, 2.0, 1), vec![1.0]);
    }

    #[test]
    fn test_log_wave_constant_ratio() {
        let wave = create_log_wave(3000.0, 9000.0, 50);
        assert_approx_eq!(wave[0], 3000.0, 1e-9);
        assert_approx_eq!(wave[49], 9000.0, 1e-6);
        let r0 = wave[1] / wave[0];
        let r1 = wave[40] / wave[39];
        assert_approx_eq!(r0, r1, 1e-12);
    }

    #[test]
    fn test_bin_edges() {
        let edges = create_bin_edges(&[1.0, 2.0, 4.0]);
        assert_eq!(edges, vec![0.5, 1.5, 3.0, 5.0]);
    }

    #[test]
    fn test_blackbody_peak() {
        // Wien: peak near 2.898e7 / T Angstrom
        let wave = create_linear_wave(2000.0, 20000.0, 1801);
        let flux = create_blackbody_flux(&wave, 5800.0);
        let (i, _) = flux
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &f)| if f > acc.1 { (i, f) } else { acc });
        assert!((wave[i] - 2.898e7 / 5800.0).abs() < 20.0);
    }

    #[test]
    fn test_synthetic_spectrum_deterministic() {
        let wave = create_linear_wave(4000.0, 7000.0, 300);
        let a = create_synthetic_spectrum(&wave, 5000.0, 4.0, -1.0);
        let b = create_synthetic_spectrum(&wave, 5000.0, 4.0, -1.0);
        assert_eq!(a, b);
        assert!(a.iter().all(|f| f.is_finite() && *f > 0.0));
    }

    #[test]
    fn test_grid_points_order() {
        let points = grid_points(&[2, 2]);
        assert_eq!(points, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn test_holes_deterministic() {
        let holes: Vec<bool> = grid_points(&[5, 5]).iter().map(|p| is_hole(p, 3, 7)).collect();
        let again: Vec<bool> = grid_points(&[5, 5]).iter().map(|p| is_hole(p, 3, 7)).collect();
        assert_eq!(holes, again);
        assert!(!is_hole(&[1, 2], 0, 7));
    }
}
