//! Common test fixtures for stellar grid tests.
//!
//! This module provides pre-defined axes, wavelength ranges and layouts that
//! represent common scenarios in spectral grid processing.

/// Parameter axes of small test grids.
pub mod axes {
    /// Effective temperature, the low end of the Kurucz grid.
    pub const T_EFF: [f64; 5] = [3500.0, 3750.0, 4000.0, 4250.0, 4500.0];

    /// Surface gravity.
    pub const LOG_G: [f64; 3] = [4.0, 4.5, 5.0];

    /// Metallicity.
    pub const FE_H: [f64; 2] = [0.0, 0.1];

    /// Single-valued axis, squeezed away for interpolation.
    pub const ALPHA_FE: [f64; 1] = [0.0];
}

/// Wavelength ranges in Angstrom.
pub mod wave {
    /// PFS blue arm.
    pub const BLUE: (f64, f64) = (3800.0, 6500.0);

    /// PFS red arm, low resolution.
    pub const RED: (f64, f64) = (6300.0, 9700.0);

    /// Narrow range around the Balmer H-beta line, for fast tests.
    pub const H_BETA: (f64, f64) = (4800.0, 4920.0);
}

/// YAML grid layouts.
pub mod layouts {
    /// Three-axis layout with a spectrum and a scalar per point.
    pub const SMALL: &str = r#"
axes:
  - name: Fe_H
    values: [0.0, 0.1]
  - name: T_eff
    values: [3500, 3750, 4000, 4250, 4500]
  - name: log_g
    range: { start: 4.0, stop: 5.0, step: 0.5 }
values:
  - name: flux
    shape: [16]
  - name: mag
chunk_per_point: true
"#;

    /// Layout missing its value arrays.
    pub const NO_VALUES: &str = r#"
axes:
  - name: T_eff
    values: [3500, 4000]
values: []
"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes_ascending() {
        for values in [&axes::T_EFF[..], &axes::LOG_G[..], &axes::FE_H[..]] {
            assert!(values.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_wave_ranges() {
        for (lo, hi) in [wave::BLUE, wave::RED, wave::H_BETA] {
            assert!(lo < hi);
        }
    }
}
