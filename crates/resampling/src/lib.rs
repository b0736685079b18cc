//! Resampling of Spectra onto Instrument Wavelength Grids
//!
//! All resamplers share an `init` / `reset` lifecycle: `init` caches the
//! target wavelength grid and its bin edges, `resample_value` maps a source
//! spectrum (and optionally its error vector) onto it.
//!
//! - [`FluxConservingResampler`]: integrates the source density, interpolates
//!   the cumulative integral at the target edges and differences it; linear
//!   or monotone cubic (PCHIP) integral
//! - [`Interp1dResampler`]: linear interpolation at the target centers
//! - [`ReferenceResampler`]: slow exact binning for cross-checks
//!
//! Errors are resampled by nearest-neighbour lookup.
//!
//! # Example
//!
//! ```ignore
//! use resampling::{FluxConservingResampler, IntegralKind, Resampler};
//!
//! let mut resampler = FluxConservingResampler::new(IntegralKind::Pchip);
//! resampler.init(target_wave.view(), None)?;
//! let out = resampler.resample_value(wave.view(), None, Some(flux.view()), Some(error.view()))?;
//! resampler.reset();
//! ```

pub mod error;
pub mod factory;
pub mod flux_conserving;
pub mod interp1d;
pub mod pchip;
pub mod reference;
pub mod resampler;

// Re-export commonly used types at crate root
pub use error::{ResampleError, Result};
pub use factory::{create_resampler, ResamplerKind};
pub use flux_conserving::{FluxConservingResampler, IntegralKind};
pub use interp1d::Interp1dResampler;
pub use pchip::Pchip;
pub use reference::ReferenceResampler;
pub use resampler::{find_wave_edges, Resampled, Resampler, TargetGrid};
