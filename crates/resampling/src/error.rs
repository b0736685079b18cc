//! Error types for spectrum resampling.

use thiserror::Error;

/// Errors that can occur while resampling a spectrum.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResampleError {
    /// `resample_*` called before `init` or after `reset`.
    #[error("resampler is not initialized with a target wavelength grid")]
    NotInitialized,

    /// Array lengths that don't fit together.
    #[error("length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Wavelengths or bin edges that are unusable.
    #[error("invalid wavelength grid: {0}")]
    InvalidWave(String),

    /// Unknown resampler name.
    #[error("unknown resampler: {0}")]
    UnknownKind(String),
}

impl ResampleError {
    /// Create an InvalidWave error.
    pub fn invalid_wave(msg: impl Into<String>) -> Self {
        Self::InvalidWave(msg.into())
    }

    /// Create a LengthMismatch error.
    pub fn length_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch { what, expected, actual }
    }
}

/// Result type for resampling operations.
pub type Result<T> = std::result::Result<T, ResampleError>;
