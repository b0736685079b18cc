//! Error types for grid storage and interpolation.

use thiserror::Error;

/// Errors that can occur while configuring, loading or querying a grid.
///
/// Missing data at a grid point and impossible interpolations are not errors;
/// those are reported as `Ok(None)` by the query methods.
#[derive(Error, Debug)]
pub enum GridError {
    /// Malformed grid configuration (axes, value arrays, slice arguments).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An axis name that the grid does not declare.
    #[error("unknown axis: {0}")]
    UnknownAxis(String),

    /// A value array name that the grid does not declare.
    #[error("unknown value array: {0}")]
    UnknownValue(String),

    /// An exact coordinate that is not a point of the axis.
    #[error("value {value} not found on axis {axis}")]
    LookupFailed { axis: String, value: f64 },

    /// The requested operation is not available in the current storage mode.
    #[error("storage mode error: {0}")]
    StorageMode(String),

    /// Shape mismatch between a value and its destination.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// The storage backend has no item at the given path.
    #[error("item not found: {0}")]
    NotFound(String),

    /// Invalid metadata in a stored grid.
    #[error("invalid grid metadata: {0}")]
    InvalidMetadata(String),
}

impl GridError {
    /// Create a ConfigError.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a StorageMode error.
    pub fn storage_mode(msg: impl Into<String>) -> Self {
        Self::StorageMode(msg.into())
    }

    /// Create a StorageError.
    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a ShapeMismatch error.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
