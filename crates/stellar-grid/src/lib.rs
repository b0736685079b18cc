//! Stellar Spectral Grids with Eager and Lazy Zarr Storage
//!
//! This crate stores pre-computed stellar model spectra on N-dimensional
//! parameter grids (`T_eff`, `Fe_H`, `log_g`, ...) and interpolates new
//! spectra between the grid points. It provides:
//!
//! - **Validity tracking**: a boolean index per value array marks the points
//!   holding usable data; missing points are never filled with placeholders
//! - **Eager or lazy storage**: arrays resident in memory, or read and written
//!   point by point from chunked Zarr V3 arrays
//! - **Slicing**: command-line parameter ranges restrict a grid to a sub-region
//! - **Interpolation**: linear 1-D, multilinear N-D and natural cubic spline
//!
//! # Architecture
//!
//! ```text
//! GridConfig (StellarModelConfig / GridLayout)
//!      │ declares axes + value arrays
//!      ▼
//! ArrayGrid ──────────────► GridStorage
//!      │                      ├─► ZarrStorage   (chunked, lazy capable)
//!      │                      └─► PackedStorage (single file, eager only)
//!      │
//!      ├─► get_value / set_value (exact, nearest)
//!      │
//!      ├─► interpolate_value_linear / _spline
//!      │
//!      └─► GridBuilder ──► GridTransform ──► output ArrayGrid
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stellar_grid::{coords, ArrayGrid, GridStoreConfig, ModelAxes, StellarModelConfig};
//!
//! let config = Arc::new(StellarModelConfig::new(ModelAxes::Kurucz, 4000));
//! let grid = ArrayGrid::open("kurucz.zarr", &GridStoreConfig::from_env(), Some(config), &[])?;
//!
//! let params = coords([("Fe_H", -0.5), ("T_eff", 5800.0), ("log_g", 4.4)]);
//! if let Some(spec) = grid.interpolate_value_linear("flux", &params)? {
//!     // ...
//! }
//! ```

pub mod array_grid;
pub mod axis;
pub mod builder;
pub mod config;
pub mod error;
pub mod grid;
pub mod index;
pub mod interpolation;
pub mod policy;
pub mod storage;

// Re-export commonly used types at crate root
pub use array_grid::{ArrayGrid, PointMode};
pub use axis::GridAxis;
pub use builder::{BuildResult, GridBuilder, GridTransform};
pub use config::{GridStoreConfig, StorageFormat, StorageMode, ZarrCompression};
pub use error::{GridError, Result};
pub use grid::{Grid, PersistentGrid};
pub use index::{coords, AxisIndex, Coords, GridIndex, GridSlice, IndexMode, ParamRange};
pub use interpolation::{CubicSpline, Interpolated};
pub use policy::{GridConfig, GridLayout, ModelAxes, StellarModelConfig};
pub use storage::{GridStorage, ItemData, ItemType, ItemView, PackedStorage, ZarrStorage};
