//! Storage backends for grid items.
//!
//! A grid is persisted as a hierarchy of named items (axis values, value
//! arrays, validity indexes). Backends address items by slash-separated
//! paths such as `/grid/arrays/flux/value` and support reading and writing
//! regions selected by a [`GridIndex`].

mod packed;
mod zarr;

pub use packed::PackedStorage;
pub use zarr::ZarrStorage;

use std::path::Path;

use ndarray::{ArrayD, ArrayViewD};

use crate::config::{GridStoreConfig, StorageFormat};
use crate::error::{GridError, Result};
use crate::index::GridIndex;

/// Element type of a stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Float64,
    Bool,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Bool => "bool",
        }
    }
}

/// Owned contents of an item (or of a region of it).
#[derive(Debug, Clone, PartialEq)]
pub enum ItemData {
    Float64(ArrayD<f64>),
    Bool(ArrayD<bool>),
}

impl ItemData {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Float64(_) => ItemType::Float64,
            Self::Bool(_) => ItemType::Bool,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float64(a) => a.shape(),
            Self::Bool(a) => a.shape(),
        }
    }

    pub fn into_f64(self) -> Result<ArrayD<f64>> {
        match self {
            Self::Float64(a) => Ok(a),
            Self::Bool(_) => Err(GridError::invalid_metadata("expected float64 item, found bool")),
        }
    }

    pub fn into_bool(self) -> Result<ArrayD<bool>> {
        match self {
            Self::Bool(a) => Ok(a),
            Self::Float64(_) => Err(GridError::invalid_metadata("expected bool item, found float64")),
        }
    }
}

/// Borrowed data to be written to an item.
#[derive(Debug, Clone)]
pub enum ItemView<'a> {
    Float64(ArrayViewD<'a, f64>),
    Bool(ArrayViewD<'a, bool>),
}

impl ItemView<'_> {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Float64(_) => ItemType::Float64,
            Self::Bool(_) => ItemType::Bool,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float64(a) => a.shape(),
            Self::Bool(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float64(a) => a.len(),
            Self::Bool(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage backend contract consumed by grids.
///
/// `index` arguments select a region along the leading dimensions of the
/// item; trailing dimensions are always read or written in full. Reads drop
/// the dimensions selected by a single position.
pub trait GridStorage: Send {
    /// Whether an item exists at `path`.
    fn has_item(&self, path: &str) -> bool;

    /// Create an item of the given shape filled with its empty value
    /// (NaN for floats, false for booleans). Existing items are replaced.
    fn allocate_item(
        &mut self,
        path: &str,
        shape: &[usize],
        item_type: ItemType,
        chunks: Option<&[usize]>,
    ) -> Result<()>;

    /// Write a whole item, or the region selected by `index`.
    ///
    /// Writing a whole item creates it with the shape of `data`.
    fn save_item(&mut self, path: &str, data: ItemView<'_>, index: Option<&GridIndex>) -> Result<()>;

    /// Read a whole item, or the region selected by `index`.
    fn load_item(&self, path: &str, item_type: ItemType, index: Option<&GridIndex>) -> Result<ItemData>;

    /// Shape of an item, `None` if it does not exist.
    fn get_item_shape(&self, path: &str) -> Result<Option<Vec<usize>>>;

    /// Persist pending changes.
    fn flush(&mut self) -> Result<()>;

    /// Whether regions can be accessed without reading the whole file.
    fn supports_random_access(&self) -> bool;

    /// Format of the backing file.
    fn format(&self) -> StorageFormat;
}

/// Create a new, empty grid file in the configured format.
pub fn create_storage(path: impl AsRef<Path>, config: &GridStoreConfig) -> Result<Box<dyn GridStorage>> {
    match config.storage_format {
        StorageFormat::Zarr => Ok(Box::new(ZarrStorage::create(path, config)?)),
        StorageFormat::Packed => Ok(Box::new(PackedStorage::create(path)?)),
    }
}

/// Open an existing grid file in the configured format.
pub fn open_storage(path: impl AsRef<Path>, config: &GridStoreConfig) -> Result<Box<dyn GridStorage>> {
    match config.storage_format {
        StorageFormat::Zarr => Ok(Box::new(ZarrStorage::open(path, config)?)),
        StorageFormat::Packed => Ok(Box::new(PackedStorage::open(path)?)),
    }
}

/// Check that an index is applicable to an item of the given shape.
pub(crate) fn check_region(path: &str, shape: &[usize], index: &GridIndex) -> Result<()> {
    if index.rank() > shape.len() {
        return Err(GridError::config(format!(
            "index of rank {} used on item {} of shape {:?}",
            index.rank(),
            path,
            shape
        )));
    }
    index.check_bounds(&shape[..index.rank()])
}
