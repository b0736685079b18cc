//! Zarr V3 grid storage.
//!
//! Every grid item is a separate Zarr array inside one filesystem
//! hierarchy. Value arrays are chunked per grid point by default, so lazy
//! grids read and write single spectra without touching their neighbours.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use super::{check_region, GridStorage, ItemData, ItemType, ItemView};
use crate::config::{GridStoreConfig, StorageFormat, ZarrCompression};
use crate::error::{GridError, Result};
use crate::index::GridIndex;

const ITEM_TYPE_ATTR: &str = "item_type";

/// Grid storage backed by a Zarr V3 hierarchy on the local filesystem.
pub struct ZarrStorage {
    root: PathBuf,
    store: Arc<FilesystemStore>,
    config: GridStoreConfig,
}

impl ZarrStorage {
    /// Create a new hierarchy at `root`, creating the directory if needed.
    pub fn create(root: impl AsRef<Path>, config: &GridStoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!(path = %root.display(), "Created zarr grid");
        Self::with_root(root, config)
    }

    /// Open an existing hierarchy.
    pub fn open(root: impl AsRef<Path>, config: &GridStoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(GridError::NotFound(root.display().to_string()));
        }
        Self::with_root(root, config)
    }

    fn with_root(root: PathBuf, config: &GridStoreConfig) -> Result<Self> {
        let store = FilesystemStore::new(&root)
            .map_err(|e| GridError::storage_error(e.to_string()))?;
        Ok(Self {
            root,
            store: Arc::new(store),
            config: config.clone(),
        })
    }

    /// Root directory of the hierarchy.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open_array(&self, path: &str) -> Result<Array<FilesystemStore>> {
        Array::open(self.store.clone(), path).map_err(|_| GridError::NotFound(path.to_string()))
    }

    fn stored_type(array: &Array<FilesystemStore>) -> ItemType {
        match array
            .attributes()
            .get(ITEM_TYPE_ATTR)
            .and_then(|v| v.as_str())
        {
            Some("bool") => ItemType::Bool,
            _ => ItemType::Float64,
        }
    }

    /// Remove an existing array so stale chunks don't survive reallocation.
    fn remove_item(&self, path: &str) -> Result<()> {
        let dir = self.root.join(path.trim_start_matches('/'));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn build_array(
        &self,
        path: &str,
        shape: &[usize],
        item_type: ItemType,
        chunks: Option<&[usize]>,
    ) -> Result<Array<FilesystemStore>> {
        let chunk_shape: Vec<u64> = match chunks {
            Some(c) if c.len() == shape.len() => c.iter().map(|&n| n.max(1) as u64).collect(),
            _ => shape.iter().map(|&n| n.max(1) as u64).collect(),
        };
        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .try_into()
            .map_err(|e| GridError::config(format!("{:?}", e)))?;

        let (data_type, fill_value, typesize) = match item_type {
            ItemType::Float64 => (DataType::Float64, FillValue::from(f64::NAN), 8),
            ItemType::Bool => (DataType::UInt8, FillValue::from(0u8), 1),
        };

        let mut attrs = serde_json::Map::new();
        attrs.insert(
            ITEM_TYPE_ATTR.to_string(),
            serde_json::json!(item_type.as_str()),
        );

        let mut binding = ArrayBuilder::new(
            shape.iter().map(|&n| n as u64).collect(),
            data_type,
            chunk_grid,
            fill_value,
        );
        let mut builder = binding.attributes(attrs);

        if self.config.zarr_compression != ZarrCompression::None {
            let codec = self.create_compression_codec(typesize)?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(self.store.clone(), path)
            .map_err(|e| GridError::storage_error(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| GridError::storage_error(e.to_string()))?;
        Ok(array)
    }

    fn create_compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.zarr_compression_level)
            .map_err(|_| GridError::config("Invalid compression level"))?;

        let shuffle = if self.config.zarr_shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.config.zarr_shuffle {
            Some(typesize)
        } else {
            None
        };

        let compressor = match self.config.zarr_compression {
            ZarrCompression::None => {
                return Err(GridError::config("No compression configured"));
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| GridError::config(e.to_string()))?;

        Ok(Arc::new(codec))
    }

    /// Subset of the item covering the region selected by `index`.
    fn subset(path: &str, shape: &[usize], index: Option<&GridIndex>) -> Result<(ArraySubset, Vec<usize>)> {
        let (start, size, selected): (Vec<u64>, Vec<u64>, Vec<usize>) = match index {
            None => (
                vec![0; shape.len()],
                shape.iter().map(|&n| n as u64).collect(),
                shape.to_vec(),
            ),
            Some(index) => {
                check_region(path, shape, index)?;
                let leading = &shape[..index.rank()];
                let trailing = &shape[index.rank()..];
                let mut ranges = index.ranges(leading);
                ranges.extend(trailing.iter().map(|&n| 0..n));
                (
                    ranges.iter().map(|r| r.start as u64).collect(),
                    ranges.iter().map(|r| r.len() as u64).collect(),
                    index.selected_shape(leading, trailing),
                )
            }
        };
        let subset = ArraySubset::new_with_start_shape(start, size)
            .map_err(|e| GridError::storage_error(e.to_string()))?;
        Ok((subset, selected))
    }

    fn shape_of(array: &Array<FilesystemStore>) -> Vec<usize> {
        array.shape().iter().map(|&n| n as usize).collect()
    }
}

impl GridStorage for ZarrStorage {
    fn has_item(&self, path: &str) -> bool {
        Array::open(self.store.clone(), path).is_ok()
    }

    fn allocate_item(
        &mut self,
        path: &str,
        shape: &[usize],
        item_type: ItemType,
        chunks: Option<&[usize]>,
    ) -> Result<()> {
        self.remove_item(path)?;
        self.build_array(path, shape, item_type, chunks)?;
        debug!(path = %path, shape = ?shape, chunks = ?chunks, dtype = item_type.as_str(), "Allocated zarr array");
        Ok(())
    }

    fn save_item(&mut self, path: &str, data: ItemView<'_>, index: Option<&GridIndex>) -> Result<()> {
        let array = match index {
            None => {
                self.remove_item(path)?;
                self.build_array(path, data.shape(), data.item_type(), None)?
            }
            Some(_) => self.open_array(path)?,
        };

        let shape = Self::shape_of(&array);
        let (subset, _) = Self::subset(path, &shape, index)?;
        if subset.num_elements() != data.len() as u64 {
            let expected: Vec<usize> = subset.shape().iter().map(|&n| n as usize).collect();
            return Err(GridError::shape_mismatch(&expected, data.shape()));
        }

        let stored = Self::stored_type(&array);
        if stored != data.item_type() {
            return Err(GridError::invalid_metadata(format!(
                "cannot write {} data to {} item {}",
                data.item_type().as_str(),
                stored.as_str(),
                path
            )));
        }

        match data {
            ItemView::Float64(v) => {
                let elements: Vec<f64> = v.iter().copied().collect();
                array
                    .store_array_subset_elements(&subset, &elements)
                    .map_err(|e| GridError::storage_error(e.to_string()))?;
            }
            ItemView::Bool(v) => {
                let elements: Vec<u8> = v.iter().map(|b| u8::from(*b)).collect();
                array
                    .store_array_subset_elements(&subset, &elements)
                    .map_err(|e| GridError::storage_error(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn load_item(&self, path: &str, item_type: ItemType, index: Option<&GridIndex>) -> Result<ItemData> {
        let array = self.open_array(path)?;
        let stored = Self::stored_type(&array);
        if stored != item_type {
            return Err(GridError::invalid_metadata(format!(
                "item {} is {}, requested {}",
                path,
                stored.as_str(),
                item_type.as_str()
            )));
        }

        let shape = Self::shape_of(&array);
        let (subset, selected) = Self::subset(path, &shape, index)?;

        match item_type {
            ItemType::Float64 => {
                let elements = array
                    .retrieve_array_subset_elements::<f64>(&subset)
                    .map_err(|e| GridError::storage_error(e.to_string()))?;
                let data = ArrayD::from_shape_vec(IxDyn(&selected), elements)
                    .map_err(|e| GridError::storage_error(e.to_string()))?;
                Ok(ItemData::Float64(data))
            }
            ItemType::Bool => {
                let elements = array
                    .retrieve_array_subset_elements::<u8>(&subset)
                    .map_err(|e| GridError::storage_error(e.to_string()))?;
                let flags: Vec<bool> = elements.into_iter().map(|b| b != 0).collect();
                let data = ArrayD::from_shape_vec(IxDyn(&selected), flags)
                    .map_err(|e| GridError::storage_error(e.to_string()))?;
                Ok(ItemData::Bool(data))
            }
        }
    }

    fn get_item_shape(&self, path: &str) -> Result<Option<Vec<usize>>> {
        match Array::open(self.store.clone(), path) {
            Ok(array) => Ok(Some(Self::shape_of(&array))),
            Err(_) => Ok(None),
        }
    }

    fn flush(&mut self) -> Result<()> {
        // Chunks are written through on every store call.
        Ok(())
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn format(&self) -> StorageFormat {
        StorageFormat::Zarr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::AxisIndex;

    fn temp_storage(config: &GridStoreConfig) -> (tempfile::TempDir, ZarrStorage) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = ZarrStorage::create(temp_dir.path().join("grid.zarr"), config)
            .expect("Failed to create store");
        (temp_dir, storage)
    }

    #[test]
    fn test_allocate_and_region_roundtrip() {
        let (_dir, mut storage) = temp_storage(&GridStoreConfig::default());
        let path = "/grid/arrays/flux/value";
        assert!(!storage.has_item(path));

        storage
            .allocate_item(path, &[3, 2, 5], ItemType::Float64, Some(&[1, 1, 5]))
            .unwrap();
        assert!(storage.has_item(path));
        assert_eq!(storage.get_item_shape(path).unwrap(), Some(vec![3, 2, 5]));

        let spectrum = ndarray::Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]).into_dyn();
        let idx = GridIndex::point(&[2, 1]);
        storage
            .save_item(path, ItemView::Float64(spectrum.view()), Some(&idx))
            .unwrap();

        let back = storage
            .load_item(path, ItemType::Float64, Some(&idx))
            .unwrap()
            .into_f64()
            .unwrap();
        assert_eq!(back, spectrum);

        let column = storage
            .load_item(
                path,
                ItemType::Float64,
                Some(&GridIndex(vec![AxisIndex::Full, AxisIndex::At(1)])),
            )
            .unwrap()
            .into_f64()
            .unwrap();
        assert_eq!(column.shape(), &[3, 5]);
        assert!(column[[0, 0]].is_nan());
        assert_eq!(column[[2, 4]], 5.0);
    }

    #[test]
    fn test_bool_items() {
        let (_dir, mut storage) = temp_storage(&GridStoreConfig::default());
        let path = "/grid/arrays/flux/index";
        storage
            .allocate_item(path, &[2, 2], ItemType::Bool, None)
            .unwrap();
        let flag = ndarray::arr0(true).into_dyn();
        storage
            .save_item(path, ItemView::Bool(flag.view()), Some(&GridIndex::point(&[0, 1])))
            .unwrap();
        let index = storage
            .load_item(path, ItemType::Bool, None)
            .unwrap()
            .into_bool()
            .unwrap();
        assert!(index[[0, 1]]);
        assert!(!index[[1, 1]]);

        assert!(storage.load_item(path, ItemType::Float64, None).is_err());
    }

    #[test]
    fn test_whole_item_save_and_reopen() {
        let config = GridStoreConfig::default();
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("axes.zarr");
        {
            let mut storage = ZarrStorage::create(&root, &config).unwrap();
            let values = ndarray::Array1::from(vec![3500.0, 3750.0, 4000.0]).into_dyn();
            storage
                .save_item("/grid/axes/T_eff", ItemView::Float64(values.view()), None)
                .unwrap();
        }
        let storage = ZarrStorage::open(&root, &config).unwrap();
        let values = storage
            .load_item("/grid/axes/T_eff", ItemType::Float64, None)
            .unwrap()
            .into_f64()
            .unwrap();
        assert_eq!(values.as_slice().unwrap(), &[3500.0, 3750.0, 4000.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let (_dir, mut storage) = temp_storage(&GridStoreConfig::default());
        let path = "/grid/arrays/flux/value";
        storage
            .allocate_item(path, &[2, 4], ItemType::Float64, None)
            .unwrap();
        let short = ndarray::Array1::from(vec![1.0, 2.0]).into_dyn();
        let result = storage.save_item(path, ItemView::Float64(short.view()), Some(&GridIndex::point(&[0])));
        assert!(matches!(result, Err(GridError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_open_missing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = ZarrStorage::open(temp_dir.path().join("nope.zarr"), &GridStoreConfig::default());
        assert!(matches!(result, Err(GridError::NotFound(_))));
    }
}
