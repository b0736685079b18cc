//! Single-file grid storage.
//!
//! Layout:
//!
//! ```text
//! +----------+----------------+------------------+------------------+
//! | "SGPACK1\0" | header length  | JSON header      | raw item payload |
//! | 8 bytes  | u64 LE         | PackedHeader     | native endian    |
//! +----------+----------------+------------------+------------------+
//! ```
//!
//! The whole file is read on open and rewritten on flush, so regions can't
//! be accessed independently and lazy grids are not supported on it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{check_region, GridStorage, ItemData, ItemType, ItemView};
use crate::config::StorageFormat;
use crate::error::{GridError, Result};
use crate::index::GridIndex;

const MAGIC: &[u8; 8] = b"SGPACK1\0";

#[derive(Debug, Serialize, Deserialize)]
struct PackedHeader {
    endian: String,
    items: Vec<PackedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackedEntry {
    path: String,
    dtype: String,
    shape: Vec<usize>,
    offset: u64,
    len: u64,
}

fn native_endian() -> &'static str {
    if cfg!(target_endian = "little") {
        "little"
    } else {
        "big"
    }
}

/// Grid storage held in memory and persisted as one file.
pub struct PackedStorage {
    path: PathBuf,
    items: BTreeMap<String, ItemData>,
    dirty: bool,
}

impl PackedStorage {
    /// Create an empty storage that will be written to `path` on flush.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            items: BTreeMap::new(),
            dirty: true,
        })
    }

    /// Read every item of an existing file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = fs::File::open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < 16 || &bytes[..8] != MAGIC {
            return Err(GridError::invalid_metadata(format!(
                "{} is not a packed grid file",
                path.display()
            )));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..16]);
        let payload_start = usize::try_from(u64::from_le_bytes(len_bytes))
            .ok()
            .and_then(|n| n.checked_add(16))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| GridError::invalid_metadata("truncated packed grid header"))?;
        let header: PackedHeader = serde_json::from_slice(&bytes[16..payload_start])?;
        if header.endian != native_endian() {
            return Err(GridError::invalid_metadata(format!(
                "packed grid written on a {}-endian machine",
                header.endian
            )));
        }

        let payload = &bytes[payload_start..];
        let mut items = BTreeMap::new();
        for entry in header.items {
            let range = usize::try_from(entry.offset)
                .ok()
                .zip(usize::try_from(entry.len).ok())
                .and_then(|(start, len)| Some(start..start.checked_add(len)?))
                .filter(|r| r.end <= payload.len());
            let Some(range) = range else {
                return Err(GridError::invalid_metadata(format!(
                    "item {} extends past the end of the file",
                    entry.path
                )));
            };
            let data = decode_item(&entry, &payload[range])?;
            items.insert(entry.path, data);
        }

        info!(path = %path.display(), items = items.len(), "Opened packed grid");

        Ok(Self {
            path,
            items,
            dirty: false,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn item(&self, path: &str) -> Result<&ItemData> {
        self.items
            .get(path)
            .ok_or_else(|| GridError::NotFound(path.to_string()))
    }
}

fn decode_item(entry: &PackedEntry, bytes: &[u8]) -> Result<ItemData> {
    let count = entry
        .shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| GridError::invalid_metadata(format!("item {} shape overflows", entry.path)))?;
    match entry.dtype.as_str() {
        "float64" => {
            if count.checked_mul(8) != Some(bytes.len()) {
                return Err(GridError::invalid_metadata(format!(
                    "item {} has {} bytes, expected {} float64 values",
                    entry.path,
                    bytes.len(),
                    count
                )));
            }
            let mut values = vec![0f64; count];
            bytemuck::cast_slice_mut::<f64, u8>(&mut values).copy_from_slice(bytes);
            let array = ArrayD::from_shape_vec(IxDyn(&entry.shape), values)
                .map_err(|e| GridError::invalid_metadata(e.to_string()))?;
            Ok(ItemData::Float64(array))
        }
        "bool" => {
            if bytes.len() != count {
                return Err(GridError::invalid_metadata(format!(
                    "item {} has {} bytes, expected {}",
                    entry.path,
                    bytes.len(),
                    count
                )));
            }
            let values: Vec<bool> = bytes.iter().map(|b| *b != 0).collect();
            let array = ArrayD::from_shape_vec(IxDyn(&entry.shape), values)
                .map_err(|e| GridError::invalid_metadata(e.to_string()))?;
            Ok(ItemData::Bool(array))
        }
        other => Err(GridError::invalid_metadata(format!(
            "unsupported dtype {} for item {}",
            other, entry.path
        ))),
    }
}

fn encode_item(data: &ItemData) -> Vec<u8> {
    match data {
        ItemData::Float64(a) => {
            let values: Vec<f64> = a.iter().copied().collect();
            bytemuck::cast_slice::<f64, u8>(&values).to_vec()
        }
        ItemData::Bool(a) => a.iter().map(|b| u8::from(*b)).collect(),
    }
}

impl GridStorage for PackedStorage {
    fn has_item(&self, path: &str) -> bool {
        self.items.contains_key(path)
    }

    fn allocate_item(
        &mut self,
        path: &str,
        shape: &[usize],
        item_type: ItemType,
        _chunks: Option<&[usize]>,
    ) -> Result<()> {
        let data = match item_type {
            ItemType::Float64 => ItemData::Float64(ArrayD::from_elem(IxDyn(shape), f64::NAN)),
            ItemType::Bool => ItemData::Bool(ArrayD::from_elem(IxDyn(shape), false)),
        };
        debug!(path = %path, shape = ?shape, dtype = item_type.as_str(), "Allocated item");
        self.items.insert(path.to_string(), data);
        self.dirty = true;
        Ok(())
    }

    fn save_item(&mut self, path: &str, data: ItemView<'_>, index: Option<&GridIndex>) -> Result<()> {
        match index {
            None => {
                let owned = match data {
                    ItemView::Float64(v) => ItemData::Float64(v.to_owned()),
                    ItemView::Bool(v) => ItemData::Bool(v.to_owned()),
                };
                self.items.insert(path.to_string(), owned);
            }
            Some(index) => {
                let target = self
                    .items
                    .get_mut(path)
                    .ok_or_else(|| GridError::NotFound(path.to_string()))?;
                check_region(path, target.shape(), index)?;
                match (target, data) {
                    (ItemData::Float64(t), ItemView::Float64(v)) => index.assign(t, &v)?,
                    (ItemData::Bool(t), ItemView::Bool(v)) => index.assign(t, &v)?,
                    (t, v) => {
                        return Err(GridError::invalid_metadata(format!(
                            "cannot write {} data to {} item {}",
                            v.item_type().as_str(),
                            t.item_type().as_str(),
                            path
                        )))
                    }
                }
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn load_item(&self, path: &str, item_type: ItemType, index: Option<&GridIndex>) -> Result<ItemData> {
        let item = self.item(path)?;
        if item.item_type() != item_type {
            return Err(GridError::invalid_metadata(format!(
                "item {} is {}, requested {}",
                path,
                item.item_type().as_str(),
                item_type.as_str()
            )));
        }
        let Some(index) = index else {
            return Ok(item.clone());
        };
        check_region(path, item.shape(), index)?;
        Ok(match item {
            ItemData::Float64(a) => ItemData::Float64(index.select(a).to_owned()),
            ItemData::Bool(a) => ItemData::Bool(index.select(a).to_owned()),
        })
    }

    fn get_item_shape(&self, path: &str) -> Result<Option<Vec<usize>>> {
        Ok(self.items.get(path).map(|i| i.shape().to_vec()))
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(self.items.len());
        let mut payload = Vec::new();
        for (path, data) in &self.items {
            let bytes = encode_item(data);
            entries.push(PackedEntry {
                path: path.clone(),
                dtype: data.item_type().as_str().to_string(),
                shape: data.shape().to_vec(),
                offset: payload.len() as u64,
                len: bytes.len() as u64,
            });
            payload.extend_from_slice(&bytes);
        }
        let header = serde_json::to_vec(&PackedHeader {
            endian: native_endian().to_string(),
            items: entries,
        })?;

        let mut file = fs::File::create(&self.path)?;
        file.write_all(MAGIC)?;
        file.write_all(&(header.len() as u64).to_le_bytes())?;
        file.write_all(&header)?;
        file.write_all(&payload)?;
        file.flush()?;

        info!(
            path = %self.path.display(),
            items = self.items.len(),
            bytes = payload.len(),
            "Wrote packed grid"
        );
        self.dirty = false;
        Ok(())
    }

    fn supports_random_access(&self) -> bool {
        false
    }

    fn format(&self) -> StorageFormat {
        StorageFormat::Packed
    }
}
