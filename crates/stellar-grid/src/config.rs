//! Runtime configuration for grid storage.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GridError;

/// Configuration shared by every grid opened or created by a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridStoreConfig {
    /// Whether value arrays are held in memory or read from storage on access.
    pub storage_mode: StorageMode,

    /// On-disk format of the grid file.
    pub storage_format: StorageFormat,

    /// Compression codec for Zarr value arrays.
    pub zarr_compression: ZarrCompression,

    /// Compression level (1-9).
    pub zarr_compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub zarr_shuffle: bool,

    /// Name of the value array whose index drives grid builders.
    pub default_value_name: String,
}

impl Default for GridStoreConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::Eager,
            storage_format: StorageFormat::Zarr,
            zarr_compression: ZarrCompression::None,
            zarr_compression_level: 1,
            zarr_shuffle: true,
            default_value_name: "flux".to_string(),
        }
    }
}

impl GridStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GRID_STORAGE_MODE") {
            match val.parse::<StorageMode>() {
                Ok(v) => config.storage_mode = v,
                Err(e) => warn!(var = "GRID_STORAGE_MODE", error = %e, "Ignoring invalid setting"),
            }
        }

        if let Ok(val) = std::env::var("GRID_STORAGE_FORMAT") {
            match val.parse::<StorageFormat>() {
                Ok(v) => config.storage_format = v,
                Err(e) => warn!(var = "GRID_STORAGE_FORMAT", error = %e, "Ignoring invalid setting"),
            }
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            match val.parse::<ZarrCompression>() {
                Ok(v) => config.zarr_compression = v,
                Err(e) => warn!(var = "ZARR_COMPRESSION", error = %e, "Ignoring invalid setting"),
            }
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.zarr_compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            config.zarr_shuffle = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("GRID_VALUE_NAME") {
            if !val.is_empty() {
                config.default_value_name = val;
            }
        }

        config
    }

    /// Validate the configuration.
    ///
    /// Lazy loading needs a format with chunked random access, so the
    /// combination of lazy mode and the packed format is rejected here
    /// before any file is touched.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage_mode == StorageMode::Lazy && !self.storage_format.supports_random_access() {
            return Err(format!(
                "lazy storage mode requires a chunked format, got {}",
                self.storage_format
            ));
        }

        if self.zarr_compression_level == 0 || self.zarr_compression_level > 9 {
            return Err("zarr_compression_level must be 1-9".to_string());
        }

        if self.default_value_name.is_empty() {
            return Err("default_value_name must not be empty".to_string());
        }

        Ok(())
    }
}

/// How value arrays of a grid are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// All value arrays are resident in memory.
    #[default]
    Eager,
    /// Every access reads or writes a region of the backing storage.
    Lazy,
}

impl FromStr for StorageMode {
    type Err = GridError;

    /// Parse from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            _ => Err(GridError::config(format!("unknown storage mode: {}", s))),
        }
    }
}

impl StorageMode {
    /// Whether value arrays are held in memory.
    pub fn is_eager(&self) -> bool {
        matches!(self, Self::Eager)
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eager => write!(f, "eager"),
            Self::Lazy => write!(f, "lazy"),
        }
    }
}

/// On-disk format of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Zarr V3 hierarchy with one chunked array per item.
    #[default]
    Zarr,
    /// Single file holding every item, read and written as a whole.
    Packed,
}

impl FromStr for StorageFormat {
    type Err = GridError;

    /// Parse from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zarr" => Ok(Self::Zarr),
            "packed" | "pack" => Ok(Self::Packed),
            _ => Err(GridError::config(format!("unknown storage format: {}", s))),
        }
    }
}

impl StorageFormat {
    /// Get the format name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zarr => "zarr",
            Self::Packed => "packed",
        }
    }

    /// Whether regions of an item can be read and written without touching
    /// the rest of the file.
    pub fn supports_random_access(&self) -> bool {
        matches!(self, Self::Zarr)
    }
}

impl std::fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZarrCompression {
    /// No compression.
    #[default]
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    BloscZstd,
}

impl FromStr for ZarrCompression {
    type Err = GridError;

    /// Parse from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" | "blosc_lz4" => Ok(Self::BloscLz4),
            "zstd" | "blosc_zstd" => Ok(Self::BloscZstd),
            _ => Err(GridError::config(format!("unknown zarr compression: {}", s))),
        }
    }
}

impl ZarrCompression {
    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridStoreConfig::default();
        assert_eq!(config.storage_mode, StorageMode::Eager);
        assert_eq!(config.storage_format, StorageFormat::Zarr);
        assert_eq!(config.zarr_compression, ZarrCompression::None);
        assert_eq!(config.default_value_name, "flux");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lazy_packed_rejected() {
        let config = GridStoreConfig {
            storage_mode: StorageMode::Lazy,
            storage_format: StorageFormat::Packed,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GridStoreConfig {
            storage_mode: StorageMode::Lazy,
            storage_format: StorageFormat::Zarr,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compression_level_validation() {
        let mut config = GridStoreConfig::default();
        config.zarr_compression_level = 0;
        assert!(config.validate().is_err());

        config.zarr_compression_level = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("LAZY".parse::<StorageMode>().unwrap(), StorageMode::Lazy);
        assert_eq!("eager".parse::<StorageMode>().unwrap(), StorageMode::Eager);
        assert_eq!("packed".parse::<StorageFormat>().unwrap(), StorageFormat::Packed);
        assert_eq!("zarr".parse::<StorageFormat>().unwrap(), StorageFormat::Zarr);
        assert_eq!("zstd".parse::<ZarrCompression>().unwrap(), ZarrCompression::BloscZstd);
        assert_eq!("BLOSC_LZ4".parse::<ZarrCompression>().unwrap(), ZarrCompression::BloscLz4);
        assert_eq!("none".parse::<ZarrCompression>().unwrap(), ZarrCompression::None);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!(matches!("lasy".parse::<StorageMode>(), Err(GridError::ConfigError(_))));
        assert!(matches!("hdf5".parse::<StorageFormat>(), Err(GridError::ConfigError(_))));
        assert!(matches!("gzip".parse::<ZarrCompression>(), Err(GridError::ConfigError(_))));
    }
}
