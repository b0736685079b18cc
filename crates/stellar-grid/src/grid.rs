//! Grid base: ordered axis registry and persistence plumbing.

use indexmap::IndexMap;
use ndarray::ArrayD;
use tracing::debug;

use crate::axis::GridAxis;
use crate::error::{GridError, Result};
use crate::index::GridSlice;
use crate::storage::{GridStorage, ItemData, ItemType, ItemView};

/// Root of every item path inside a grid file.
pub const GRID_ROOT: &str = "/grid";

/// Axis registry plus an optional storage handle.
///
/// Axes iterate in declaration order; index tuples and array dimensions
/// follow that order.
#[derive(Default)]
pub struct Grid {
    axes: IndexMap<String, GridAxis>,
    storage: Option<Box<dyn GridStorage>>,
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("axes", &self.axes.keys().collect::<Vec<_>>())
            .field("storage", &self.storage.as_ref().map(|s| s.format()))
            .finish()
    }
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grid over existing axes.
    pub fn with_axes(axes: IndexMap<String, GridAxis>) -> Self {
        Self {
            axes,
            storage: None,
        }
    }

    /// Declare a new axis. Axis names must be unique.
    pub fn add_axis(&mut self, axis: GridAxis) -> Result<()> {
        if self.axes.contains_key(axis.name()) {
            return Err(GridError::config(format!("axis {} declared twice", axis.name())));
        }
        self.axes.insert(axis.name().to_string(), axis);
        Ok(())
    }

    pub fn axes(&self) -> &IndexMap<String, GridAxis> {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Result<&GridAxis> {
        self.axes
            .get(name)
            .ok_or_else(|| GridError::UnknownAxis(name.to_string()))
    }

    /// Position of an axis in declaration order.
    pub fn axis_position(&self, name: &str) -> Result<usize> {
        self.axes
            .get_index_of(name)
            .ok_or_else(|| GridError::UnknownAxis(name.to_string()))
    }

    pub fn rank(&self) -> usize {
        self.axes.len()
    }

    /// Axes with their positions; `squeeze` skips single-valued axes.
    pub fn enumerate_axes(&self, squeeze: bool) -> impl Iterator<Item = (usize, &GridAxis)> {
        self.axes
            .values()
            .enumerate()
            .filter(move |(_, a)| !squeeze || a.len() > 1)
    }

    /// Grid shape, optionally restricted to a slice and squeezed.
    pub fn get_shape(&self, slice: Option<&GridSlice>, squeeze: bool) -> Vec<usize> {
        self.axes
            .values()
            .enumerate()
            .map(|(i, a)| match slice {
                Some(s) => s.ranges()[i].len(),
                None => a.len(),
            })
            .filter(|&n| !squeeze || n > 1)
            .collect()
    }

    /// Build the exact value lookup of every axis.
    pub fn build_axis_indexes(&mut self) -> Result<()> {
        for axis in self.axes.values_mut() {
            axis.build_index()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------------

    pub fn attach_storage(&mut self, storage: Box<dyn GridStorage>) {
        self.storage = Some(storage);
    }

    pub fn detach_storage(&mut self) -> Option<Box<dyn GridStorage>> {
        self.storage.take()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn storage(&self) -> Result<&dyn GridStorage> {
        self.storage
            .as_deref()
            .ok_or_else(|| GridError::storage_error("grid has no storage attached"))
    }

    pub fn storage_mut(&mut self) -> Result<&mut (dyn GridStorage + 'static)> {
        self.storage
            .as_deref_mut()
            .ok_or_else(|| GridError::storage_error("grid has no storage attached"))
    }

    pub fn axis_path(name: &str) -> String {
        format!("{}/axes/{}", GRID_ROOT, name)
    }

    pub fn array_path(name: &str, item: &str) -> String {
        format!("{}/arrays/{}/{}", GRID_ROOT, name, item)
    }

    /// Write every axis' values.
    pub fn save_axes(&mut self) -> Result<()> {
        let arrays: Vec<(String, ArrayD<f64>)> = self
            .axes
            .values()
            .map(|a| (Self::axis_path(a.name()), a.to_array().into_dyn()))
            .collect();
        let storage = self.storage_mut()?;
        for (path, values) in &arrays {
            storage.save_item(path, ItemView::Float64(values.view()), None)?;
        }
        debug!(count = arrays.len(), "Saved grid axes");
        Ok(())
    }

    /// Replace declared axes by their stored values, where stored.
    pub fn load_axes(&mut self) -> Result<()> {
        let mut loaded = Vec::new();
        {
            let storage = self.storage()?;
            for name in self.axes.keys() {
                let path = Self::axis_path(name);
                if storage.has_item(&path) {
                    let values = match storage.load_item(&path, ItemType::Float64, None)? {
                        ItemData::Float64(a) => a.iter().copied().collect::<Vec<f64>>(),
                        ItemData::Bool(_) => {
                            return Err(GridError::invalid_metadata(format!("axis {} is not numeric", name)))
                        }
                    };
                    loaded.push((name.clone(), values));
                }
            }
        }
        for (name, values) in loaded {
            debug!(axis = %name, len = values.len(), "Loaded grid axis");
            self.axes.insert(name.clone(), GridAxis::new(name, values));
        }
        self.build_axis_indexes()
    }
}

/// Grids that can be written to and read back from their attached storage.
pub trait PersistentGrid {
    fn grid(&self) -> &Grid;

    fn grid_mut(&mut self) -> &mut Grid;

    /// Write all grid items.
    fn save_items(&mut self) -> Result<()>;

    /// Read all grid items.
    fn load_items(&mut self) -> Result<()>;

    /// Write all grid items and flush the storage.
    fn save(&mut self) -> Result<()> {
        self.save_items()?;
        self.grid_mut().storage_mut()?.flush()
    }

    fn load(&mut self) -> Result<()> {
        self.load_items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridStoreConfig;
    use crate::storage::create_storage;

    fn sample() -> Grid {
        let mut grid = Grid::new();
        grid.add_axis(GridAxis::new("Fe_H", vec![0.0])).unwrap();
        grid.add_axis(GridAxis::new("T_eff", vec![3500.0, 4000.0, 4500.0])).unwrap();
        grid.add_axis(GridAxis::new("log_g", vec![4.0, 4.5])).unwrap();
        grid
    }

    #[test]
    fn test_duplicate_axis() {
        let mut grid = sample();
        assert!(matches!(
            grid.add_axis(GridAxis::new("T_eff", vec![1.0])),
            Err(GridError::ConfigError(_))
        ));
    }

    #[test]
    fn test_shape_and_squeeze() {
        let grid = sample();
        assert_eq!(grid.get_shape(None, false), vec![1, 3, 2]);
        assert_eq!(grid.get_shape(None, true), vec![3, 2]);

        let slice = GridSlice(vec![0..1, 1..2, 0..2]);
        assert_eq!(grid.get_shape(Some(&slice), false), vec![1, 1, 2]);
        assert_eq!(grid.get_shape(Some(&slice), true), vec![2]);

        let free: Vec<usize> = grid.enumerate_axes(true).map(|(i, _)| i).collect();
        assert_eq!(free, vec![1, 2]);
    }

    #[test]
    fn test_unknown_axis() {
        let grid = sample();
        assert!(matches!(grid.axis("M_H"), Err(GridError::UnknownAxis(_))));
        assert_eq!(grid.axis_position("log_g").unwrap(), 2);
    }

    #[test]
    fn test_paths() {
        assert_eq!(Grid::axis_path("T_eff"), "/grid/axes/T_eff");
        assert_eq!(Grid::array_path("flux", "index"), "/grid/arrays/flux/index");
    }

    #[test]
    fn test_axes_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = GridStoreConfig::default();

        let mut grid = sample();
        grid.attach_storage(create_storage(dir.path().join("grid"), &config).unwrap());
        grid.save_axes().unwrap();

        let mut other = Grid::new();
        other.add_axis(GridAxis::new("T_eff", vec![0.0])).unwrap();
        other.attach_storage(grid.detach_storage().unwrap());
        other.load_axes().unwrap();
        assert_eq!(other.axis("T_eff").unwrap().values(), &[3500.0, 4000.0, 4500.0]);
        assert!(other.axis("T_eff").unwrap().has_index());
    }
}
