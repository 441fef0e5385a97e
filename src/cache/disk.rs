//! Filesystem tile cache.
//!
//! Tiles are stored one file each at `<root>/<code>/<z>/<x>/<y>.tile`.
//! Writes go to a temporary file in the target directory and are renamed
//! into place, so readers never observe a partially written tile.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::TileStore;
use crate::error::CacheError;
use crate::tile::{is_valid_code, TileCoordinate};

/// Subdirectory of the application cache directory holding downloaded tiles.
pub const ONLINE_CACHE_DIR: &str = "online";

/// Extension of stored tile files.
pub const TILE_EXTENSION: &str = "tile";

/// Tile cache backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct DiskTileCache {
    root: PathBuf,
}

impl DiskTileCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    ///
    /// An existing directory is reused as is.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        match fs::create_dir_all(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && root.is_dir() => {}
            Err(e) => return Err(e.into()),
        }
        info!(root = %root.display(), "Disk tile cache ready");
        Ok(Self { root })
    }

    /// Open the cache in the `online` subdirectory of an application cache
    /// directory.
    pub fn in_cache_dir(cache_dir: &Path) -> Result<Self, CacheError> {
        Self::open(cache_dir.join(ONLINE_CACHE_DIR))
    }

    /// Cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding a tile.
    pub fn tile_path(&self, source: &str, coordinate: &TileCoordinate) -> Result<PathBuf, CacheError> {
        if !is_valid_code(source) {
            return Err(CacheError::InvalidKey(format!("source code {:?}", source)));
        }
        if coordinate.zoom < 0 || coordinate.x < 0 || coordinate.y < 0 {
            return Err(CacheError::InvalidKey(format!("coordinate {}", coordinate)));
        }

        Ok(self
            .root
            .join(source)
            .join(coordinate.zoom.to_string())
            .join(coordinate.x.to_string())
            .join(format!("{}.{}", coordinate.y, TILE_EXTENSION)))
    }
}

impl TileStore for DiskTileCache {
    fn read(&self, source: &str, coordinate: &TileCoordinate) -> Result<Option<Bytes>, CacheError> {
        let path = self.tile_path(source, coordinate)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, source: &str, coordinate: &TileCoordinate, data: &[u8]) -> Result<(), CacheError> {
        let path = self.tile_path(source, coordinate)?;
        let dir = path
            .parent()
            .ok_or_else(|| CacheError::InvalidKey(path.display().to_string()))?;
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(data)?;
        file.persist(&path).map_err(|e| CacheError::Io(e.error))?;

        debug!(source, tile = %coordinate, bytes = data.len(), "Tile cached on disk");
        Ok(())
    }
}
