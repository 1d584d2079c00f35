//! Persistence of loaded tiles so later runs can skip the heightmap import.

use std::path::PathBuf;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::{Arc, RwLock};

use bevy::prelude::*;
#[cfg(test)]
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, TerrainError};
use crate::world::tile::TileCoord;

/// Bumped whenever [`TileFile`] changes shape.
pub const TILE_FILE_VERSION: u16 = 1;

/// Deterministic `<prefix>_<packed index as 8 hex digits>.<extension>` names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameConvention {
    pub prefix: String,
    pub extension: String,
}

impl FilenameConvention {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn generate_filename(&self, coord: TileCoord) -> String {
        format!("{}_{:08x}.{}", self.prefix, coord.packed(), self.extension)
    }
}

/// On-disk tile contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileFile {
    pub version: u16,
    pub coord: TileCoord,
    pub size: u16,
    pub world_size: f32,
    pub heights: Vec<f32>,
    pub blend_map_size: u16,
    /// One weight buffer per layer above the base layer
    pub blend_maps: Vec<Vec<f32>>,
}

impl TileFile {
    pub fn encode(&self, name: &str) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|source| TerrainError::TileCodec {
            name: name.to_string(),
            source,
        })
    }

    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        let file: TileFile =
            bincode::deserialize(bytes).map_err(|source| TerrainError::TileCodec {
                name: name.to_string(),
                source,
            })?;

        if file.version != TILE_FILE_VERSION {
            return Err(TerrainError::TileMismatch {
                name: name.to_string(),
                reason: format!(
                    "version {} (expected {})",
                    file.version, TILE_FILE_VERSION
                ),
            });
        }
        Ok(file)
    }
}

/// Where tile files live. Injected into the terrain group so tests can swap it out.
pub trait TileStore: Send + Sync + 'static {
    fn exists(&self, name: &str) -> bool;
    fn read(&self, name: &str) -> Result<Vec<u8>>;
    fn write(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Tile files in a directory on disk.
#[derive(Debug, Clone)]
pub struct FsTileStore {
    pub dir: PathBuf,
}

impl FsTileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TileStore for FsTileStore {
    fn exists(&self, name: &str) -> bool {
        self.dir.join(name).is_file()
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        std::fs::read(&path).map_err(|source| TerrainError::TileIo { path, source })
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| TerrainError::TileIo {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(name);
        std::fs::write(&path, bytes).map_err(|source| TerrainError::TileIo { path, source })?;
        info!("Saved terrain tile {:?}", self.dir.join(name));
        Ok(())
    }
}

/// In-memory store for tests; clones share the same files.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryTileStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

#[cfg(test)]
impl MemoryTileStore {
    pub fn names(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
impl TileStore for MemoryTileStore {
    fn exists(&self, name: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(name))
            .unwrap_or(false)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(name).cloned())
            .ok_or_else(|| TerrainError::TileMissing(name.to_string()))
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        if let Ok(mut files) = self.files.write() {
            files.insert(name.to_string(), bytes.to_vec());
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
