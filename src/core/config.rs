//! Runtime configuration.
//!
//! Defaults come from [`crate::core::constants`]; a TOML file can override any field.
//! The file is named by `TERRAIN_DEMO_CONFIG`, falling back to `terrain_demo.toml`
//! in the working directory when that exists.

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::constants;
use crate::core::error::{Result, TerrainError};

pub const CONFIG_ENV_VAR: &str = "TERRAIN_DEMO_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "terrain_demo.toml";

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Directory that heightmaps, textures and models are resolved against
    pub asset_root: PathBuf,
    pub heightmap_name: String,
    pub tile_cache_dir: PathBuf,
    pub filename_prefix: String,
    pub filename_extension: String,
    pub camera_height_offset: f32,
    pub rotate_speed: f32,
    pub move_speed: f32,
    pub log_filter: Option<String>,
    /// Folded stack output for tracing-flame, only honoured with the `logging` feature
    pub flame_trace: Option<PathBuf>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            heightmap_name: constants::terrain::HEIGHTMAP_NAME.to_string(),
            tile_cache_dir: PathBuf::from(constants::terrain::TILE_CACHE_DIR),
            filename_prefix: constants::terrain::FILENAME_PREFIX.to_string(),
            filename_extension: constants::terrain::FILENAME_EXTENSION.to_string(),
            camera_height_offset: constants::camera::MIN_HEIGHT_ABOVE_TERRAIN,
            rotate_speed: constants::camera::ROTATE_SPEED,
            move_speed: constants::camera::MOVE_SPEED,
            log_filter: None,
            flame_trace: None,
        }
    }
}

impl DemoConfig {
    pub fn from_toml_str(source: &str, path: &Path) -> Result<Self> {
        toml::from_str(source).map_err(|source| TerrainError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| TerrainError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source, path)
    }

    /// Reads the config named by the environment, or the defaults when there is none.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn log_filter(&self) -> String {
        self.log_filter
            .clone()
            .unwrap_or_else(|| env!("TERRAIN_DEMO_DEFAULT_LOG").to_string())
    }
}
