//! Global terrain options and the default import settings for new tiles.

use bevy::prelude::*;

use crate::core::constants::terrain::*;

/// Settings shared by every tile, mostly consumed when computing derived data.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct TerrainGlobalOptions {
    /// Largest vertical error, in world units, a decimated batch may introduce
    pub max_pixel_error: f32,
    /// Distance beyond which the baked composite colours are all that remains of lighting
    pub composite_map_distance: f32,
    pub light_map_direction: Vec3,
    pub composite_map_ambient: LinearRgba,
    pub composite_map_diffuse: LinearRgba,
}

impl Default for TerrainGlobalOptions {
    fn default() -> Self {
        Self {
            max_pixel_error: MAX_PIXEL_ERROR,
            composite_map_distance: COMPOSITE_MAP_DISTANCE,
            light_map_direction: Vec3::NEG_Y,
            composite_map_ambient: LinearRgba::rgb(0.5, 0.5, 0.5),
            composite_map_diffuse: LinearRgba::WHITE,
        }
    }
}

/// One texture layer: how large a texture repeat is in the world, which textures
/// it uses, and the tint baked into the composite colours.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSettings {
    pub world_size: f32,
    /// Diffuse/specular first, normal/height second
    pub texture_names: Vec<String>,
    pub tint: LinearRgba,
}

impl LayerSettings {
    pub fn new(world_size: f32, diffuse: &str, normal: &str, tint: LinearRgba) -> Self {
        Self {
            world_size,
            texture_names: vec![diffuse.to_string(), normal.to_string()],
            tint,
        }
    }

    pub fn diffuse_texture(&self) -> Option<&str> {
        self.texture_names.first().map(String::as_str)
    }

    pub fn normal_height_texture(&self) -> Option<&str> {
        self.texture_names.get(1).map(String::as_str)
    }
}

/// Parameters for tiles built from a heightmap image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub terrain_size: u16,
    pub world_size: f32,
    pub input_scale: f32,
    pub min_batch_size: u16,
    pub max_batch_size: u16,
    pub blend_map_size: u16,
    pub layers: Vec<LayerSettings>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            terrain_size: TILE_SIZE,
            world_size: WORLD_SIZE,
            input_scale: INPUT_SCALE,
            min_batch_size: MIN_BATCH_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            blend_map_size: BLEND_MAP_SIZE,
            layers: Vec::new(),
        }
    }
}

/// Sets up global options from the scene light and the three rock/grass/fungus layers.
pub fn configure_terrain_defaults(
    light_direction: Vec3,
    light_diffuse: Color,
    ambient: Color,
) -> (TerrainGlobalOptions, ImportSettings) {
    let globals = TerrainGlobalOptions {
        max_pixel_error: MAX_PIXEL_ERROR,
        composite_map_distance: COMPOSITE_MAP_DISTANCE,
        light_map_direction: light_direction.normalize_or(Vec3::NEG_Y),
        composite_map_ambient: ambient.to_linear(),
        composite_map_diffuse: light_diffuse.to_linear(),
    };

    let import = ImportSettings {
        layers: vec![
            LayerSettings::new(
                100.0,
                "dirt_grayrocky_diffusespecular.dds",
                "dirt_grayrocky_normalheight.dds",
                LinearRgba::rgb(0.42, 0.40, 0.38),
            ),
            LayerSettings::new(
                30.0,
                "grass_green-01_diffusespecular.dds",
                "grass_green-01_normalheight.dds",
                LinearRgba::rgb(0.22, 0.42, 0.15),
            ),
            LayerSettings::new(
                200.0,
                "growth_weirdfungus-03_diffusespecular.dds",
                "growth_weirdfungus-03_normalheight.dds",
                LinearRgba::rgb(0.45, 0.30, 0.50),
            ),
        ],
        ..default()
    };

    (globals, import)
}
