//! World modules: terrain tiles, their persistence and rendering, and scene setup
pub mod blend_map;
pub mod derived_data;
pub mod heightmap;
pub mod scene;
pub mod terrain_defaults;
pub mod terrain_group;
pub mod terrain_material;
pub mod terrain_mesh;
pub mod tile;
pub mod tile_store;

use bevy::prelude::*;

use crate::core::game::GameSet;
use derived_data::{collect_derived_data, start_derived_data_tasks, DerivedDataTasks};
use terrain_material::TerrainSplatMaterial;
use terrain_mesh::{sync_terrain_batches, update_batch_materials};

pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(MaterialPlugin::<TerrainSplatMaterial>::default())
            .init_resource::<DerivedDataTasks>()
            .add_systems(Startup, (scene::setup_scene, scene::build_terrain).chain())
            .add_systems(
                Update,
                (
                    start_derived_data_tasks,
                    collect_derived_data,
                    sync_terrain_batches,
                    update_batch_materials,
                )
                    .chain()
                    .in_set(GameSet::Terrain),
            )
            .add_systems(Last, scene::teardown_terrain);
    }
}
