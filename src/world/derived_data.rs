//! Derived data: normals, light map and composite colours, computed off the main
//! thread whenever a tile's heights or blend maps change.

use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task};
use futures::executor::block_on;
use hashbrown::HashMap;

use crate::world::blend_map::BlendMap;
use crate::world::terrain_defaults::TerrainGlobalOptions;
use crate::world::terrain_group::TerrainGroup;
use crate::world::tile::{Heightmap, Terrain, TileCoord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivedState {
    #[default]
    Dirty,
    Computing,
    Ready,
}

/// Per-vertex results, laid out like the heightmap.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedData {
    pub normals: Vec<Vec3>,
    pub light_map: Vec<f32>,
    pub composite: Vec<[f32; 4]>,
}

/// Snapshot of everything the computation reads, so it can leave the main world.
#[derive(Debug, Clone)]
pub struct DerivedInput {
    pub heightmap: Heightmap,
    pub world_size: f32,
    pub blend_maps: Vec<BlendMap>,
    pub layer_tints: Vec<LinearRgba>,
    pub light_direction: Vec3,
    pub ambient: LinearRgba,
    pub diffuse: LinearRgba,
}

impl DerivedInput {
    pub fn from_terrain(terrain: &Terrain, globals: &TerrainGlobalOptions) -> Self {
        Self {
            heightmap: terrain.heightmap.clone(),
            world_size: terrain.world_size,
            blend_maps: terrain.blend_maps.clone(),
            layer_tints: terrain.layers.iter().map(|layer| layer.tint).collect(),
            light_direction: globals.light_map_direction,
            ambient: globals.composite_map_ambient,
            diffuse: globals.composite_map_diffuse,
        }
    }
}

pub fn compute_derived_data(input: &DerivedInput) -> DerivedData {
    let size = input.heightmap.size() as usize;
    let last = (size - 1) as f32;
    let step = input.world_size / last;
    let to_light = -input.light_direction.normalize_or(Vec3::NEG_Y);
    let base_tint = input
        .layer_tints
        .first()
        .copied()
        .unwrap_or(LinearRgba::WHITE);

    let mut normals = Vec::with_capacity(size * size);
    let mut light_map = Vec::with_capacity(size * size);
    let mut composite = Vec::with_capacity(size * size);

    for y in 0..size {
        for x in 0..size {
            let h = |dx: isize, dy: isize| {
                let sx = (x as isize + dx).clamp(0, size as isize - 1) as usize;
                let sy = (y as isize + dy).clamp(0, size as isize - 1) as usize;
                input.heightmap.get(sx, sy)
            };

            // Terrain y runs along world -Z
            let slope_x = (h(1, 0) - h(-1, 0)) / (2.0 * step);
            let slope_y = (h(0, 1) - h(0, -1)) / (2.0 * step);
            let normal = Vec3::new(-slope_x, 1.0, slope_y).normalize();

            let light = normal.dot(to_light).max(0.0);

            let tx = x as f32 / last;
            let ty = y as f32 / last;
            let mut color = base_tint;
            for (map, tint) in input.blend_maps.iter().zip(input.layer_tints.iter().skip(1)) {
                let weight = map.weight_at_terrain_position(tx, ty);
                color = color * (1.0 - weight) + *tint * weight;
            }

            let lit = |channel: f32, ambient: f32, diffuse: f32| {
                (channel * (ambient + diffuse * light)).clamp(0.0, 1.0)
            };

            normals.push(normal);
            light_map.push(light);
            composite.push([
                lit(color.red, input.ambient.red, input.diffuse.red),
                lit(color.green, input.ambient.green, input.diffuse.green),
                lit(color.blue, input.ambient.blue, input.diffuse.blue),
                1.0,
            ]);
        }
    }

    DerivedData {
        normals,
        light_map,
        composite,
    }
}

/// In-flight derived data computations, one per tile at most.
#[derive(Resource, Default)]
pub struct DerivedDataTasks {
    pub tasks: HashMap<TileCoord, Task<DerivedData>>,
}

/// Spawns a computation for every tile whose derived data is stale.
pub fn start_derived_data_tasks(
    group: Option<ResMut<TerrainGroup>>,
    globals: Option<Res<TerrainGlobalOptions>>,
    mut tasks: ResMut<DerivedDataTasks>,
) {
    let (Some(mut group), Some(globals)) = (group, globals) else {
        return;
    };

    for terrain in group.terrains_mut() {
        if terrain.derived_state != DerivedState::Dirty || tasks.tasks.contains_key(&terrain.coord) {
            continue;
        }

        let input = DerivedInput::from_terrain(terrain, &globals);
        let task = AsyncComputeTaskPool::get().spawn(async move { compute_derived_data(&input) });
        tasks.tasks.insert(terrain.coord, task);
        terrain.derived_state = DerivedState::Computing;
        debug!("Started derived data update for tile {}", terrain.coord);
    }
}

/// Hands finished computations back to their tiles.
pub fn collect_derived_data(
    group: Option<ResMut<TerrainGroup>>,
    mut tasks: ResMut<DerivedDataTasks>,
) {
    let Some(mut group) = group else {
        return;
    };

    tasks.tasks.retain(|coord, task| {
        if !task.is_finished() {
            return true;
        }

        let data = block_on(task);
        match group.terrain_mut(*coord) {
            Some(terrain) => {
                terrain.apply_derived_data(data);
                info!("Derived data ready for tile {}", coord);
            }
            None => warn!("Dropping derived data for unloaded tile {}", coord),
        }
        false
    });
}
