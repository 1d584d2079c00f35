//! Turns tiles into rendered batches once their derived data is ready.

use bevy::prelude::*;
use bevy::render::mesh::{Indices, MeshAabb, PrimitiveTopology};
use bevy::render::render_asset::RenderAssetUsages;

use crate::core::components::{MainCamera, TerrainBatch};
use crate::world::derived_data::DerivedData;
use crate::world::terrain_defaults::{ImportSettings, TerrainGlobalOptions};
use crate::world::terrain_group::TerrainGroup;
use crate::world::terrain_material::{TerrainMaterials, TerrainSplatMaterial};
use crate::world::tile::{Heightmap, Terrain};

/// How a tile is cut into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLayout {
    /// Heightmap cells along one side of a batch
    pub span: usize,
    pub batches_per_side: usize,
    /// Vertex stride used when a batch is decimated down to the minimum batch size
    pub coarse_step: usize,
}

impl BatchLayout {
    pub fn new(tile_size: u16, min_batch_size: u16, max_batch_size: u16) -> Self {
        let cells = (tile_size as usize).saturating_sub(1).max(1);
        let mut span = (max_batch_size as usize).saturating_sub(1).clamp(1, cells);
        if cells % span != 0 {
            span = cells;
        }

        let coarse_cells = (min_batch_size as usize).saturating_sub(1).max(1);
        let coarse_step = if coarse_cells < span && span % coarse_cells == 0 {
            span / coarse_cells
        } else {
            1
        };

        Self {
            span,
            batches_per_side: cells / span,
            coarse_step,
        }
    }

    pub fn from_settings(settings: &ImportSettings) -> Self {
        Self::new(settings.terrain_size, settings.min_batch_size, settings.max_batch_size)
    }
}

/// Largest height difference between the full-resolution batch and its decimated form.
pub fn decimation_error(heightmap: &Heightmap, origin: (usize, usize), span: usize, step: usize) -> f32 {
    if step <= 1 {
        return 0.0;
    }

    let (x0, y0) = origin;
    let mut worst = 0.0f32;
    for y in 0..=span {
        for x in 0..=span {
            let cx = (x / step) * step;
            let cy = (y / step) * step;
            let nx = (cx + step).min(span);
            let ny = (cy + step).min(span);
            let ax = if nx > cx { (x - cx) as f32 / (nx - cx) as f32 } else { 0.0 };
            let ay = if ny > cy { (y - cy) as f32 / (ny - cy) as f32 } else { 0.0 };

            let h = |px: usize, py: usize| heightmap.get(x0 + px, y0 + py);
            let low = h(cx, cy) + (h(nx, cy) - h(cx, cy)) * ax;
            let high = h(cx, ny) + (h(nx, ny) - h(cx, ny)) * ax;
            let approx = low + (high - low) * ay;

            worst = worst.max((approx - h(x, y)).abs());
        }
    }
    worst
}

/// Builds the mesh of one batch; `step` is 1 for full resolution. UVs address the
/// tile's blend map, layer textures are tiled from world position in the shader.
pub fn build_batch_mesh(terrain: &Terrain, data: &DerivedData, origin: (usize, usize), span: usize, step: usize) -> Mesh {
    let size = terrain.size() as usize;
    let last = (size - 1) as f32;
    let (x0, y0) = origin;
    let step = step.max(1);
    let verts_per_side = span / step + 1;

    let mut positions = Vec::with_capacity(verts_per_side * verts_per_side);
    let mut normals = Vec::with_capacity(verts_per_side * verts_per_side);
    let mut colors = Vec::with_capacity(verts_per_side * verts_per_side);
    let mut uvs = Vec::with_capacity(verts_per_side * verts_per_side);

    for row in 0..verts_per_side {
        for col in 0..verts_per_side {
            let x = (x0 + col * step).min(size - 1);
            let y = (y0 + row * step).min(size - 1);
            let index = y * size + x;

            let world = terrain.terrain_to_world(x as f32 / last, y as f32 / last);
            let height = terrain.position.y + terrain.heightmap.get(x, y);
            positions.push([world.x, height, world.y]);

            let normal = data.normals.get(index).copied().unwrap_or(Vec3::Y);
            normals.push(normal.to_array());
            colors.push(data.composite.get(index).copied().unwrap_or([1.0; 4]));
            uvs.push([x as f32 / last, 1.0 - y as f32 / last]);
        }
    }

    // Rows advance along world -Z, so (i, i + 1, i + n) winds counter-clockwise seen from above
    let n = verts_per_side as u32;
    let mut indices = Vec::with_capacity((verts_per_side - 1).pow(2) * 6);
    for row in 0..n - 1 {
        for col in 0..n - 1 {
            let i = row * n + col;
            indices.extend_from_slice(&[i, i + 1, i + n, i + 1, i + n + 1, i + n]);
        }
    }

    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}

/// Rebuilds the batches of every tile whose derived data changed.
pub fn sync_terrain_batches(
    mut commands: Commands,
    group: Option<ResMut<TerrainGroup>>,
    globals: Option<Res<TerrainGlobalOptions>>,
    materials: Option<ResMut<TerrainMaterials>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut images: ResMut<Assets<Image>>,
    mut splat_materials: ResMut<Assets<TerrainSplatMaterial>>,
) {
    let (Some(mut group), Some(globals), Some(mut materials)) = (group, globals, materials) else {
        return;
    };

    let layout = BatchLayout::from_settings(group.default_import_settings());
    for terrain in group.terrains_mut() {
        if !terrain.meshes_stale {
            continue;
        }
        let Some(data) = terrain.derived_data.as_ref() else {
            continue;
        };

        let mut built = Vec::with_capacity(layout.batches_per_side * layout.batches_per_side);
        let mut decimated = 0;
        for by in 0..layout.batches_per_side {
            for bx in 0..layout.batches_per_side {
                let origin = (bx * layout.span, by * layout.span);
                let step = if decimation_error(&terrain.heightmap, origin, layout.span, layout.coarse_step)
                    < globals.max_pixel_error
                {
                    layout.coarse_step
                } else {
                    1
                };
                if step > 1 {
                    decimated += 1;
                }

                let mesh = build_batch_mesh(terrain, data, origin, layout.span, step);
                let center = mesh
                    .compute_aabb()
                    .map_or(terrain.position, |aabb| Vec3::from(aabb.center));
                built.push((bx, by, center, mesh));
            }
        }

        let detail = materials.refresh_tile(terrain, &mut images, &mut splat_materials);

        if terrain.batches.len() == built.len() {
            for ((_, handle), (_, _, _, mesh)) in terrain.batches.iter().zip(built) {
                if let Some(existing) = meshes.get_mut(handle) {
                    *existing = mesh;
                }
            }
        } else {
            for (entity, _) in terrain.batches.drain(..) {
                commands.entity(entity).despawn_recursive();
            }
            for (bx, by, center, mesh) in built {
                let handle = meshes.add(mesh);
                let entity = commands
                    .spawn((
                        Mesh3d(handle.clone()),
                        MeshMaterial3d(detail.clone()),
                        Transform::IDENTITY,
                        TerrainBatch {
                            tile: terrain.coord,
                            batch_x: bx as u16,
                            batch_y: by as u16,
                            center,
                        },
                        Name::new(format!("Terrain{}_{}Batch{}_{}", terrain.coord.x, terrain.coord.y, bx, by)),
                    ))
                    .id();
                terrain.batches.push((entity, handle));
            }
        }

        terrain.meshes_stale = false;
        info!(
            "Rebuilt {} batches for tile {} ({} decimated)",
            terrain.batches.len(),
            terrain.coord,
            decimated
        );
    }
}

/// Far batches swap the splat material for the baked composite colours.
pub fn update_batch_materials(
    mut commands: Commands,
    camera_query: Query<&GlobalTransform, With<MainCamera>>,
    batches: Query<(Entity, &TerrainBatch, Has<MeshMaterial3d<StandardMaterial>>)>,
    globals: Option<Res<TerrainGlobalOptions>>,
    materials: Option<Res<TerrainMaterials>>,
) {
    let (Some(globals), Some(materials)) = (globals, materials) else {
        return;
    };
    let Ok(camera) = camera_query.get_single() else {
        return;
    };
    let eye = camera.translation();

    for (entity, batch, showing_composite) in batches.iter() {
        let wants_composite = eye.distance(batch.center) > globals.composite_map_distance;
        if wants_composite == showing_composite {
            continue;
        }

        if wants_composite {
            commands
                .entity(entity)
                .remove::<MeshMaterial3d<TerrainSplatMaterial>>()
                .insert(MeshMaterial3d(materials.composite.clone()));
        } else if let Some(detail) = materials.detail.get(&batch.tile) {
            commands
                .entity(entity)
                .remove::<MeshMaterial3d<StandardMaterial>>()
                .insert(MeshMaterial3d(detail.clone()));
        } else {
            continue;
        }
        trace!(
            "Batch ({}, {}) of tile {} switched to the {} material",
            batch.batch_x,
            batch.batch_y,
            batch.tile,
            if wants_composite { "composite" } else { "splat" }
        );
    }
}
