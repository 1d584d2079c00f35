//! Layer blend maps and the height-based painter run on freshly imported tiles.

use bevy::prelude::*;

use crate::core::constants::terrain::*;
use crate::world::tile::Terrain;

/// Per-texel weights controlling how much one layer shows over the layers below it.
/// Row 0 is the top of the image, which is terrain y = 1.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendMap {
    size: u16,
    weights: Vec<f32>,
    dirty: bool,
}

impl BlendMap {
    pub fn new(size: u16) -> Self {
        Self {
            size,
            weights: vec![0.0; size as usize * size as usize],
            dirty: false,
        }
    }

    pub fn from_weights(size: u16, weights: Vec<f32>) -> Option<Self> {
        (size >= 2 && weights.len() == size as usize * size as usize).then_some(Self {
            size,
            weights,
            dirty: false,
        })
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn blend_pointer(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    pub fn dirty(&mut self) {
        self.dirty = true;
    }

    /// Commits pending changes. Returns whether anything was pending so the caller
    /// can schedule a derived-data refresh.
    pub fn update(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn convert_image_to_terrain_space(&self, x: u16, y: u16) -> (f32, f32) {
        let last = (self.size - 1) as f32;
        (x as f32 / last, 1.0 - y as f32 / last)
    }

    pub fn weight_at_terrain_position(&self, tx: f32, ty: f32) -> f32 {
        let last = (self.size - 1) as f32;
        let fx = tx.clamp(0.0, 1.0) * last;
        let fy = (1.0 - ty.clamp(0.0, 1.0)) * last;
        let n = self.size as usize;
        let at = |x: usize, y: usize| self.weights[y.min(n - 1) * n + x.min(n - 1)];

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let ax = fx - x0 as f32;
        let ay = fy - y0 as f32;

        let top = at(x0, y0) * (1.0 - ax) + at(x0 + 1, y0) * ax;
        let bottom = at(x0, y0 + 1) * (1.0 - ax) + at(x0 + 1, y0 + 1) * ax;
        top * (1.0 - ay) + bottom * ay
    }
}

/// Height band that fades a layer in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendRule {
    pub layer: usize,
    pub min_height: f32,
    pub fade_distance: f32,
}

pub const DEFAULT_BLEND_RULES: [BlendRule; 2] = [
    BlendRule {
        layer: 1,
        min_height: GRASS_MIN_HEIGHT,
        fade_distance: GRASS_FADE_DISTANCE,
    },
    BlendRule {
        layer: 2,
        min_height: FUNGUS_MIN_HEIGHT,
        fade_distance: FUNGUS_FADE_DISTANCE,
    },
];

/// 0 at or below `min_height`, 1 from `min_height + fade_distance` up, linear in between.
pub fn blend_value(height: f32, min_height: f32, fade_distance: f32) -> f32 {
    ((height - min_height) / fade_distance).clamp(0.0, 1.0)
}

/// Paints every rule's layer from terrain height, then commits the maps.
pub fn paint_blend_maps(terrain: &mut Terrain, rules: &[BlendRule]) {
    let size = terrain.layer_blend_map_size();
    if size < 2 {
        return;
    }

    for rule in rules {
        let Some(map) = terrain.layer_blend_map(rule.layer) else {
            warn!("Tile {} has no blend map for layer {}", terrain.coord, rule.layer);
            continue;
        };

        let mut weights = Vec::with_capacity(size as usize * size as usize);
        for y in 0..size {
            for x in 0..size {
                let (tx, ty) = map.convert_image_to_terrain_space(x, y);
                let height = terrain.height_at_terrain_position(tx, ty);
                weights.push(blend_value(height, rule.min_height, rule.fade_distance));
            }
        }

        if let Some(map) = terrain.layer_blend_map_mut(rule.layer) {
            map.blend_pointer().copy_from_slice(&weights);
            map.dirty();
        }
    }

    let mut changed = false;
    for map in terrain.blend_maps.iter_mut() {
        changed |= map.update();
    }
    if changed {
        terrain.mark_derived_dirty();
    }

    debug!("Painted {} blend layers on tile {}", rules.len(), terrain.coord);
}
