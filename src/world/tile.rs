//! Terrain tiles: grid coordinates, heightmaps and the loaded tile itself.
//!
//! Terrain space runs from 0 to 1 on both axes of a tile. It maps onto the world
//! with terrain x along world +X and terrain y along world -Z, centered on the
//! tile's slot position, so the top row of an imported image ends up on the -Z edge.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::world::blend_map::BlendMap;
use crate::world::derived_data::{DerivedData, DerivedState};
use crate::world::heightmap::HeightImage;
use crate::world::terrain_defaults::LayerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Packs both coordinates into one key, 16 bits each with x in the high half.
    pub fn packed(self) -> u32 {
        ((self.x as u16 as u32) << 16) | (self.y as u16 as u32)
    }

    /// Odd tiles mirror the shared heightmap so neighbouring edges line up.
    pub fn mirror_flags(self) -> (bool, bool) {
        (self.x % 2 != 0, self.y % 2 != 0)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Square grid of world-space heights, row-major with row 0 at terrain y = 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightmap {
    size: u16,
    heights: Vec<f32>,
}

impl Heightmap {
    pub fn new(size: u16, heights: Vec<f32>) -> Option<Self> {
        (size >= 2 && heights.len() == size as usize * size as usize).then_some(Self { size, heights })
    }

    #[cfg(test)]
    pub fn flat(size: u16, height: f32) -> Self {
        Self {
            size,
            heights: vec![height; size as usize * size as usize],
        }
    }

    /// Resamples a normalized image to `size` and scales it to world heights.
    /// Image rows run top to bottom, terrain rows bottom to top.
    pub fn from_image(image: &HeightImage, size: u16, input_scale: f32) -> Self {
        let n = size as usize;
        let mut heights = Vec::with_capacity(n * n);
        let last = (n - 1).max(1) as f32;

        for row in 0..n {
            let v = 1.0 - row as f32 / last;
            for col in 0..n {
                let u = col as f32 / last;
                heights.push(image.sample(u, v) * input_scale);
            }
        }

        Self { size, heights }
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        let n = self.size as usize;
        self.heights[y.min(n - 1) * n + x.min(n - 1)]
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }

    /// Bilinear height at a terrain-space position, clamped to the tile.
    pub fn height_at_terrain_position(&self, tx: f32, ty: f32) -> f32 {
        let last = (self.size - 1) as f32;
        let fx = (tx.clamp(0.0, 1.0)) * last;
        let fy = (ty.clamp(0.0, 1.0)) * last;

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let ax = fx - x0 as f32;
        let ay = fy - y0 as f32;

        let h00 = self.get(x0, y0);
        let h10 = self.get(x0 + 1, y0);
        let h01 = self.get(x0, y0 + 1);
        let h11 = self.get(x0 + 1, y0 + 1);

        let bottom = h00 + (h10 - h00) * ax;
        let top = h01 + (h11 - h01) * ax;
        bottom + (top - bottom) * ay
    }
}

/// A loaded tile: heights, blend maps and the derived data computed from them.
#[derive(Debug)]
pub struct Terrain {
    pub coord: TileCoord,
    /// World-space center of the tile at height zero
    pub position: Vec3,
    pub world_size: f32,
    pub heightmap: Heightmap,
    /// Lowest and highest height in the heightmap
    pub height_range: (f32, f32),
    pub layers: Vec<LayerSettings>,
    /// Blend map of layer `i` lives at index `i - 1`; layer 0 is the base and has none
    pub blend_maps: Vec<BlendMap>,
    pub derived_state: DerivedState,
    pub derived_data: Option<DerivedData>,
    /// Set when derived data changed and the batch meshes are stale
    pub meshes_stale: bool,
    pub batches: Vec<(Entity, Handle<Mesh>)>,
}

impl Terrain {
    pub fn new(
        coord: TileCoord,
        position: Vec3,
        world_size: f32,
        heightmap: Heightmap,
        layers: Vec<LayerSettings>,
        blend_maps: Vec<BlendMap>,
    ) -> Self {
        let height_range = heightmap.min_max();
        Self {
            coord,
            position,
            world_size,
            heightmap,
            height_range,
            layers,
            blend_maps,
            derived_state: DerivedState::Dirty,
            derived_data: None,
            meshes_stale: false,
            batches: Vec::new(),
        }
    }

    pub fn size(&self) -> u16 {
        self.heightmap.size()
    }

    pub fn layer_blend_map(&self, layer: usize) -> Option<&BlendMap> {
        layer.checked_sub(1).and_then(|i| self.blend_maps.get(i))
    }

    pub fn layer_blend_map_mut(&mut self, layer: usize) -> Option<&mut BlendMap> {
        layer.checked_sub(1).and_then(|i| self.blend_maps.get_mut(i))
    }

    pub fn layer_blend_map_size(&self) -> u16 {
        self.blend_maps.first().map_or(0, BlendMap::size)
    }

    pub fn height_at_terrain_position(&self, tx: f32, ty: f32) -> f32 {
        self.heightmap.height_at_terrain_position(tx, ty)
    }

    pub fn terrain_to_world(&self, tx: f32, ty: f32) -> Vec2 {
        Vec2::new(
            self.position.x + (tx - 0.5) * self.world_size,
            self.position.z - (ty - 0.5) * self.world_size,
        )
    }

    /// Terrain-space position of a world XZ point, `None` outside the tile.
    pub fn world_to_terrain(&self, x: f32, z: f32) -> Option<Vec2> {
        let tx = (x - self.position.x) / self.world_size + 0.5;
        let ty = -(z - self.position.z) / self.world_size + 0.5;
        ((0.0..=1.0).contains(&tx) && (0.0..=1.0).contains(&ty)).then_some(Vec2::new(tx, ty))
    }

    pub fn height_at_world_position(&self, x: f32, z: f32) -> Option<f32> {
        self.world_to_terrain(x, z)
            .map(|t| self.position.y + self.height_at_terrain_position(t.x, t.y))
    }

    /// Derived data is recomputed on the next frame; used after blend maps or heights change.
    pub fn mark_derived_dirty(&mut self) {
        self.derived_state = DerivedState::Dirty;
    }

    /// Stores a finished computation. A tile dirtied again meanwhile stays dirty.
    pub fn apply_derived_data(&mut self, data: DerivedData) {
        self.derived_data = Some(data);
        self.meshes_stale = true;
        if self.derived_state == DerivedState::Computing {
            self.derived_state = DerivedState::Ready;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_index_matches_filename_convention() {
        assert_eq!(TileCoord::new(0, 0).packed(), 0);
        assert_eq!(TileCoord::new(1, 2).packed(), 0x0001_0002);
        assert_eq!(TileCoord::new(-1, 0).packed(), 0xFFFF_0000);
    }

    #[test]
    fn mirror_flags_follow_parity() {
        assert_eq!(TileCoord::new(0, 0).mirror_flags(), (false, false));
        assert_eq!(TileCoord::new(1, 0).mirror_flags(), (true, false));
        assert_eq!(TileCoord::new(2, 3).mirror_flags(), (false, true));
        assert_eq!(TileCoord::new(-1, -3).mirror_flags(), (true, true));
    }

    #[test]
    fn bilinear_sampling_interpolates_between_posts() {
        let map = Heightmap::new(2, vec![0.0, 10.0, 20.0, 30.0]).unwrap();
        assert_eq!(map.height_at_terrain_position(0.0, 0.0), 0.0);
        assert_eq!(map.height_at_terrain_position(1.0, 1.0), 30.0);
        assert!((map.height_at_terrain_position(0.5, 0.5) - 15.0).abs() < 1e-4);
        assert!((map.height_at_terrain_position(0.5, 0.0) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn image_top_row_becomes_last_terrain_row() {
        let image = HeightImage::new(2, 2, vec![1.0, 1.0, 0.0, 0.0]).unwrap();
        let map = Heightmap::from_image(&image, 2, 600.0);
        assert_eq!(map.get(0, 0), 0.0);
        assert_eq!(map.get(0, 1), 600.0);
    }

    #[test]
    fn world_mapping_round_trips_through_terrain_space() {
        let terrain = Terrain::new(
            TileCoord::new(0, 0),
            Vec3::ZERO,
            100.0,
            Heightmap::flat(3, 5.0),
            Vec::new(),
            Vec::new(),
        );

        let world = terrain.terrain_to_world(0.25, 0.75);
        assert_eq!(world, Vec2::new(-25.0, -25.0));
        let back = terrain.world_to_terrain(world.x, world.y).unwrap();
        assert!((back - Vec2::new(0.25, 0.75)).length() < 1e-5);

        assert_eq!(terrain.height_at_world_position(10.0, 10.0), Some(5.0));
        assert_eq!(terrain.height_at_world_position(60.0, 0.0), None);
    }
}
