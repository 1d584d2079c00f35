use bevy::prelude::*;

use crate::world::tile::TileCoord;

/// The single scene camera; height clamping and orbiting act on it.
#[derive(Component, Debug, Default)]
pub struct MainCamera;

/// The directional light the terrain derives its light map from.
#[derive(Component, Debug, Default)]
pub struct SunLight;

/// A robot spawned by left-clicking the terrain.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedObject {
    pub index: u32,
}

/// One rendered batch of a terrain tile.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct TerrainBatch {
    pub tile: TileCoord,
    pub batch_x: u16,
    pub batch_y: u16,
    /// World-space center, used to pick between detail and composite materials
    pub center: Vec3,
}

/// The "terrain is busy" label at the top of the screen.
#[derive(Component, Debug, Default)]
pub struct StatusLabel;
