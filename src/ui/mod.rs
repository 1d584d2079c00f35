// UI module: the terrain status label

pub mod status;

pub use status::*;

use bevy::prelude::*;

use crate::core::game::GameSet;

pub struct UIPlugin;

impl Plugin for UIPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_status_label)
            .add_systems(Update, update_terrain_status.in_set(GameSet::Ui));
    }
}
