//! Mouse input: placing robots on the terrain, dragging them, and orbiting the camera.

pub mod mouse;
pub mod systems;

use bevy::prelude::*;

use crate::core::config::DemoConfig;
use crate::core::constants::camera::ROTATE_SPEED;
use crate::core::game::GameSet;
use mouse::MouseController;
use systems::*;

pub struct InteractionPlugin;

impl Plugin for InteractionPlugin {
    fn build(&self, app: &mut App) {
        let rotate_speed = app
            .world()
            .get_resource::<DemoConfig>()
            .map_or(ROTATE_SPEED, |config| config.rotate_speed);

        app.insert_resource(MouseController::new(rotate_speed))
            .init_resource::<CursorRay>()
            .add_systems(Startup, load_robot_model)
            .add_systems(
                Update,
                (update_cursor_ray, handle_mouse_input)
                    .chain()
                    .in_set(GameSet::Input),
            );
    }
}
