//! Free-look camera movement and keeping the camera above the terrain.

use bevy::prelude::*;

use crate::core::components::MainCamera;
use crate::core::config::DemoConfig;
use crate::core::constants::camera::*;
use crate::core::constants::hotkeys;
use crate::core::game::GameSet;
use crate::world::terrain_group::TerrainGroup;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, fly_camera.in_set(GameSet::Input))
            .add_systems(Update, clamp_camera_to_terrain.in_set(GameSet::Camera));
    }
}

/// Lowest allowed camera height over ground at `terrain_height`.
pub fn clamp_height(current_y: f32, terrain_height: f32, offset: f32) -> f32 {
    current_y.max(terrain_height + offset)
}

/// Terrain height straight below (x, z), found with a downward ray from high above.
pub fn ground_height_below(group: &TerrainGroup, x: f32, z: f32) -> Option<f32> {
    let probe = Ray3d::new(Vec3::new(x, GROUND_PROBE_HEIGHT, z), Dir3::NEG_Y);
    group.ray_intersects(probe).map(|hit| hit.y)
}

pub fn clamp_camera_to_terrain(
    group: Option<Res<TerrainGroup>>,
    config: Res<DemoConfig>,
    mut camera_query: Query<&mut Transform, With<MainCamera>>,
) {
    let Some(group) = group else {
        return;
    };

    for mut transform in camera_query.iter_mut() {
        let position = transform.translation;
        let Some(ground) = ground_height_below(&group, position.x, position.z) else {
            continue;
        };

        let clamped = clamp_height(position.y, ground, config.camera_height_offset);
        if clamped != position.y {
            transform.translation.y = clamped;
            debug!("Camera lifted to {:.1} above ground at {:.1}", clamped, ground);
        }
    }
}

/// Unit-length movement direction from the held keys, in the camera's frame.
pub fn fly_direction(keyboard: &ButtonInput<KeyCode>, transform: &Transform) -> Vec3 {
    let mut direction = Vec3::ZERO;

    if keyboard.any_pressed([KeyCode::KeyW, KeyCode::ArrowUp]) {
        direction += *transform.forward();
    }
    if keyboard.any_pressed([KeyCode::KeyS, KeyCode::ArrowDown]) {
        direction += *transform.back();
    }
    if keyboard.any_pressed([KeyCode::KeyA, KeyCode::ArrowLeft]) {
        direction += *transform.left();
    }
    if keyboard.any_pressed([KeyCode::KeyD, KeyCode::ArrowRight]) {
        direction += *transform.right();
    }
    if keyboard.pressed(KeyCode::PageUp) {
        direction += Vec3::Y;
    }
    if keyboard.pressed(KeyCode::PageDown) {
        direction += Vec3::NEG_Y;
    }

    direction.normalize_or_zero()
}

pub fn fly_camera(
    keyboard: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    config: Res<DemoConfig>,
    mut camera_query: Query<&mut Transform, With<MainCamera>>,
) {
    let multiplier = if keyboard.any_pressed([hotkeys::FAST_MOVE, KeyCode::ShiftRight]) {
        FAST_MOVE_MULTIPLIER
    } else {
        1.0
    };

    for mut transform in camera_query.iter_mut() {
        let direction = fly_direction(&keyboard, &transform);
        if direction != Vec3::ZERO {
            transform.translation += direction * config.move_speed * multiplier * time.delta_secs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::terrain_group::tests::{flat_source, group_with, small_settings};
    use crate::world::tile::TileCoord;
    use crate::world::tile_store::MemoryTileStore;
    use std::time::Duration;

    fn flat_group() -> TerrainGroup {
        // Flat at 50 over x, z in [-50, 50]
        let mut group = group_with(small_settings(), MemoryTileStore::default(), flat_source(0.5));
        group.define_tile(TileCoord::new(0, 0)).unwrap();
        group.load_all_terrains().unwrap();
        group
    }

    #[test]
    fn height_is_raised_to_the_offset_but_never_lowered() {
        assert_eq!(clamp_height(20.0, 50.0, 10.0), 60.0);
        assert_eq!(clamp_height(60.0, 50.0, 10.0), 60.0);
        assert_eq!(clamp_height(300.0, 50.0, 10.0), 300.0);
    }

    #[test]
    fn camera_below_ground_is_pushed_up() {
        let mut app = App::new();
        app.insert_resource(flat_group())
            .init_resource::<DemoConfig>()
            .add_systems(Update, clamp_camera_to_terrain);

        let low = app
            .world_mut()
            .spawn((Transform::from_xyz(10.0, 20.0, -10.0), MainCamera))
            .id();
        app.update();
        let y = app.world().get::<Transform>(low).unwrap().translation.y;
        assert!((y - 60.0).abs() < 1e-3, "camera at {y}");

        app.world_mut().get_mut::<Transform>(low).unwrap().translation.y = 400.0;
        app.update();
        assert_eq!(app.world().get::<Transform>(low).unwrap().translation.y, 400.0);
    }

    #[test]
    fn camera_off_the_terrain_is_left_alone() {
        let mut app = App::new();
        app.insert_resource(flat_group())
            .init_resource::<DemoConfig>()
            .add_systems(Update, clamp_camera_to_terrain);

        let camera = app
            .world_mut()
            .spawn((Transform::from_xyz(900.0, -5.0, 0.0), MainCamera))
            .id();
        app.update();
        assert_eq!(app.world().get::<Transform>(camera).unwrap().translation.y, -5.0);
    }

    #[test]
    fn held_keys_move_along_the_view_axes() {
        let mut keyboard = ButtonInput::<KeyCode>::default();
        keyboard.press(KeyCode::KeyW);
        keyboard.press(KeyCode::KeyD);
        let direction = fly_direction(&keyboard, &Transform::IDENTITY);
        assert!((direction - Vec3::new(1.0, 0.0, -1.0).normalize()).length() < 1e-6);

        keyboard.press(KeyCode::ArrowLeft);
        let direction = fly_direction(&keyboard, &Transform::IDENTITY);
        assert!((direction - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn shift_speeds_up_flying() {
        let mut app = App::new();
        let mut keyboard = ButtonInput::<KeyCode>::default();
        keyboard.press(KeyCode::KeyW);
        keyboard.press(hotkeys::FAST_MOVE);
        app.insert_resource(keyboard)
            .init_resource::<Time>()
            .init_resource::<DemoConfig>()
            .add_systems(Update, fly_camera);

        let camera = app.world_mut().spawn((Transform::IDENTITY, MainCamera)).id();
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(100));
        app.update();

        // 400 units/s, ten times faster, for a tenth of a second
        let z = app.world().get::<Transform>(camera).unwrap().translation.z;
        assert!((z + 400.0).abs() < 1e-2, "camera at z = {z}");
    }
}
