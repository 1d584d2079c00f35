use bevy::input::mouse::MouseButtonInput;
use bevy::input::ButtonState;
use bevy::prelude::*;
use bevy::window::{PrimaryWindow, WindowEvent};

use crate::core::components::{MainCamera, PlacedObject};
use crate::core::constants::placement::*;
use crate::interaction::mouse::{MouseController, MouseEffect};
use crate::world::terrain_group::TerrainGroup;

/// Scene spawned for every placed robot.
#[derive(Resource, Debug, Clone, Default)]
pub struct RobotModel(pub Handle<Scene>);

/// Ray from the camera through the cursor this frame, `None` when the cursor is outside the window.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct CursorRay(pub Option<Ray3d>);

impl CursorRay {
    pub fn terrain_hit(&self, group: Option<&TerrainGroup>) -> Option<Vec3> {
        group?.ray_intersects(self.0?)
    }
}

pub fn load_robot_model(mut commands: Commands, asset_server: Res<AssetServer>) {
    let scene = asset_server.load(GltfAssetLabel::Scene(0).from_asset(ROBOT_MODEL_PATH));
    info!("Loading robot model from {}", ROBOT_MODEL_PATH);
    commands.insert_resource(RobotModel(scene));
}

pub fn update_cursor_ray(
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    mut cursor_ray: ResMut<CursorRay>,
) {
    cursor_ray.0 = windows.get_single().ok().and_then(|window| {
        let cursor = window.cursor_position()?;
        let (camera, camera_transform) = camera_query.get_single().ok()?;
        camera.viewport_to_world(camera_transform, cursor).ok()
    });
}

/// Feeds mouse buttons and motion to the controller in the order they arrived, so a
/// press, drag and release inside one frame behave like three separate frames.
pub fn handle_mouse_input(
    mut commands: Commands,
    mut window_events: EventReader<WindowEvent>,
    mut mouse: ResMut<MouseController>,
    cursor_ray: Res<CursorRay>,
    group: Option<Res<TerrainGroup>>,
    robot: Res<RobotModel>,
    mut windows: Query<&mut Window, With<PrimaryWindow>>,
    mut placed: Query<&mut Transform, (With<PlacedObject>, Without<MainCamera>)>,
    mut camera_query: Query<&mut Transform, (With<MainCamera>, Without<PlacedObject>)>,
) {
    for event in window_events.read() {
        let effect = match event {
            WindowEvent::MouseButtonInput(input) => button_effect(input, &mut mouse, &cursor_ray, group.as_deref()),
            WindowEvent::MouseMotion(motion) => {
                mouse.mouse_moved(motion.delta, || cursor_ray.terrain_hit(group.as_deref()))
            }
            _ => None,
        };

        match effect {
            Some(MouseEffect::Spawn { name, index, position }) => {
                let entity = commands
                    .spawn((
                        SceneRoot(robot.0.clone()),
                        Transform::from_translation(position).with_scale(Vec3::splat(ROBOT_SCALE)),
                        PlacedObject { index },
                        Name::new(name.clone()),
                    ))
                    .id();
                mouse.track(entity);
                info!("Placed {} at {:?} ({} so far)", name, position, mouse.placed_count());
            }
            Some(MouseEffect::MoveObject { entity, position }) => {
                if let Ok(mut transform) = placed.get_mut(entity) {
                    transform.translation = position;
                }
            }
            Some(MouseEffect::Orbit {
                yaw_degrees,
                pitch_degrees,
            }) => {
                for mut transform in camera_query.iter_mut() {
                    transform.rotate_y(yaw_degrees.to_radians());
                    transform.rotate_local_x(pitch_degrees.to_radians());
                }
            }
            Some(MouseEffect::SetCursorVisible(visible)) => {
                if let Ok(mut window) = windows.get_single_mut() {
                    window.cursor_options.visible = visible;
                }
            }
            None => {}
        }
    }
}

fn button_effect(
    input: &MouseButtonInput,
    mouse: &mut MouseController,
    cursor_ray: &CursorRay,
    group: Option<&TerrainGroup>,
) -> Option<MouseEffect> {
    match input.state {
        ButtonState::Pressed => {
            let hit = if input.button == MouseButton::Left {
                cursor_ray.terrain_hit(group)
            } else {
                None
            };
            mouse.mouse_pressed(input.button, hit)
        }
        ButtonState::Released => {
            if input.button == MouseButton::Left {
                if let Some(entity) = mouse.current_object() {
                    debug!("Dropped {:?}", entity);
                }
            }
            mouse.mouse_released(input.button)
        }
    }
}
