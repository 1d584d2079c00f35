use bevy::prelude::*;

use crate::core::constants::camera::ROTATE_SPEED;

/// What the app should do in response to one mouse event.
#[derive(Debug, Clone, PartialEq)]
pub enum MouseEffect {
    /// Place a new robot at a terrain hit and start tracking it
    Spawn { name: String, index: u32, position: Vec3 },
    /// Move the tracked robot to a terrain hit
    MoveObject { entity: Entity, position: Vec3 },
    /// Yaw about world Y and pitch about the camera's local X
    Orbit { yaw_degrees: f32, pitch_degrees: f32 },
    SetCursorVisible(bool),
}

/// Button state and the robot being dragged. Terrain hits are looked up by the caller
/// so this stays independent of cameras and windows.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct MouseController {
    left_down: bool,
    right_down: bool,
    placed_count: u32,
    current_object: Option<Entity>,
    rotate_speed: f32,
}

impl Default for MouseController {
    fn default() -> Self {
        Self::new(ROTATE_SPEED)
    }
}

impl MouseController {
    pub fn new(rotate_speed: f32) -> Self {
        Self {
            left_down: false,
            right_down: false,
            placed_count: 0,
            current_object: None,
            rotate_speed,
        }
    }

    pub fn placed_count(&self) -> u32 {
        self.placed_count
    }

    pub fn current_object(&self) -> Option<Entity> {
        self.current_object
    }

    /// Records the entity created for the last `Spawn` effect.
    pub fn track(&mut self, entity: Entity) {
        self.current_object = Some(entity);
    }

    /// Left press spawns on a hit; the button counts as held either way.
    pub fn mouse_pressed(&mut self, button: MouseButton, hit: Option<Vec3>) -> Option<MouseEffect> {
        match button {
            MouseButton::Left => {
                self.left_down = true;
                hit.map(|position| {
                    let index = self.placed_count;
                    self.placed_count += 1;
                    MouseEffect::Spawn {
                        name: format!("Robot{index}Node"),
                        index,
                        position,
                    }
                })
            }
            MouseButton::Right => {
                self.right_down = true;
                Some(MouseEffect::SetCursorVisible(false))
            }
            _ => None,
        }
    }

    pub fn mouse_released(&mut self, button: MouseButton) -> Option<MouseEffect> {
        match button {
            MouseButton::Left => {
                self.left_down = false;
                self.current_object = None;
                None
            }
            MouseButton::Right => {
                self.right_down = false;
                Some(MouseEffect::SetCursorVisible(true))
            }
            _ => None,
        }
    }

    /// Left drag wins over right drag. `hit` is only evaluated while dragging an object.
    pub fn mouse_moved(&self, delta: Vec2, hit: impl FnOnce() -> Option<Vec3>) -> Option<MouseEffect> {
        if self.left_down {
            let entity = self.current_object?;
            let position = hit()?;
            Some(MouseEffect::MoveObject { entity, position })
        } else if self.right_down {
            Some(MouseEffect::Orbit {
                yaw_degrees: -delta.x * self.rotate_speed,
                pitch_degrees: -delta.y * self.rotate_speed,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
impl MouseController {
    pub fn left_down(&self) -> bool {
        self.left_down
    }

    pub fn right_down(&self) -> bool {
        self.right_down
    }
}
