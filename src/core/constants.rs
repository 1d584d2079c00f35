// Demo configuration constants
// The magic numbers of the scene live here; DemoConfig overrides the ones that are user facing

// === WINDOW AND DISPLAY ===
pub const WINDOW_TITLE: &str = "Terrain Placement Demo";
pub const WINDOW_WIDTH: f32 = 1280.0;
pub const WINDOW_HEIGHT: f32 = 720.0;

// === SCENE ===
pub mod scene {
    use bevy::prelude::*;

    // Linear so the baked composite ambient stays at 0.5
    pub const AMBIENT_COLOR: Color = Color::linear_rgb(0.5, 0.5, 0.5);
    pub const AMBIENT_BRIGHTNESS: f32 = 400.0;
    // Clear colour stands in for the cloudy sky dome
    pub const SKY_COLOR: Color = Color::srgb(0.53, 0.66, 0.82);

    pub const CAMERA_START: Vec3 = Vec3::new(1683.0, 300.0, 2116.0);
    pub const CAMERA_START_PITCH_DEGREES: f32 = -30.0;
    pub const CAMERA_START_YAW_DEGREES: f32 = -45.0;
    pub const CAMERA_FAR_PLANE: f32 = 50000.0;

    pub const LIGHT_DIRECTION: Vec3 = Vec3::new(0.55, -0.3, 0.75);
    pub const LIGHT_DIFFUSE: Color = Color::WHITE;
    pub const LIGHT_ILLUMINANCE: f32 = 10000.0;
}

// === TERRAIN ===
pub mod terrain {
    pub const HEIGHTMAP_NAME: &str = "terrain.png";
    pub const FILENAME_PREFIX: &str = "IntermediateTutorial2Terrain";
    pub const FILENAME_EXTENSION: &str = "dat";
    pub const TILE_CACHE_DIR: &str = "terrain_cache";

    // Grid of tiles defined at startup, inclusive on both ends
    pub const GRID_MIN: (i32, i32) = (0, 0);
    pub const GRID_MAX: (i32, i32) = (0, 0);

    pub const TILE_SIZE: u16 = 513;
    pub const WORLD_SIZE: f32 = 12000.0;
    pub const INPUT_SCALE: f32 = 600.0;
    pub const MIN_BATCH_SIZE: u16 = 33;
    pub const MAX_BATCH_SIZE: u16 = 65;
    pub const BLEND_MAP_SIZE: u16 = 1024;

    pub const MAX_PIXEL_ERROR: f32 = 8.0;
    pub const COMPOSITE_MAP_DISTANCE: f32 = 3000.0;

    // Blend thresholds painted onto freshly imported tiles
    pub const GRASS_MIN_HEIGHT: f32 = 70.0;
    pub const GRASS_FADE_DISTANCE: f32 = 40.0;
    pub const FUNGUS_MIN_HEIGHT: f32 = 70.0;
    pub const FUNGUS_FADE_DISTANCE: f32 = 15.0;
}

// === CAMERA SYSTEM ===
pub mod camera {
    // Downward probe starts this high so it is always above the terrain
    pub const GROUND_PROBE_HEIGHT: f32 = 5000.0;
    pub const MIN_HEIGHT_ABOVE_TERRAIN: f32 = 10.0;
    // Degrees per pixel of mouse motion while orbiting
    pub const ROTATE_SPEED: f32 = 0.1;
    pub const MOVE_SPEED: f32 = 400.0;
    pub const FAST_MOVE_MULTIPLIER: f32 = 10.0;
}

// === PLACEMENT ===
pub mod placement {
    pub const ROBOT_MODEL_PATH: &str = "models/robot.glb";
    pub const ROBOT_SCALE: f32 = 0.1;
}

// === UI CONSTANTS ===
pub mod ui {
    use bevy::prelude::*;

    pub const STATUS_LABEL_WIDTH: f32 = 350.0;
    pub const STATUS_LABEL_TOP: f32 = 10.0;
    pub const STATUS_TEXT_SIZE: f32 = 18.0;
    pub const STATUS_BACKGROUND: Color = Color::srgba(0.1, 0.1, 0.1, 0.8);
    pub const TEXT_COLOR: Color = Color::WHITE;

    pub const BUILDING_TERRAIN_TEXT: &str = "Building terrain, please wait...";
    pub const UPDATING_TEXTURES_TEXT: &str = "Updating textures, patience...";
}

// === HOTKEYS ===
pub mod hotkeys {
    use bevy::prelude::KeyCode;

    pub const EXIT: KeyCode = KeyCode::Escape;
    pub const FAST_MOVE: KeyCode = KeyCode::ShiftLeft;
}
