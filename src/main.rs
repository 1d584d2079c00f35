use bevy::asset::AssetPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

mod camera;
mod core;
mod interaction;
mod ui;
mod world;

use camera::CameraPlugin;
use crate::core::config::DemoConfig;
use crate::core::constants;
use crate::core::game::GamePlugin;
use interaction::InteractionPlugin;
use ui::UIPlugin;
use world::TerrainPlugin;

fn main() {
    let config = match DemoConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("An exception has occurred: {err}");
            return;
        }
    };

    App::new()
        // Inserted before the plugins so the log layer hook can read it
        .insert_resource(config.clone())
        .add_plugins((
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: constants::WINDOW_TITLE.into(),
                        resolution: (constants::WINDOW_WIDTH, constants::WINDOW_HEIGHT).into(),
                        ..default()
                    }),
                    ..default()
                })
                .set(AssetPlugin {
                    file_path: config.asset_root.to_string_lossy().into_owned(),
                    ..default()
                })
                .set(LogPlugin {
                    filter: config.log_filter(),
                    custom_layer: flame_layer,
                    ..default()
                }),
            GamePlugin,
            TerrainPlugin,
            CameraPlugin,
            InteractionPlugin,
            UIPlugin,
        ))
        .run();
}

// Writes folded stacks for flamegraphs when `flame_trace` is configured
#[cfg(feature = "logging")]
fn flame_layer(app: &mut App) -> Option<bevy::log::BoxedLayer> {
    use tracing_subscriber::Layer;

    let path = app.world().get_resource::<DemoConfig>()?.flame_trace.clone()?;
    match tracing_flame::FlameLayer::with_file(&path) {
        Ok((layer, guard)) => {
            // Flushes the trace file when the app is dropped
            app.insert_non_send_resource(guard);
            Some(layer.boxed())
        }
        Err(err) => {
            eprintln!("Flame trace disabled, cannot write {}: {err}", path.display());
            None
        }
    }
}

#[cfg(not(feature = "logging"))]
fn flame_layer(_app: &mut App) -> Option<bevy::log::BoxedLayer> {
    None
}
