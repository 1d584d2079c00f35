use bevy::prelude::*;

use crate::core::config::DemoConfig;
use crate::core::constants::hotkeys;
use crate::core::error::{report_fatal_errors, FatalError};

/// Frame order: input first, then terrain upkeep, the status label, and finally the
/// camera height clamp against the settled terrain.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum GameSet {
    Input,
    Terrain,
    Ui,
    Camera,
}

/// Frame ordering, configuration and shutdown. `main` inserts the loaded [`DemoConfig`]
/// before any plugin is built; without one the defaults are used.
pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            Update,
            (GameSet::Input, GameSet::Terrain, GameSet::Ui, GameSet::Camera).chain(),
        )
        .init_resource::<DemoConfig>()
        .add_event::<FatalError>()
        .add_systems(Update, exit_on_hotkey.in_set(GameSet::Input))
        .add_systems(Update, report_fatal_errors.after(GameSet::Camera));
    }
}

pub fn exit_on_hotkey(keyboard: Res<ButtonInput<KeyCode>>, mut app_exit: EventWriter<AppExit>) {
    if keyboard.just_pressed(hotkeys::EXIT) {
        info!("Exit requested");
        app_exit.send(AppExit::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exits(app: &mut App) -> Vec<AppExit> {
        app.world_mut()
            .resource_mut::<Events<AppExit>>()
            .drain()
            .collect()
    }

    #[test]
    fn escape_exits_cleanly() {
        let mut app = App::new();
        app.add_event::<AppExit>()
            .init_resource::<ButtonInput<KeyCode>>()
            .add_systems(Update, exit_on_hotkey);

        app.update();
        assert!(exits(&mut app).is_empty());

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(hotkeys::EXIT);
        app.update();
        assert_eq!(exits(&mut app), vec![AppExit::Success]);
    }

    #[test]
    fn plugin_keeps_loaded_config_and_reports_fatal_errors() {
        let config = DemoConfig {
            move_speed: 12.0,
            ..Default::default()
        };
        let mut app = App::new();
        app.add_event::<AppExit>()
            .init_resource::<ButtonInput<KeyCode>>()
            .insert_resource(config.clone())
            .add_plugins(GamePlugin);

        assert_eq!(*app.world().resource::<DemoConfig>(), config);

        app.world_mut()
            .send_event(FatalError("heightmap missing".to_string()));
        app.update();
        assert_eq!(exits(&mut app), vec![AppExit::Success]);
    }
}
