use bevy::prelude::*;

use crate::core::components::StatusLabel;
use crate::core::constants::ui::*;
use crate::core::error::FatalError;
use crate::world::terrain_group::TerrainGroup;

/// What the status label should show this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainStatus {
    Importing { caption: &'static str },
    Idle,
}

pub fn poll_terrain_status(in_progress: bool, imported: bool) -> TerrainStatus {
    if !in_progress {
        TerrainStatus::Idle
    } else if imported {
        TerrainStatus::Importing {
            caption: BUILDING_TERRAIN_TEXT,
        }
    } else {
        TerrainStatus::Importing {
            caption: UPDATING_TEXTURES_TEXT,
        }
    }
}

pub fn spawn_status_label(mut commands: Commands) {
    commands.spawn((
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(STATUS_LABEL_TOP),
            left: Val::Percent(50.0),
            margin: UiRect::left(Val::Px(-STATUS_LABEL_WIDTH / 2.0)),
            width: Val::Px(STATUS_LABEL_WIDTH),
            padding: UiRect::all(Val::Px(6.0)),
            justify_content: JustifyContent::Center,
            ..default()
        },
        Text::new(""),
        TextFont {
            font_size: STATUS_TEXT_SIZE,
            ..default()
        },
        TextColor(TEXT_COLOR),
        TextLayout::new_with_justify(JustifyText::Center),
        BackgroundColor(STATUS_BACKGROUND),
        Visibility::Hidden,
        StatusLabel,
    ));
}

/// Shows the label while derived data is being computed. Once the terrain settles,
/// freshly imported tiles are written to the tile cache.
pub fn update_terrain_status(
    group: Option<ResMut<TerrainGroup>>,
    mut label_query: Query<(&mut Text, &mut Visibility), With<StatusLabel>>,
    mut fatal_errors: EventWriter<FatalError>,
) {
    let Some(mut group) = group else {
        return;
    };

    let status = poll_terrain_status(group.is_derived_data_update_in_progress(), group.terrains_imported);

    for (mut text, mut visibility) in label_query.iter_mut() {
        match status {
            TerrainStatus::Importing { caption } => {
                if text.0 != caption {
                    text.0 = caption.to_string();
                }
                visibility.set_if_neq(Visibility::Visible);
            }
            TerrainStatus::Idle => {
                visibility.set_if_neq(Visibility::Hidden);
            }
        }
    }

    if status == TerrainStatus::Idle && group.terrains_imported {
        match group.save_all_terrains() {
            Ok(()) => info!("Imported terrain saved to the tile cache"),
            Err(err) => {
                fatal_errors.send(err.into());
            }
        }
        group.terrains_imported = false;
    }
}
