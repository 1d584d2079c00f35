//! Scene bootstrap: camera, light, sky, and the terrain group with its materials.

use bevy::prelude::*;

use crate::core::components::{MainCamera, SunLight};
use crate::core::config::DemoConfig;
use crate::core::constants::{scene::*, terrain::*};
use crate::core::error::{FatalError, Result};
use crate::world::blend_map::{paint_blend_maps, DEFAULT_BLEND_RULES};
use crate::world::heightmap::FsHeightmapSource;
use crate::world::terrain_defaults::{configure_terrain_defaults, TerrainGlobalOptions};
use crate::world::terrain_group::TerrainGroup;
use crate::world::terrain_material::{load_layer_textures, TerrainMaterials};
use crate::world::tile::TileCoord;
use crate::world::tile_store::{FilenameConvention, FsTileStore};

pub fn setup_scene(mut commands: Commands) {
    let rotation = Quat::from_rotation_y(CAMERA_START_YAW_DEGREES.to_radians())
        * Quat::from_rotation_x(CAMERA_START_PITCH_DEGREES.to_radians());

    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            far: CAMERA_FAR_PLANE,
            ..default()
        }),
        Transform::from_translation(CAMERA_START).with_rotation(rotation),
        MainCamera,
        Name::new("MainCamera"),
    ));

    commands.spawn((
        DirectionalLight {
            color: LIGHT_DIFFUSE,
            illuminance: LIGHT_ILLUMINANCE,
            ..default()
        },
        Transform::default().looking_to(LIGHT_DIRECTION, Vec3::Y),
        SunLight,
        Name::new("SunLight"),
    ));

    commands.insert_resource(AmbientLight {
        color: AMBIENT_COLOR,
        brightness: AMBIENT_BRIGHTNESS,
    });
    commands.insert_resource(ClearColor(SKY_COLOR));

    info!("Scene setup complete");
}

/// Defines every tile in the inclusive grid, loads them, paints blend maps on
/// imported ones and drops the import buffers.
pub fn build_terrain_group(group: &mut TerrainGroup, grid_min: (i32, i32), grid_max: (i32, i32)) -> Result<()> {
    for x in grid_min.0..=grid_max.0 {
        for y in grid_min.1..=grid_max.1 {
            group.define_tile(TileCoord::new(x, y))?;
        }
    }

    group.load_all_terrains()?;

    if group.terrains_imported {
        for terrain in group.terrains_mut() {
            paint_blend_maps(terrain, &DEFAULT_BLEND_RULES);
        }
    }

    group.free_temporary_resources();
    Ok(())
}

/// Direction the sun shines in and its colour, which the composite lighting is baked from.
pub fn scene_light(transform: &Transform, light: &DirectionalLight) -> (Vec3, Color) {
    (*transform.forward(), light.color)
}

fn create_terrain_group(
    config: &DemoConfig,
    light_direction: Vec3,
    light_diffuse: Color,
) -> Result<(TerrainGroup, TerrainGlobalOptions)> {
    let (globals, import_settings) = configure_terrain_defaults(light_direction, light_diffuse, AMBIENT_COLOR);

    let mut group = TerrainGroup::new(
        import_settings.terrain_size,
        import_settings.world_size,
        FilenameConvention::new(&config.filename_prefix, &config.filename_extension),
        FsTileStore::new(&config.tile_cache_dir),
        FsHeightmapSource::new(&config.asset_root, &config.heightmap_name),
    );
    group.set_origin(Vec3::ZERO);
    *group.default_import_settings_mut() = import_settings;

    build_terrain_group(&mut group, GRID_MIN, GRID_MAX)?;
    Ok((group, globals))
}

fn create_terrain_materials(
    group: &TerrainGroup,
    asset_server: &AssetServer,
    materials: &mut Assets<StandardMaterial>,
) -> TerrainMaterials {
    let layers = load_layer_textures(asset_server, &group.default_import_settings().layers);
    let composite = materials.add(StandardMaterial {
        perceptual_roughness: 0.9,
        unlit: true,
        ..default()
    });

    TerrainMaterials::new(layers, composite)
}

/// Builds the terrain at startup. Any failure is fatal.
pub fn build_terrain(
    mut commands: Commands,
    config: Res<DemoConfig>,
    asset_server: Res<AssetServer>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    sun: Query<(&Transform, &DirectionalLight), With<SunLight>>,
    mut fatal_errors: EventWriter<FatalError>,
) {
    let (light_direction, light_diffuse) = match sun.get_single() {
        Ok((transform, light)) => scene_light(transform, light),
        Err(_) => {
            warn!("No sun light in the scene, baking terrain lighting from the default direction");
            (LIGHT_DIRECTION, LIGHT_DIFFUSE)
        }
    };

    let (group, globals) = match create_terrain_group(&config, light_direction, light_diffuse) {
        Ok(built) => built,
        Err(err) => {
            fatal_errors.send(err.into());
            return;
        }
    };

    let terrain_materials = create_terrain_materials(&group, &asset_server, &mut materials);
    info!(
        "Terrain group ready: {} tiles, imported: {}",
        group.terrains().count(),
        group.terrains_imported
    );

    commands.insert_resource(globals);
    commands.insert_resource(terrain_materials);
    commands.insert_resource(group);
}

/// Releases the terrain group when the app is shutting down.
pub fn teardown_terrain(mut app_exit: EventReader<AppExit>, mut commands: Commands) {
    if app_exit.read().next().is_none() {
        return;
    }

    commands.remove_resource::<TerrainGroup>();
    commands.remove_resource::<TerrainGlobalOptions>();
    commands.remove_resource::<TerrainMaterials>();
    info!("Terrain group destroyed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::derived_data::DerivedState;
    use crate::world::terrain_group::tests::{flat_source, group_with, small_settings};
    use crate::world::tile_store::MemoryTileStore;

    #[test]
    fn imported_tiles_get_painted_and_freed() {
        // Flat at 100: grass is three quarters into its fade band, fungus is past its band
        let mut group = group_with(small_settings(), MemoryTileStore::default(), flat_source(1.0));
        build_terrain_group(&mut group, (0, 0), (1, 0)).unwrap();

        assert!(group.terrains_imported);
        assert_eq!(group.terrains().count(), 2);
        assert!(group.slots().all(|slot| slot.definition.is_none()));
        for terrain in group.terrains() {
            assert_eq!(terrain.derived_state, DerivedState::Dirty);
            for (layer, expected) in [(1, 0.75), (2, 1.0)] {
                let map = terrain.layer_blend_map(layer).unwrap();
                assert!(map.weights().iter().all(|&w| (w - expected).abs() < 1e-6));
            }
        }
    }

    #[test]
    fn cached_tiles_keep_their_stored_blend_maps() {
        let store = MemoryTileStore::default();
        let mut first = group_with(small_settings(), store.clone(), flat_source(0.2));
        build_terrain_group(&mut first, (0, 0), (0, 0)).unwrap();
        first.save_all_terrains().unwrap();

        // Same cache, much higher heightmap: the cached tile must not be repainted
        let mut second = group_with(small_settings(), store, flat_source(1.0));
        build_terrain_group(&mut second, (0, 0), (0, 0)).unwrap();

        assert!(!second.terrains_imported);
        let terrain = second.terrain(TileCoord::new(0, 0)).unwrap();
        assert!((terrain.heightmap.get(0, 0) - 20.0).abs() < 1e-4);
        let grass = terrain.layer_blend_map(1).unwrap();
        assert!(grass.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn terrain_lighting_comes_from_the_spawned_sun() {
        let mut app = App::new();
        app.add_systems(Startup, setup_scene);
        app.update();

        let mut sun = app
            .world_mut()
            .query_filtered::<(&Transform, &DirectionalLight), With<SunLight>>();
        let (transform, light) = sun.single(app.world());
        let (direction, diffuse) = scene_light(transform, light);
        assert!((direction - LIGHT_DIRECTION.normalize()).length() < 1e-5);
        assert_eq!(diffuse, LIGHT_DIFFUSE);

        let (globals, _) = configure_terrain_defaults(direction, diffuse, AMBIENT_COLOR);
        assert!((globals.light_map_direction - LIGHT_DIRECTION.normalize()).length() < 1e-5);
        assert_eq!(globals.composite_map_ambient, LinearRgba::rgb(0.5, 0.5, 0.5));
    }
}
