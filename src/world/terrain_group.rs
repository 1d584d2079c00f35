//! The terrain group: owns every tile of the scene, decides whether each one is
//! imported or read back from the tile cache, and answers height and ray queries.

use bevy::prelude::*;
use hashbrown::HashMap;

use crate::core::error::{Result, TerrainError};
use crate::world::blend_map::BlendMap;
use crate::world::derived_data::DerivedState;
use crate::world::heightmap::HeightmapSource;
use crate::world::terrain_defaults::ImportSettings;
use crate::world::tile::{Heightmap, Terrain, TileCoord};
use crate::world::tile_store::{FilenameConvention, TileFile, TileStore, TILE_FILE_VERSION};

const RAY_REFINE_STEPS: usize = 20;

/// How a defined slot gets its data when terrains are loaded.
#[derive(Debug, Clone)]
pub enum TileDefinition {
    /// Read back from the tile cache
    Cached,
    /// Built from an imported heightmap; freed by `free_temporary_resources`
    Import(Heightmap),
}

#[derive(Debug)]
pub struct TerrainSlot {
    pub coord: TileCoord,
    pub definition: Option<TileDefinition>,
    pub instance: Option<Terrain>,
}

/// Owns every tile for the scene's lifetime. Inserted as a resource when the scene
/// is built and removed when it is torn down.
#[derive(Resource)]
pub struct TerrainGroup {
    terrain_size: u16,
    world_size: f32,
    origin: Vec3,
    convention: FilenameConvention,
    import_settings: ImportSettings,
    store: Box<dyn TileStore>,
    heightmaps: Box<dyn HeightmapSource>,
    slots: HashMap<TileCoord, TerrainSlot>,
    /// True once any tile of this session was imported instead of read from the cache
    pub terrains_imported: bool,
}

impl TerrainGroup {
    pub fn new(
        terrain_size: u16,
        world_size: f32,
        convention: FilenameConvention,
        store: impl TileStore,
        heightmaps: impl HeightmapSource,
    ) -> Self {
        Self {
            terrain_size,
            world_size,
            origin: Vec3::ZERO,
            convention,
            import_settings: ImportSettings::default(),
            store: Box::new(store),
            heightmaps: Box::new(heightmaps),
            slots: HashMap::new(),
            terrains_imported: false,
        }
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    pub fn default_import_settings(&self) -> &ImportSettings {
        &self.import_settings
    }

    pub fn default_import_settings_mut(&mut self) -> &mut ImportSettings {
        &mut self.import_settings
    }

    pub fn terrain_size(&self) -> u16 {
        self.terrain_size
    }

    pub fn world_size(&self) -> f32 {
        self.world_size
    }

    pub fn generate_filename(&self, coord: TileCoord) -> String {
        self.convention.generate_filename(coord)
    }

    /// World-space center of a slot.
    pub fn slot_position(&self, coord: TileCoord) -> Vec3 {
        self.origin + Vec3::new(coord.x as f32 * self.world_size, 0.0, -(coord.y as f32) * self.world_size)
    }

    pub fn slot_at_world(&self, x: f32, z: f32) -> TileCoord {
        TileCoord::new(
            ((x - self.origin.x) / self.world_size).round() as i32,
            (-(z - self.origin.z) / self.world_size).round() as i32,
        )
    }

    /// Defines a slot from the tile cache when its file exists, otherwise imports the
    /// heightmap (mirrored on odd coordinates) and raises the import flag.
    pub fn define_tile(&mut self, coord: TileCoord) -> Result<()> {
        let filename = self.generate_filename(coord);

        let definition = if self.store.exists(&filename) {
            debug!("Tile {} will load from cache {}", coord, filename);
            TileDefinition::Cached
        } else {
            let (flip_x, flip_y) = coord.mirror_flags();
            let image = self.heightmaps.load(flip_x, flip_y)?;
            let heightmap = Heightmap::from_image(
                &image,
                self.terrain_size,
                self.import_settings.input_scale,
            );
            self.terrains_imported = true;
            info!("Tile {} imported from heightmap ({}x{})", coord, image.width(), image.height());
            TileDefinition::Import(heightmap)
        };

        self.slots.insert(
            coord,
            TerrainSlot {
                coord,
                definition: Some(definition),
                instance: None,
            },
        );
        Ok(())
    }

    /// Loads every defined slot. Always blocks until all tiles are in place.
    pub fn load_all_terrains(&mut self) -> Result<()> {
        let pending: Vec<TileCoord> = self
            .slots
            .values()
            .filter(|slot| slot.instance.is_none() && slot.definition.is_some())
            .map(|slot| slot.coord)
            .collect();

        for coord in pending {
            let terrain = self.load_slot(coord)?;
            if let Some(slot) = self.slots.get_mut(&coord) {
                slot.instance = Some(terrain);
            }
        }

        info!("Loaded {} terrain tiles", self.slots.len());
        Ok(())
    }

    fn load_slot(&self, coord: TileCoord) -> Result<Terrain> {
        let filename = self.generate_filename(coord);
        let layers = self.import_settings.layers.clone();
        let blend_layers = layers.len().saturating_sub(1);
        let position = self.slot_position(coord);

        let definition = self
            .slots
            .get(&coord)
            .and_then(|slot| slot.definition.as_ref())
            .ok_or_else(|| TerrainError::TileMissing(filename.clone()))?;

        let (heightmap, blend_maps) = match definition {
            TileDefinition::Import(heightmap) => {
                let blend_maps = (0..blend_layers)
                    .map(|_| BlendMap::new(self.import_settings.blend_map_size))
                    .collect();
                (heightmap.clone(), blend_maps)
            }
            TileDefinition::Cached => {
                let bytes = self.store.read(&filename)?;
                let file = TileFile::decode(&filename, &bytes)?;
                self.tile_from_file(&filename, file, blend_layers)?
            }
        };

        Ok(Terrain::new(
            coord,
            position,
            self.world_size,
            heightmap,
            layers,
            blend_maps,
        ))
    }

    fn tile_from_file(
        &self,
        filename: &str,
        file: TileFile,
        blend_layers: usize,
    ) -> Result<(Heightmap, Vec<BlendMap>)> {
        let mismatch = |reason: String| TerrainError::TileMismatch {
            name: filename.to_string(),
            reason,
        };

        if file.size != self.terrain_size {
            return Err(mismatch(format!(
                "size {} (expected {})",
                file.size, self.terrain_size
            )));
        }
        if (file.world_size - self.world_size).abs() > f32::EPSILON * self.world_size {
            return Err(mismatch(format!(
                "world size {} (expected {})",
                file.world_size, self.world_size
            )));
        }
        if file.blend_maps.len() != blend_layers {
            return Err(mismatch(format!(
                "{} blend maps (expected {})",
                file.blend_maps.len(),
                blend_layers
            )));
        }

        let heightmap = Heightmap::new(file.size, file.heights)
            .ok_or_else(|| mismatch("truncated heights".to_string()))?;
        let blend_maps = file
            .blend_maps
            .into_iter()
            .map(|weights| BlendMap::from_weights(file.blend_map_size, weights))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| mismatch("truncated blend map".to_string()))?;

        Ok((heightmap, blend_maps))
    }

    /// Writes every loaded tile to the tile cache.
    pub fn save_all_terrains(&self) -> Result<()> {
        for terrain in self.terrains() {
            let filename = self.generate_filename(terrain.coord);
            let file = TileFile {
                version: TILE_FILE_VERSION,
                coord: terrain.coord,
                size: terrain.size(),
                world_size: terrain.world_size,
                heights: terrain.heightmap.heights().to_vec(),
                blend_map_size: terrain.layer_blend_map_size(),
                blend_maps: terrain
                    .blend_maps
                    .iter()
                    .map(|map| map.weights().to_vec())
                    .collect(),
            };
            self.store.write(&filename, &file.encode(&filename)?)?;
        }
        Ok(())
    }

    /// Drops the import buffers of tiles that finished loading.
    pub fn free_temporary_resources(&mut self) {
        for slot in self.slots.values_mut() {
            if slot.instance.is_some() {
                slot.definition = None;
            }
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = &TerrainSlot> {
        self.slots.values()
    }

    pub fn terrains(&self) -> impl Iterator<Item = &Terrain> {
        self.slots.values().filter_map(|slot| slot.instance.as_ref())
    }

    pub fn terrains_mut(&mut self) -> impl Iterator<Item = &mut Terrain> {
        self.slots.values_mut().filter_map(|slot| slot.instance.as_mut())
    }

    pub fn terrain(&self, coord: TileCoord) -> Option<&Terrain> {
        self.slots.get(&coord).and_then(|slot| slot.instance.as_ref())
    }

    pub fn terrain_mut(&mut self, coord: TileCoord) -> Option<&mut Terrain> {
        self.slots.get_mut(&coord).and_then(|slot| slot.instance.as_mut())
    }

    pub fn is_derived_data_update_in_progress(&self) -> bool {
        self.terrains()
            .any(|terrain| terrain.derived_state != DerivedState::Ready)
    }

    pub fn height_at_world_position(&self, position: Vec3) -> Option<f32> {
        let coord = self.slot_at_world(position.x, position.z);
        self.terrain(coord)?
            .height_at_world_position(position.x, position.z)
    }

    /// Box around every loaded tile.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.terrains().fold(None, |bounds, terrain| {
            let half = terrain.world_size * 0.5;
            let (low, high) = terrain.height_range;
            let min = Vec3::new(terrain.position.x - half, terrain.position.y + low, terrain.position.z - half);
            let max = Vec3::new(terrain.position.x + half, terrain.position.y + high, terrain.position.z + half);
            Some(match bounds {
                Some((lo, hi)) => (lo.min(min), hi.max(max)),
                None => (min, max),
            })
        })
    }

    /// First point where the ray meets the terrain surface.
    pub fn ray_intersects(&self, ray: Ray3d) -> Option<Vec3> {
        let (min, max) = self.bounds()?;
        // Pad vertically so perfectly flat terrain still has a box to enter
        let min = min - Vec3::Y;
        let max = max + Vec3::Y;

        let origin = ray.origin;
        let direction = *ray.direction;
        let mut t_enter = 0.0f32;
        let mut t_exit = f32::MAX;
        for axis in 0..3 {
            let (o, d) = (origin[axis], direction[axis]);
            if d.abs() < 1e-6 {
                if o < min[axis] || o > max[axis] {
                    return None;
                }
            } else {
                let a = (min[axis] - o) / d;
                let b = (max[axis] - o) / d;
                t_enter = t_enter.max(a.min(b));
                t_exit = t_exit.min(a.max(b));
            }
        }
        if t_enter > t_exit {
            return None;
        }

        let clearance = |t: f32| {
            let point = ray.get_point(t);
            self.height_at_world_position(point).map(|h| point.y - h)
        };

        let step = (self.world_size / (self.terrain_size.max(2) - 1) as f32) * 0.5;
        let mut prev_t = t_enter;
        let mut prev = clearance(t_enter);
        if matches!(prev, Some(c) if c <= 0.0) {
            return self.surface_point(ray.get_point(t_enter));
        }

        let mut t = t_enter;
        while t < t_exit {
            t = (t + step).min(t_exit);
            let current = clearance(t);
            if let Some(c) = current {
                if c <= 0.0 {
                    if prev.is_none() {
                        return self.surface_point(ray.get_point(t));
                    }
                    let (mut lo, mut hi) = (prev_t, t);
                    for _ in 0..RAY_REFINE_STEPS {
                        let mid = (lo + hi) * 0.5;
                        if clearance(mid).map_or(true, |c| c > 0.0) {
                            lo = mid;
                        } else {
                            hi = mid;
                        }
                    }
                    return self.surface_point(ray.get_point(hi));
                }
            }
            prev_t = t;
            prev = current;
        }
        None
    }

    fn surface_point(&self, point: Vec3) -> Option<Vec3> {
        self.height_at_world_position(point)
            .map(|height| Vec3::new(point.x, height, point.z))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::world::heightmap::HeightImage;
    use crate::world::terrain_defaults::LayerSettings;
    use crate::world::tile_store::MemoryTileStore;
    use std::sync::{Arc, Mutex};

    /// Serves a fixed image and remembers which mirror flags were requested.
    #[derive(Clone)]
    pub(crate) struct StaticHeightmap {
        image: HeightImage,
        pub requests: Arc<Mutex<Vec<(bool, bool)>>>,
    }

    impl StaticHeightmap {
        pub(crate) fn new(image: HeightImage) -> Self {
            Self {
                image,
                requests: Arc::default(),
            }
        }

        pub(crate) fn requests(&self) -> Vec<(bool, bool)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HeightmapSource for StaticHeightmap {
        fn load(&self, flip_x: bool, flip_y: bool) -> Result<HeightImage> {
            self.requests.lock().unwrap().push((flip_x, flip_y));
            Ok(self.image.clone())
        }
    }

    pub(crate) fn group_with(
        settings: ImportSettings,
        store: MemoryTileStore,
        heightmaps: StaticHeightmap,
    ) -> TerrainGroup {
        let mut group = TerrainGroup::new(
            settings.terrain_size,
            settings.world_size,
            FilenameConvention::new("TestTerrain", "dat"),
            store,
            heightmaps,
        );
        *group.default_import_settings_mut() = settings;
        group
    }

    pub(crate) fn small_settings() -> ImportSettings {
        ImportSettings {
            terrain_size: 5,
            world_size: 100.0,
            input_scale: 100.0,
            min_batch_size: 3,
            max_batch_size: 5,
            blend_map_size: 8,
            layers: vec![
                LayerSettings::new(10.0, "rock.dds", "rock_n.dds", LinearRgba::WHITE),
                LayerSettings::new(10.0, "grass.dds", "grass_n.dds", LinearRgba::BLACK),
                LayerSettings::new(10.0, "fungus.dds", "fungus_n.dds", LinearRgba::BLACK),
            ],
        }
    }

    /// Uniform grey heightmap: every tile is flat at `level * input_scale`.
    pub(crate) fn flat_source(level: f32) -> StaticHeightmap {
        StaticHeightmap::new(HeightImage::new(2, 2, vec![level; 4]).unwrap())
    }

    #[test]
    fn uncached_tiles_import_with_parity_mirroring() {
        let source = flat_source(0.5);
        let mut group = group_with(small_settings(), MemoryTileStore::default(), source.clone());

        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1), (-1, 2)] {
            group.define_tile(TileCoord::new(x, y)).unwrap();
        }

        assert!(group.terrains_imported);
        assert_eq!(
            source.requests(),
            vec![(false, false), (true, false), (false, true), (true, true), (true, false)]
        );
    }

    #[test]
    fn cached_tiles_skip_the_import() {
        let store = MemoryTileStore::default();
        let mut seeded = group_with(small_settings(), store.clone(), flat_source(0.5));
        seeded.define_tile(TileCoord::new(1, 1)).unwrap();
        seeded.load_all_terrains().unwrap();
        seeded.save_all_terrains().unwrap();

        let source = flat_source(0.9);
        let mut group = group_with(small_settings(), store, source.clone());
        group.define_tile(TileCoord::new(1, 1)).unwrap();

        assert!(!group.terrains_imported);
        assert!(source.requests().is_empty());

        group.load_all_terrains().unwrap();
        let terrain = group.terrain(TileCoord::new(1, 1)).unwrap();
        assert!((terrain.heightmap.get(2, 2) - 50.0).abs() < 1e-4);
        assert_eq!(terrain.blend_maps.len(), 2);
    }

    #[test]
    fn saved_tiles_keep_their_blend_maps() {
        let store = MemoryTileStore::default();
        let mut group = group_with(small_settings(), store.clone(), flat_source(0.2));
        group.define_tile(TileCoord::new(0, 0)).unwrap();
        group.load_all_terrains().unwrap();
        group
            .terrain_mut(TileCoord::new(0, 0))
            .and_then(|t| t.layer_blend_map_mut(2))
            .unwrap()
            .blend_pointer()
            .fill(0.75);
        group.save_all_terrains().unwrap();
        assert_eq!(store.names(), vec!["TestTerrain_00000000.dat".to_string()]);

        let mut reloaded = group_with(small_settings(), store, flat_source(0.2));
        reloaded.define_tile(TileCoord::new(0, 0)).unwrap();
        reloaded.load_all_terrains().unwrap();
        let map = reloaded
            .terrain(TileCoord::new(0, 0))
            .and_then(|t| t.layer_blend_map(2))
            .unwrap();
        assert!(map.weights().iter().all(|&w| w == 0.75));
    }

    #[test]
    fn cached_tile_with_other_size_is_rejected() {
        let store = MemoryTileStore::default();
        let mut seeded = group_with(small_settings(), store.clone(), flat_source(0.5));
        seeded.define_tile(TileCoord::new(0, 0)).unwrap();
        seeded.load_all_terrains().unwrap();
        seeded.save_all_terrains().unwrap();

        let settings = ImportSettings {
            terrain_size: 9,
            ..small_settings()
        };
        let mut group = group_with(settings, store, flat_source(0.5));
        group.define_tile(TileCoord::new(0, 0)).unwrap();
        assert!(matches!(
            group.load_all_terrains(),
            Err(TerrainError::TileMismatch { .. })
        ));
    }

    #[test]
    fn free_temporary_resources_drops_import_buffers() {
        let mut group = group_with(small_settings(), MemoryTileStore::default(), flat_source(0.5));
        group.define_tile(TileCoord::new(0, 0)).unwrap();
        assert!(matches!(
            group.slots().next().unwrap().definition,
            Some(TileDefinition::Import(_))
        ));

        group.load_all_terrains().unwrap();
        group.free_temporary_resources();

        let slot = group.slots().next().unwrap();
        assert!(slot.definition.is_none());
        assert!(slot.instance.is_some());
    }

    #[test]
    fn loaded_tiles_start_with_derived_data_pending() {
        let mut group = group_with(small_settings(), MemoryTileStore::default(), flat_source(0.5));
        group.define_tile(TileCoord::new(0, 0)).unwrap();
        assert!(!group.is_derived_data_update_in_progress());

        group.load_all_terrains().unwrap();
        assert!(group.is_derived_data_update_in_progress());

        for terrain in group.terrains_mut() {
            terrain.derived_state = DerivedState::Ready;
        }
        assert!(!group.is_derived_data_update_in_progress());
    }

    #[test]
    fn slots_are_laid_out_along_x_and_negative_z() {
        let group = group_with(small_settings(), MemoryTileStore::default(), flat_source(0.5));
        assert_eq!(group.slot_position(TileCoord::new(1, 2)), Vec3::new(100.0, 0.0, -200.0));
        assert_eq!(group.slot_at_world(95.0, -210.0), TileCoord::new(1, 2));
        assert_eq!(group.slot_at_world(40.0, 40.0), TileCoord::new(0, 0));
    }

    #[test]
    fn downward_ray_hits_flat_terrain() {
        let mut group = group_with(small_settings(), MemoryTileStore::default(), flat_source(0.5));
        group.define_tile(TileCoord::new(0, 0)).unwrap();
        group.load_all_terrains().unwrap();

        let ray = Ray3d::new(Vec3::new(10.0, 5000.0, -20.0), Dir3::NEG_Y);
        let hit = group.ray_intersects(ray).unwrap();
        assert!((hit - Vec3::new(10.0, 50.0, -20.0)).length() < 1e-3);

        assert_eq!(group.height_at_world_position(hit), Some(50.0));
    }

    #[test]
    fn slanted_ray_hits_sloped_terrain() {
        // Left image column low, right column high: heights rise along +X
        let source = StaticHeightmap::new(HeightImage::new(2, 2, vec![0.0, 1.0, 0.0, 1.0]).unwrap());
        let mut group = group_with(small_settings(), MemoryTileStore::default(), source);
        group.define_tile(TileCoord::new(0, 0)).unwrap();
        group.load_all_terrains().unwrap();

        let direction = Dir3::new(Vec3::new(1.0, -1.0, 0.0)).unwrap();
        let ray = Ray3d::new(Vec3::new(-50.0, 150.0, 0.0), direction);
        let hit = group.ray_intersects(ray).unwrap();

        // Surface is h = x + 50 and the ray is y = 100 - x, so they meet at x = 25
        assert!((hit.x - 25.0).abs() < 0.5, "hit at {hit:?}");
        assert!((hit.y - 75.0).abs() < 0.5, "hit at {hit:?}");
    }

    #[test]
    fn rays_that_miss_return_none() {
        let mut group = group_with(small_settings(), MemoryTileStore::default(), flat_source(0.5));
        assert_eq!(group.ray_intersects(Ray3d::new(Vec3::Y * 100.0, Dir3::NEG_Y)), None);

        group.define_tile(TileCoord::new(0, 0)).unwrap();
        group.load_all_terrains().unwrap();

        // Pointing up, and passing beside the tile
        assert_eq!(group.ray_intersects(Ray3d::new(Vec3::Y * 100.0, Dir3::Y)), None);
        assert_eq!(
            group.ray_intersects(Ray3d::new(Vec3::new(500.0, 100.0, 0.0), Dir3::NEG_Y)),
            None
        );
    }
}
