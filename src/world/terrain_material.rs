//! Splatted terrain material: the rock, grass and fungus textures mixed per pixel by
//! the tile's blend maps, plus the unlit composite used beyond the composite distance.

use bevy::image::{ImageAddressMode, ImageLoaderSettings, ImageSampler, ImageSamplerDescriptor};
use bevy::pbr::{ExtendedMaterial, MaterialExtension};
use bevy::prelude::*;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{AsBindGroup, Extent3d, ShaderRef, TextureDimension, TextureFormat};
use hashbrown::HashMap;

use crate::world::blend_map::BlendMap;
use crate::world::terrain_defaults::LayerSettings;
use crate::world::tile::{Terrain, TileCoord};

pub const SPLAT_SHADER_PATH: &str = "shaders/terrain_splat.wgsl";

/// Layers the splat shader mixes: a base layer and two blended over it.
pub const SPLAT_LAYERS: usize = 3;

pub type TerrainSplatMaterial = ExtendedMaterial<StandardMaterial, TerrainSplatExtension>;

/// Bindings 100+ sit after the standard material's own.
#[derive(Asset, AsBindGroup, Reflect, Debug, Clone)]
pub struct TerrainSplatExtension {
    /// Texture repeats per world unit, one lane per layer
    #[uniform(100)]
    pub layer_scales: Vec4,
    /// Blend weights of layers 1 and 2 in R and G
    #[texture(101)]
    #[sampler(102)]
    pub blend_map: Handle<Image>,
    // Every layer texture shares the base layer's repeating sampler
    #[texture(103)]
    #[sampler(104)]
    pub rock_diffuse: Handle<Image>,
    #[texture(105)]
    pub grass_diffuse: Handle<Image>,
    #[texture(106)]
    pub fungus_diffuse: Handle<Image>,
    #[texture(107)]
    pub rock_normal: Handle<Image>,
    #[texture(108)]
    pub grass_normal: Handle<Image>,
    #[texture(109)]
    pub fungus_normal: Handle<Image>,
}

impl MaterialExtension for TerrainSplatExtension {
    fn fragment_shader() -> ShaderRef {
        SPLAT_SHADER_PATH.into()
    }
}

/// Diffuse/specular and normal/height textures of the splatted layers.
#[derive(Debug, Clone, Default)]
pub struct LayerTextures {
    pub diffuse_specular: [Handle<Image>; SPLAT_LAYERS],
    pub normal_height: [Handle<Image>; SPLAT_LAYERS],
    pub scales: Vec4,
}

impl LayerTextures {
    pub fn splat_material(&self, blend_map: Handle<Image>) -> TerrainSplatMaterial {
        let [rock_diffuse, grass_diffuse, fungus_diffuse] = self.diffuse_specular.clone();
        let [rock_normal, grass_normal, fungus_normal] = self.normal_height.clone();
        ExtendedMaterial {
            base: StandardMaterial {
                perceptual_roughness: 0.9,
                reflectance: 0.2,
                ..default()
            },
            extension: TerrainSplatExtension {
                layer_scales: self.scales,
                blend_map,
                rock_diffuse,
                grass_diffuse,
                fungus_diffuse,
                rock_normal,
                grass_normal,
                fungus_normal,
            },
        }
    }
}

/// Repeat of each layer's texture in the world, as texture repeats per world unit.
pub fn layer_scales(layers: &[LayerSettings]) -> Vec4 {
    let mut scales = Vec4::ZERO;
    for (i, layer) in layers.iter().take(4).enumerate() {
        if layer.world_size > 0.0 {
            scales[i] = 1.0 / layer.world_size;
        }
    }
    scales
}

fn load_repeating(asset_server: &AssetServer, name: &str, is_srgb: bool) -> Handle<Image> {
    asset_server.load_with_settings(format!("textures/{name}"), move |settings: &mut ImageLoaderSettings| {
        settings.is_srgb = is_srgb;
        settings.sampler = ImageSampler::Descriptor(ImageSamplerDescriptor {
            address_mode_u: ImageAddressMode::Repeat,
            address_mode_v: ImageAddressMode::Repeat,
            ..ImageSamplerDescriptor::linear()
        });
    })
}

/// Starts loading every layer's texture pair. Missing layers fall back to the default image.
pub fn load_layer_textures(asset_server: &AssetServer, layers: &[LayerSettings]) -> LayerTextures {
    let mut textures = LayerTextures {
        scales: layer_scales(layers),
        ..default()
    };

    for (i, layer) in layers.iter().take(SPLAT_LAYERS).enumerate() {
        if let Some(name) = layer.diffuse_texture() {
            textures.diffuse_specular[i] = load_repeating(asset_server, name, true);
        }
        // Normal maps hold vectors, not colours
        if let Some(name) = layer.normal_height_texture() {
            textures.normal_height[i] = load_repeating(asset_server, name, false);
        }
    }

    if layers.len() > SPLAT_LAYERS {
        warn!("Only the first {} terrain layers are rendered, {} configured", SPLAT_LAYERS, layers.len());
    }
    textures
}

/// Packs up to four blend maps into one RGBA8 texture, map `i` in channel `i`.
pub fn blend_maps_to_image(blend_maps: &[BlendMap]) -> Image {
    let size = blend_maps.first().map_or(1, |map| map.size().max(1)) as usize;

    let mut raw = vec![0u8; size * size * 4];
    for (channel, map) in blend_maps.iter().take(4).enumerate() {
        if map.size() as usize != size {
            warn!("Blend map {} is {}x{}, expected {}x{}", channel, map.size(), map.size(), size, size);
            continue;
        }
        for (texel, weight) in map.weights().iter().enumerate() {
            raw[texel * 4 + channel] = (weight.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }

    let mut image = Image::new(
        Extent3d {
            width: size as u32,
            height: size as u32,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        raw,
        TextureFormat::Rgba8Unorm,
        RenderAssetUsages::default(),
    );
    image.sampler = ImageSampler::Descriptor(ImageSamplerDescriptor {
        address_mode_u: ImageAddressMode::ClampToEdge,
        address_mode_v: ImageAddressMode::ClampToEdge,
        ..ImageSamplerDescriptor::linear()
    });
    image
}

/// Shared terrain materials: one splat material per tile up close and a single
/// unlit composite material showing the baked vertex colours far away.
#[derive(Resource, Debug, Clone, Default)]
pub struct TerrainMaterials {
    pub layers: LayerTextures,
    pub composite: Handle<StandardMaterial>,
    pub detail: HashMap<TileCoord, Handle<TerrainSplatMaterial>>,
}

impl TerrainMaterials {
    pub fn new(layers: LayerTextures, composite: Handle<StandardMaterial>) -> Self {
        Self {
            layers,
            composite,
            detail: HashMap::new(),
        }
    }

    /// Uploads the tile's current blend maps and returns its splat material. Later calls
    /// replace the blend texture of the existing material.
    pub fn refresh_tile(
        &mut self,
        terrain: &Terrain,
        images: &mut Assets<Image>,
        splat_materials: &mut Assets<TerrainSplatMaterial>,
    ) -> Handle<TerrainSplatMaterial> {
        let image = blend_maps_to_image(&terrain.blend_maps);

        if let Some(handle) = self.detail.get(&terrain.coord) {
            // Touching the material re-prepares its bind group with the new texture
            if let Some(material) = splat_materials.get_mut(handle) {
                images.insert(&material.extension.blend_map, image);
                return handle.clone();
            }
        }

        let blend_map = images.add(image);
        let handle = splat_materials.add(self.layers.splat_material(blend_map));
        self.detail.insert(terrain.coord, handle.clone());
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tile::Heightmap;

    fn blend(size: u16, weight: f32) -> BlendMap {
        BlendMap::from_weights(size, vec![weight; size as usize * size as usize]).unwrap()
    }

    fn tile_with(maps: Vec<BlendMap>) -> Terrain {
        Terrain::new(
            TileCoord::new(0, 0),
            Vec3::ZERO,
            40.0,
            Heightmap::flat(5, 0.0),
            Vec::new(),
            maps,
        )
    }

    #[test]
    fn blend_maps_fill_one_channel_each() {
        let image = blend_maps_to_image(&[blend(4, 1.0), blend(4, 0.5)]);

        assert_eq!(image.texture_descriptor.size.width, 4);
        assert_eq!(image.texture_descriptor.format, TextureFormat::Rgba8Unorm);
        assert_eq!(image.data.len(), 4 * 4 * 4);
        assert!(image.data.chunks(4).all(|texel| texel == [255, 128, 0, 0]));
    }

    #[test]
    fn mismatched_blend_map_is_left_empty() {
        let image = blend_maps_to_image(&[blend(4, 0.25), blend(2, 1.0)]);
        assert!(image.data.chunks(4).all(|texel| texel == [64, 0, 0, 0]));
    }

    #[test]
    fn tile_without_blend_maps_gets_a_blank_texel() {
        let image = blend_maps_to_image(&[]);
        assert_eq!(image.data, vec![0, 0, 0, 0]);
    }

    #[test]
    fn scales_follow_layer_world_sizes() {
        let layers = [
            LayerSettings::new(100.0, "a.dds", "b.dds", LinearRgba::WHITE),
            LayerSettings::new(30.0, "c.dds", "d.dds", LinearRgba::WHITE),
            LayerSettings::new(200.0, "e.dds", "f.dds", LinearRgba::WHITE),
        ];
        let scales = layer_scales(&layers);
        assert!((scales - Vec4::new(0.01, 1.0 / 30.0, 0.005, 0.0)).length() < 1e-7);
    }

    #[test]
    fn refreshing_a_tile_reuses_its_material() {
        let mut images = Assets::<Image>::default();
        let mut splats = Assets::<TerrainSplatMaterial>::default();
        let mut materials = TerrainMaterials::default();

        let first = materials.refresh_tile(&tile_with(vec![blend(4, 0.0)]), &mut images, &mut splats);
        let second = materials.refresh_tile(&tile_with(vec![blend(4, 1.0)]), &mut images, &mut splats);

        assert_eq!(first, second);
        assert_eq!(splats.len(), 1);
        assert_eq!(images.len(), 1);
        let blend_map = &splats.get(&second).unwrap().extension.blend_map;
        assert_eq!(images.get(blend_map).unwrap().data[0], 255);
    }
}
