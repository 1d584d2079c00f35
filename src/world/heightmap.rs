//! Heightmap image loading.
//!
//! Terrain import needs the pixels synchronously during startup, so this bypasses the
//! asset server and decodes the image directly from the asset root.

use std::path::PathBuf;

use bevy::prelude::*;
use image::imageops;

use crate::core::error::{Result, TerrainError};

/// Normalized luminance samples, row-major with row 0 at the top of the image.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightImage {
    width: u32,
    height: u32,
    samples: Vec<f32>,
}

impl HeightImage {
    pub fn new(width: u32, height: u32, samples: Vec<f32>) -> Option<Self> {
        (width > 0 && height > 0 && samples.len() == width as usize * height as usize).then_some(
            Self {
                width,
                height,
                samples,
            },
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        self.samples[y * self.width as usize + x]
    }

    /// Bilinear sample at normalized image coordinates, `v = 0` being the top row.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        let fx = u.clamp(0.0, 1.0) * (self.width - 1) as f32;
        let fy = v.clamp(0.0, 1.0) * (self.height - 1) as f32;
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let ax = fx - x0 as f32;
        let ay = fy - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - ax) + self.get(x0 + 1, y0) * ax;
        let bottom = self.get(x0, y0 + 1) * (1.0 - ax) + self.get(x0 + 1, y0 + 1) * ax;
        top * (1.0 - ay) + bottom * ay
    }
}

/// Provides the heightmap used to import tiles that have no cached data.
pub trait HeightmapSource: Send + Sync + 'static {
    /// Loads the heightmap, mirrored left-right when `flip_x` and top-bottom when `flip_y`.
    fn load(&self, flip_x: bool, flip_y: bool) -> Result<HeightImage>;
}

/// Reads a heightmap file relative to the asset root.
#[derive(Debug, Clone)]
pub struct FsHeightmapSource {
    pub asset_root: PathBuf,
    pub name: String,
}

impl FsHeightmapSource {
    pub fn new(asset_root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            asset_root: asset_root.into(),
            name: name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.asset_root.join(&self.name)
    }
}

impl HeightmapSource for FsHeightmapSource {
    fn load(&self, flip_x: bool, flip_y: bool) -> Result<HeightImage> {
        let path = self.path();
        let decoded = image::open(&path).map_err(|source| TerrainError::Heightmap {
            path: path.clone(),
            source,
        })?;

        let mut luma = decoded.into_luma16();
        if flip_x {
            imageops::flip_horizontal_in_place(&mut luma);
        }
        if flip_y {
            imageops::flip_vertical_in_place(&mut luma);
        }

        let (width, height) = luma.dimensions();
        let samples = luma
            .pixels()
            .map(|pixel| pixel.0[0] as f32 / u16::MAX as f32)
            .collect();

        debug!(
            "Loaded heightmap {:?} ({}x{}, flip_x: {}, flip_y: {})",
            path, width, height, flip_x, flip_y
        );

        HeightImage::new(width, height, samples).ok_or_else(|| TerrainError::Heightmap {
            path,
            source: image::ImageError::Limits(image::error::LimitError::from_kind(
                image::error::LimitErrorKind::DimensionError,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_test_png(dir: &std::path::Path) {
        // 2x2: top-left white, everything else black
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(0, 0, Luma([255]));
        img.save(dir.join("terrain.png")).unwrap();
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "terrain-demo-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_and_normalizes_png() {
        let dir = scratch_dir("heightmap-load");
        write_test_png(&dir);

        let source = FsHeightmapSource::new(&dir, "terrain.png");
        let image = source.load(false, false).unwrap();

        assert_eq!((image.width(), image.height()), (2, 2));
        assert!((image.get(0, 0) - 1.0).abs() < 1e-6);
        assert_eq!(image.get(1, 1), 0.0);
    }

    #[test]
    fn flips_mirror_the_image() {
        let dir = scratch_dir("heightmap-flip");
        write_test_png(&dir);
        let source = FsHeightmapSource::new(&dir, "terrain.png");

        let flipped_x = source.load(true, false).unwrap();
        assert!((flipped_x.get(1, 0) - 1.0).abs() < 1e-6);

        let flipped_y = source.load(false, true).unwrap();
        assert!((flipped_y.get(0, 1) - 1.0).abs() < 1e-6);

        let flipped_both = source.load(true, true).unwrap();
        assert!((flipped_both.get(1, 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn missing_file_is_a_heightmap_error() {
        let source = FsHeightmapSource::new("/nonexistent-asset-root", "terrain.png");
        let err = source.load(false, false).unwrap_err();
        assert!(matches!(err, TerrainError::Heightmap { .. }));
    }

    #[test]
    fn sampling_is_bilinear() {
        let image = HeightImage::new(2, 1, vec![0.0, 1.0]).unwrap();
        assert!((image.sample(0.25, 0.0) - 0.25).abs() < 1e-6);
        assert_eq!(image.sample(2.0, 0.0), 1.0);
    }
}
