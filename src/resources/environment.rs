//! Equirectangular reflection maps.
//!
//! HDR files are tone mapped down to 8 bit sRGB on load so they can share the
//! material texture path with every other map. When nothing can be loaded a
//! synthetic sky gradient stands in.

use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use log::{info, warn};

use crate::{
    data_structures::material::{ColorSpace, ImageMap},
    resources::{AssetLoader, LoadError, Progress},
};

pub const SYNTHETIC_SIZE: (u32, u32) = (256, 128);

/// Reinhard tone map followed by display gamma.
fn tone_map(linear: f32, exposure: f32) -> u8 {
    let c = (linear * exposure).max(0.0);
    let mapped = c / (1.0 + c);
    (mapped.powf(1.0 / 2.2) * 255.0).round().clamp(0.0, 255.0) as u8
}

pub fn decode_hdr(bytes: &[u8], label: &str, exposure: f32) -> Result<ImageMap, LoadError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Hdr)?.to_rgb32f();
    let (width, height) = decoded.dimensions();
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let p = decoded.get_pixel(x, y).0;
        Rgba([
            tone_map(p[0], exposure),
            tone_map(p[1], exposure),
            tone_map(p[2], exposure),
            255,
        ])
    });
    Ok(ImageMap::new(label, image, ColorSpace::Srgb))
}

/// Sky-to-ground gradient with a bright band at the horizon, enough for
/// reflective materials to read as reflective.
pub fn synthetic_environment() -> ImageMap {
    let (width, height) = SYNTHETIC_SIZE;
    let image = RgbaImage::from_fn(width, height, |x, y| {
        // v = 0 is straight up
        let v = y as f32 / (height - 1) as f32;
        let u = x as f32 / width as f32;
        let horizon = (1.0 - ((v - 0.5).abs() * 8.0)).max(0.0);
        let sky = 1.0 - v;
        let ripple = 0.05 * (u * std::f32::consts::TAU * 4.0).sin();
        let level = (0.15 + 0.6 * sky + 0.5 * horizon + ripple).clamp(0.0, 1.0);
        let g = (level * 255.0) as u8;
        Rgba([g, g, (level * 0.9 * 255.0 + 20.0).min(255.0) as u8, 255])
    });
    ImageMap::new("synthetic environment", image, ColorSpace::Srgb)
}

impl AssetLoader {
    pub async fn load_environment<P>(&self, locator: &str, progress: P) -> Result<ImageMap, LoadError>
    where
        P: FnMut(Progress),
    {
        let bytes = self.fetch(locator, progress).await?;
        let map = decode_hdr(&bytes, locator, 1.0)?;
        info!(
            "Loaded environment {} ({}x{})",
            locator,
            map.image.width(),
            map.image.height()
        );
        Ok(map)
    }

    /// The environment at `locator`, or the synthetic one if there is no
    /// locator or loading fails.
    pub async fn environment_or_synthetic(&self, locator: Option<&str>) -> Arc<ImageMap> {
        let Some(locator) = locator else {
            return Arc::new(synthetic_environment());
        };
        match self.load_environment(locator, |_| {}).await {
            Ok(map) => Arc::new(map),
            Err(e) => {
                warn!("Using synthetic environment, {} failed to load: {}", locator, e);
                Arc::new(synthetic_environment())
            }
        }
    }
}
