//! Surface appearance: descriptors, palettes and their GPU bind groups.
//!
//! A [`MaterialDescriptor`] is an immutable value. A [`Material`] is what a mesh
//! actually points to: a descriptor plus the image maps it carries. Meshes hold
//! materials behind `Arc`, so changing a mesh's look always means swapping the
//! reference, never mutating an instance somebody else may share.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use wgpu::util::DeviceExt;

use crate::data_structures::texture::Texture;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// How the texels of an [`ImageMap`] are to be interpreted on the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// A decoded image shared between materials. The id identifies the upload.
#[derive(Debug)]
pub struct ImageMap {
    id: u64,
    pub label: String,
    pub image: image::RgbaImage,
    pub color_space: ColorSpace,
}

impl ImageMap {
    pub fn new(label: impl Into<String>, image: image::RgbaImage, color_space: ColorSpace) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            image,
            color_space,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Two maps are the same map only if they are the same upload.
impl PartialEq for ImageMap {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ImageMap {}

/// sRGB encoded channel to linear.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Rec. 601 luma, the weighting the dither pass uses as well.
pub fn luminance(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDescriptor {
    /// Linear RGBA.
    pub base_color: [f32; 4],
    pub metalness: f32,
    pub roughness: f32,
    pub reflection_map: Option<Arc<ImageMap>>,
    pub reflection_intensity: Option<f32>,
}

impl MaterialDescriptor {
    pub fn new(base_color: [f32; 4], metalness: f32, roughness: f32) -> Self {
        Self {
            base_color,
            metalness: metalness.clamp(0.0, 1.0),
            roughness: roughness.clamp(0.0, 1.0),
            reflection_map: None,
            reflection_intensity: None,
        }
    }

    /// Opaque colour from a `0xRRGGBB` sRGB value.
    pub fn from_hex(hex: u32) -> Self {
        Self::new(hex_to_linear(hex), 0.0, 1.0)
    }

    pub fn with_surface(self, metalness: f32, roughness: f32) -> Self {
        Self {
            metalness: metalness.clamp(0.0, 1.0),
            roughness: roughness.clamp(0.0, 1.0),
            ..self
        }
    }

    pub fn with_reflection(self, map: Option<Arc<ImageMap>>, intensity: f32) -> Self {
        Self {
            reflection_map: map,
            reflection_intensity: Some(intensity.max(0.0)),
            ..self
        }
    }

    pub fn luminance(&self) -> f32 {
        luminance([self.base_color[0], self.base_color[1], self.base_color[2]])
    }
}

pub fn hex_to_linear(hex: u32) -> [f32; 4] {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0), 1.0]
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub descriptor: MaterialDescriptor,
    pub base_color_map: Option<Arc<ImageMap>>,
    pub normal_map: Option<Arc<ImageMap>>,
}

impl Material {
    pub fn new(name: impl Into<String>, descriptor: MaterialDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            base_color_map: None,
            normal_map: None,
        }
    }

    /// A fresh material from `descriptor` that keeps the base colour and normal
    /// maps of `previous`. Nothing else is taken over.
    pub fn replacing(previous: &Material, descriptor: &MaterialDescriptor) -> Self {
        Self {
            name: previous.name.clone(),
            descriptor: descriptor.clone(),
            base_color_map: previous.base_color_map.clone(),
            normal_map: previous.normal_map.clone(),
        }
    }

    pub fn to_uniform(&self) -> MaterialUniform {
        let reflection = match &self.descriptor.reflection_map {
            Some(_) => self.descriptor.reflection_intensity.unwrap_or(1.0),
            None => 0.0,
        };
        MaterialUniform {
            base_color: self.descriptor.base_color,
            metalness: self.descriptor.metalness,
            roughness: self.descriptor.roughness,
            reflection,
            has_normal_map: if self.normal_map.is_some() { 1.0 } else { 0.0 },
        }
    }
}

/// Material properties as the scene shader reads them.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    base_color: [f32; 4],
    metalness: f32,
    roughness: f32,
    reflection: f32,
    has_normal_map: f32,
}

/// An ordered list of descriptors plus the distinguished finish used for
/// name-matched parts.
#[derive(Clone, Debug)]
pub struct Palette {
    pub name: &'static str,
    pub entries: Vec<MaterialDescriptor>,
    pub special: MaterialDescriptor,
}

impl Palette {
    pub fn new(name: &'static str, entries: Vec<MaterialDescriptor>) -> Self {
        Self {
            name,
            entries,
            special: special_finish(None),
        }
    }

    pub fn with_special(self, special: MaterialDescriptor) -> Self {
        Self { special, ..self }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&MaterialDescriptor> {
        self.entries.get(i)
    }

    /// Mid greys spread over the dither levels, not pure black so no part
    /// disappears.
    pub fn dithering_optimized() -> Self {
        Self::from_hex(
            "dithering-optimized",
            &[
                0x404040, 0x808080, 0xC0C0C0, 0xFFFFFF, 0x606060, 0xA0A0A0, 0x303030, 0xE0E0E0,
            ],
        )
    }

    pub fn high_contrast() -> Self {
        Self::from_hex(
            "high-contrast",
            &[
                0x000000, 0xFFFFFF, 0x404040, 0xC0C0C0, 0xFF0000, 0x00FF00, 0x0000FF, 0x800000,
                0x008000, 0x000080,
            ],
        )
    }

    /// Black, grey and white land exactly on the three dither levels, the
    /// rest dither between two neighbours.
    pub fn three_level() -> Self {
        Self::from_hex(
            "three-level",
            &[
                0x000000, 0x808080, 0xFFFFFF, 0x202020, 0xE0E0E0, 0x404040, 0xC0C0C0,
            ],
        )
    }

    pub fn dark_matte() -> Self {
        let entries = [
            (0x2A2A2A, 0.1, 0.9),
            (0x4A4A4A, 0.0, 0.8),
            (0x1C1C1C, 0.2, 0.7),
            (0x606060, 0.0, 0.95),
            (0x383838, 0.1, 0.85),
            (0x505050, 0.05, 0.9),
        ]
        .into_iter()
        .map(|(hex, m, r)| MaterialDescriptor::from_hex(hex).with_surface(m, r))
        .collect();
        Self::new("dark-matte", entries)
    }

    /// Metallic whites and silvers; reflective entries use `environment`.
    pub fn light_metallic(environment: Option<Arc<ImageMap>>) -> Self {
        let entries = [
            (0xE8E8E8, 0.9, 0.2),
            (0xC8C8C8, 1.0, 0.1),
            (0xFFFFFF, 0.8, 0.3),
            (0xA8A8A8, 1.0, 0.15),
            (0xD8D8D8, 0.7, 0.25),
            (0xB8B8B8, 0.95, 0.2),
        ]
        .into_iter()
        .map(|(hex, m, r)| {
            MaterialDescriptor::from_hex(hex)
                .with_surface(m, r)
                .with_reflection(environment.clone(), 1.0)
        })
        .collect();
        Self::new("light-metallic", entries).with_special(special_finish(environment))
    }

    fn from_hex(name: &'static str, colors: &[u32]) -> Self {
        Self::new(
            name,
            colors.iter().map(|&c| MaterialDescriptor::from_hex(c)).collect(),
        )
    }
}

/// The two material themes the viewer toggles between.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    DarkMatte,
    LightMetallic,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::DarkMatte => Theme::LightMetallic,
            Theme::LightMetallic => Theme::DarkMatte,
        }
    }

    pub fn palette(self, environment: Option<Arc<ImageMap>>) -> Palette {
        match self {
            Theme::DarkMatte => Palette::dark_matte().with_special(special_finish(environment)),
            Theme::LightMetallic => Palette::light_metallic(environment),
        }
    }
}

/// Maximum reflectivity, no roughness.
pub fn special_finish(environment: Option<Arc<ImageMap>>) -> MaterialDescriptor {
    MaterialDescriptor::from_hex(0xFFFFFF)
        .with_surface(1.0, 0.0)
        .with_reflection(environment, 1.0)
}

/// The bind group of one material: uniform, base colour map, normal map,
/// reflection map and a shared sampler.
#[derive(Debug)]
pub struct GpuMaterial {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/**
 * Turns [`Material`]s into bind groups. Image maps are uploaded once per
 * [`ImageMap`] and reused; missing maps fall back to neutral defaults so the
 * pipeline layout never changes.
 */
pub struct MaterialBinder {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white: Texture,
    flat_normal: Texture,
    black: Texture,
    uploads: HashMap<u64, Texture>,
}

impl MaterialBinder {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, layout: wgpu::BindGroupLayout) -> Self {
        Self {
            layout,
            sampler: crate::data_structures::texture::create_default_sampler(device),
            white: Texture::create_solid(device, queue, [255; 4], false, "default base colour"),
            flat_normal: Texture::create_default_normal_map(1, 1, device, queue),
            black: Texture::create_solid(device, queue, [0, 0, 0, 255], false, "default reflection"),
            uploads: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Forget uploads no material refers to anymore.
    pub fn retain(&mut self, live: &std::collections::HashSet<u64>) {
        self.uploads.retain(|id, _| live.contains(id));
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, map: &ImageMap) -> Texture {
        if let Some(texture) = self.uploads.get(&map.id()) {
            return texture.clone();
        }
        let texture = Texture::from_rgba(
            device,
            queue,
            &map.image,
            Some(&map.label),
            map.color_space == ColorSpace::Linear,
        );
        self.uploads.insert(map.id(), texture.clone());
        texture
    }

    pub fn bind(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, material: &Material) -> GpuMaterial {
        let base = match &material.base_color_map {
            Some(map) => self.upload(device, queue, map),
            None => self.white.clone(),
        };
        let normal = match &material.normal_map {
            Some(map) => self.upload(device, queue, map),
            None => self.flat_normal.clone(),
        };
        let reflection = match &material.descriptor.reflection_map {
            Some(map) => self.upload(device, queue, map),
            None => self.black.clone(),
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", material.name)),
            contents: bytemuck::cast_slice(&[material.to_uniform()]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&base.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&reflection.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
            label: Some(&format!("{} Material Bind Group", material.name)),
        });
        GpuMaterial { buffer, bind_group }
    }
}
