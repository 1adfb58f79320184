use wgpu::util::DeviceExt;

use crate::data_structures::{
    scene_graph::{Light, LightKind},
    transform::Transform,
};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    /// Direction the directional light comes from (its position, looking at
    /// the origin).
    position: [f32; 3],
    /// Summed intensity of all ambient lights. Shares the 16 byte slot with
    /// `position` instead of padding.
    ambient: f32,
    color: [f32; 3],
    intensity: f32,
}

impl LightUniform {
    /// Collapse the scene's lights into the single ambient + directional pair
    /// the scene shader evaluates. Extra directional lights are ignored.
    pub fn from_lights(lights: &[(&Light, &Transform)]) -> Self {
        let ambient = lights
            .iter()
            .filter(|(l, _)| l.kind == LightKind::Ambient)
            .map(|(l, _)| l.intensity)
            .sum::<f32>();
        let directional = lights.iter().find(|(l, _)| l.kind == LightKind::Directional);
        let (position, color, intensity): ([f32; 3], [f32; 3], f32) = match directional {
            Some((light, world)) => (world.position.into(), light.color, light.intensity),
            None => ([0.0, 1.0, 0.0], [1.0; 3], 0.0),
        };
        Self {
            position,
            ambient,
            color,
            intensity,
        }
    }

    pub fn ambient(&self) -> f32 {
        self.ambient
    }
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, uniform: LightUniform) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("light_bind_group_layout"),
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("light_bind_group"),
        });
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn write(&mut self, queue: &wgpu::Queue, uniform: LightUniform) {
        if uniform != self.uniform {
            self.uniform = uniform;
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[uniform]));
        }
    }
}
