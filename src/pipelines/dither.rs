//! Second pass: the full-viewport dither over the off-screen scene texture.

use wgpu::util::DeviceExt;

use crate::{
    data_structures::texture::Texture,
    dither::DitherUniforms,
    pipelines::basic::{REPLACE, mk_render_pipeline},
};

pub fn dither_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("dither_bind_group_layout"),
    })
}

/// Pipeline, uniform buffer and the bind group pointing at the current render
/// target. The bind group must be rebuilt whenever the target is reallocated.
#[derive(Debug)]
pub struct DitherResources {
    pub pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl DitherResources {
    pub fn new(
        device: &wgpu::Device,
        output_format: wgpu::TextureFormat,
        source: &Texture,
        uniforms: DitherUniforms,
    ) -> anyhow::Result<Self> {
        let layout = dither_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Dither Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let shader = wgpu::ShaderModuleDescriptor {
            label: Some("Dither Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("dither.wgsl").into()),
        };
        let pipeline = mk_render_pipeline(
            device,
            "Dither Pipeline",
            &pipeline_layout,
            output_format,
            REPLACE,
            None,
            &[],
            wgpu::PrimitiveTopology::TriangleList,
            shader,
        );
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Dither Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = mk_bind_group(device, &layout, source, &buffer)?;
        Ok(Self {
            pipeline,
            layout,
            buffer,
            bind_group,
        })
    }

    pub fn rebind(&mut self, device: &wgpu::Device, source: &Texture) -> anyhow::Result<()> {
        self.bind_group = mk_bind_group(device, &self.layout, source, &self.buffer)?;
        Ok(())
    }

    /// Upload `uniforms`; they take effect with the next submitted pass.
    pub fn write(&self, queue: &wgpu::Queue, uniforms: DitherUniforms) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[uniforms]));
    }
}

fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    source: &Texture,
    buffer: &wgpu::Buffer,
) -> anyhow::Result<wgpu::BindGroup> {
    let sampler = source
        .sampler
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("dither source texture has no sampler"))?;
    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&source.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: buffer.as_entire_binding(),
            },
        ],
        label: Some("dither_bind_group"),
    }))
}
