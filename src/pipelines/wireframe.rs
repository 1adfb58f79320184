use crate::{
    data_structures::{
        mesh::Vertex, texture::Texture, transform::TransformRaw, wireframe::LineVertex,
    },
    pipelines::basic::{REPLACE, mk_render_pipeline},
};

/// Unlit line list; shares the depth buffer with the scene so meshes occlude
/// the wireframe.
pub fn mk_wireframe_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Wireframe Pipeline Layout"),
        bind_group_layouts: &[camera_bind_group_layout],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Wireframe Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("wireframe.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        "Wireframe Pipeline",
        &layout,
        color_format,
        REPLACE,
        Some(Texture::DEPTH_FORMAT),
        &[LineVertex::desc(), TransformRaw::desc()],
        wgpu::PrimitiveTopology::LineList,
        shader,
    )
}
