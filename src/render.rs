//! Frame composition: the pass list and the renderer that executes it.
//!
//! A frame is a short ordered list of [`PassDescriptor`]s. In composited mode
//! the scene is drawn into an off-screen render target and then dithered onto
//! the output; in direct mode the scene goes straight to the output.
//!
//! The [`Renderer`] never touches a surface. It draws into whatever output view
//! it is handed, so the same code path runs in the window and headless.
//!
//! # Key types
//!
//! - [`PassDescriptor`] is one step of a frame: source, shader, destination
//! - [`PostProcessState`] keeps the render target size and the dither
//!   resolution uniform paired
//! - [`Drawable`] is what scene nodes hand to the renderer

use std::collections::HashSet;

use log::{debug, warn};

use crate::{
    camera::{Camera, CameraResources, Projection},
    data_structures::{
        material::{GpuMaterial, MaterialBinder},
        mesh::GpuMesh,
        scene_graph::SceneGraph,
        texture::Texture,
        wireframe::GpuLines,
    },
    dither::DitherUniforms,
    pipelines::{
        dither::DitherResources,
        light::{LightResources, LightUniform},
        scene::{material_layout, mk_scene_pipeline},
        wireframe::mk_wireframe_pipeline,
    },
    settings::RenderSettings,
};

/// Something uploaded and ready to be drawn.
pub enum Drawable<'a> {
    Mesh {
        mesh: &'a GpuMesh,
        material: &'a GpuMaterial,
    },
    Lines(&'a GpuLines),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassSource {
    /// The scene graph, seen through the camera.
    Scene,
    /// The colour buffer of the off-screen render target.
    Target,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassShader {
    Scene,
    Dither,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassDestination {
    Target,
    /// Whatever view the frame is presented from.
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassDescriptor {
    pub label: &'static str,
    pub source: PassSource,
    pub shader: PassShader,
    pub destination: PassDestination,
}

pub const COMPOSITED: [PassDescriptor; 2] = [
    PassDescriptor {
        label: "Scene Pass",
        source: PassSource::Scene,
        shader: PassShader::Scene,
        destination: PassDestination::Target,
    },
    PassDescriptor {
        label: "Dither Pass",
        source: PassSource::Target,
        shader: PassShader::Dither,
        destination: PassDestination::Output,
    },
];

pub const DIRECT: [PassDescriptor; 1] = [PassDescriptor {
    label: "Direct Scene Pass",
    source: PassSource::Scene,
    shader: PassShader::Scene,
    destination: PassDestination::Output,
}];

pub fn pass_list(bypass: bool) -> &'static [PassDescriptor] {
    if bypass { &DIRECT[..] } else { &COMPOSITED[..] }
}

/// `floor(viewport × scale)` per axis, never below one pixel.
pub fn scaled_extent(viewport: [u32; 2], scale: f32) -> [u32; 2] {
    viewport.map(|v| ((v as f32 * scale).floor() as u32).max(1))
}

/**
 * Size of the off-screen target together with the dither uniforms that
 * describe it. Every mutation goes through here so the resolution uniform can
 * never disagree with the target it is sampling.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostProcessState {
    viewport: [u32; 2],
    render_scale: f32,
    target: [u32; 2],
    uniforms: DitherUniforms,
}

impl PostProcessState {
    pub fn new(viewport: [u32; 2], settings: &RenderSettings) -> Self {
        let viewport = viewport.map(|v| v.max(1));
        let target = scaled_extent(viewport, settings.render_scale());
        Self {
            viewport,
            render_scale: settings.render_scale(),
            target,
            uniforms: DitherUniforms::new(target, settings.dot_size()),
        }
    }

    pub fn viewport(&self) -> [u32; 2] {
        self.viewport
    }

    pub fn target_size(&self) -> [u32; 2] {
        self.target
    }

    pub fn uniforms(&self) -> DitherUniforms {
        self.uniforms
    }

    /// Returns whether the target has to be reallocated. A zero-sized
    /// viewport (minimised window) is ignored.
    pub fn resize(&mut self, viewport: [u32; 2]) -> bool {
        if viewport.contains(&0) {
            debug!("ignoring resize to {viewport:?}");
            return false;
        }
        self.viewport = viewport;
        self.retarget()
    }

    /// `scale` must already be clamped, see [`RenderSettings::set_render_scale`].
    pub fn set_render_scale(&mut self, scale: f32) -> bool {
        self.render_scale = scale;
        self.retarget()
    }

    pub fn set_dot_size(&mut self, dot_size: f32) {
        self.uniforms.set_dot_size(dot_size);
    }

    pub fn set_time(&mut self, time: f32) {
        self.uniforms.set_time(time);
    }

    fn retarget(&mut self) -> bool {
        let target = scaled_extent(self.viewport, self.render_scale);
        let changed = target != self.target;
        self.target = target;
        self.uniforms.set_resolution(target);
        changed
    }
}

/**
 * Owns every GPU object of a frame except the surface: pipelines, camera and
 * light uniforms, the render target, depth buffers, dither resources and the
 * material binder.
 */
pub struct Renderer {
    format: wgpu::TextureFormat,
    scene_pipeline: wgpu::RenderPipeline,
    wireframe_pipeline: wgpu::RenderPipeline,
    camera: CameraResources,
    light: LightResources,
    binder: MaterialBinder,
    post: PostProcessState,
    target: Texture,
    target_depth: Texture,
    output_depth: Texture,
    dither: DitherResources,
    pub clear_colour: wgpu::Color,
}

impl Renderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        viewport: [u32; 2],
        settings: &RenderSettings,
        camera: &Camera,
        projection: &Projection,
        clear_colour: wgpu::Color,
    ) -> anyhow::Result<Self> {
        let camera = CameraResources::new(device, camera, projection);
        let light = LightResources::new(device, LightUniform::from_lights(&[]));
        let materials = material_layout(device);
        let scene_pipeline = mk_scene_pipeline(
            device,
            format,
            &materials,
            &camera.bind_group_layout,
            &light.bind_group_layout,
        );
        let wireframe_pipeline = mk_wireframe_pipeline(device, format, &camera.bind_group_layout);
        let binder = MaterialBinder::new(device, queue, materials);

        let post = PostProcessState::new(viewport, settings);
        let target = Texture::create_render_target(device, post.target_size(), format, "render_target");
        let target_depth = Texture::create_depth_texture(device, post.target_size(), "render_target_depth");
        let output_depth = Texture::create_depth_texture(device, post.viewport(), "depth_texture");
        let dither = DitherResources::new(device, format, &target, post.uniforms())?;

        debug!(
            "renderer ready: {:?} output {:?}, target {:?}",
            format,
            post.viewport(),
            post.target_size()
        );

        Ok(Self {
            format,
            scene_pipeline,
            wireframe_pipeline,
            camera,
            light,
            binder,
            post,
            target,
            target_depth,
            output_depth,
            dither,
            clear_colour,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn post(&self) -> &PostProcessState {
        &self.post
    }

    pub fn target(&self) -> &Texture {
        &self.target
    }

    /// New output size: output depth, render target, its depth and the
    /// resolution uniform all change before the next frame is encoded.
    pub fn resize(&mut self, device: &wgpu::Device, viewport: [u32; 2]) -> anyhow::Result<()> {
        if viewport.contains(&0) {
            return Ok(());
        }
        if viewport != self.post.viewport() {
            self.output_depth = Texture::create_depth_texture(device, viewport, "depth_texture");
        }
        if self.post.resize(viewport) {
            self.reallocate_target(device)?;
        }
        Ok(())
    }

    pub fn set_render_scale(&mut self, device: &wgpu::Device, scale: f32) -> anyhow::Result<()> {
        if self.post.set_render_scale(scale) {
            self.reallocate_target(device)?;
        }
        Ok(())
    }

    fn reallocate_target(&mut self, device: &wgpu::Device) -> anyhow::Result<()> {
        let size = self.post.target_size();
        debug!("render target now {size:?}");
        self.target = Texture::create_render_target(device, size, self.format, "render_target");
        self.target_depth = Texture::create_depth_texture(device, size, "render_target_depth");
        self.dither.rebind(device, &self.target)
    }

    /// Drop uploaded images no mesh refers to anymore, e.g. after a model swap.
    pub fn release_unused(&mut self, scene: &SceneGraph) {
        let mut live = HashSet::new();
        let mut collect = |material: &crate::data_structures::material::Material| {
            let maps = [
                &material.base_color_map,
                &material.normal_map,
                &material.descriptor.reflection_map,
            ];
            live.extend(maps.into_iter().flatten().map(|m| m.id()));
        };
        scene.primary().for_each_mesh(&mut |_, mesh| collect(mesh.material()));
        if let Some(model) = scene.model() {
            model.for_each_mesh(&mut |_, mesh| collect(mesh.material()));
        }
        self.binder.retain(&live);
    }

    /// Upload everything the next frame reads: camera, lights, scene buffers
    /// and the dither uniforms.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &mut SceneGraph,
        settings: &RenderSettings,
        camera: &Camera,
        projection: &Projection,
        time: f32,
    ) {
        self.camera.write(queue, camera, projection);
        self.light.write(queue, LightUniform::from_lights(&scene.lights()));
        scene.write_to_buffers(device, queue, &mut self.binder, settings.visibility);

        self.post.set_dot_size(settings.dot_size());
        self.post.set_time(if settings.animate { time } else { 0.0 });
        self.dither.write(queue, self.post.uniforms());
    }

    /// Record the frame's passes into `encoder`, ending in `output`.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        scene: &SceneGraph,
        settings: &RenderSettings,
    ) {
        let drawables = scene.drawables(settings.visibility);
        for pass in pass_list(settings.bypass) {
            let (color, depth) = match pass.destination {
                PassDestination::Target => (&self.target.view, &self.target_depth.view),
                PassDestination::Output => (output, &self.output_depth.view),
            };
            match (pass.source, pass.shader) {
                (PassSource::Scene, PassShader::Scene) => {
                    self.draw_scene(encoder, pass.label, color, depth, &drawables)
                }
                (PassSource::Target, PassShader::Dither) => self.draw_dither(encoder, pass.label, color),
                (source, shader) => warn!("{}: cannot run {shader:?} over {source:?}", pass.label),
            }
        }
    }

    fn draw_scene(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        color: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        drawables: &[Drawable<'_>],
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_colour),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_pipeline(&self.scene_pipeline);
        render_pass.set_bind_group(1, &self.camera.bind_group, &[]);
        render_pass.set_bind_group(2, &self.light.bind_group, &[]);
        for drawable in drawables {
            if let Drawable::Mesh { mesh, material } = drawable {
                if mesh.num_elements == 0 {
                    continue;
                }
                render_pass.set_bind_group(0, &material.bind_group, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, mesh.transform_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.num_elements, 0, 0..1);
            }
        }

        render_pass.set_pipeline(&self.wireframe_pipeline);
        render_pass.set_bind_group(0, &self.camera.bind_group, &[]);
        for drawable in drawables {
            if let Drawable::Lines(lines) = drawable {
                render_pass.set_vertex_buffer(0, lines.vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, lines.transform_buffer.slice(..));
                render_pass.set_index_buffer(lines.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..lines.num_elements, 0, 0..1);
            }
        }
    }

    fn draw_dither(&self, encoder: &mut wgpu::CommandEncoder, label: &str, color: &wgpu::TextureView) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&self.dither.pipeline);
        render_pass.set_bind_group(0, &self.dither.bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}
