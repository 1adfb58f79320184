//! Mesh data: CPU-side geometry, its GPU buffers and the drawable mesh slot.
//!
//! Geometry stays on the CPU until the render thread uploads it, which keeps
//! loading, bounding-box math and material assignment free of any GPU handle.

use std::sync::Arc;

use cgmath::{InnerSpace, Point3, Vector2, Vector3};
use wgpu::util::DeviceExt;

use crate::data_structures::{
    bounds::Aabb,
    material::{GpuMaterial, Material, MaterialBinder},
    transform::Transform,
};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 11]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Triangle list geometry as loaded or generated, before upload.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub label: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn new(label: impl Into<String>, vertices: Vec<ModelVertex>, indices: Vec<u32>) -> Self {
        Self {
            label: label.into(),
            vertices,
            indices,
        }
    }

    /// Bounds of the vertex positions in the geometry's own space.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| Point3::from(v.position)))
    }

    /// Axis-aligned cube with edge length `size`, centered on the origin.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // normal, then the face's u and v axes
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let n = Vector3::from(normal);
            let u = Vector3::from(u);
            let v = Vector3::from(v);
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + u * su + v * sv) * h;
                vertices.push(ModelVertex {
                    position: p.into(),
                    tex_coords: [(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5],
                    normal,
                    tangent: u.into(),
                    bitangent: v.into(),
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new("cube", vertices, indices)
    }

    /**
     * Meshes without tangents need them calculated for normal maps to work.
     *
     * Every triangle contributes its tangent/bitangent to its three vertices,
     * which are averaged afterwards.
     */
    pub fn compute_tangents(&mut self) {
        let mut triangles_included = vec![0u32; self.vertices.len()];
        let vertices = &mut self.vertices;

        for c in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
            if i0.max(i1).max(i2) >= vertices.len() {
                continue;
            }
            let pos0: Vector3<_> = vertices[i0].position.into();
            let pos1: Vector3<_> = vertices[i1].position.into();
            let pos2: Vector3<_> = vertices[i2].position.into();

            let uv0: Vector2<_> = vertices[i0].tex_coords.into();
            let uv1: Vector2<_> = vertices[i1].tex_coords.into();
            let uv2: Vector2<_> = vertices[i2].tex_coords.into();

            let delta_pos1 = pos1 - pos0;
            let delta_pos2 = pos2 - pos0;
            let delta_uv1 = uv1 - uv0;
            let delta_uv2 = uv2 - uv0;

            // Solves
            //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
            //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
            let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
            if det.abs() <= f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
            // Flipped bitangent for right-handed normal maps in wgpu texture space
            let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

            for i in [i0, i1, i2] {
                vertices[i].tangent = (tangent + Vector3::from(vertices[i].tangent)).into();
                vertices[i].bitangent =
                    (bitangent + Vector3::from(vertices[i].bitangent)).into();
                triangles_included[i] += 1;
            }
        }

        for (v, n) in vertices.iter_mut().zip(triangles_included) {
            if n == 0 {
                continue;
            }
            let denom = 1.0 / n as f32;
            v.tangent = (Vector3::from(v.tangent) * denom).into();
            v.bitangent = (Vector3::from(v.bitangent) * denom).into();
        }
    }

    /// Flat per-face normals for geometry that came without any.
    pub fn compute_normals(&mut self) {
        for c in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
            if i0.max(i1).max(i2) >= self.vertices.len() {
                continue;
            }
            let p0: Vector3<f32> = self.vertices[i0].position.into();
            let p1: Vector3<f32> = self.vertices[i1].position.into();
            let p2: Vector3<f32> = self.vertices[i2].position.into();
            let n = (p1 - p0).cross(p2 - p0);
            if n.magnitude2() <= f32::EPSILON {
                continue;
            }
            let n: [f32; 3] = n.normalize().into();
            for i in [i0, i1, i2] {
                self.vertices[i].normal = n;
            }
        }
    }
}

/// GPU buffers of one drawable mesh.
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub transform_buffer: wgpu::Buffer,
    pub num_elements: u32,
}

impl GpuMesh {
    pub fn new(device: &wgpu::Device, geometry: &Geometry, world: &Transform) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", geometry.label)),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", geometry.label)),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let transform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Transform Buffer", geometry.label)),
            contents: bytemuck::cast_slice(&[world.to_raw()]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            vertex_buffer,
            index_buffer,
            transform_buffer,
            num_elements: geometry.indices.len() as u32,
        }
    }
}

/// The mesh payload of a scene node: shared geometry, the current material
/// reference and lazily created GPU resources for both.
#[derive(Debug)]
pub struct MeshData {
    geometry: Arc<Geometry>,
    material: Arc<Material>,
    gpu: Option<GpuMesh>,
    gpu_material: Option<GpuMaterial>,
}

impl MeshData {
    pub fn new(geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            geometry,
            material,
            gpu: None,
            gpu_material: None,
        }
    }

    pub fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    /// Swap the material reference. The old material is left untouched for
    /// whoever else holds it; its bind group is rebuilt on the next upload.
    pub fn set_material(&mut self, material: Arc<Material>) {
        self.material = material;
        self.gpu_material = None;
    }

    pub(crate) fn write_to_buffers(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        binder: &mut MaterialBinder,
        world: &Transform,
    ) {
        match &self.gpu {
            Some(gpu) => queue.write_buffer(
                &gpu.transform_buffer,
                0,
                bytemuck::cast_slice(&[world.to_raw()]),
            ),
            None => self.gpu = Some(GpuMesh::new(device, &self.geometry, world)),
        }
        if self.gpu_material.is_none() {
            self.gpu_material = Some(binder.bind(device, queue, &self.material));
        }
    }

    pub(crate) fn gpu(&self) -> Option<(&GpuMesh, &GpuMaterial)> {
        Some((self.gpu.as_ref()?, self.gpu_material.as_ref()?))
    }
}
