//! Line geometry for decorative wireframes.

use std::collections::BTreeSet;

use wgpu::util::DeviceExt;

use crate::data_structures::{mesh::Vertex, transform::Transform};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex for LineVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Vertices plus a line list (pairs of indices).
#[derive(Clone, Debug, PartialEq)]
pub struct LineGeometry {
    pub vertices: Vec<LineVertex>,
    pub indices: Vec<u32>,
}

impl LineGeometry {
    /// The 30 edges of a regular icosahedron with circumradius `radius`.
    pub fn icosahedron(radius: f32, color: [f32; 3]) -> Self {
        let t = (1.0 + 5f32.sqrt()) / 2.0;
        let raw = [
            [-1.0, t, 0.0],
            [1.0, t, 0.0],
            [-1.0, -t, 0.0],
            [1.0, -t, 0.0],
            [0.0, -1.0, t],
            [0.0, 1.0, t],
            [0.0, -1.0, -t],
            [0.0, 1.0, -t],
            [t, 0.0, -1.0],
            [t, 0.0, 1.0],
            [-t, 0.0, -1.0],
            [-t, 0.0, 1.0],
        ];
        let faces: [[u32; 3]; 20] = [
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        let norm = (1.0 + t * t).sqrt();
        let vertices = raw
            .iter()
            .map(|p| LineVertex {
                position: [p[0] / norm * radius, p[1] / norm * radius, p[2] / norm * radius],
                color,
            })
            .collect();

        let edges: BTreeSet<(u32, u32)> = faces
            .iter()
            .flat_map(|f| [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])])
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        let indices = edges.into_iter().flat_map(|(a, b)| [a, b]).collect();

        Self { vertices, indices }
    }
}

#[derive(Debug)]
pub struct GpuLines {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub transform_buffer: wgpu::Buffer,
    pub num_elements: u32,
}

/// Payload of a wireframe node. Buffers are created on first upload.
#[derive(Debug)]
pub struct WireframeData {
    geometry: LineGeometry,
    gpu: Option<GpuLines>,
}

impl WireframeData {
    pub fn new(geometry: LineGeometry) -> Self {
        Self { geometry, gpu: None }
    }

    pub fn geometry(&self) -> &LineGeometry {
        &self.geometry
    }

    pub(crate) fn write_to_buffers(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, world: &Transform) {
        let raw = [world.to_raw()];
        if let Some(gpu) = &self.gpu {
            queue.write_buffer(&gpu.transform_buffer, 0, bytemuck::cast_slice(&raw));
            return;
        }
        self.gpu = Some(GpuLines {
            vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Wireframe Vertex Buffer"),
                contents: bytemuck::cast_slice(&self.geometry.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Wireframe Index Buffer"),
                contents: bytemuck::cast_slice(&self.geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            transform_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Wireframe Transform Buffer"),
                contents: bytemuck::cast_slice(&raw),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            }),
            num_elements: self.geometry.indices.len() as u32,
        });
    }

    pub(crate) fn gpu(&self) -> Option<&GpuLines> {
        self.gpu.as_ref()
    }
}
