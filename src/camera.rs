//! Camera types, projection and the smoothed pointer look.
//!
//! The camera orbits the origin at a fixed distance. Pointer movement only sets
//! a target orientation; [`PointerLook::update`] moves the actual orientation a
//! fraction of the way there every frame.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector2, Vector3, perspective};
use wgpu::util::DeviceExt;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::from_cols(
    cgmath::Vector4::new(1.0, 0.0, 0.0, 0.0),
    cgmath::Vector4::new(0.0, 1.0, 0.0, 0.0),
    cgmath::Vector4::new(0.0, 0.0, 0.5, 0.0),
    cgmath::Vector4::new(0.0, 0.0, 0.5, 1.0),
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub distance: f32,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
}

impl Camera {
    /// Looking down -Z from `(0, 0, distance)`.
    pub fn new(distance: f32) -> Self {
        Self {
            distance,
            yaw: Rad(0.0),
            pitch: Rad(0.0),
        }
    }

    pub fn position(&self) -> Point3<f32> {
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        Point3::new(
            self.distance * sin_yaw * cos_pitch,
            self.distance * sin_pitch,
            self.distance * cos_yaw * cos_pitch,
        )
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), Point3::new(0.0, 0.0, 0.0), Vector3::unit_y())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position().to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponentially smoothed look direction driven by the latest pointer sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerLook {
    target: Vector2<f32>,
    current: Vector2<f32>,
    /// Fraction of the remaining distance covered per update, in (0, 1].
    smoothing: f32,
    /// Yaw/pitch reached with the pointer at the window edge.
    max_angle: Rad<f32>,
}

impl PointerLook {
    pub fn new(smoothing: f32, max_angle: Rad<f32>) -> Self {
        Self {
            target: Vector2::new(0.0, 0.0),
            current: Vector2::new(0.0, 0.0),
            smoothing: smoothing.clamp(f32::EPSILON, 1.0),
            max_angle,
        }
    }

    /// Only the most recent sample matters; earlier ones are overwritten.
    pub fn on_pointer_move(&mut self, x: f64, y: f64, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let nx = ((x / width as f64) * 2.0 - 1.0).clamp(-1.0, 1.0) as f32;
        let ny = ((y / height as f64) * 2.0 - 1.0).clamp(-1.0, 1.0) as f32;
        // Pointer right turns the view right, pointer up looks from above
        self.target = Vector2::new(nx, -ny) * self.max_angle.0;
    }

    pub fn update(&mut self) -> Vector2<f32> {
        self.current += (self.target - self.current) * self.smoothing;
        self.current
    }

    pub fn apply(&self, camera: &mut Camera) {
        camera.yaw = Rad(self.current.x);
        camera.pitch = Rad(self.current.y);
    }

    pub fn settled(&self) -> bool {
        (self.target - self.current).magnitude() < 1e-4
    }
}

/// GPU side of the camera: uniform buffer and its bind group.
#[derive(Debug)]
pub struct CameraResources {
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device, camera: &Camera, projection: &Projection) -> Self {
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(camera, projection);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
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
            label: Some("camera_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn write(&mut self, queue: &wgpu::Queue, camera: &Camera, projection: &Projection) {
        self.uniform.update_view_proj(camera, projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use cgmath::Deg;

    use super::*;

    #[test]
    fn default_camera_sits_on_positive_z() {
        let p = Camera::new(3.0).position();
        assert_relative_eq!(p.x, 0.0);
        assert_relative_eq!(p.z, 3.0);
    }

    #[test]
    fn orbit_keeps_distance() {
        let camera = Camera {
            distance: 3.0,
            yaw: Rad(0.7),
            pitch: Rad(-0.3),
        };
        let p = camera.position();
        assert_relative_eq!((p.x * p.x + p.y * p.y + p.z * p.z).sqrt(), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn resize_changes_aspect_only() {
        let mut projection = Projection::new(800, 600, Deg(75.0), 0.1, 100.0);
        projection.resize(1000, 500);
        assert_relative_eq!(projection.aspect(), 2.0);
        projection.resize(0, 0);
        assert_relative_eq!(projection.aspect(), 1.0);
    }

    #[test]
    fn pointer_look_converges_geometrically() {
        let mut look = PointerLook::new(0.5, Rad(0.2));
        look.on_pointer_move(100.0, 50.0, 100, 100);
        look.update();
        assert_relative_eq!(look.update().x, 0.15, epsilon = 1e-6);
        for _ in 0..40 {
            look.update();
        }
        assert!(look.settled());
    }

    #[test]
    fn only_the_latest_pointer_sample_counts() {
        let mut a = PointerLook::new(0.1, Rad(0.2));
        let mut b = a;
        a.on_pointer_move(0.0, 0.0, 100, 100);
        a.on_pointer_move(75.0, 25.0, 100, 100);
        b.on_pointer_move(75.0, 25.0, 100, 100);
        assert_eq!(a.update(), b.update());
    }
}
