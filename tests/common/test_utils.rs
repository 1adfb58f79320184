use std::path::PathBuf;

use instant::Duration;

/// Device and queue without a window. `None` when the machine has no adapter
/// at all, so GPU tests can bail out instead of failing.
pub async fn headless_gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = match instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
    {
        Ok(adapter) => adapter,
        Err(e) => {
            eprintln!("skipping GPU test, no adapter: {}", e);
            return None;
        }
    };
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("test device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
        })
        .await
        .expect("adapter refused a default device");
    Some((device, queue))
}

/// Colour texture that can be drawn to and copied out, standing in for the
/// window surface.
pub fn output_texture(
    device: &wgpu::Device,
    size: [u32; 2],
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("test output"),
        size: wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

/// Copy an RGBA8 texture back to the CPU.
pub async fn read_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> image::RgbaImage {
    let (width, height) = (texture.width(), texture.height());
    let unpadded = 4 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: (padded * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).unwrap();
    });
    device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(Duration::from_secs(3)),
        })
        .unwrap();
    rx.receive().await.unwrap().unwrap();

    let data = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded * height) as usize);
    for row in data.chunks(padded as usize) {
        pixels.extend_from_slice(&row[..unpadded as usize]);
    }
    drop(data);
    buffer.unmap();
    image::RgbaImage::from_raw(width, height, pixels).unwrap()
}

fn triangle(x: f32) -> [[f32; 3]; 3] {
    [[x, 0.0, 0.0], [x + 1.0, 0.0, 0.0], [x, 1.0, 0.0]]
}

/// Writes `parts.gltf` + `parts.bin` into a fresh temp directory: one
/// triangle mesh per name, side by side along X, no materials.
pub fn write_named_triangles(tag: &str, names: &[&str]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dither-ngin-{}-{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let mut bin = Vec::new();
    let mut nodes = Vec::new();
    let mut meshes = Vec::new();
    let mut views = Vec::new();
    let mut accessors = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let x = i as f32 * 1.5;
        let offset = bin.len();
        for p in triangle(x) {
            for c in p {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        nodes.push(format!(r#"{{"name":"{name}","mesh":{i}}}"#));
        meshes.push(format!(
            r#"{{"name":"{name}","primitives":[{{"attributes":{{"POSITION":{i}}}}}]}}"#
        ));
        views.push(format!(
            r#"{{"buffer":0,"byteOffset":{offset},"byteLength":36}}"#
        ));
        accessors.push(format!(
            r#"{{"bufferView":{i},"componentType":5126,"count":3,"type":"VEC3","min":[{x},0,0],"max":[{},1,0]}}"#,
            x + 1.0
        ));
    }
    let node_ids: Vec<String> = (0..names.len()).map(|i| i.to_string()).collect();
    let json = format!(
        r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [{}]}}],
  "nodes": [{}],
  "meshes": [{}],
  "buffers": [{{"uri": "parts.bin", "byteLength": {}}}],
  "bufferViews": [{}],
  "accessors": [{}]
}}"#,
        node_ids.join(","),
        nodes.join(","),
        meshes.join(","),
        bin.len(),
        views.join(","),
        accessors.join(",")
    );
    std::fs::write(dir.join("parts.bin"), &bin).unwrap();
    std::fs::write(dir.join("parts.gltf"), json).unwrap();
    dir
}
