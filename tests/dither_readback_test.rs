#![cfg(feature = "integration-tests")]

use dither_ngin::{
    data_structures::texture::Texture,
    dither::{DitherUniforms, dither_image},
    pipelines::dither::DitherResources,
};

mod common;

use common::test_utils::{headless_gpu, output_texture, read_rgba};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

fn gradient(width: u32, height: u32) -> image::RgbaImage {
    image::RgbaImage::from_fn(width, height, |x, y| {
        let u = x * 255 / (width - 1);
        let v = y * 255 / (height - 1);
        image::Rgba([u as u8, ((u + v) / 2) as u8, v as u8, 255])
    })
}

fn as_linear(rgba: &image::RgbaImage) -> image::Rgb32FImage {
    image::Rgb32FImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, _] = rgba.get_pixel(x, y).0;
        image::Rgb([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0])
    })
}

async fn dither_on_gpu(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &image::RgbaImage,
    dot_size: f32,
    time: f32,
) -> image::RgbaImage {
    let size = [source.width(), source.height()];
    let input = Texture::from_rgba(device, queue, source, Some("dither source"), true);
    let mut uniforms = DitherUniforms::new(size, dot_size);
    uniforms.set_time(time);
    let dither = DitherResources::new(device, FORMAT, &input, uniforms).unwrap();
    draw(device, queue, &dither, size).await
}

async fn draw(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    dither: &DitherResources,
    size: [u32; 2],
) -> image::RgbaImage {
    let output = output_texture(device, size, FORMAT);
    let view = output.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("dither only"),
    });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("dither only"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::RED),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&dither.pipeline);
        pass.set_bind_group(0, &dither.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
    queue.submit(std::iter::once(encoder.finish()));
    read_rgba(device, queue, &output).await
}

fn mismatches(gpu: &image::RgbaImage, cpu: &image::GrayImage) -> usize {
    gpu.pixels()
        .zip(cpu.pixels())
        .filter(|(g, c)| g.0[0].abs_diff(c.0[0]) > 3)
        .count()
}

#[tokio::test]
async fn shader_matches_cpu_reference() {
    let Some((device, queue)) = headless_gpu().await else {
        return;
    };
    let source = gradient(48, 32);
    let linear = as_linear(&source);
    // Pixels sitting exactly on a threshold may round either way
    let allowed = (48 * 32) / 50;

    for dot_size in [1.0, 2.0, 3.0] {
        let gpu = dither_on_gpu(&device, &queue, &source, dot_size, 0.0).await;
        let cpu = dither_image(&linear, dot_size, 0.0);
        let bad = mismatches(&gpu, &cpu);
        assert!(bad <= allowed, "dot size {dot_size}: {bad} pixels differ");
    }
}

#[tokio::test]
async fn animation_shifts_the_pattern() {
    let Some((device, queue)) = headless_gpu().await else {
        return;
    };
    let source = image::RgbaImage::from_pixel(16, 16, image::Rgba([90, 90, 90, 255]));
    let still = dither_on_gpu(&device, &queue, &source, 1.0, 0.0).await;
    let moved = dither_on_gpu(&device, &queue, &source, 1.0, 0.3).await;
    assert_ne!(still, moved);

    let linear = as_linear(&source);
    let cpu = dither_image(&linear, 1.0, 0.3);
    assert!(mismatches(&moved, &cpu) <= 5);
}

#[tokio::test]
async fn written_uniforms_replace_the_initial_ones() {
    let Some((device, queue)) = headless_gpu().await else {
        return;
    };
    let source = gradient(48, 32);
    let input = Texture::from_rgba(&device, &queue, &source, Some("dither source"), true);
    let dither =
        DitherResources::new(&device, FORMAT, &input, DitherUniforms::new([48, 32], 1.0)).unwrap();
    dither.write(&queue, DitherUniforms::new([48, 32], 3.0));
    let gpu = draw(&device, &queue, &dither, [48, 32]).await;

    let cpu = dither_image(&as_linear(&source), 3.0, 0.0);
    assert!(mismatches(&gpu, &cpu) <= (48 * 32) / 50);
}
