//! Ordered dithering: the uniform block of the dither pass and a CPU rendition
//! of the same function.
//!
//! The dither shader (`pipelines/dither.wgsl`) and [`dither_pixel`] implement
//! one algorithm:
//!
//! 1. take the linear source colour to display space (gamma 2.2),
//! 2. compute its Rec. 601 luma,
//! 3. find the screen cell the pixel falls in, cells being `dot_size` pixels wide,
//! 4. look up the cell's threshold in a 4x4 Bayer matrix, shifted by time,
//! 5. quantise the luma to one of [`LEVELS`] grey levels using that threshold.
//!
//! Nothing is carried between frames; with `time` fixed the output is a pure
//! function of the source, the resolution and the dot size.

use crate::settings::DOT_SIZE_RANGE;

/// Bayer index matrix, row major.
pub const BAYER_4X4: [u32; 16] = [0, 8, 2, 10, 12, 4, 14, 6, 3, 11, 1, 9, 15, 7, 13, 5];
/// Number of output grey levels: black, grey, white.
pub const LEVELS: u32 = 3;
/// Pattern shifts per second when animated.
pub const ANIMATION_RATE: f32 = 4.0;
pub const GAMMA: f32 = 2.2;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DitherUniforms {
    /// Size of the texture being dithered, in pixels.
    resolution: [f32; 2],
    dot_size: f32,
    /// Seconds; 0 keeps the pattern still.
    time: f32,
}

impl DitherUniforms {
    pub fn new(resolution: [u32; 2], dot_size: f32) -> Self {
        let mut uniforms = Self {
            resolution: [0.0; 2],
            dot_size: 1.0,
            time: 0.0,
        };
        uniforms.set_resolution(resolution);
        uniforms.set_dot_size(dot_size);
        uniforms
    }

    pub fn resolution(&self) -> [u32; 2] {
        [self.resolution[0] as u32, self.resolution[1] as u32]
    }

    pub fn set_resolution(&mut self, resolution: [u32; 2]) {
        self.resolution = [resolution[0] as f32, resolution[1] as f32];
    }

    pub fn dot_size(&self) -> f32 {
        self.dot_size
    }

    pub fn set_dot_size(&mut self, dot_size: f32) {
        if !dot_size.is_nan() {
            self.dot_size = dot_size.clamp(*DOT_SIZE_RANGE.start(), *DOT_SIZE_RANGE.end());
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = if time.is_finite() { time.max(0.0) } else { 0.0 };
    }
}

pub fn display_luma(linear: [f32; 3]) -> f32 {
    let [r, g, b] = linear.map(|c| c.clamp(0.0, 1.0).powf(1.0 / GAMMA));
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Threshold in (0, 1) of pixel `(x, y)`.
pub fn threshold(x: u32, y: u32, dot_size: f32, time: f32) -> f32 {
    // Pixel centres, as the fragment shader sees them
    let cell_x = ((x as f32 + 0.5) / dot_size).floor() as u32;
    let cell_y = ((y as f32 + 0.5) / dot_size).floor() as u32;
    let shift = (time.max(0.0) * ANIMATION_RATE) as u32 % 4;
    let i = ((cell_y + shift) % 4) * 4 + (cell_x + shift) % 4;
    (BAYER_4X4[i as usize] as f32 + 0.5) / 16.0
}

/// Output level in display space (0, 0.5 or 1) of one pixel.
pub fn dither_pixel(linear: [f32; 3], x: u32, y: u32, dot_size: f32, time: f32) -> f32 {
    let steps = (LEVELS - 1) as f32;
    let t = threshold(x, y, dot_size, time);
    (display_luma(linear) * steps + t).floor().clamp(0.0, steps) / steps
}

/// Dither a whole linear image; the result holds display-space grey values.
pub fn dither_image(source: &image::Rgb32FImage, dot_size: f32, time: f32) -> image::GrayImage {
    image::GrayImage::from_fn(source.width(), source.height(), |x, y| {
        let image::Rgb(rgb) = *source.get_pixel(x, y);
        image::Luma([(dither_pixel(rgb, x, y, dot_size, time) * 255.0).round() as u8])
    })
}
