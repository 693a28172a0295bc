// Color mapping backends: density raster + palette → visible RGBA surface.
//
// The per-pixel transform is the same for every backend:
// 1. `bucket = floor(density · palette_size)`, clamped to the last bucket;
// 2. color = `palette[bucket]`, alpha = density (saturated at 1);
// 3. optional 4x4 ordered dither on the color's luma (×0.9 or ×1.0);
// 4. rows are produced in framebuffer order (bottom-left origin) and flipped
//    into the top-down visible surface.

use image::RgbaImage;

use crate::context::PipelineContext;
use crate::error::Result;
use crate::palette::Palette;
use crate::surface::DensitySurface;

pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;

pub use cpu::CpuBackend;
#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

/// Ordered-dither thresholds, indexed by `x % 4 + (y % 4) * 4`.
pub const DITHER_4X4: [f32; 16] = [
    0.0625, 0.5625, 0.1875, 0.6875, //
    0.8125, 0.3125, 0.9375, 0.4375, //
    0.25, 0.75, 0.125, 0.625, //
    1.0, 0.5, 0.875, 0.375,
];

/// Brightness multipliers picked by the dither threshold.
pub const DITHER_DARK: f32 = 0.9;
pub const DITHER_LIGHT: f32 = 1.0;

/// A pluggable color mapping stage.
///
/// `setup` runs once at construction, `resize` whenever the surfaces are
/// reallocated, `render` once per render call, `destroy` once at teardown.
pub trait ColorBackend {
    fn setup(&mut self, ctx: &PipelineContext, width: u32, height: u32) -> Result<()>;

    fn render(&mut self, ctx: &PipelineContext, density: &DensitySurface, visible: &mut RgbaImage) -> Result<()>;

    fn resize(&mut self, ctx: &PipelineContext, width: u32, height: u32) -> Result<()>;

    fn destroy(&mut self);
}

/// Palette bucket for a density value. Overshoot past 1 lands in the last bucket.
#[inline]
pub fn bucket_index(density: f32, palette_size: usize) -> usize {
    let i = (density * palette_size as f32).floor();
    if i.is_nan() || i < 0.0 {
        0
    } else {
        (i as usize).min(palette_size - 1)
    }
}

#[inline]
pub fn luma(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

/// Brightness multiplier at framebuffer pixel `(x, y)` for a color of `brightness`.
#[inline]
pub fn dither_factor(x: u32, y: u32, brightness: f32) -> f32 {
    let limit = DITHER_4X4[(x % 4 + (y % 4) * 4) as usize];
    if brightness < limit { DITHER_DARK } else { DITHER_LIGHT }
}

/// Final RGBA for one pixel. `fb_y` counts rows from the bottom.
#[inline]
pub fn map_pixel(density: f32, palette: &Palette, dither: bool, x: u32, fb_y: u32) -> [u8; 4] {
    let mut rgb = palette.get(bucket_index(density, palette.len()));
    if dither {
        let k = dither_factor(x, fb_y, luma(rgb));
        rgb = rgb.map(|c| c * k);
    }
    [to_unorm8(rgb[0]), to_unorm8(rgb[1]), to_unorm8(rgb[2]), to_unorm8(density)]
}

#[inline]
fn to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
