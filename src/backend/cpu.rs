// Software color mapper: the same bucketing and dither math as the GPU pass,
// evaluated per pixel on the host.

use image::{Rgba, RgbaImage};

use super::{ColorBackend, map_pixel};
use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::surface::DensitySurface;

#[derive(Debug, Default)]
pub struct CpuBackend {
    width: u32,
    height: u32,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ColorBackend for CpuBackend {
    fn setup(&mut self, _ctx: &PipelineContext, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        tracing::debug!(width, height, "cpu color backend ready");
        Ok(())
    }

    fn render(&mut self, ctx: &PipelineContext, density: &DensitySurface, visible: &mut RgbaImage) -> Result<()> {
        let (w, h) = (self.width, self.height);
        if density.width() != w || density.height() != h || visible.dimensions() != (w, h) {
            return Err(Error::Configuration(format!(
                "cpu backend is {w}x{h} but surfaces are {}x{} / {:?}",
                density.width(),
                density.height(),
                visible.dimensions()
            )));
        }

        let dither = ctx.options.dither;
        // Walk framebuffer rows bottom-up; row `fb_y` lands flipped at `h - 1 - fb_y`.
        for fb_y in 0..h {
            let row = h - 1 - fb_y;
            for x in 0..w {
                let px = map_pixel(density.at(x, row), &ctx.palette, dither, x, fb_y);
                visible.put_pixel(x, row, Rgba(px));
            }
        }
        Ok(())
    }

    fn resize(&mut self, _ctx: &PipelineContext, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn destroy(&mut self) {
        self.width = 0;
        self.height = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DITHER_DARK, bucket_index};
    use crate::options::HeatmapOptions;
    use crate::palette::Palette;

    fn context(dither: bool) -> PipelineContext {
        let options = HeatmapOptions { dither, ..Default::default() };
        let palette = Palette::build(&options.gradient, options.palette_size).unwrap();
        PipelineContext::new(options, palette)
    }

    #[test]
    fn empty_density_maps_to_first_bucket() {
        let ctx = context(false);
        let density = DensitySurface::new(8, 6);
        let mut visible = RgbaImage::new(8, 6);
        let mut backend = CpuBackend::new();
        backend.setup(&ctx, 8, 6).unwrap();
        backend.render(&ctx, &density, &mut visible).unwrap();

        assert!(visible.pixels().all(|p| p.0 == [0, 0, 255, 0]));
    }

    #[test]
    fn dither_rows_count_from_the_bottom() {
        let ctx = context(true);
        let density = DensitySurface::new(4, 6);
        let mut visible = RgbaImage::new(4, 6);
        let mut backend = CpuBackend::new();
        backend.setup(&ctx, 4, 6).unwrap();
        backend.render(&ctx, &density, &mut visible).unwrap();

        // Bottom visible row is framebuffer row 0: only x = 0 (threshold 1/16)
        // stays at full brightness for pure blue.
        let dark = (255.0 * DITHER_DARK).round() as u8;
        assert_eq!(visible.get_pixel(0, 5).0[2], 255);
        assert_eq!(visible.get_pixel(1, 5).0[2], dark);
        // Top visible row is framebuffer row 5 ≡ 1 (mod 4): thresholds
        // 0.8125, 0.3125, 0.9375, 0.4375 all darken blue.
        assert!((0..4).all(|x| visible.get_pixel(x, 0).0[2] == dark));
    }

    #[test]
    fn mismatched_surfaces_are_rejected() {
        let ctx = context(false);
        let density = DensitySurface::new(8, 8);
        let mut visible = RgbaImage::new(4, 4);
        let mut backend = CpuBackend::new();
        backend.setup(&ctx, 8, 8).unwrap();
        assert!(backend.render(&ctx, &density, &mut visible).is_err());
    }

    #[test]
    fn palette_index_matches_bucket() {
        let ctx = context(false);
        let expected = ctx.palette.get(bucket_index(0.5, 64));
        assert_eq!(expected, ctx.palette.get(32));
    }
}
