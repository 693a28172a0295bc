// Density accumulation surface.
//
// Each render pass clears only the region dirtied by the previous pass,
// composites every shape's brush scaled by its normalized value, and records
// the union of the new placements as the next dirty region.

use std::ops::Range;
use std::rc::Rc;

use image::{GrayImage, Luma};

use crate::brush::Brush;
use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::types::{Mask, Shape};

/// Lowest alpha a stamp is ever drawn with. Smaller alphas vanish when the
/// surface is read back at 8 bits, so they are raised to this floor.
pub const MIN_OPACITY: f32 = 0.01;

/// Normalize `value` into the `[min, max]` range. Not clamped above 1; floored
/// at [`MIN_OPACITY`].
#[inline]
pub fn opacity(value: f32, min: f32, max: f32) -> f32 {
    let alpha = (value - min) / (max - min);
    if alpha < MIN_OPACITY { MIN_OPACITY } else { alpha }
}

/// Axis-aligned rectangle in surface pixels; also used for stamp placements.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// "Inverted" box: any real placement shrinks it to fit.
    pub fn inverted(width: u32, height: u32) -> Self {
        Self { x0: width as f32, y0: height as f32, x1: 0.0, y1: 0.0 }
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }

    fn include(&mut self, other: &BoundingBox) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }

    /// Entirely outside a `width`x`height` viewport.
    fn is_outside(&self, width: f32, height: f32) -> bool {
        self.x0 > width || self.y0 > height || self.x1 < 0.0 || self.y1 < 0.0
    }

    /// Whole pixels touched by the box, clipped to the surface.
    fn pixel_span(&self, width: usize, height: usize) -> Option<(Range<usize>, Range<usize>)> {
        let clip = |lo: f32, hi: f32, limit: usize| {
            let start = lo.max(0.0).floor() as usize;
            let end = (hi.min(limit as f32).ceil().max(0.0) as usize).min(limit);
            (start < end).then_some(start..end)
        };
        Some((clip(self.x0, self.x1, width)?, clip(self.y0, self.y1, height)?))
    }
}

/// Per-pass draw counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub drawn: usize,
    pub culled: usize,
}

pub struct DensitySurface {
    density: Mask,
    bounding_box: BoundingBox,
}

impl DensitySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            density: Mask::new(width as usize, height as usize),
            bounding_box: BoundingBox::inverted(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.density.width as u32
    }

    pub fn height(&self) -> u32 {
        self.density.height as u32
    }

    /// Accumulated density; may exceed 1 where strong stamps overlap.
    pub fn density(&self) -> &Mask {
        &self.density
    }

    #[inline]
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.density.get(x as usize, y as usize)
    }

    /// Dirty region of the most recent pass.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Run one accumulation pass over `shapes`.
    ///
    /// Every shape is validated and every brush resolved before the raster is
    /// touched, so a failing call leaves the surface as it was.
    pub fn accumulate(&mut self, ctx: &mut PipelineContext, shapes: &[Shape]) -> Result<RenderStats> {
        for shape in shapes {
            let shape_type = shape.shape_type();
            if !ctx.registry.contains(shape_type) {
                return Err(Error::UnregisteredShapeType(shape_type));
            }
            shape.validate()?;
        }

        let mut brushes: Vec<Rc<Brush>> = Vec::with_capacity(shapes.len());
        for shape in shapes {
            let shape_type = shape.shape_type();
            let register = ctx
                .registry
                .get(shape_type)
                .ok_or(Error::UnregisteredShapeType(shape_type))?;
            let key = (register.identity)(shape);
            let brush = ctx
                .cache
                .get_or_create(shape_type, key, || (register.rasterize)(shape))?;
            brushes.push(brush);
        }

        self.clear_region(self.bounding_box);

        let (width, height) = (self.width() as f32, self.height() as f32);
        let (min, max) = (ctx.options.min, ctx.options.max);
        let mut bounding_box = BoundingBox::inverted(self.width(), self.height());
        let mut stats = RenderStats::default();

        for (shape, brush) in shapes.iter().zip(&brushes) {
            let x0 = shape.x + brush.offset_x;
            let y0 = shape.y + brush.offset_y;
            let placement = BoundingBox {
                x0,
                y0,
                x1: x0 + brush.width() as f32,
                y1: y0 + brush.height() as f32,
            };

            // don't draw if we're outside the surface
            if placement.is_outside(width, height) {
                stats.culled += 1;
                continue;
            }

            let alpha = opacity(shape.value, min, max);
            self.composite(brush, x0.round() as i32, y0.round() as i32, alpha);
            bounding_box.include(&placement);
            stats.drawn += 1;
        }

        self.bounding_box = bounding_box;
        tracing::trace!(
            drawn = stats.drawn,
            culled = stats.culled,
            ?bounding_box,
            "accumulated density"
        );
        Ok(stats)
    }

    /// Zero the pixels under `region`.
    fn clear_region(&mut self, region: BoundingBox) {
        let width = self.density.width;
        let Some((xs, ys)) = region.pixel_span(width, self.density.height) else {
            return;
        };
        for y in ys {
            let row = y * width;
            self.density.alpha[row + xs.start..row + xs.end].fill(0.0);
        }
    }

    /// Source-over composite of `brush` at integer `(x0, y0)` with a global
    /// alpha of `opacity`. Overlapping stamps build up; a draw never lowers
    /// the density already there.
    fn composite(&mut self, brush: &Brush, x0: i32, y0: i32, opacity: f32) {
        let (w, h) = (self.density.width as i32, self.density.height as i32);
        let (bw, bh) = (brush.width() as i32, brush.height() as i32);

        let kx0 = (-x0).max(0);
        let kx1 = (w - x0).min(bw);
        let ky0 = (-y0).max(0);
        let ky1 = (h - y0).min(bh);
        if kx0 >= kx1 || ky0 >= ky1 {
            return;
        }

        for ky in ky0..ky1 {
            let src = &brush.mask.alpha[(ky * bw) as usize..((ky + 1) * bw) as usize];
            let dst_row = ((y0 + ky) * w) as usize;
            for kx in kx0..kx1 {
                let s = src[kx as usize] * opacity;
                if s <= 0.0 {
                    continue;
                }
                let d = &mut self.density.alpha[dst_row + (x0 + kx) as usize];
                *d = d.max(s + *d * (1.0 - s));
            }
        }
    }

    /// Debug view of the density raster, saturated at 1.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([(self.at(x, y).clamp(0.0, 1.0) * 255.0).round() as u8])
        })
    }
}
