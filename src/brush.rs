// Brush rasterizers: shape geometry → blurred density stamp.
//
// Every stamp reserves a margin of [`SHADOW_BLUR`] pixels around the
// silhouette for the blur falloff, and reports that margin back as a negative
// offset so the accumulation surface can place all shape kinds the same way:
// `top_left = (shape.x + offset_x, shape.y + offset_y)`.
//
// Only alpha is kept. Silhouettes are drawn opaque black, so the stamp's
// alpha channel is the density it contributes.

use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::blur::gaussian_blur;
use crate::error::{Error, Result};
use crate::types::{Geometry, Mask, Shape};

/// Blur margin around every silhouette, in pixels.
pub const SHADOW_BLUR: f32 = 40.0;
/// Second, tighter blur applied over the whole stamp.
pub const FILTER_BLUR: f32 = 8.0;
/// Stroke width for path shapes.
pub const LINE_WIDTH: f32 = 8.0;
pub const HALF_LINE_WIDTH: f32 = LINE_WIDTH / 2.0;

/// An immutable rasterized stamp plus where to put it relative to its shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Brush {
    pub mask: Mask,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Brush {
    pub fn width(&self) -> usize {
        self.mask.width
    }

    pub fn height(&self) -> usize {
        self.mask.height
    }
}

/// Canvas dimension for a (possibly fractional) size, rounded up to whole pixels.
#[inline]
fn canvas_px(size: f32) -> u32 {
    size.ceil().max(1.0) as u32
}

fn pixmap(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| {
        Error::Configuration(format!("cannot allocate a {width}x{height} brush canvas"))
    })
}

fn black() -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(0, 0, 0, 255);
    paint.anti_alias = true;
    paint
}

/// Turn a drawn silhouette into the final stamp: shape over its shadow, then
/// the filter blur over both (canvas `shadowBlur` is a gaussian of sigma
/// `blur / 2`).
fn finish(pixmap: &Pixmap, offset_x: f32, offset_y: f32) -> Result<Brush> {
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;

    let mut shape = Mask::new(width, height);
    for (a, px) in shape.alpha.iter_mut().zip(pixmap.pixels()) {
        *a = px.alpha() as f32 / 255.0;
    }

    let mut shadow = shape.clone();
    gaussian_blur(&mut shadow, SHADOW_BLUR / 2.0)?;

    let mut stamp = shadow;
    for (dst, &src) in stamp.alpha.iter_mut().zip(&shape.alpha) {
        *dst = src + *dst * (1.0 - src);
    }
    gaussian_blur(&mut stamp, FILTER_BLUR)?;

    Ok(Brush { mask: stamp, offset_x, offset_y })
}

fn mismatch(expected: &str, shape: &Shape) -> Error {
    Error::Configuration(format!(
        "{expected} brush given a {:?} shape",
        shape.shape_type()
    ))
}

/// Filled disc; stamp side = 2·radius + 2·margin.
pub fn circle_brush(shape: &Shape) -> Result<Brush> {
    let Geometry::Circle { radius } = shape.geometry else {
        return Err(mismatch("circle", shape));
    };
    let side = canvas_px(radius * 2.0 + SHADOW_BLUR * 2.0);
    let mut canvas = pixmap(side, side)?;

    let center = radius + SHADOW_BLUR;
    if let Some(path) = PathBuilder::from_circle(center, center, radius) {
        canvas.fill_path(&path, &black(), FillRule::Winding, Transform::identity(), None);
    }

    finish(&canvas, -SHADOW_BLUR, -SHADOW_BLUR)
}

/// Square rotated 45°. The canvas reserves an extra `radius` on each axis and
/// the silhouette sits `radius` in from the margin.
pub fn diamond_brush(shape: &Shape) -> Result<Brush> {
    let Geometry::Diamond { radius } = shape.geometry else {
        return Err(mismatch("diamond", shape));
    };
    let diameter = radius * 2.0;
    let side = canvas_px(diameter + radius + SHADOW_BLUR * 2.0);
    let mut canvas = pixmap(side, side)?;

    let x = SHADOW_BLUR + radius;
    let y = SHADOW_BLUR + radius;
    let mut pb = PathBuilder::new();
    pb.move_to(x + radius, y); // top center
    pb.line_to(x + diameter, y + radius); // middle right
    pb.line_to(x + radius, y + diameter); // bottom center
    pb.line_to(x, y + radius); // middle left
    pb.close();
    if let Some(path) = pb.finish() {
        canvas.fill_path(&path, &black(), FillRule::Winding, Transform::identity(), None);
    }

    finish(&canvas, -SHADOW_BLUR, -SHADOW_BLUR)
}

/// Filled rectangle; stamp = (width + 2·margin, height + 2·margin).
pub fn rectangle_brush(shape: &Shape) -> Result<Brush> {
    let Geometry::Rectangle { width, height } = shape.geometry else {
        return Err(mismatch("rectangle", shape));
    };
    let mut canvas = pixmap(
        canvas_px(width + SHADOW_BLUR * 2.0),
        canvas_px(height + SHADOW_BLUR * 2.0),
    )?;

    if let Some(rect) = Rect::from_xywh(SHADOW_BLUR, SHADOW_BLUR, width, height) {
        canvas.fill_rect(rect, &black(), Transform::identity(), None);
    }

    finish(&canvas, -SHADOW_BLUR, -SHADOW_BLUR)
}

/// Stroked polyline. The extent always includes the shape origin; points left
/// of or above the origin shift the stamp instead of being clipped.
pub fn path_brush(shape: &Shape) -> Result<Brush> {
    let Geometry::Path { points } = &shape.geometry else {
        return Err(mismatch("path", shape));
    };
    if points.is_empty() {
        return Err(Error::Configuration("path shape has no points".into()));
    }

    let (mut x0, mut y0, mut x1, mut y1) = (0.0_f32, 0.0_f32, 0.0_f32, 0.0_f32);
    for p in points {
        x0 = x0.min(p.x);
        x1 = x1.max(p.x);
        y0 = y0.min(p.y);
        y1 = y1.max(p.y);
    }

    let pad = SHADOW_BLUR + HALF_LINE_WIDTH;
    let mut canvas = pixmap(
        canvas_px(x1 - x0 + SHADOW_BLUR * 2.0 + LINE_WIDTH),
        canvas_px(y1 - y0 + SHADOW_BLUR * 2.0 + LINE_WIDTH),
    )?;

    let mut pb = PathBuilder::new();
    for (i, p) in points.iter().enumerate() {
        let (px, py) = (p.x - x0 + pad, p.y - y0 + pad);
        if i == 0 {
            pb.move_to(px, py);
        } else {
            pb.line_to(px, py);
        }
    }
    // A single point has no segments and strokes nothing.
    if let Some(path) = pb.finish() {
        let stroke = Stroke { width: LINE_WIDTH, ..Stroke::default() };
        canvas.stroke_path(&path, &black(), &stroke, Transform::identity(), None);
    }

    finish(&canvas, x0 - pad, y0 - pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn peak(brush: &Brush) -> f32 {
        brush.mask.alpha.iter().copied().fold(0.0, f32::max)
    }

    #[test]
    fn circle_stamp_reserves_blur_margin() {
        let brush = circle_brush(&Shape::circle(0.0, 0.0, 1.0, 20.0)).unwrap();
        assert_eq!(brush.width(), 120);
        assert_eq!(brush.height(), 120);
        assert_eq!(brush.offset_x, -SHADOW_BLUR);
        assert_eq!(brush.offset_y, -SHADOW_BLUR);

        // Dense at the center, fading to nothing at the corner.
        let center = brush.mask.get(60, 60);
        assert!(center > 0.5, "center alpha {center}");
        assert!(brush.mask.get(0, 0) < 0.01);
    }

    #[test]
    fn diamond_reserves_extra_radius() {
        let brush = diamond_brush(&Shape::diamond(0.0, 0.0, 1.0, 10.0)).unwrap();
        assert_eq!(brush.width(), 30 + 80);
        assert_eq!(brush.height(), 30 + 80);
        // Silhouette center sits at margin + 2·radius.
        assert!(brush.mask.get(60, 60) > brush.mask.get(45, 45));
    }

    #[test]
    fn rectangle_stamp_dimensions() {
        let brush = rectangle_brush(&Shape::rectangle(0.0, 0.0, 1.0, 30.0, 10.0)).unwrap();
        assert_eq!((brush.width(), brush.height()), (110, 90));
        assert!(peak(&brush) > 0.0);
    }

    #[test]
    fn path_stamp_covers_extent_and_stroke() {
        let points = vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(100.0, 50.0)];
        let brush = path_brush(&Shape::path(0.0, 0.0, 1.0, points)).unwrap();
        assert_eq!((brush.width(), brush.height()), (188, 138));
        assert_eq!(brush.offset_x, -SHADOW_BLUR - HALF_LINE_WIDTH);
        assert!(peak(&brush) > 0.0);
    }

    #[test]
    fn path_with_negative_points_shifts_offset() {
        let points = vec![Point::new(-20.0, -10.0), Point::new(30.0, 10.0)];
        let brush = path_brush(&Shape::path(0.0, 0.0, 1.0, points)).unwrap();
        assert_eq!(brush.offset_x, -20.0 - SHADOW_BLUR - HALF_LINE_WIDTH);
        assert_eq!(brush.offset_y, -10.0 - SHADOW_BLUR - HALF_LINE_WIDTH);
        assert_eq!(brush.width(), 50 + 88);
    }

    #[test]
    fn rasterizer_rejects_other_shape_kinds() {
        assert!(circle_brush(&Shape::diamond(0.0, 0.0, 1.0, 5.0)).is_err());
        assert!(path_brush(&Shape::path(0.0, 0.0, 1.0, Vec::new())).is_err());
    }

    #[test]
    fn rasterization_is_deterministic() {
        let a = circle_brush(&Shape::circle(5.0, 5.0, 1.0, 12.0)).unwrap();
        let b = circle_brush(&Shape::circle(90.0, 3.0, 7.0, 12.0)).unwrap();
        assert_eq!(a, b);
    }
}
