// Core types shared by the brush, surface and palette stages.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A 2D point in pixels, relative to the owning shape's origin for paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Discriminant used to look up a shape's brush handlers in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Circle,
    Rectangle,
    Diamond,
    Path,
}

/// Size-determining part of a shape. Only these fields feed the identity key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Circle { radius: f32 },
    /// Square rotated 45°, width = height = 2·radius.
    Diamond { radius: f32 },
    Rectangle { width: f32, height: f32 },
    /// Stroked polyline; footprint spans the points' bounding extent.
    Path { points: Vec<Point> },
}

/// One marker: where it is, how much it weighs, and what it looks like.
///
/// `value` is not clamped; it is normalized against the configured
/// `[min, max]` range at composite time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub x: f32,
    pub y: f32,
    pub value: f32,
    #[serde(flatten)]
    pub geometry: Geometry,
}

impl Shape {
    pub fn circle(x: f32, y: f32, value: f32, radius: f32) -> Self {
        Self { x, y, value, geometry: Geometry::Circle { radius } }
    }

    pub fn diamond(x: f32, y: f32, value: f32, radius: f32) -> Self {
        Self { x, y, value, geometry: Geometry::Diamond { radius } }
    }

    pub fn rectangle(x: f32, y: f32, value: f32, width: f32, height: f32) -> Self {
        Self { x, y, value, geometry: Geometry::Rectangle { width, height } }
    }

    pub fn path(x: f32, y: f32, value: f32, points: Vec<Point>) -> Self {
        Self { x, y, value, geometry: Geometry::Path { points } }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self.geometry {
            Geometry::Circle { .. } => ShapeType::Circle,
            Geometry::Diamond { .. } => ShapeType::Diamond,
            Geometry::Rectangle { .. } => ShapeType::Rectangle,
            Geometry::Path { .. } => ShapeType::Path,
        }
    }

    /// Reject geometry the rasterizers cannot turn into a stamp.
    pub fn validate(&self) -> Result<()> {
        if !(self.x.is_finite() && self.y.is_finite() && self.value.is_finite()) {
            return Err(Error::Configuration(format!(
                "{:?} shape has a non-finite position or value",
                self.shape_type()
            )));
        }
        let size_ok = |v: f32| v.is_finite() && v >= 0.0;
        let ok = match &self.geometry {
            Geometry::Circle { radius } | Geometry::Diamond { radius } => size_ok(*radius),
            Geometry::Rectangle { width, height } => size_ok(*width) && size_ok(*height),
            Geometry::Path { points } => {
                if points.is_empty() {
                    return Err(Error::Configuration("path shape has no points".into()));
                }
                points.iter().all(|p| p.x.is_finite() && p.y.is_finite())
            }
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "{:?} shape has negative or non-finite geometry",
                self.shape_type()
            )))
        }
    }
}

/// 8-bit RGB color, as gradient stops are authored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A gradient stop: `offset` in [0, 1] along the color ramp.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// Single-channel alpha raster, row-major, values nominally in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub alpha: Vec<f32>, // length = width * height
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, alpha: vec![0.0; width * height] }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.alpha[y * self.width + x]
    }
}
