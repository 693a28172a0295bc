// Shape-type registry: for each [`ShapeType`], how to derive a geometry
// identity key and how to rasterize a brush.

use rustc_hash::FxHashMap;

use crate::brush::{self, Brush};
use crate::error::Result;
use crate::types::{Geometry, Shape, ShapeType};

pub type IdentityFn = Box<dyn Fn(&Shape) -> String>;
pub type RasterizeFn = Box<dyn Fn(&Shape) -> Result<Brush>>;

pub struct ShapeRegister {
    pub identity: IdentityFn,
    pub rasterize: RasterizeFn,
}

#[derive(Default)]
pub struct ShapeRegistry {
    entries: FxHashMap<ShapeType, ShapeRegister>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the handlers for `shape_type`.
    pub fn register(&mut self, shape_type: ShapeType, identity: IdentityFn, rasterize: RasterizeFn) {
        self.entries.insert(shape_type, ShapeRegister { identity, rasterize });
    }

    pub fn get(&self, shape_type: ShapeType) -> Option<&ShapeRegister> {
        self.entries.get(&shape_type)
    }

    pub fn contains(&self, shape_type: ShapeType) -> bool {
        self.entries.contains_key(&shape_type)
    }
}

/// Identity key from the size-determining fields only; position and value
/// never take part.
pub fn identity_key(shape: &Shape) -> String {
    match &shape.geometry {
        Geometry::Circle { radius } | Geometry::Diamond { radius } => format!("{radius}"),
        Geometry::Rectangle { width, height } => format!("{width}x{height}"),
        Geometry::Path { points } => serde_json::to_string(points).unwrap_or_default(),
    }
}

fn builtin(
    shape_type: ShapeType,
    rasterize: fn(&Shape) -> Result<Brush>,
) -> (ShapeType, IdentityFn, RasterizeFn) {
    (shape_type, Box::new(identity_key), Box::new(rasterize))
}

/// The four built-in shape kinds with their default rasterizers.
pub fn default_registers() -> Vec<(ShapeType, IdentityFn, RasterizeFn)> {
    vec![
        builtin(ShapeType::Circle, brush::circle_brush),
        builtin(ShapeType::Rectangle, brush::rectangle_brush),
        builtin(ShapeType::Diamond, brush::diamond_brush),
        builtin(ShapeType::Path, brush::path_brush),
    ]
}
