// Heatmap rendering: shapes with a value are stamped as blurred density
// brushes onto an accumulation raster, and the accumulated density is mapped
// through a gradient palette into a visible RGBA surface.

pub mod backend;
pub mod blur;
pub mod brush;
pub mod cache;
pub mod context;
pub mod error;
pub mod heatmap;
pub mod host;
pub mod options;
pub mod palette;
pub mod registry;
pub mod surface;
pub mod types;

pub use backend::{ColorBackend, CpuBackend};
#[cfg(feature = "gpu")]
pub use backend::GpuBackend;
pub use brush::Brush;
pub use cache::BrushCache;
pub use context::PipelineContext;
pub use error::{Error, Result};
pub use heatmap::Heatmap;
pub use host::{DisplayHost, Headless, Layer};
pub use options::HeatmapOptions;
pub use palette::Palette;
pub use surface::{BoundingBox, DensitySurface, RenderStats};
pub use types::{Color, Geometry, GradientStop, Mask, Point, Shape, ShapeType};
