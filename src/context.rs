// State shared by the render stages. Owned by the `Heatmap` facade and lent
// out per call: `&mut` to the accumulation surface (it fills the brush cache),
// `&` to the color backend.

use crate::cache::BrushCache;
use crate::options::HeatmapOptions;
use crate::palette::Palette;
use crate::registry::ShapeRegistry;

pub struct PipelineContext {
    pub options: HeatmapOptions,
    pub registry: ShapeRegistry,
    pub cache: BrushCache,
    pub palette: Palette,
}

impl PipelineContext {
    pub fn new(options: HeatmapOptions, palette: Palette) -> Self {
        Self {
            options,
            registry: ShapeRegistry::new(),
            cache: BrushCache::new(),
            palette,
        }
    }
}
