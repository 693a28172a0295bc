// The heatmap facade: owns the options, the shape registry, the brush cache,
// the density/visible surfaces and a color backend, and runs the
// accumulate → colorize cycle on demand.

use image::{GrayImage, RgbImage, RgbaImage};
use tracing::{debug, warn};

use crate::backend::{ColorBackend, CpuBackend};
use crate::brush::Brush;
use crate::cache::BrushCache;
use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::host::{DisplayHost, Layer};
use crate::options::HeatmapOptions;
use crate::palette::Palette;
use crate::registry::{self, IdentityFn, RasterizeFn};
use crate::surface::{BoundingBox, DensitySurface, RenderStats};
use crate::types::{Shape, ShapeType};

struct Surfaces {
    density: DensitySurface,
    visible: RgbaImage,
    // Density currently holds the remembered render list (false after resize).
    holds_render_list: bool,
}

impl Surfaces {
    fn new(width: u32, height: u32) -> Self {
        Self {
            density: DensitySurface::new(width, height),
            visible: RgbaImage::new(width, height),
            holds_render_list: false,
        }
    }

    /// Accumulate `shapes` and colorize. If the backend fails, `previous` is
    /// accumulated again so the density matches the untouched visible image.
    fn cycle(
        &mut self,
        context: &mut PipelineContext,
        backend: &mut dyn ColorBackend,
        shapes: &[Shape],
        previous: &[Shape],
    ) -> Result<RenderStats> {
        let stats = self.density.accumulate(context, shapes)?;
        if let Err(err) = backend.render(context, &self.density, &mut self.visible) {
            if let Err(restore) = self.density.accumulate(context, previous) {
                warn!(%restore, "could not restore the previous density");
            }
            return Err(err);
        }
        self.holds_render_list = true;
        Ok(stats)
    }
}

pub struct Heatmap<H: DisplayHost> {
    host: H,
    context: PipelineContext,
    backend: Box<dyn ColorBackend>,
    // `None` once destroyed.
    surfaces: Option<Surfaces>,
    render_list: Option<Vec<Shape>>,
}

impl<H: DisplayHost> Heatmap<H> {
    /// Heatmap sized to `host`, colorized in software. No shape types are
    /// registered yet; see [`register_default_shapes`](Self::register_default_shapes).
    pub fn new(host: H, options: HeatmapOptions) -> Result<Self> {
        Self::with_backend(host, options, Box::new(CpuBackend::new()))
    }

    pub fn with_backend(mut host: H, options: HeatmapOptions, mut backend: Box<dyn ColorBackend>) -> Result<Self> {
        options.validate()?;
        let palette = Palette::build(&options.gradient, options.palette_size)?;

        let (width, height) = host.size();
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }

        let context = PipelineContext::new(options, palette);
        backend.setup(&context, width, height)?;

        host.attach(Layer::Visible);
        if context.options.debug {
            host.attach(Layer::Density);
            host.attach(Layer::Palette);
        }
        debug!(width, height, debug = context.options.debug, "heatmap created");

        Ok(Self {
            host,
            context,
            backend,
            surfaces: Some(Surfaces::new(width, height)),
            render_list: None,
        })
    }

    /// Register circle, rectangle, diamond and path with their stock brushes.
    pub fn register_default_shapes(&mut self) -> Result<()> {
        self.ensure_alive()?;
        for (shape_type, identity, rasterize) in registry::default_registers() {
            self.context.registry.register(shape_type, identity, rasterize);
            self.context.cache.clear_type(shape_type);
        }
        Ok(())
    }

    /// Add or replace the handlers for a shape type. Brushes cached for that
    /// type are dropped; other types keep theirs.
    pub fn register_shape<I, R>(&mut self, shape_type: ShapeType, identity: I, rasterize: R) -> Result<()>
    where
        I: Fn(&Shape) -> String + 'static,
        R: Fn(&Shape) -> Result<Brush> + 'static,
    {
        self.ensure_alive()?;
        let identity: IdentityFn = Box::new(identity);
        let rasterize: RasterizeFn = Box::new(rasterize);
        self.context.registry.register(shape_type, identity, rasterize);
        self.context.cache.clear_type(shape_type);
        Ok(())
    }

    /// Accumulate `shapes` and colorize. On success the list is remembered
    /// for [`redraw`](Self::redraw); on failure nothing changes.
    pub fn render(&mut self, shapes: Vec<Shape>) -> Result<RenderStats> {
        let surfaces = self.surfaces.as_mut().ok_or(Error::UseAfterDestroy)?;
        let previous: &[Shape] = match &self.render_list {
            Some(list) if surfaces.holds_render_list => list.as_slice(),
            _ => &[],
        };
        let stats = surfaces.cycle(&mut self.context, self.backend.as_mut(), &shapes, previous)?;
        self.render_list = Some(shapes);
        Ok(stats)
    }

    /// Re-run the last successful render. Before any render this does nothing.
    pub fn redraw(&mut self) -> Result<RenderStats> {
        let surfaces = self.surfaces.as_mut().ok_or(Error::UseAfterDestroy)?;
        let Some(shapes) = self.render_list.as_deref() else {
            warn!("redraw called before any render");
            return Ok(RenderStats::default());
        };
        let previous: &[Shape] = if surfaces.holds_render_list { shapes } else { &[] };
        surfaces.cycle(&mut self.context, self.backend.as_mut(), shapes, previous)
    }

    /// Reallocate the surfaces at the new size. Cached brushes and the
    /// palette are kept; call [`redraw`](Self::redraw) to repaint. If the
    /// backend cannot resize, the heatmap keeps its current size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_alive()?;
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        self.backend.resize(&self.context, width, height)?;
        self.surfaces = Some(Surfaces::new(width, height));
        debug!(width, height, "heatmap resized");
        Ok(())
    }

    /// Release surfaces, cached brushes and backend resources. Every later
    /// call fails with [`Error::UseAfterDestroy`].
    pub fn destroy(&mut self) -> Result<()> {
        if self.surfaces.take().is_none() {
            return Err(Error::UseAfterDestroy);
        }
        self.backend.destroy();
        self.context.cache.clear();
        self.render_list = None;

        self.host.detach(Layer::Visible);
        if self.context.options.debug {
            self.host.detach(Layer::Density);
            self.host.detach(Layer::Palette);
        }
        debug!("heatmap destroyed");
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.surfaces.is_some() { Ok(()) } else { Err(Error::UseAfterDestroy) }
    }

    fn surfaces(&self) -> Result<&Surfaces> {
        self.surfaces.as_ref().ok_or(Error::UseAfterDestroy)
    }

    pub fn is_destroyed(&self) -> bool {
        self.surfaces.is_none()
    }

    pub fn width(&self) -> Result<u32> {
        Ok(self.surfaces()?.density.width())
    }

    pub fn height(&self) -> Result<u32> {
        Ok(self.surfaces()?.density.height())
    }

    pub fn options(&self) -> &HeatmapOptions {
        &self.context.options
    }

    pub fn palette(&self) -> &Palette {
        &self.context.palette
    }

    pub fn cache(&self) -> &BrushCache {
        &self.context.cache
    }

    pub fn bounding_box(&self) -> Result<BoundingBox> {
        Ok(self.surfaces()?.density.bounding_box())
    }

    /// The colorized output, top-down RGBA.
    pub fn visible(&self) -> Result<&RgbaImage> {
        Ok(&self.surfaces()?.visible)
    }

    pub fn density(&self) -> Result<&DensitySurface> {
        Ok(&self.surfaces()?.density)
    }

    /// Density raster as grayscale; `None` unless `debug` is on.
    pub fn density_image(&self) -> Result<Option<GrayImage>> {
        let surfaces = self.surfaces()?;
        Ok(self.context.options.debug.then(|| surfaces.density.to_image()))
    }

    /// Palette strip (`palette_size` x 1); `None` unless `debug` is on.
    pub fn palette_image(&self) -> Result<Option<RgbImage>> {
        self.ensure_alive()?;
        Ok(self.context.options.debug.then(|| self.context.palette.to_image()))
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::brush;
    use crate::host::Headless;

    /// Software backend that errors on render and resize while `fail` is set.
    struct Flaky {
        inner: CpuBackend,
        fail: Rc<Cell<bool>>,
    }

    impl ColorBackend for Flaky {
        fn setup(&mut self, ctx: &PipelineContext, width: u32, height: u32) -> Result<()> {
            self.inner.setup(ctx, width, height)
        }

        fn render(&mut self, ctx: &PipelineContext, density: &DensitySurface, visible: &mut RgbaImage) -> Result<()> {
            if self.fail.get() {
                return Err(Error::Gpu("readback failed".into()));
            }
            self.inner.render(ctx, density, visible)
        }

        fn resize(&mut self, ctx: &PipelineContext, width: u32, height: u32) -> Result<()> {
            if self.fail.get() {
                return Err(Error::Gpu("out of memory".into()));
            }
            self.inner.resize(ctx, width, height)
        }

        fn destroy(&mut self) {
            self.inner.destroy();
        }
    }

    fn flaky_heatmap(width: u32, height: u32) -> (Heatmap<Headless>, Rc<Cell<bool>>) {
        let fail = Rc::new(Cell::new(false));
        let backend = Flaky { inner: CpuBackend::new(), fail: Rc::clone(&fail) };
        let mut map =
            Heatmap::with_backend(Headless::new(width, height), HeatmapOptions::default(), Box::new(backend)).unwrap();
        map.register_default_shapes().unwrap();
        (map, fail)
    }

    fn heatmap(width: u32, height: u32) -> Heatmap<Headless> {
        let mut map = Heatmap::new(Headless::new(width, height), HeatmapOptions::default()).unwrap();
        map.register_default_shapes().unwrap();
        map
    }

    #[test]
    fn construction_rejects_bad_options_and_sizes() {
        let options = HeatmapOptions { min: 5.0, max: 5.0, ..Default::default() };
        assert!(matches!(
            Heatmap::new(Headless::new(10, 10), options),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Heatmap::new(Headless::new(0, 10), HeatmapOptions::default()),
            Err(Error::InvalidDimensions { width: 0, height: 10 })
        ));
    }

    #[test]
    fn visible_layer_attached_until_destroy() {
        let mut map = heatmap(16, 16);
        assert_eq!(map.host().attached(), &[Layer::Visible]);
        map.destroy().unwrap();
        assert!(map.host().attached().is_empty());
        assert!(map.is_destroyed());
    }

    #[test]
    fn register_shape_clears_only_that_type() {
        let mut map = heatmap(200, 200);
        map.render(vec![
            Shape::circle(100.0, 100.0, 5.0, 10.0),
            Shape::diamond(50.0, 50.0, 5.0, 10.0),
        ])
        .unwrap();
        assert_eq!(map.cache().len(), 2);

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        map.register_shape(ShapeType::Circle, registry::identity_key, move |shape: &Shape| {
            counter.set(counter.get() + 1);
            brush::circle_brush(shape)
        })
        .unwrap();
        assert_eq!(map.cache().len_for(ShapeType::Circle), 0);
        assert_eq!(map.cache().len_for(ShapeType::Diamond), 1);

        map.redraw().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn redraw_before_render_is_a_no_op() {
        let mut map = heatmap(8, 8);
        assert_eq!(map.redraw().unwrap(), RenderStats::default());
    }

    #[test]
    fn failed_render_keeps_previous_list() {
        let mut map = heatmap(200, 200);
        map.render(vec![Shape::circle(100.0, 100.0, 5.0, 10.0)]).unwrap();
        let bad = Shape::path(0.0, 0.0, 1.0, Vec::new());
        assert!(map.render(vec![bad]).is_err());

        let stats = map.redraw().unwrap();
        assert_eq!(stats.drawn, 1);
    }

    #[test]
    fn debug_layers_only_when_enabled() {
        let map = heatmap(8, 8);
        assert!(map.density_image().unwrap().is_none());
        assert!(map.palette_image().unwrap().is_none());

        let options = HeatmapOptions { debug: true, ..Default::default() };
        let map = Heatmap::new(Headless::new(8, 8), options).unwrap();
        assert!(map.host().is_attached(Layer::Density));
        assert_eq!(map.palette_image().unwrap().unwrap().dimensions(), (64, 1));
        assert_eq!(map.density_image().unwrap().unwrap().dimensions(), (8, 8));
    }

    #[test]
    fn backend_failure_keeps_previous_frame() {
        let (mut map, fail) = flaky_heatmap(200, 200);
        map.render(vec![Shape::circle(100.0, 100.0, 5.0, 20.0)]).unwrap();
        let density = map.density().unwrap().density().clone();
        let visible = map.visible().unwrap().clone();
        let bb = map.bounding_box().unwrap();

        fail.set(true);
        let err = map.render(vec![Shape::circle(10.0, 10.0, 5.0, 20.0)]).unwrap_err();
        assert!(matches!(err, Error::Gpu(_)));
        assert_eq!(map.density().unwrap().density(), &density);
        assert_eq!(map.visible().unwrap(), &visible);
        assert_eq!(map.bounding_box().unwrap(), bb);

        fail.set(false);
        assert_eq!(map.redraw().unwrap().drawn, 1);
        assert_eq!(map.bounding_box().unwrap(), bb);
        assert_eq!(map.density().unwrap().density(), &density);
    }

    #[test]
    fn backend_failure_after_resize_leaves_surface_empty() {
        let (mut map, fail) = flaky_heatmap(200, 200);
        map.render(vec![Shape::circle(100.0, 100.0, 5.0, 20.0)]).unwrap();
        map.resize(240, 240).unwrap();

        fail.set(true);
        assert!(map.redraw().is_err());
        assert!(map.density().unwrap().density().alpha.iter().all(|&a| a == 0.0));
        assert_eq!(map.bounding_box().unwrap(), BoundingBox::inverted(240, 240));
    }

    #[test]
    fn failed_backend_resize_keeps_current_size() {
        let (mut map, fail) = flaky_heatmap(200, 200);
        map.render(vec![Shape::circle(100.0, 100.0, 5.0, 20.0)]).unwrap();

        fail.set(true);
        assert!(map.resize(50, 50).is_err());
        assert_eq!((map.width().unwrap(), map.height().unwrap()), (200, 200));

        fail.set(false);
        assert_eq!(map.redraw().unwrap().drawn, 1);
    }
}
