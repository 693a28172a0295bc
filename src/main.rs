// Heatmap demo.
// • Shapes bounce around the window; overlapping shapes heat up.
// • Hold Left Mouse: drop a trail of small circles under the cursor.
// • C clears the trail. ESC quits.
// • `--snapshot out.png` renders headless and writes PNGs instead.

mod scene;
mod window;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use heatmap_renderer::{ColorBackend, CpuBackend, DisplayHost, Headless, Heatmap, HeatmapOptions, Result};
use tracing::info;

use scene::Scene;
use window::WindowHost;

/// Render a bouncing-shapes heatmap in a window or to PNG.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Viewport width in pixels
    #[arg(long, default_value = "800")]
    width: u32,

    /// Viewport height in pixels
    #[arg(long, default_value = "600")]
    height: u32,

    /// Number of bouncing shapes
    #[arg(short, long, default_value = "256")]
    count: usize,

    /// TOML file with heatmap options; defaults scale `max` to the scene
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render headless and write the visible surface to this PNG
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Scene steps simulated before a snapshot is taken
    #[arg(long, default_value = "60")]
    frames: u32,

    /// Seed for the scene generator
    #[arg(long, default_value = "12648430")]
    seed: u32,

    /// Colorize on the GPU
    #[cfg(feature = "gpu")]
    #[arg(long)]
    gpu: bool,
}

fn load_options(args: &Args, scene: &Scene) -> Result<HeatmapOptions> {
    match &args.config {
        Some(path) => HeatmapOptions::from_toml(&std::fs::read_to_string(path)?),
        None => {
            let mut options = HeatmapOptions::default();
            let max = scene.max_value();
            if max > options.min {
                options.max = max;
            }
            Ok(options)
        }
    }
}

fn backend(args: &Args) -> Result<Box<dyn ColorBackend>> {
    #[cfg(feature = "gpu")]
    if args.gpu {
        return Ok(Box::new(heatmap_renderer::GpuBackend::new()?));
    }
    let _ = args;
    Ok(Box::new(CpuBackend::new()))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("heatmap");
    path.with_file_name(format!("{stem}-{suffix}.png"))
}

fn snapshot(args: &Args, mut scene: Scene, options: HeatmapOptions, out: &Path) -> Result<()> {
    let host = Headless::new(args.width, args.height);
    let mut heatmap = Heatmap::with_backend(host, options, backend(args)?)?;
    heatmap.register_default_shapes()?;

    for _ in 0..args.frames {
        scene.step(args.width, args.height);
    }
    let stats = heatmap.render(scene.shapes())?;
    info!(drawn = stats.drawn, culled = stats.culled, brushes = heatmap.cache().len(), "rendered");

    heatmap.visible()?.save(out)?;
    if let Some(density) = heatmap.density_image()? {
        density.save(sibling(out, "density"))?;
    }
    if let Some(palette) = heatmap.palette_image()? {
        palette.save(sibling(out, "palette"))?;
    }
    info!(path = %out.display(), "snapshot written");
    heatmap.destroy()
}

fn run_window(args: &Args, mut scene: Scene, options: HeatmapOptions) -> Result<()> {
    let host = WindowHost::new("Heatmap", args.width, args.height)?;
    let mut heatmap = Heatmap::with_backend(host, options, backend(args)?)?;
    heatmap.register_default_shapes()?;
    info!(layers = ?heatmap.host().layers(), "window ready");

    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;

    while heatmap.host().is_open() && !heatmap.host().esc_pressed() {
        if heatmap.host_mut().sync_size() {
            let (w, h) = heatmap.host().size();
            heatmap.resize(w, h)?;
        }

        if heatmap.host().c_pressed_once() {
            scene.clear_trail();
        }
        if heatmap.host().left_mouse_down() {
            if let Some((mx, my)) = heatmap.host().mouse_pos() {
                scene.push_trail(mx, my);
            }
        }

        let (w, h) = (heatmap.width()?, heatmap.height()?);
        scene.step(w, h);
        let stats = heatmap.render(scene.shapes())?;

        // Borrow the image and the host separately.
        let visible = heatmap.visible()?.clone();
        heatmap.host_mut().present(&visible)?;

        frames_this_second += 1;
        let now = Instant::now();
        if now.duration_since(last_fps_time) >= Duration::from_secs(1) {
            let fps = frames_this_second as f32 / now.duration_since(last_fps_time).as_secs_f32();
            info!("FPS: {fps:.1} ({} drawn, {} culled)", stats.drawn, stats.culled);
            frames_this_second = 0;
            last_fps_time = now;
        }
    }

    heatmap.destroy()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let scene = Scene::bouncing(args.seed, args.count, args.width, args.height);
    let options = load_options(&args, &scene)?;

    match &args.snapshot {
        Some(out) => snapshot(&args, scene, options, out),
        None => run_window(&args, scene, options),
    }
}
