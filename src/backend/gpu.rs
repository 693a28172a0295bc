// wgpu color mapper. The density raster is uploaded as an R32Float texture,
// the palette as a storage buffer; one fullscreen pass does the bucketing and
// dither, and the result is read back into the visible surface.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;

use super::{ColorBackend, DITHER_4X4, DITHER_DARK, DITHER_LIGHT};
use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::surface::DensitySurface;

const SHADER: &str = r#"
struct Params {
    palette_size: u32,
    dither: u32,
    height: u32,
    _pad: u32,
};

@group(0) @binding(0) var density: texture_2d<f32>;
@group(0) @binding(1) var<storage, read> palette: array<vec4<f32>>;
@group(0) @binding(2) var<uniform> params: Params;

@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((i << 1u) & 2u), f32(i & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let x = u32(pos.x);
    let row = u32(pos.y);
    let a = textureLoad(density, vec2<i32>(i32(x), i32(row)), 0).r;

    let n = params.palette_size;
    let bucket = min(u32(max(floor(a * f32(n)), 0.0)), n - 1u);
    var rgb = palette[bucket].rgb;

    if (params.dither != 0u) {
        var thresholds = array<f32, 16>(DITHER_TABLE);
        let fb_y = params.height - 1u - row;
        let limit = thresholds[(x % 4u) + (fb_y % 4u) * 4u];
        let luma = dot(rgb, vec3<f32>(0.299, 0.587, 0.114));
        rgb = rgb * select(DITHER_LIGHT, DITHER_DARK, luma < limit);
    }
    return vec4<f32>(rgb, clamp(a, 0.0, 1.0));
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Params {
    palette_size: u32,
    dither: u32,
    height: u32,
    _pad: u32,
}

/// Size-dependent resources, rebuilt on resize.
struct Targets {
    width: u32,
    height: u32,
    padded_row: u32,
    density: wgpu::Texture,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct Gpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    palette: Option<wgpu::Buffer>,
    params: wgpu::Buffer,
    targets: Option<Targets>,
}

pub struct GpuBackend {
    // `None` after destroy.
    gpu: Option<Gpu>,
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn shader_source() -> String {
    let table = DITHER_4X4.map(|v| format!("{v:?}")).join(", ");
    SHADER
        .replace("DITHER_TABLE", &table)
        .replace("DITHER_LIGHT", &format!("{DITHER_LIGHT:?}"))
        .replace("DITHER_DARK", &format!("{DITHER_DARK:?}"))
}

impl GpuBackend {
    /// Open a headless device and compile the color pass.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Gpu("no suitable adapter".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("heatmap device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("heatmap color shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source().into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("heatmap color layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("heatmap color pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("heatmap color pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("heatmap params"),
            size: std::mem::size_of::<Params>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::debug!(adapter = ?adapter.get_info().name, "gpu color backend ready");
        Ok(Self {
            gpu: Some(Gpu { device, queue, pipeline, layout, palette: None, params, targets: None }),
        })
    }

    fn gpu_mut(&mut self) -> Result<&mut Gpu> {
        self.gpu.as_mut().ok_or(Error::UseAfterDestroy)
    }
}

impl Gpu {
    fn upload_palette(&mut self, ctx: &PipelineContext) {
        let colors: Vec<[f32; 4]> = ctx.palette.colors().iter().map(|c| [c[0], c[1], c[2], 1.0]).collect();
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("heatmap palette"),
            size: (colors.len() * std::mem::size_of::<[f32; 4]>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&colors));
        self.palette = Some(buffer);
    }

    fn build_targets(&self, width: u32, height: u32) -> Result<Targets> {
        let palette = self
            .palette
            .as_ref()
            .ok_or_else(|| Error::Gpu("palette not uploaded".into()))?;
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };

        let density = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("heatmap density"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let density_view = density.create_view(&wgpu::TextureViewDescriptor::default());

        let output = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("heatmap visible"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_row = padded_bytes_per_row(width);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("heatmap readback"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("heatmap color bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&density_view) },
                wgpu::BindGroupEntry { binding: 1, resource: palette.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.params.as_entire_binding() },
            ],
        });

        Ok(Targets { width, height, padded_row, density, output, output_view, readback, bind_group })
    }
}

impl ColorBackend for GpuBackend {
    fn setup(&mut self, ctx: &PipelineContext, width: u32, height: u32) -> Result<()> {
        let gpu = self.gpu_mut()?;
        gpu.upload_palette(ctx);
        gpu.targets = Some(gpu.build_targets(width, height)?);
        Ok(())
    }

    fn render(&mut self, ctx: &PipelineContext, surface: &DensitySurface, visible: &mut RgbaImage) -> Result<()> {
        let gpu = self.gpu_mut()?;
        let targets = gpu.targets.as_ref().ok_or_else(|| Error::Gpu("render before setup".into()))?;
        let (w, h) = (targets.width, targets.height);
        if surface.width() != w || surface.height() != h || visible.dimensions() != (w, h) {
            return Err(Error::Gpu(format!("gpu backend is {w}x{h}, surfaces differ")));
        }

        let params = Params {
            palette_size: ctx.palette.len() as u32,
            dither: u32::from(ctx.options.dither),
            height: h,
            _pad: 0,
        };
        gpu.queue.write_buffer(&gpu.params, 0, bytemuck::bytes_of(&params));

        let extent = wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 };
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &targets.density,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&surface.density().alpha),
            wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(w * 4), rows_per_image: Some(h) },
            extent,
        );

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("heatmap color encoder") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("heatmap color pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&gpu.pipeline);
            pass.set_bind_group(0, &targets.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &targets.output,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &targets.readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(targets.padded_row),
                    rows_per_image: Some(h),
                },
            },
            extent,
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = targets.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| Error::Gpu(e.to_string()))?
            .map_err(|e| Error::Gpu(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            let row_bytes = (w * 4) as usize;
            for (row, dst) in visible.chunks_exact_mut(row_bytes).enumerate() {
                let start = row * targets.padded_row as usize;
                dst.copy_from_slice(&data[start..start + row_bytes]);
            }
        }
        targets.readback.unmap();
        Ok(())
    }

    fn resize(&mut self, _ctx: &PipelineContext, width: u32, height: u32) -> Result<()> {
        // Old targets stay in place until the new ones exist.
        let gpu = self.gpu_mut()?;
        let targets = gpu.build_targets(width, height)?;
        gpu.targets = Some(targets);
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            drop(gpu.targets);
            if let Some(palette) = gpu.palette {
                palette.destroy();
            }
            gpu.params.destroy();
            tracing::debug!("gpu color backend released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::brush::Brush;
    use crate::options::HeatmapOptions;
    use crate::palette::Palette;
    use crate::types::{Mask, Shape, ShapeType};

    const W: usize = 64;
    const H: usize = 18;

    /// Density ramp 0..~2 across x, identical on every row.
    fn ramp_surface(ctx: &mut PipelineContext) -> DensitySurface {
        ctx.registry.register(
            ShapeType::Rectangle,
            Box::new(|_: &Shape| "ramp".to_string()),
            Box::new(|_: &Shape| {
                let alpha = (0..W * H).map(|i| (i % W) as f32 / 48.0).collect();
                Ok(Brush { mask: Mask { width: W, height: H, alpha }, offset_x: 0.0, offset_y: 0.0 })
            }),
        );
        let mut surface = DensitySurface::new(W as u32, H as u32);
        // value 15 of max 10: opacity 1.5 pushes the right half past 1.
        surface
            .accumulate(ctx, &[Shape::rectangle(0.0, 0.0, 15.0, 1.0, 1.0)])
            .unwrap();
        surface
    }

    #[test]
    fn matches_cpu_backend() {
        let mut gpu = match GpuBackend::new() {
            Ok(gpu) => gpu,
            Err(err) => {
                eprintln!("skipping: {err}");
                return;
            }
        };

        let options = HeatmapOptions { dither: true, ..Default::default() };
        let palette = Palette::build(&options.gradient, options.palette_size).unwrap();
        let mut ctx = PipelineContext::new(options, palette);
        let surface = ramp_surface(&mut ctx);
        assert!(surface.at(W as u32 - 1, 0) > 1.0);

        let (w, h) = (W as u32, H as u32);
        let mut cpu = CpuBackend::new();
        cpu.setup(&ctx, w, h).unwrap();
        let mut expected = RgbaImage::new(w, h);
        cpu.render(&ctx, &surface, &mut expected).unwrap();

        gpu.setup(&ctx, w, h).unwrap();
        let mut actual = RgbaImage::new(w, h);
        gpu.render(&ctx, &surface, &mut actual).unwrap();

        // Unorm conversion on the device may round the last bit differently.
        for (x, y, px) in expected.enumerate_pixels() {
            let got = actual.get_pixel(x, y);
            for c in 0..4 {
                let diff = (px.0[c] as i16 - got.0[c] as i16).abs();
                assert!(diff <= 1, "pixel ({x}, {y}) channel {c}: {:?} vs {:?}", px.0, got.0);
            }
        }
        gpu.destroy();
    }

    #[test]
    fn resize_rebuilds_targets() {
        let Ok(mut gpu) = GpuBackend::new() else {
            return;
        };
        let options = HeatmapOptions::default();
        let palette = Palette::build(&options.gradient, options.palette_size).unwrap();
        let ctx = PipelineContext::new(options, palette);

        gpu.setup(&ctx, 8, 8).unwrap();
        gpu.resize(&ctx, 12, 5).unwrap();
        let surface = DensitySurface::new(12, 5);
        let mut visible = RgbaImage::new(12, 5);
        gpu.render(&ctx, &surface, &mut visible).unwrap();
        assert!(visible.pixels().all(|p| p.0[3] == 0));

        let stale = DensitySurface::new(8, 8);
        assert!(gpu.render(&ctx, &stale, &mut RgbaImage::new(8, 8)).is_err());
    }

    #[test]
    fn shader_embeds_dither_table() {
        let src = shader_source();
        assert!(src.contains("0.0625, 0.5625"));
        assert!(!src.contains("DITHER_"));
    }
}
