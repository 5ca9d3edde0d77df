use std::sync::Arc;

use anyhow::Context;
use bevy_color::{ColorToComponents, LinearRgba, Srgba};
use instant::Instant;
use rand::SeedableRng;
use rand::rngs::StdRng;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::{Camera, CameraUniform};
use crate::config::MorphConfig;
use crate::mesh::load_meshes;
use crate::models::Dimensions;
use crate::morph::MorphField;
use crate::normalizer::normalize;
use crate::scene::ProceduralLoader;

pub struct State {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,
    pub morph_config: MorphConfig,

    pub camera: Camera,
    pub camera_buffer: wgpu::Buffer,
    pub camera_uniform: CameraUniform,
    needs_srgb_output_conversion: bool,

    pub morph: MorphField,
    pub dimensions: Dimensions,
    clear_color: wgpu::Color,
    started_at: Instant,
}

impl State {
    // Takes Arc<Window> for setup, doesn't store it.
    pub async fn new(window_arc: Arc<Window>, morph_config: MorphConfig) -> anyhow::Result<State> {
        let size = window_arc.inner_size();
        let scale_factor = window_arc.scale_factor();

        let gpu = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        // Surface itself is !Send on WASM due to HtmlCanvasElement
        let surface = gpu.create_surface(window_arc).context("failed to create surface")?;

        let adapter = gpu
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible GPU adapter")?;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let texture_format = surface_caps.formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        if !texture_format.is_srgb() {
            log::warn!("No sRGB surface format found, falling back to {:?}", texture_format);
        }

        let needs_srgb_output_conversion = !texture_format.is_srgb();

        log::info!(
            "Using {} ({:?}, Target Format: {:?}), Needs Shader sRGB Output Conversion: {}",
            adapter_info.name,
            adapter_info.backend,
            texture_format,
            needs_srgb_output_conversion
        );

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let camera = Camera::new(&morph_config.camera, size.width, size.height);
        let camera_uniform = camera.uniform(needs_srgb_output_conversion);
        let camera_buffer = device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Camera Buffer"),
                contents: bytemuck::cast_slice(&[camera_uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            }
        );

        // --- Models: nothing renders until every mesh is loaded and normalized ---
        let ids: Vec<String> = morph_config.models.iter().map(|m| m.id()).collect();
        let meshes = load_meshes(&ProceduralLoader, &ids).await?;

        let seed = morph_config.seed.unwrap_or_else(|| instant::now().to_bits());
        log::info!("Particle seed: {}", seed);
        let mut rng = StdRng::seed_from_u64(seed);
        let normalized = normalize(&meshes, &mut rng)?;

        let appearances: Vec<_> = meshes.into_iter().map(|mesh| mesh.texture).collect();
        let dimensions = Dimensions::from_physical(size.width, size.height, scale_factor, morph_config.max_pixel_ratio);

        let morph = MorphField::new(
            &device,
            &queue,
            texture_format,
            &camera_buffer,
            &normalized,
            &appearances,
            dimensions,
            &morph_config,
        )?;

        let [r, g, b, a] = LinearRgba::from(Srgba::rgb_u8(18, 18, 18)).to_f32_array();
        let clear_color = wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 };

        Ok(Self {
            surface, device, queue, config, is_surface_configured: false, morph_config,
            camera, camera_buffer, camera_uniform, needs_srgb_output_conversion,
            morph, dimensions, clear_color,
            started_at: Instant::now(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32, scale_factor: f64) {
        if width > 0 && height > 0 {
            log::info!("Resize {}, {} (scale {})", width, height, scale_factor);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);

            self.camera.update_aspect_ratio(width, height);
            self.camera_uniform = self.camera.uniform(self.needs_srgb_output_conversion);
            self.queue.write_buffer(
                &self.camera_buffer,
                0,
                bytemuck::cast_slice(&[self.camera_uniform]),
            );

            self.dimensions = Dimensions::from_physical(width, height, scale_factor, self.morph_config.max_pixel_ratio);
            self.morph.resize(&self.queue, self.dimensions);
            self.is_surface_configured = true;
            // No request_redraw here, it's App's responsibility
        }
    }

    /// Seconds since the state was created; the frame clock of the morph.
    pub fn elapsed(&self) -> f32 {
        self.started_at.elapsed().as_secs_f32()
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        let time = self.elapsed();

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let status = match self.morph.prepare_frame(&self.queue, &mut encoder, time) {
            Ok(status) => status,
            Err(e) => {
                log::error!("Skipping frame: {}", e);
                return Ok(());
            }
        };

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.morph.draw(&mut render_pass);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        if let Err(e) = self.morph.finish_frame(&self.queue, status) {
            log::error!("Failed to commit transition: {}", e);
        }

        Ok(())
    }
}
