// src/particles.rs
//! Draws the particle field from two simulation states and two appearance
//! textures, blended by transition progress.

use bevy_color::{ColorToComponents, LinearRgba, Srgba};
use glam::Vec3;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::error::MorphError;
use crate::mesh::check_texture;
use crate::models::{Dimensions, ParticleInstance, ParticleUniform, SurfaceUv, Vertex2D};
use crate::normalizer::NormalizedModels;
use crate::simulation::{SimulationRegistry, StateTexels};

const PARTICLES_WGSL: &str = include_str!("./shaders/particles.wgsl");
pub const APPEARANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// GPU resources of one model, created once and kept for the session.
struct ModelBinding {
    bind_group: wgpu::BindGroup,
    surface_uv_buffer: wgpu::Buffer,
    _appearance: wgpu::Texture,
}

pub struct ParticleRenderer {
    pipeline: wgpu::RenderPipeline,
    frame_bind_group: wgpu::BindGroup,
    uniform: ParticleUniform,
    uniform_buffer: wgpu::Buffer,
    quad_vertex_buffer: wgpu::Buffer,
    quad_index_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    models: Vec<ModelBinding>,
    source: usize,
    target: usize,
}

impl ParticleRenderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        camera_buffer: &wgpu::Buffer,
        normalized: &NormalizedModels,
        registry: &SimulationRegistry,
        appearances: &[RgbaImage],
        dimensions: Dimensions,
        base_size: f32,
    ) -> Result<Self, MorphError> {
        for actual in [appearances.len(), normalized.model_count()] {
            if actual != registry.len() {
                return Err(MorphError::ModelCountMismatch {
                    expected: registry.len(),
                    actual,
                });
            }
        }

        let uniform = ParticleUniform::new(dimensions, base_size, normalized.side);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let frame_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                uniform_layout_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                uniform_layout_entry(1, wgpu::ShaderStages::VERTEX),
            ],
            label: Some("Particle Frame Bind Group Layout"),
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &frame_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
            label: Some("Particle Frame Bind Group"),
        });

        // Same layout serves the source (group 1) and target (group 2) slots.
        let model_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("Particle Model Bind Group Layout"),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Appearance Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mut models = Vec::with_capacity(registry.len());
        for (index, (buffer, appearance)) in normalized.buffers.iter().zip(appearances).enumerate() {
            let state = registry.get(index)?;
            check_texture(appearance, index)?;
            let texture = upload_appearance(device, queue, appearance, index);
            let appearance_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &model_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(state.current_texture()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&appearance_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
                label: Some(&format!("Model {index} Bind Group")),
            });

            let surface_uvs: Vec<SurfaceUv> = buffer.uvs.iter().map(|&uv| SurfaceUv { uv }).collect();
            let surface_uv_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Model {index} Surface UV Buffer")),
                contents: bytemuck::cast_slice(&surface_uvs),
                usage: wgpu::BufferUsages::VERTEX,
            });

            models.push(ModelBinding {
                bind_group,
                surface_uv_buffer,
                _appearance: texture,
            });
        }

        let instances = ParticleInstance::build(&normalized.lookup, &normalized.sizes);
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Instance Buffer"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(Vertex2D::QUAD_VERTICES.as_slice()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(Vertex2D::QUAD_INDICES.as_slice()),
            usage: wgpu::BufferUsages::INDEX,
        });

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particles Shader"),
            source: wgpu::ShaderSource::Wgsl(PARTICLES_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[
                &frame_bind_group_layout,
                &model_bind_group_layout,
                &model_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader_module,
                entry_point: Some("vs_main"),
                buffers: &[
                    Vertex2D::layout(),
                    ParticleInstance::layout(),
                    SurfaceUv::source_layout(),
                    SurfaceUv::target_layout(),
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        log::info!(
            "Particle renderer ready: {} particles, {} models",
            normalized.particle_count,
            models.len()
        );

        Ok(Self {
            pipeline,
            frame_bind_group,
            uniform,
            uniform_buffer,
            quad_vertex_buffer,
            quad_index_buffer,
            instance_buffer,
            instance_count: normalized.particle_count as u32,
            models,
            source: 0,
            target: 0,
        })
    }

    /// Only the resolution uniform depends on the viewport.
    pub fn resize(&mut self, queue: &wgpu::Queue, dimensions: Dimensions) {
        self.uniform.set_viewport(dimensions);
        self.write_uniform(queue);
    }

    /// Selects which precomputed model bindings feed the source and target slots.
    pub fn bind_models(&mut self, source: usize, target: usize) -> Result<(), MorphError> {
        for index in [source, target] {
            if index >= self.models.len() {
                return Err(MorphError::InvalidModelIndex {
                    index,
                    count: self.models.len(),
                });
            }
        }
        self.source = source;
        self.target = target;
        Ok(())
    }

    pub fn set_progress(&mut self, queue: &wgpu::Queue, progress: f32) {
        self.uniform.progress = progress.clamp(0.0, 1.0);
        self.write_uniform(queue);
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        let source = &self.models[self.source];
        let target = &self.models[self.target];

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
        render_pass.set_bind_group(1, &source.bind_group, &[]);
        render_pass.set_bind_group(2, &target.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        render_pass.set_vertex_buffer(2, source.surface_uv_buffer.slice(..));
        render_pass.set_vertex_buffer(3, target.surface_uv_buffer.slice(..));
        render_pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..Vertex2D::QUAD_INDICES.len() as u32, 0, 0..self.instance_count);
    }

    fn write_uniform(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

fn uniform_layout_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn upload_appearance(device: &wgpu::Device, queue: &wgpu::Queue, image: &RgbaImage, index: usize) -> wgpu::Texture {
    let (width, height) = image.dimensions();
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("Model {index} Appearance Texture")),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: APPEARANCE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

// --- CPU mirror of vs_main, used to check blending without a GPU ---

/// One model as seen by the particle shader.
#[derive(Debug, Clone, Copy)]
pub struct ModelSnapshot<'a> {
    pub state: &'a StateTexels,
    pub appearance: &'a RgbaImage,
    pub surface_uvs: &'a [[f32; 2]],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSample {
    pub position: Vec3,
    /// Linear RGBA.
    pub color: [f32; 4],
    /// Point size in physical pixels before depth attenuation.
    pub size: f32,
}

impl ParticleSample {
    pub fn approx_eq(&self, other: &ParticleSample, tolerance: f32) -> bool {
        self.position.abs_diff_eq(other.position, tolerance)
            && self.color.iter().zip(other.color).all(|(a, b)| (a - b).abs() <= tolerance)
            && (self.size - other.size).abs() <= tolerance
    }
}

/// Nearest-texel sample of an sRGB image, returned in linear space.
/// An empty image samples as transparent black.
pub fn sample_appearance(image: &RgbaImage, uv: [f32; 2]) -> [f32; 4] {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return [0.0; 4];
    }
    let x = (uv[0].clamp(0.0, 1.0) * width as f32).floor().min((width - 1) as f32) as u32;
    let y = (uv[1].clamp(0.0, 1.0) * height as f32).floor().min((height - 1) as f32) as u32;
    let [r, g, b, a] = image.get_pixel(x, y).0;
    LinearRgba::from(Srgba::rgba_u8(r, g, b, a)).to_f32_array()
}

pub fn sample_particle(
    index: usize,
    instance: &ParticleInstance,
    source: &ModelSnapshot<'_>,
    target: &ModelSnapshot<'_>,
    uniform: &ParticleUniform,
) -> ParticleSample {
    let progress = uniform.progress;
    let source_position = Vec3::from_slice(&source.state.load(instance.lookup_uv)[..3]);
    let target_position = Vec3::from_slice(&target.state.load(instance.lookup_uv)[..3]);

    let source_color = sample_appearance(source.appearance, source.surface_uvs[index]);
    let target_color = sample_appearance(target.appearance, target.surface_uvs[index]);
    let mut color = [0.0; 4];
    for (c, (s, t)) in color.iter_mut().zip(source_color.into_iter().zip(target_color)) {
        *c = s + (t - s) * progress;
    }

    ParticleSample {
        position: source_position.lerp(target_position, progress),
        color,
        size: uniform.base_size * instance.size * uniform.resolution[1],
    }
}

/// Samples every particle of a frame.
pub fn sample_frame(
    instances: &[ParticleInstance],
    source: &ModelSnapshot<'_>,
    target: &ModelSnapshot<'_>,
    uniform: &ParticleUniform,
) -> Vec<ParticleSample> {
    instances
        .iter()
        .enumerate()
        .map(|(i, instance)| sample_particle(i, instance, source, target, uniform))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshSource;
    use crate::normalizer::normalize;
    use image::Rgba;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Fixture {
        normalized: NormalizedModels,
        states: Vec<StateTexels>,
        textures: Vec<RgbaImage>,
        instances: Vec<ParticleInstance>,
    }

    impl Fixture {
        fn new() -> Self {
            let red = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
            let blue = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
            let a = MeshSource::new(
                (0..20).map(|i| [i as f32, 0.0, 0.0]).collect(),
                (0..20).map(|i| [i as f32 / 20.0, 0.5]).collect(),
                red,
            );
            let b = MeshSource::new(
                (0..30).map(|i| [0.0, i as f32, 1.0]).collect(),
                (0..30).map(|i| [0.5, i as f32 / 30.0]).collect(),
                blue,
            );
            let mut rng = StdRng::seed_from_u64(11);
            let normalized = normalize(&[a.clone(), b.clone()], &mut rng).unwrap();
            let states = normalized
                .buffers
                .iter()
                .map(|buffer| StateTexels::seed(buffer, normalized.side))
                .collect();
            let instances = ParticleInstance::build(&normalized.lookup, &normalized.sizes);
            Self {
                normalized,
                states,
                textures: vec![a.texture, b.texture],
                instances,
            }
        }

        fn snapshot(&self, model: usize) -> ModelSnapshot<'_> {
            ModelSnapshot {
                state: &self.states[model],
                appearance: &self.textures[model],
                surface_uvs: &self.normalized.buffers[model].uvs,
            }
        }

        fn uniform(&self, progress: f32) -> ParticleUniform {
            let mut uniform = ParticleUniform::new(Dimensions::new(800.0, 600.0, 1.0), 0.05, self.normalized.side);
            uniform.progress = progress;
            uniform
        }
    }

    fn frames_match(a: &[ParticleSample], b: &[ParticleSample]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.approx_eq(y, 1e-5))
    }

    #[test]
    fn progress_zero_renders_source_alone() {
        let f = Fixture::new();
        let blended = sample_frame(&f.instances, &f.snapshot(0), &f.snapshot(1), &f.uniform(0.0));
        let alone = sample_frame(&f.instances, &f.snapshot(0), &f.snapshot(0), &f.uniform(0.0));
        assert!(frames_match(&blended, &alone));
    }

    #[test]
    fn progress_one_renders_target_alone() {
        let f = Fixture::new();
        let blended = sample_frame(&f.instances, &f.snapshot(0), &f.snapshot(1), &f.uniform(1.0));
        let alone = sample_frame(&f.instances, &f.snapshot(1), &f.snapshot(1), &f.uniform(0.0));
        assert!(frames_match(&blended, &alone));
    }

    #[test]
    fn halfway_blends_position_and_color() {
        let f = Fixture::new();
        let sample = sample_particle(3, &f.instances[3], &f.snapshot(0), &f.snapshot(1), &f.uniform(0.5));
        assert!(sample.position.abs_diff_eq(Vec3::new(1.5, 1.5, 0.5), 1e-6));
        assert!((sample.color[0] - 0.5).abs() < 1e-6);
        assert!((sample.color[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn size_scales_with_resolution_height() {
        let f = Fixture::new();
        let mut uniform = f.uniform(0.0);
        let small = sample_particle(0, &f.instances[0], &f.snapshot(0), &f.snapshot(0), &uniform);
        uniform.set_viewport(Dimensions::new(1600.0, 1200.0, 2.0));
        let large = sample_particle(0, &f.instances[0], &f.snapshot(0), &f.snapshot(0), &uniform);
        assert!((large.size - small.size * 4.0).abs() < 1e-5);
    }

    #[test]
    fn appearance_sample_is_linear() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 128, 0, 255]));
        let color = sample_appearance(&image, [1.0, 1.0]);
        assert_eq!(color[0], 1.0);
        assert!(color[1] > 0.2 && color[1] < 0.23);
        assert_eq!(color[3], 1.0);
    }

    #[test]
    fn empty_appearance_samples_transparent() {
        assert_eq!(sample_appearance(&RgbaImage::new(0, 0), [0.5, 0.5]), [0.0; 4]);
        assert_eq!(sample_appearance(&RgbaImage::new(3, 0), [1.0, 1.0]), [0.0; 4]);
    }
}
