// src/simulation.rs
//! Texture-resident particle state, one instance per model.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::MorphError;
use crate::normalizer::ParticleBuffer;

const SIMULATION_WGSL: &str = include_str!("./shaders/simulation.wgsl");
const WORKGROUP_SIZE: u32 = 8;
pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// CPU copy of a state texture: S x S texels of xyz + flag.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTexels {
    side: u32,
    texels: Vec<[f32; 4]>,
}

impl StateTexels {
    /// Texel i holds particle i; texels past the particle count stay zero.
    pub fn seed(buffer: &ParticleBuffer, side: u32) -> Self {
        let mut texels = vec![[0.0; 4]; (side * side) as usize];
        for (texel, position) in texels.iter_mut().zip(&buffer.positions) {
            *texel = [position[0], position[1], position[2], 0.0];
        }
        Self { side, texels }
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.side + x) as usize]
    }

    /// Same addressing as the particle shader: floor(uv * S), clamped to the grid.
    pub fn load(&self, lookup_uv: [f32; 2]) -> [f32; 4] {
        let max = self.side.saturating_sub(1) as f32;
        let x = (lookup_uv[0] * self.side as f32).floor().clamp(0.0, max) as u32;
        let y = (lookup_uv[1] * self.side as f32).floor().clamp(0.0, max) as u32;
        self.texel(x, y)
    }

    /// Mirrors one compute dispatch of `simulation.wgsl`.
    pub fn advance(&mut self, delta_time: f32) {
        for texel in &mut self.texels {
            *texel = step_particle(*texel, delta_time);
        }
    }
}

fn step_particle(texel: [f32; 4], _delta_time: f32) -> [f32; 4] {
    texel
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SimulationUniform {
    pub delta_time: f32,
    pub elapsed: f32,
    pub side: u32,
    pub particle_count: u32,
}

/// Pipeline objects shared by every simulation state.
pub struct SimulationPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl SimulationPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: STATE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
            label: Some("Simulation Bind Group Layout"),
        });

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Simulation Shader"),
            source: wgpu::ShaderSource::Wgsl(SIMULATION_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Simulation Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Simulation Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self { pipeline, bind_group_layout }
    }
}

/// GPU state for one model. `state` is what the renderer samples; the compute
/// pass writes `scratch` and the result is copied back, so views into `state`
/// stay valid for the session.
pub struct SimulationState {
    side: u32,
    elapsed: f32,
    uniform: SimulationUniform,
    uniform_buffer: wgpu::Buffer,
    state: wgpu::Texture,
    state_view: wgpu::TextureView,
    scratch: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl SimulationState {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipeline: &SimulationPipeline,
        buffer: &ParticleBuffer,
        side: u32,
        label: &str,
    ) -> Self {
        let seed = StateTexels::seed(buffer, side);
        let size = wgpu::Extent3d {
            width: side,
            height: side,
            depth_or_array_layers: 1,
        };

        let state = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} State Texture")),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let scratch = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} Scratch Texture")),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATE_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &state,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(seed.texels()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(side * std::mem::size_of::<[f32; 4]>() as u32),
                rows_per_image: Some(side),
            },
            size,
        );

        let uniform = SimulationUniform {
            delta_time: 0.0,
            elapsed: 0.0,
            side,
            particle_count: buffer.len() as u32,
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Simulation Uniform Buffer")),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let state_view = state.create_view(&wgpu::TextureViewDescriptor::default());
        let scratch_view = scratch.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&state_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&scratch_view),
                },
            ],
            label: Some(&format!("{label} Simulation Bind Group")),
        });

        Self {
            side,
            elapsed: 0.0,
            uniform,
            uniform_buffer,
            state,
            state_view,
            scratch,
            bind_group,
        }
    }

    /// Records one compute iteration into `encoder`. The result is visible to
    /// render passes recorded later in the same encoder.
    pub fn advance(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &SimulationPipeline,
        delta_time: f32,
    ) {
        self.elapsed += delta_time;
        self.uniform.delta_time = delta_time;
        self.uniform.elapsed = self.elapsed;
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.uniform]));

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Simulation Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&pipeline.pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            let groups = self.side.div_ceil(WORKGROUP_SIZE);
            compute_pass.dispatch_workgroups(groups, groups, 1);
        }

        encoder.copy_texture_to_texture(
            self.scratch.as_image_copy(),
            self.state.as_image_copy(),
            wgpu::Extent3d {
                width: self.side,
                height: self.side,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Most recently computed state.
    pub fn current_texture(&self) -> &wgpu::TextureView {
        &self.state_view
    }
}

/// Simulation states keyed by model index, alive for the whole session.
pub struct SimulationRegistry {
    pipeline: SimulationPipeline,
    states: Vec<SimulationState>,
}

impl SimulationRegistry {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &[ParticleBuffer],
        side: u32,
    ) -> Self {
        let pipeline = SimulationPipeline::new(device);
        let states = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| SimulationState::new(device, queue, &pipeline, buffer, side, &format!("Model {i}")))
            .collect();
        Self { pipeline, states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&SimulationState, MorphError> {
        self.states.get(index).ok_or(MorphError::InvalidModelIndex {
            index,
            count: self.states.len(),
        })
    }

    /// States never read each other, so the order of the passes is irrelevant.
    pub fn advance_all(&mut self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder, delta_time: f32) {
        for state in &mut self.states {
            state.advance(queue, encoder, &self.pipeline, delta_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(count: usize) -> ParticleBuffer {
        ParticleBuffer {
            positions: (0..count).map(|i| [i as f32, 2.0 * i as f32, -(i as f32)]).collect(),
            uvs: vec![[0.0, 0.0]; count],
        }
    }

    #[test]
    fn seed_fills_particles_and_zeroes_the_rest() {
        let texels = StateTexels::seed(&buffer(5), 3);
        assert_eq!(texels.texels().len(), 9);
        assert_eq!(texels.texel(0, 0), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(texels.texel(1, 1), [4.0, 8.0, -4.0, 0.0]);
        assert_eq!(texels.texel(2, 2), [0.0; 4]);
    }

    #[test]
    fn load_uses_texel_center_lookup() {
        let texels = StateTexels::seed(&buffer(9), 3);
        let lookup = crate::normalizer::lookup_table(9, 3);
        for (i, uv) in lookup.iter().enumerate() {
            assert_eq!(texels.load(*uv)[0], i as f32);
        }
    }

    #[test]
    fn advance_with_zero_delta_is_idempotent() {
        let mut texels = StateTexels::seed(&buffer(7), 3);
        let before = texels.clone();
        texels.advance(0.0);
        assert_eq!(texels, before);
    }

    #[test]
    fn identity_step_holds_over_many_frames() {
        let mut texels = StateTexels::seed(&buffer(16), 4);
        let before = texels.clone();
        for _ in 0..60 {
            texels.advance(1.0 / 60.0);
        }
        assert_eq!(texels, before);
    }

    #[test]
    fn uniform_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<SimulationUniform>(), 16);
    }
}
