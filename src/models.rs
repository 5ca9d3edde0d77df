// src/models.rs
use bytemuck::{Pod, Zeroable};

// --- Unit quad every particle is expanded from ---
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex2D {
    pub position: [f32; 2],
}

impl Vertex2D {
    pub const QUAD_VERTICES: [Self; 4] = [
        Vertex2D { position: [-0.5, -0.5] }, // 0: Bottom-left
        Vertex2D { position: [ 0.5, -0.5] }, // 1: Bottom-right
        Vertex2D { position: [ 0.5,  0.5] }, // 2: Top-right
        Vertex2D { position: [-0.5,  0.5] }, // 3: Top-left
    ];

    pub const QUAD_INDICES: [u16; 6] = [
        0, 1, 2, // First triangle: BL, BR, TR
        0, 2, 3, // Second triangle: BL, TR, TL
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0, // location 0 for quad corner
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

// --- Per-particle data shared by every model ---
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub lookup_uv: [f32; 2], // texel center in the simulation textures
    pub size: f32,           // random scalar in [0, 1)
}

impl ParticleInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![1 => Float32x2, 2 => Float32];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }

    pub fn build(lookup: &[[f32; 2]], sizes: &[f32]) -> Vec<Self> {
        lookup
            .iter()
            .zip(sizes)
            .map(|(&lookup_uv, &size)| ParticleInstance { lookup_uv, size })
            .collect()
    }
}

// --- Per-model surface uv, bound once for the source and once for the target ---
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SurfaceUv {
    pub uv: [f32; 2],
}

impl SurfaceUv {
    const SOURCE_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Float32x2];
    const TARGET_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![4 => Float32x2];

    pub fn source_layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::SOURCE_ATTRIBS,
        }
    }

    pub fn target_layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::TARGET_ATTRIBS,
        }
    }
}

// --- Uniforms for the particle pipeline ---
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleUniform {
    pub resolution: [f32; 2], // viewport size * pixel ratio
    pub base_size: f32,
    pub progress: f32,
    pub side: f32,            // simulation texture side
    pub _padding: [f32; 3],   // 32 bytes total
}

impl ParticleUniform {
    pub fn new(dimensions: Dimensions, base_size: f32, side: u32) -> Self {
        Self {
            resolution: dimensions.resolution(),
            base_size,
            progress: 0.0,
            side: side as f32,
            _padding: [0.0; 3],
        }
    }

    /// Only the resolution depends on the viewport.
    pub fn set_viewport(&mut self, dimensions: Dimensions) {
        self.resolution = dimensions.resolution();
    }
}

/// Viewport as reported by the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl Dimensions {
    pub fn new(width: f32, height: f32, pixel_ratio: f32) -> Self {
        Self { width, height, pixel_ratio }
    }

    /// From a physical surface size and the display scale factor, capping the ratio.
    pub fn from_physical(width: u32, height: u32, scale_factor: f64, max_pixel_ratio: f32) -> Self {
        let scale = (scale_factor as f32).max(f32::EPSILON);
        Self {
            width: width as f32 / scale,
            height: height as f32 / scale,
            pixel_ratio: scale.min(max_pixel_ratio),
        }
    }

    pub fn resolution(&self) -> [f32; 2] {
        [self.width * self.pixel_ratio, self.height * self.pixel_ratio]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<ParticleUniform>(), 32);
        assert_eq!(std::mem::size_of::<ParticleInstance>(), 12);
    }

    #[test]
    fn resolution_includes_pixel_ratio() {
        assert_eq!(Dimensions::new(800.0, 600.0, 1.0).resolution(), [800.0, 600.0]);
        assert_eq!(Dimensions::new(1600.0, 1200.0, 2.0).resolution(), [3200.0, 2400.0]);
    }

    #[test]
    fn viewport_change_keeps_other_uniforms() {
        let mut uniform = ParticleUniform::new(Dimensions::new(800.0, 600.0, 1.0), 0.05, 35);
        uniform.progress = 0.4;
        let before = uniform;

        uniform.set_viewport(Dimensions::new(1600.0, 1200.0, 2.0));
        assert_eq!(uniform.resolution, [3200.0, 2400.0]);
        assert_eq!(uniform.base_size, before.base_size);
        assert_eq!(uniform.progress, before.progress);
        assert_eq!(uniform.side, before.side);
    }

    #[test]
    fn pixel_ratio_is_capped() {
        let dims = Dimensions::from_physical(3000, 1500, 3.0, 2.0);
        assert_eq!(dims.width, 1000.0);
        assert_eq!(dims.height, 500.0);
        assert_eq!(dims.pixel_ratio, 2.0);
    }

    #[test]
    fn instances_pair_lookup_with_size() {
        let instances = ParticleInstance::build(&[[0.25, 0.25], [0.75, 0.25]], &[0.1, 0.9]);
        assert_eq!(instances[1], ParticleInstance { lookup_uv: [0.75, 0.25], size: 0.9 });
    }
}
