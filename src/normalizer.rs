// src/normalizer.rs
//! Pads every model to a shared particle count so one particle index space
//! addresses all simulation states.

use rand::Rng;

use crate::error::MorphError;
use crate::mesh::MeshSource;

/// Largest texture side the default wgpu limits allow for 2D textures.
pub const MAX_STATE_SIDE: u32 = 8192;

/// Per-model particle attributes, all of length N.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleBuffer {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
}

impl ParticleBuffer {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Output of [`normalize`]: equal-length buffers plus the shared per-particle data.
#[derive(Debug, Clone)]
pub struct NormalizedModels {
    /// N, the maximum vertex count across the inputs.
    pub particle_count: usize,
    /// S = ceil(sqrt(N)), the side of every simulation texture.
    pub side: u32,
    pub buffers: Vec<ParticleBuffer>,
    /// One random scalar in [0, 1) per particle, shared by all models.
    pub sizes: Vec<f32>,
    /// Center-of-texel coordinate of particle i in an S x S state texture.
    pub lookup: Vec<[f32; 2]>,
}

impl NormalizedModels {
    pub fn model_count(&self) -> usize {
        self.buffers.len()
    }
}

/// Smallest S with S * S >= n.
pub fn texture_side(n: usize) -> u32 {
    let mut side = (n as f64).sqrt().ceil() as u64;
    while side * side < n as u64 {
        side += 1;
    }
    while side > 0 && (side - 1) * (side - 1) >= n as u64 {
        side -= 1;
    }
    side as u32
}

/// Texel-center uv for each particle index, row-major.
pub fn lookup_table(particle_count: usize, side: u32) -> Vec<[f32; 2]> {
    let side_f = side as f32;
    (0..particle_count)
        .map(|i| {
            let x = (i % side as usize) as f32;
            let y = (i / side as usize) as f32;
            [(x + 0.5) / side_f, (y + 0.5) / side_f]
        })
        .collect()
}

pub fn normalize<R: Rng>(meshes: &[MeshSource], rng: &mut R) -> Result<NormalizedModels, MorphError> {
    if meshes.is_empty() {
        return Err(MorphError::NoModels);
    }
    for (model, mesh) in meshes.iter().enumerate() {
        mesh.validate(model)?;
    }

    let particle_count = meshes.iter().map(MeshSource::vertex_count).max().unwrap_or(0);
    let side = texture_side(particle_count);
    if side > MAX_STATE_SIDE {
        return Err(MorphError::TooManyParticles {
            particles: particle_count,
            side,
            limit: MAX_STATE_SIDE,
        });
    }

    let buffers = meshes
        .iter()
        .map(|mesh| pad_mesh(mesh, particle_count, rng))
        .collect();

    let sizes = (0..particle_count).map(|_| rng.random::<f32>()).collect();

    log::info!(
        "Normalized {} models to {} particles ({}x{} state texture)",
        meshes.len(),
        particle_count,
        side,
        side
    );

    Ok(NormalizedModels {
        particle_count,
        side,
        buffers,
        sizes,
        lookup: lookup_table(particle_count, side),
    })
}

/// Copies the mesh verbatim, then fills slots past its vertex count with
/// duplicates of uniformly chosen real vertices. Caller guarantees a non-empty mesh.
fn pad_mesh<R: Rng>(mesh: &MeshSource, particle_count: usize, rng: &mut R) -> ParticleBuffer {
    let vertex_count = mesh.vertex_count();
    let mut positions = Vec::with_capacity(particle_count);
    let mut uvs = Vec::with_capacity(particle_count);

    positions.extend_from_slice(&mesh.positions);
    uvs.extend_from_slice(&mesh.uvs);

    for _ in vertex_count..particle_count {
        let source = rng.random_range(0..vertex_count);
        positions.push(mesh.positions[source]);
        uvs.push(mesh.uvs[source]);
    }

    ParticleBuffer { positions, uvs }
}
