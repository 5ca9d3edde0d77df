// src/mesh.rs
use std::future::Future;

use image::RgbaImage;

use crate::error::MorphError;

/// Largest appearance texture side accepted, matching wgpu's default 2D limit.
pub const MAX_TEXTURE_SIDE: u32 = 8192;

/// Rejects textures the GPU cannot hold: empty, or a side past [`MAX_TEXTURE_SIDE`].
pub fn check_texture(texture: &RgbaImage, model: usize) -> Result<(), MorphError> {
    let (width, height) = texture.dimensions();
    let in_range = |side: u32| (1..=MAX_TEXTURE_SIDE).contains(&side);
    if in_range(width) && in_range(height) {
        Ok(())
    } else {
        Err(MorphError::InvalidTexture {
            model,
            width,
            height,
            limit: MAX_TEXTURE_SIDE,
        })
    }
}

/// Raw surface samples of one model as produced by a mesh decoder.
#[derive(Debug, Clone)]
pub struct MeshSource {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    /// Appearance texture sampled at each vertex uv.
    pub texture: RgbaImage,
}

impl MeshSource {
    pub fn new(positions: Vec<[f32; 3]>, uvs: Vec<[f32; 2]>, texture: RgbaImage) -> Self {
        Self { positions, uvs, texture }
    }

    /// Builds a source from flat attribute arrays (xyz triples, uv pairs).
    pub fn from_flat(positions: &[f32], uvs: &[f32], texture: RgbaImage) -> Self {
        Self {
            positions: positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect(),
            uvs: uvs.chunks_exact(2).map(|uv| [uv[0], uv[1]]).collect(),
            texture,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Checks the invariants normalization relies on; `model` is the index used in errors.
    pub fn validate(&self, model: usize) -> Result<(), MorphError> {
        if self.positions.len() != self.uvs.len() {
            return Err(MorphError::MismatchedAttributes {
                model,
                positions: self.positions.len(),
                uvs: self.uvs.len(),
            });
        }
        if self.positions.is_empty() {
            return Err(MorphError::EmptyMesh { model });
        }
        check_texture(&self.texture, model)
    }
}

/// Asynchronous source of decoded meshes, keyed by an identifier.
pub trait MeshLoader {
    fn load_mesh(&self, id: &str) -> impl Future<Output = anyhow::Result<MeshSource>>;
}

/// Resolves every requested mesh before returning. Nothing is returned on a
/// partial load: the first failure aborts and names the model.
pub async fn load_meshes<L, S>(loader: &L, ids: &[S]) -> Result<Vec<MeshSource>, MorphError>
where
    L: MeshLoader,
    S: AsRef<str>,
{
    if ids.is_empty() {
        return Err(MorphError::NoModels);
    }

    let mut meshes = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.as_ref();
        let mesh = loader
            .load_mesh(id)
            .await
            .map_err(|e| MorphError::resource(id, e))?;
        log::info!("Loaded model '{}' with {} vertices", id, mesh.vertex_count());
        meshes.push(mesh);
    }
    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLoader;

    impl MeshLoader for FixedLoader {
        async fn load_mesh(&self, id: &str) -> anyhow::Result<MeshSource> {
            match id {
                "missing" => anyhow::bail!("no such mesh"),
                _ => Ok(MeshSource::from_flat(
                    &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
                    &[0.0, 0.0, 1.0, 1.0],
                    RgbaImage::new(1, 1),
                )),
            }
        }
    }

    #[test]
    fn from_flat_splits_components() {
        let mesh = MeshSource::from_flat(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[0.1, 0.2, 0.3, 0.4], RgbaImage::new(1, 1));
        assert_eq!(mesh.positions, vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(mesh.uvs, vec![[0.1, 0.2], [0.3, 0.4]]);
        assert_eq!(mesh.vertex_count(), 2);
    }

    #[test]
    fn validate_rejects_empty_and_mismatched() {
        let empty = MeshSource::new(vec![], vec![], RgbaImage::new(1, 1));
        assert!(matches!(empty.validate(2), Err(MorphError::EmptyMesh { model: 2 })));

        let mismatched = MeshSource::new(vec![[0.0; 3]; 2], vec![[0.0; 2]], RgbaImage::new(1, 1));
        assert!(matches!(
            mismatched.validate(0),
            Err(MorphError::MismatchedAttributes { positions: 2, uvs: 1, .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_texture() {
        let mesh = MeshSource::new(vec![[0.0; 3]; 4], vec![[0.5; 2]; 4], RgbaImage::new(0, 0));
        assert!(matches!(
            mesh.validate(3),
            Err(MorphError::InvalidTexture { model: 3, width: 0, height: 0, .. })
        ));
    }

    #[test]
    fn validate_rejects_oversized_texture() {
        let wide = MeshSource::new(vec![[0.0; 3]], vec![[0.5; 2]], RgbaImage::new(MAX_TEXTURE_SIDE + 1, 1));
        let err = wide.validate(1).unwrap_err();
        assert!(matches!(err, MorphError::InvalidTexture { model: 1, height: 1, .. }));
        assert!(err.is_fatal());

        let edge = MeshSource::new(vec![[0.0; 3]], vec![[0.5; 2]], RgbaImage::new(MAX_TEXTURE_SIDE, 1));
        assert!(edge.validate(1).is_ok());
    }

    #[test]
    fn load_meshes_resolves_all_in_order() {
        let meshes = pollster::block_on(load_meshes(&FixedLoader, &["a", "b", "c"])).unwrap();
        assert_eq!(meshes.len(), 3);
    }

    #[test]
    fn load_failure_names_the_model() {
        let err = pollster::block_on(load_meshes(&FixedLoader, &["a", "missing"])).unwrap_err();
        match err {
            MorphError::Resource { model, .. } => assert_eq!(model, "missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_ids_is_a_configuration_error() {
        let ids: [&str; 0] = [];
        assert!(matches!(
            pollster::block_on(load_meshes(&FixedLoader, &ids)),
            Err(MorphError::NoModels)
        ));
    }
}
