pub mod shapes;

use anyhow::Context;

use crate::mesh::{MeshLoader, MeshSource};
use shapes::Shape;

/// Serves the built-in shapes. Ids are `shape` or `shape:texture_path`; a path
/// replaces the generated texture with an image decoded from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProceduralLoader;

impl MeshLoader for ProceduralLoader {
    async fn load_mesh(&self, id: &str) -> anyhow::Result<MeshSource> {
        let (name, texture_path) = match id.split_once(':') {
            Some((name, path)) => (name, Some(path)),
            None => (id, None),
        };
        let shape = Shape::from_name(name).with_context(|| format!("unknown shape '{name}'"))?;

        let texture = match texture_path {
            Some(path) => image::open(path)
                .with_context(|| format!("failed to decode texture {path}"))?
                .to_rgba8(),
            None => shape.texture(),
        };

        let (positions, uvs) = shape.generate();
        Ok(MeshSource::new(positions, uvs, texture))
    }
}
