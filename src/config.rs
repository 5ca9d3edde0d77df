// src/config.rs
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::scene::shapes::Shape;
use crate::transition::Easing;

/// Environment variable pointing at a JSON config file.
pub const CONFIG_ENV_VAR: &str = "MORPHFIELD_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MorphConfig {
    /// Seconds a morph takes from start to commit.
    pub transition_duration: f32,
    pub easing: Easing,
    /// Base point size, scaled by each particle's random size and the resolution.
    pub particle_size: f32,
    /// Upper bound applied to the display scale factor.
    pub max_pixel_ratio: f32,
    /// Fixed seed for padding and particle sizes; random when absent.
    pub seed: Option<u64>,
    pub camera: CameraConfig,
    pub models: Vec<ModelDescriptor>,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            transition_duration: 2.0,
            easing: Easing::Linear,
            particle_size: 0.05,
            max_pixel_ratio: 2.0,
            seed: None,
            camera: CameraConfig::default(),
            models: vec![
                ModelDescriptor::procedural(Shape::Sphere),
                ModelDescriptor::procedural(Shape::Torus),
                ModelDescriptor::procedural(Shape::Cube),
                ModelDescriptor::procedural(Shape::Wave),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub position: [f32; 3],
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            position: [0.0, 2.0, 8.0],
            near: 0.1,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelDescriptor {
    pub shape: Shape,
    /// Replaces the generated appearance texture.
    #[serde(default)]
    pub texture: Option<PathBuf>,
}

impl ModelDescriptor {
    pub fn procedural(shape: Shape) -> Self {
        Self { shape, texture: None }
    }

    /// Identifier handed to the mesh loader.
    pub fn id(&self) -> String {
        match &self.texture {
            Some(path) => format!("{}:{}", self.shape.name(), path.display()),
            None => self.shape.name().to_string(),
        }
    }
}

impl MorphConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: MorphConfig = serde_json::from_str(json).context("invalid morph config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Reads the file named by `MORPHFIELD_CONFIG`, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                log::info!("Loading config from {}", Path::new(&path).display());
                Self::load(Path::new(&path))
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.transition_duration.is_finite() && self.transition_duration > 0.0,
            "transition_duration must be positive, got {}",
            self.transition_duration
        );
        anyhow::ensure!(self.particle_size > 0.0, "particle_size must be positive");
        anyhow::ensure!(self.max_pixel_ratio >= 1.0, "max_pixel_ratio must be at least 1");
        anyhow::ensure!(!self.models.is_empty(), "at least one model must be configured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_scene() {
        let config = MorphConfig::default();
        assert_eq!(config.transition_duration, 2.0);
        assert_eq!(config.particle_size, 0.05);
        assert_eq!(config.max_pixel_ratio, 2.0);
        assert_eq!(config.camera.position, [0.0, 2.0, 8.0]);
        assert_eq!(config.easing, Easing::Linear);
        assert_eq!(config.models.len(), 4);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = MorphConfig::from_json(
            r#"{
                "transition_duration": 3.5,
                "seed": 7,
                "models": [{ "shape": "sphere" }, { "shape": "torus", "texture": "assets/rust.png" }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.transition_duration, 3.5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.particle_size, 0.05);
        assert_eq!(config.models[1].id(), "torus:assets/rust.png");
    }

    #[test]
    fn rejects_empty_model_list() {
        assert!(MorphConfig::from_json(r#"{ "models": [] }"#).is_err());
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(MorphConfig::from_json(r#"{ "transition_duration": 0.0 }"#).is_err());
    }
}
