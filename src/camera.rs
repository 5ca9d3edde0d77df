// src/camera.rs
// Perspective camera looking at the particle field. Orbiting is left to the host.
use glam::{Mat4, Vec3};
use bytemuck::{Pod, Zeroable};

use crate::config::CameraConfig;

// Camera data sent to the GPU
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],              // particle size attenuation needs view depth
    pub needs_srgb_output_conversion: u32, // 0 for false, 1 for true
    pub _padding: [u32; 3],                // 144 bytes total
}

#[derive(Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y_radians: f32,
    pub aspect_ratio: f32, // width / height
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(config: &CameraConfig, viewport_width: u32, viewport_height: u32) -> Self {
        let aspect_ratio = viewport_width as f32 / viewport_height as f32;
        Self {
            position: Vec3::from_array(config.position),
            target: Vec3::ZERO,
            fov_y_radians: config.fov_degrees.to_radians(),
            aspect_ratio: if aspect_ratio.is_finite() && aspect_ratio > 0.0 { aspect_ratio } else { 1.0 },
            near: config.near,
            far: config.far,
        }
    }

    /// Called when the window size changes
    pub fn update_aspect_ratio(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
        }
    }

    pub fn build_view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn build_view_projection_matrix(&self) -> Mat4 {
        let proj_matrix = Mat4::perspective_rh(self.fov_y_radians, self.aspect_ratio, self.near, self.far);
        proj_matrix * self.build_view_matrix()
    }

    pub fn uniform(&self, needs_srgb_output_conversion: bool) -> CameraUniform {
        CameraUniform {
            view_proj: self.build_view_projection_matrix().to_cols_array_2d(),
            view: self.build_view_matrix().to_cols_array_2d(),
            needs_srgb_output_conversion: needs_srgb_output_conversion as u32,
            _padding: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn origin_projects_near_screen_center() {
        let camera = Camera::new(&CameraConfig::default(), 800, 600);
        let clip = camera.build_view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc_x = clip.x / clip.w;
        assert!(ndc_x.abs() < 1e-5);
        assert!(clip.w > 0.0);
    }

    #[test]
    fn degenerate_viewport_keeps_unit_aspect() {
        let camera = Camera::new(&CameraConfig::default(), 800, 0);
        assert_eq!(camera.aspect_ratio, 1.0);
    }

    #[test]
    fn uniform_is_144_bytes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 144);
    }
}
