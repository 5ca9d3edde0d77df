// src/scene/shapes.rs
// Built-in surface samplers used when no external mesh decoder is wired in.
use std::f32::consts::{PI, TAU};

use bevy_color::{Color, ColorToPacked};
use image::{Rgba, RgbaImage};
use serde::Deserialize;

const TEXTURE_SIZE: u32 = 256;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Sphere,
    Torus,
    Cube,
    Wave,
}

impl Shape {
    pub const ALL: [Shape; 4] = [Shape::Sphere, Shape::Torus, Shape::Cube, Shape::Wave];

    pub fn name(self) -> &'static str {
        match self {
            Shape::Sphere => "sphere",
            Shape::Torus => "torus",
            Shape::Cube => "cube",
            Shape::Wave => "wave",
        }
    }

    pub fn from_name(name: &str) -> Option<Shape> {
        Shape::ALL.into_iter().find(|shape| shape.name() == name)
    }

    /// Surface positions and uvs, one entry per vertex.
    pub fn generate(self) -> (Vec<[f32; 3]>, Vec<[f32; 2]>) {
        match self {
            Shape::Sphere => sphere(2.0, 32, 16),
            Shape::Torus => torus(1.5, 0.5, 24, 64),
            Shape::Cube => cube(3.0, 12),
            Shape::Wave => wave(5.0, 40),
        }
    }

    /// Oklch gradient, hue along u and lightness along v, offset per shape.
    pub fn texture(self) -> RgbaImage {
        let hue_offset = match self {
            Shape::Sphere => 20.0,
            Shape::Torus => 140.0,
            Shape::Cube => 260.0,
            Shape::Wave => 320.0,
        };
        RgbaImage::from_fn(TEXTURE_SIZE, TEXTURE_SIZE, |x, y| {
            let u = x as f32 / (TEXTURE_SIZE - 1) as f32;
            let v = y as f32 / (TEXTURE_SIZE - 1) as f32;
            let color = Color::oklch(0.55 + 0.3 * v, 0.15, (hue_offset + 90.0 * u) % 360.0);
            Rgba(color.to_srgba().to_u8_array())
        })
    }
}

// Same vertex layout as a three.js SphereGeometry
fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> (Vec<[f32; 3]>, Vec<[f32; 2]>) {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            positions.push([
                -radius * (u * TAU).cos() * (v * PI).sin(),
                radius * (v * PI).cos(),
                radius * (u * TAU).sin() * (v * PI).sin(),
            ]);
            uvs.push([u, 1.0 - v]);
        }
    }
    (positions, uvs)
}

fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> (Vec<[f32; 3]>, Vec<[f32; 2]>) {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for j in 0..=radial_segments {
        let v = j as f32 / radial_segments as f32 * TAU;
        for i in 0..=tubular_segments {
            let u = i as f32 / tubular_segments as f32 * TAU;
            positions.push([
                (radius + tube * v.cos()) * u.cos(),
                (radius + tube * v.cos()) * u.sin(),
                tube * v.sin(),
            ]);
            uvs.push([i as f32 / tubular_segments as f32, j as f32 / radial_segments as f32]);
        }
    }
    (positions, uvs)
}

// Six faces, each a (segments + 1)^2 grid
fn cube(size: f32, segments: u32) -> (Vec<[f32; 3]>, Vec<[f32; 2]>) {
    let half = size / 2.0;
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for face in 0..6 {
        for iy in 0..=segments {
            let v = iy as f32 / segments as f32;
            for ix in 0..=segments {
                let u = ix as f32 / segments as f32;
                let a = (u - 0.5) * size;
                let b = (v - 0.5) * size;
                positions.push(match face {
                    0 => [half, b, -a],
                    1 => [-half, b, a],
                    2 => [a, half, -b],
                    3 => [a, -half, b],
                    4 => [a, b, half],
                    _ => [-a, b, -half],
                });
                uvs.push([u, v]);
            }
        }
    }
    (positions, uvs)
}

fn wave(size: f32, segments: u32) -> (Vec<[f32; 3]>, Vec<[f32; 2]>) {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for iz in 0..=segments {
        let v = iz as f32 / segments as f32;
        for ix in 0..=segments {
            let u = ix as f32 / segments as f32;
            let x = (u - 0.5) * size;
            let z = (v - 0.5) * size;
            let y = 0.4 * (x * 1.5).sin() * (z * 1.5).cos();
            positions.push([x, y, z]);
            uvs.push([u, 1.0 - v]);
        }
    }
    (positions, uvs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_counts_match_segment_grids() {
        assert_eq!(Shape::Sphere.generate().0.len(), 33 * 17);
        assert_eq!(Shape::Torus.generate().0.len(), 25 * 65);
        assert_eq!(Shape::Cube.generate().0.len(), 6 * 13 * 13);
        assert_eq!(Shape::Wave.generate().0.len(), 41 * 41);
    }

    #[test]
    fn uvs_pair_with_positions_and_stay_in_range() {
        for shape in Shape::ALL {
            let (positions, uvs) = shape.generate();
            assert_eq!(positions.len(), uvs.len(), "{}", shape.name());
            assert!(uvs.iter().all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1])));
        }
    }

    #[test]
    fn sphere_points_lie_on_radius() {
        let (positions, _) = Shape::Sphere.generate();
        for p in positions {
            let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((r - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn names_round_trip() {
        for shape in Shape::ALL {
            assert_eq!(Shape::from_name(shape.name()), Some(shape));
        }
        assert_eq!(Shape::from_name("teapot"), None);
    }

    #[test]
    fn textures_are_opaque() {
        let texture = Shape::Torus.texture();
        assert_eq!(texture.dimensions(), (TEXTURE_SIZE, TEXTURE_SIZE));
        assert!(texture.pixels().all(|p| p.0[3] == 255));
    }
}
