//! Indexed triangle meshes.

use std::f32::consts::{PI, TAU};
use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::{info, warn};
use vkdemo_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// Vertices plus a `u32` triangle list, ready for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Load and triangulate every model in an OBJ file into one mesh.
    ///
    /// Texture V is flipped for Vulkan's top-left image origin. Missing
    /// normals or texture coordinates are left zeroed.
    pub fn load_obj(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        let options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        };
        let (models, materials) =
            tobj::load_obj(path, &options).map_err(|source| ResourceError::Obj {
                path: path.to_path_buf(),
                source,
            })?;
        if let Err(e) = materials {
            warn!("Ignoring materials of {}: {e}", path.display());
        }

        let mut mesh = Self::default();
        for model in &models {
            let m = &model.mesh;
            let base = mesh.vertices.len() as u32;
            let count = m.positions.len() / 3;
            mesh.vertices.extend((0..count).map(|i| {
                let position = Vec3::from_slice(&m.positions[3 * i..3 * i + 3]);
                let normal = m
                    .normals
                    .get(3 * i..3 * i + 3)
                    .map_or(Vec3::ZERO, Vec3::from_slice);
                let tex_coord = m
                    .texcoords
                    .get(2 * i..2 * i + 2)
                    .map_or(Vec2::ZERO, |t| Vec2::new(t[0], 1.0 - t[1]));
                Vertex::new(position, normal, tex_coord)
            }));
            mesh.indices.extend(m.indices.iter().map(|&i| base + i));
        }

        if mesh.indices.is_empty() {
            return Err(ResourceError::EmptyMesh(path.to_path_buf()));
        }
        info!(
            "{} loaded: {} vertices, {} indices",
            path.display(),
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(mesh)
    }

    /// Square on the XZ plane facing +Y, centered at the origin.
    ///
    /// Texture coordinates repeat `uv_repeat` times across the plane.
    pub fn plane(size: f32, uv_repeat: f32) -> Self {
        let mut mesh = Self::default();
        mesh.push_quad(Vec3::ZERO, Vec3::X, Vec3::NEG_Z, size * 0.5, uv_repeat);
        mesh
    }

    /// Axis-aligned cube with per-face normals.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut mesh = Self::default();
        for (normal, u, v) in faces {
            mesh.push_quad(normal * h, u, v, h, 1.0);
        }
        mesh
    }

    /// Latitude/longitude sphere.
    pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let phi = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let theta = u * TAU;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                mesh.vertices
                    .push(Vertex::new(normal * radius, normal, Vec2::new(u, v)));
            }
        }
        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        mesh
    }

    /// Quad centered at `center`, counter-clockwise seen from the `u × v` side.
    fn push_quad(&mut self, center: Vec3, u: Vec3, v: Vec3, half: f32, uv_scale: f32) {
        let normal = u.cross(v).normalize();
        let base = self.vertices.len() as u32;
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (su, sv) in corners {
            let position = center + (u * su + v * sv) * half;
            let tex_coord = Vec2::new((su + 1.0) * 0.5, (1.0 - sv) * 0.5) * uv_scale;
            self.vertices.push(Vertex::new(position, normal, tex_coord));
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Axis-aligned bounds, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.position;
        Some(self.vertices.iter().fold((first, first), |(min, max), v| {
            (min.min(v.position), max.max(v.position))
        }))
    }
}
