//! Format decoders producing a single interleaved triangle mesh.

mod gltf_mesh;
mod obj;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::ModelFormat;

pub use self::gltf_mesh::load_gltf_from_slice;
pub use self::obj::load_obj_from_str;

/// Floats per vertex: `position.xyz` followed by `normal.xyz`.
pub const VERTEX_STRIDE: usize = 6;

/// GPU ready mesh buffers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() || self.vertices.is_empty()
    }

    pub fn position(&self, index: usize) -> Vec3 {
        let start = index * VERTEX_STRIDE;
        Vec3::from_slice(&self.vertices[start..start + 3])
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .map(|chunk| Vec3::new(chunk[0], chunk[1], chunk[2]))
    }

    pub(crate) fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&[
            position.x, position.y, position.z, normal.x, normal.y, normal.z,
        ]);
        index
    }

    pub(crate) fn needs_normals(&self) -> bool {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    /// Replaces every vertex normal with the area-weighted face average.
    pub(crate) fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertex_count()];

        for triangle in self.indices.chunks_exact(3) {
            let i0 = triangle[0] as usize;
            let i1 = triangle[1] as usize;
            let i2 = triangle[2] as usize;
            let p0 = self.position(i0);
            let p1 = self.position(i1);
            let p2 = self.position(i2);
            let normal = (p1 - p0).cross(p2 - p0);
            if normal.length_squared() > f32::EPSILON {
                let normal = normal.normalize();
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }

        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            self.vertices[i * VERTEX_STRIDE + 3] = normal.x;
            self.vertices[i * VERTEX_STRIDE + 4] = normal.y;
            self.vertices[i * VERTEX_STRIDE + 5] = normal.z;
        }
    }
}

/// Decodes raw model bytes with the decoder selected by `format`.
pub fn decode(format: ModelFormat, bytes: &[u8]) -> Result<MeshData> {
    if bytes.is_empty() {
        return Err(anyhow!("model file is empty"));
    }
    let mesh = match format {
        ModelFormat::Obj => {
            let text = std::str::from_utf8(bytes).context("OBJ file is not valid UTF-8")?;
            load_obj_from_str(text)?
        }
        ModelFormat::Gltf | ModelFormat::Glb => load_gltf_from_slice(bytes)?,
    };
    if mesh.is_empty() {
        return Err(anyhow!("{} file contains no triangles", format.name()));
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_model_bytes() {
        let html = b"<!doctype html><html><body>Access denied</body></html>";
        assert!(decode(ModelFormat::Glb, html).is_err());
        assert!(decode(ModelFormat::Obj, &[0xff, 0xfe, 0x00]).is_err());
        assert!(decode(ModelFormat::Obj, b"# nothing here\n").is_err());
        assert!(decode(ModelFormat::Gltf, b"").is_err());
    }

    #[test]
    fn vertex_only_obj_has_no_triangles() {
        let err = decode(ModelFormat::Obj, b"v 0 0 0\nv 1 0 0\nv 0 1 0\n").unwrap_err();
        assert!(err.to_string().contains("no triangles"));
    }
}
