use anyhow::{anyhow, Context, Result};
use glam::{Mat3, Mat4, Vec3};
use gltf::buffer::Data;
use gltf::mesh::Mode;
use gltf::{Gltf, Mesh, Node};

use super::MeshData;

const MAX_NODE_DEPTH: usize = 64;

/// Decodes a `.gltf` (embedded buffers only) or `.glb` file and bakes every
/// triangle primitive of the default scene into one mesh.
///
/// Node transforms are applied. If any primitive lacks normals, normals are
/// recomputed for the whole mesh.
pub fn load_gltf_from_slice(bytes: &[u8]) -> Result<MeshData> {
    let Gltf { document, blob } = Gltf::from_slice(bytes).context("not a valid glTF asset")?;
    let buffers = gltf::import_buffers(&document, None, blob)
        .context("unable to resolve glTF buffers (external files are not supported)")?;

    let mut mesh = MeshData::default();
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                append_node(&node, Mat4::IDENTITY, &buffers, &mut mesh, 0)?;
            }
        }
        None => {
            for source in document.meshes() {
                append_mesh(&source, Mat4::IDENTITY, &buffers, &mut mesh)?;
            }
        }
    }

    if mesh.indices.is_empty() {
        return Err(anyhow!("glTF scene contains no triangle geometry"));
    }
    if mesh.needs_normals() {
        mesh.compute_normals();
    }
    Ok(mesh)
}

fn append_node(
    node: &Node<'_>,
    parent: Mat4,
    buffers: &[Data],
    mesh: &mut MeshData,
    depth: usize,
) -> Result<()> {
    if depth > MAX_NODE_DEPTH {
        return Err(anyhow!("glTF node hierarchy is deeper than {MAX_NODE_DEPTH}"));
    }
    let transform = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(source) = node.mesh() {
        append_mesh(&source, transform, buffers, mesh)
            .with_context(|| format!("in node {}", node.name().unwrap_or("<unnamed>")))?;
    }
    for child in node.children() {
        append_node(&child, transform, buffers, mesh, depth + 1)?;
    }
    Ok(())
}

fn append_mesh(source: &Mesh<'_>, transform: Mat4, buffers: &[Data], mesh: &mut MeshData) -> Result<()> {
    let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();

    for primitive in source.primitives() {
        if primitive.mode() != Mode::Triangles {
            continue;
        }
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<Vec3> = positions
            .map(|p| transform.transform_point3(Vec3::from(p)))
            .collect();
        let normals: Vec<Vec3> = reader
            .read_normals()
            .map(|normals| {
                normals
                    .map(|n| (normal_matrix * Vec3::from(n)).normalize_or_zero())
                    .collect()
            })
            .unwrap_or_default();

        let base = mesh.vertex_count() as u32;
        for (i, position) in positions.iter().enumerate() {
            let normal = normals.get(i).copied().unwrap_or(Vec3::ZERO);
            mesh.push_vertex(*position, normal);
        }

        match reader.read_indices() {
            Some(indices) => {
                for index in indices.into_u32() {
                    if index as usize >= positions.len() {
                        return Err(anyhow!(
                            "index {index} out of range for {} vertices",
                            positions.len()
                        ));
                    }
                    mesh.indices.push(base + index);
                }
            }
            None => {
                let usable = (positions.len() - positions.len() % 3) as u32;
                mesh.indices.extend((0..usable).map(|i| base + i));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Bounds;
    use crate::test_support::glb_box;

    #[test]
    fn decodes_indexed_box() {
        let bytes = glb_box(Vec3::new(0.0, 3.0, 2.0), Vec3::new(10.0, 7.0, 8.0), None);
        let mesh = load_gltf_from_slice(&bytes).unwrap();
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        let bounds = Bounds::from_points(mesh.positions()).unwrap();
        assert_eq!(bounds.size(), Vec3::new(10.0, 4.0, 6.0));
        assert_eq!(bounds.center(), Vec3::splat(5.0));
    }

    #[test]
    fn bakes_node_translation() {
        let bytes = glb_box(Vec3::ZERO, Vec3::ONE, Some(Vec3::new(0.0, 10.0, 0.0)));
        let mesh = load_gltf_from_slice(&bytes).unwrap();
        let bounds = Bounds::from_points(mesh.positions()).unwrap();
        assert_eq!(bounds.min, Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 11.0, 1.0));
    }

    #[test]
    fn computes_normals_when_absent() {
        let bytes = glb_box(Vec3::ZERO, Vec3::ONE, None);
        let mesh = load_gltf_from_slice(&bytes).unwrap();
        for chunk in mesh.vertices.chunks_exact(6) {
            let normal = Vec3::new(chunk[3], chunk[4], chunk[5]);
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(load_gltf_from_slice(b"glTF\x02\x00\x00\x00garbage").is_err());
        assert!(load_gltf_from_slice(b"{\"asset\": 5}").is_err());
    }
}
