use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4Swizzles};

use crate::decode::MeshData;
use crate::scene::{LightRig, SceneState};

/// Drawing backend owned by one mounted viewer.
pub trait RenderBackend {
    /// Uploads the mesh of the model that is about to be attached.
    fn upload_model(&mut self, mesh: &MeshData) -> Result<()>;

    /// Frees the buffers of the attached model.
    fn release_model(&mut self);

    /// Issues one render pass.
    fn render(&mut self, scene: &SceneState) -> Result<()>;

    fn resize(&mut self, width: u32, height: u32);

    /// Releases the underlying graphics context. Safe to call more than once.
    fn dispose(&mut self);
}

/// Per-frame shader constants shared by every backend.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    /// rgb + intensity
    pub ambient: [f32; 4],
    /// xyz direction towards the light + intensity
    pub key_direction: [f32; 4],
    pub key_color: [f32; 4],
    pub fill_direction: [f32; 4],
    pub fill_color: [f32; 4],
    pub base_color: [f32; 4],
}

pub const BASE_COLOR: [f32; 4] = [0.8, 0.8, 0.82, 1.0];
pub const CLEAR_COLOR: [f64; 4] = [0.07, 0.07, 0.09, 1.0];

impl FrameUniforms {
    pub fn from_scene(scene: &SceneState) -> Self {
        let model = scene
            .model()
            .map(|node| node.transform())
            .unwrap_or(Mat4::IDENTITY);
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let lights = &scene.lights;
        Self {
            view_proj: scene.camera.view_proj().to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            ambient: lights.ambient_color.extend(lights.ambient_intensity).into(),
            key_direction: (-lights.key.direction).extend(lights.key.intensity).into(),
            key_color: lights.key.color.extend(1.0).into(),
            fill_direction: (-lights.fill.direction).extend(lights.fill.intensity).into(),
            fill_color: lights.fill.color.extend(1.0).into(),
            base_color: BASE_COLOR,
        }
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

/// Light reaching a surface with world-space `normal`, matching the WGSL shader.
pub fn shade(lights: &LightRig, normal: Vec3) -> Vec3 {
    let normal = normal.normalize_or_zero();
    let key = normal.dot(-lights.key.direction).max(0.0) * lights.key.intensity;
    let fill = normal.dot(-lights.fill.direction).max(0.0) * lights.fill.intensity;
    lights.ambient_color * lights.ambient_intensity + lights.key.color * key + lights.fill.color * fill
}

/// Screen-space triangle for backends without a depth buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedTriangle {
    pub points: [Vec2; 3],
    /// Mean NDC depth, larger is farther.
    pub depth: f32,
    pub color: Vec3,
}

/// Projects the attached model into a `width` x `height` viewport, sorted back to front.
pub fn project_triangles(scene: &SceneState, width: u32, height: u32) -> Vec<ProjectedTriangle> {
    let Some(model) = scene.model() else {
        return Vec::new();
    };
    let transform = model.transform();
    let view_proj = scene.camera.view_proj();
    let base = Vec3::new(BASE_COLOR[0], BASE_COLOR[1], BASE_COLOR[2]);
    let half = Vec2::new(width as f32, height as f32) * 0.5;

    let mut triangles = Vec::with_capacity(model.mesh.triangle_count());
    'triangles: for tri in model.mesh.indices.chunks_exact(3) {
        let world = [
            transform.transform_point3(model.mesh.position(tri[0] as usize)),
            transform.transform_point3(model.mesh.position(tri[1] as usize)),
            transform.transform_point3(model.mesh.position(tri[2] as usize)),
        ];
        let mut points = [Vec2::ZERO; 3];
        let mut depth = 0.0;
        for (slot, corner) in points.iter_mut().zip(world) {
            let clip = view_proj * corner.extend(1.0);
            if clip.w <= f32::EPSILON {
                continue 'triangles;
            }
            let ndc = clip.xyz() / clip.w;
            if !(0.0..=1.0).contains(&ndc.z) {
                continue 'triangles;
            }
            *slot = Vec2::new((ndc.x + 1.0) * half.x, (1.0 - ndc.y) * half.y);
            depth += ndc.z / 3.0;
        }
        let mut normal = (world[1] - world[0]).cross(world[2] - world[0]);
        if normal.dot(scene.camera.position - world[0]) < 0.0 {
            normal = -normal;
        }
        let color = (base * shade(&scene.lights, normal)).clamp(Vec3::ZERO, Vec3::ONE);
        triangles.push(ProjectedTriangle {
            points,
            depth,
            color,
        });
    }
    triangles.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    triangles
}

/// Backend that draws nothing and records what it was asked to do.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    pub width: u32,
    pub height: u32,
    pub uploaded_triangles: Option<usize>,
    pub frames: u64,
    pub disposed: bool,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

impl RenderBackend for HeadlessRenderer {
    fn upload_model(&mut self, mesh: &MeshData) -> Result<()> {
        self.uploaded_triangles = Some(mesh.triangle_count());
        Ok(())
    }

    fn release_model(&mut self) {
        self.uploaded_triangles = None;
    }

    fn render(&mut self, scene: &SceneState) -> Result<()> {
        let _uniforms = FrameUniforms::from_scene(scene);
        self.frames += 1;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn dispose(&mut self) {
        self.uploaded_triangles = None;
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::decode::load_obj_from_str;
    use crate::scene::ModelNode;
    use crate::test_support::obj_box;

    fn scene_with_box() -> SceneState {
        let mesh = load_obj_from_str(&obj_box(Vec3::ZERO, Vec3::new(10.0, 4.0, 2.0))).unwrap();
        let mut scene = SceneState::new(1.5);
        scene.attach(ModelNode::normalized(mesh).unwrap());
        scene
    }

    #[test]
    fn facing_the_key_light_is_brightest() {
        let lights = LightRig::default();
        let toward_key = shade(&lights, -lights.key.direction);
        let away = shade(&lights, lights.key.direction);
        assert!(toward_key.x > away.x);
        assert!(away.x >= lights.ambient_intensity - 1e-6);
    }

    #[test]
    fn projects_every_triangle_inside_viewport() {
        let scene = scene_with_box();
        let triangles = project_triangles(&scene, 600, 400);
        assert_eq!(triangles.len(), 12);
        for tri in &triangles {
            for p in tri.points {
                assert!((0.0..=600.0).contains(&p.x) && (0.0..=400.0).contains(&p.y));
            }
        }
        assert!(triangles.windows(2).all(|w| w[0].depth >= w[1].depth));
    }

    #[test]
    fn empty_scene_projects_nothing() {
        assert!(project_triangles(&SceneState::new(1.0), 10, 10).is_empty());
    }

    #[test]
    fn uniforms_follow_model_transform() {
        let scene = scene_with_box();
        let uniforms = FrameUniforms::from_scene(&scene);
        let model = scene.model().unwrap().transform();
        assert_eq!(uniforms.model, model.to_cols_array_2d());
        assert_eq!(uniforms.base_color, BASE_COLOR);
    }

    #[test]
    fn headless_renderer_tracks_lifecycle() {
        let scene = scene_with_box();
        let mut renderer = HeadlessRenderer::new(600, 400);
        renderer.upload_model(&scene.model().unwrap().mesh).unwrap();
        assert_eq!(renderer.uploaded_triangles, Some(12));
        renderer.render(&scene).unwrap();
        renderer.dispose();
        assert!(renderer.disposed);
        assert_eq!(renderer.uploaded_triangles, None);
        assert_eq!(renderer.frames, 1);
    }
}
