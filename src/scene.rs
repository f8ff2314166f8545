use anyhow::{anyhow, Result};
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::decode::MeshData;

/// Largest extent of a model after normalization.
pub const MODEL_UNIT_SIZE: f32 = 2.0;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }

    /// Bounds of the eight corners after `transform`.
    pub fn transformed(&self, transform: Mat4) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        Self::from_points(corners.map(|c| transform.transform_point3(c))).unwrap_or(*self)
    }
}

/// Perspective camera looking at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub const DISTANCE: f32 = 5.0;

    /// Frames a normalized model from a fixed distance.
    pub fn framing_unit_model(aspect: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, Self::DISTANCE),
            target: Vec3::ZERO,
            fov_y: 45f32.to_radians(),
            aspect: aspect.max(0.01),
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    fn from_position(position: Vec3, intensity: f32) -> Self {
        Self {
            direction: (-position).normalize(),
            color: Vec3::ONE,
            intensity,
        }
    }
}

/// Fixed ambient + key + fill rig. Model materials are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::ONE,
            ambient_intensity: 0.6,
            key: DirectionalLight::from_position(Vec3::new(5.0, 10.0, 7.5), 0.8),
            fill: DirectionalLight::from_position(Vec3::new(-5.0, -5.0, -5.0), 0.3),
        }
    }
}

/// The single loaded model, normalized to a centered 2-unit box.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub mesh: MeshData,
    /// Bounds in source coordinates.
    pub source_bounds: Bounds,
    /// Applied before scaling; moves the bounds center to the origin.
    pub offset: Vec3,
    pub scale: f32,
    pub rotation: Quat,
}

impl ModelNode {
    pub fn normalized(mesh: MeshData) -> Result<Self> {
        let bounds = Bounds::from_points(mesh.positions())
            .ok_or_else(|| anyhow!("model contains no vertices"))?;
        let extent = bounds.max_extent();
        if !extent.is_finite() || extent <= f32::EPSILON {
            return Err(anyhow!("model has no measurable extent"));
        }
        Ok(Self {
            mesh,
            source_bounds: bounds,
            offset: -bounds.center(),
            scale: MODEL_UNIT_SIZE / extent,
            rotation: Quat::IDENTITY,
        })
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_quat(self.rotation)
            * Mat4::from_scale(Vec3::splat(self.scale))
            * Mat4::from_translation(self.offset)
    }

    /// Bounds after normalization, ignoring rotation.
    pub fn normalized_bounds(&self) -> Bounds {
        self.source_bounds.transformed(
            Mat4::from_scale(Vec3::splat(self.scale)) * Mat4::from_translation(self.offset),
        )
    }
}

/// Camera, lights, and at most one attached model.
#[derive(Debug, Clone)]
pub struct SceneState {
    pub camera: Camera,
    pub lights: LightRig,
    model: Option<ModelNode>,
}

impl SceneState {
    pub fn new(aspect: f32) -> Self {
        Self {
            camera: Camera::framing_unit_model(aspect),
            lights: LightRig::default(),
            model: None,
        }
    }

    pub fn model(&self) -> Option<&ModelNode> {
        self.model.as_ref()
    }

    pub fn model_count(&self) -> usize {
        usize::from(self.model.is_some())
    }

    /// Attaches `model`, returning the one it replaced.
    pub fn attach(&mut self, model: ModelNode) -> Option<ModelNode> {
        self.model.replace(model)
    }

    pub fn detach(&mut self) -> Option<ModelNode> {
        self.model.take()
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        if let Some(model) = self.model.as_mut() {
            model.rotation = rotation;
        }
    }
}
