//! Interactive single-model 3D viewer for build artifacts.
//!
//! A [`Viewer`] owns the mount lifecycle: it decides when a configuration
//! change needs a fresh load, drops completions from superseded loads and
//! releases every local reference it was handed. Loading itself goes through
//! [`LoadPipeline`], which routes the source URL through the cross-origin
//! policy before decoding GLB, glTF or OBJ bytes into a normalized model.
//!
//! Hosts plug in through [`ViewerHost`]. The crate ships a winit/wgpu host for
//! native builds, a canvas host for the browser and [`HeadlessHost`] for tests
//! and tooling.

pub mod config;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod headless;
pub mod input;
pub mod pipeline;
pub mod refs;
pub mod render;
pub mod scene;
pub mod source;
pub mod viewer;

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
#[cfg(not(target_arch = "wasm32"))]
pub mod window;
#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(test)]
mod test_support;

pub use config::{FetchPolicy, ModelFormat, Settings, ViewerConfig};
pub use decode::{decode, MeshData};
pub use error::ViewerError;
pub use fetch::{HttpClient, ResourceFetcher, Route, StaticCredentials};
pub use headless::HeadlessHost;
pub use input::{InputEvent, InteractionController, RotationState};
pub use pipeline::{LoadCompletion, LoadPipeline, LoadRequest};
pub use refs::{FetchedResource, LocalRefStore, MemoryRefStore};
pub use render::{HeadlessRenderer, RenderBackend};
pub use scene::{Bounds, Camera, LightRig, ModelNode, SceneState};
pub use source::{AssetSource, LoadProgress};
pub use viewer::{LoadStatus, Overlay, Viewer, ViewerHost, ViewerStatus};
