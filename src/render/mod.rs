mod common;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use common::{
    project_triangles, shade, FrameUniforms, HeadlessRenderer, ProjectedTriangle, RenderBackend,
    BASE_COLOR, CLEAR_COLOR,
};
#[cfg(not(target_arch = "wasm32"))]
pub use native::GpuRenderer;
#[cfg(target_arch = "wasm32")]
pub use wasm::CanvasRenderer;
