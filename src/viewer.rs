//! Mount lifecycle: builds the scene for a load, drives frames, and tears
//! everything down again when the inputs change or the viewer goes away.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::input::{InputEvent, InteractionController, RotationState};
use crate::pipeline::{LoadCompletion, LoadRequest};
use crate::refs::{FetchedResource, LocalRefStore};
use crate::render::RenderBackend;
use crate::scene::{ModelNode, SceneState};
use crate::source::LoadProgress;

pub const DRAG_HINT: &str = "Drag to rotate";

/// Identifies one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Platform services a [`Viewer`] needs from whatever embeds it.
pub trait ViewerHost {
    type Renderer: RenderBackend;

    fn create_renderer(&mut self, width: u32, height: u32) -> Result<Self::Renderer, ViewerError>;

    /// Schedules one call to [`Viewer::on_frame`] with the returned handle.
    fn request_frame(&mut self) -> FrameHandle;

    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Starts listening for pointer and touch input.
    fn bind_input(&mut self);

    fn unbind_input(&mut self);

    /// Input gathered since the previous frame.
    fn drain_input(&mut self) -> Vec<InputEvent> {
        Vec::new()
    }

    /// Removes whatever the last mount drew.
    fn clear_output(&mut self);

    fn present_overlay(&mut self, overlay: &Overlay);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerStatus {
    Idle,
    Loading { progress: Option<LoadProgress> },
    Ready,
    Failed(ViewerError),
}

/// What the host should draw on top of the render output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    None,
    Loading { percent: Option<u8> },
    Error { message: String, cross_origin: bool },
    Hint(&'static str),
}

/// How [`Viewer::finish_load`] disposed of a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Ready,
    Failed,
    /// A newer request superseded it; nothing was mutated.
    Stale,
}

struct Mount<R> {
    renderer: R,
    scene: SceneState,
    controller: InteractionController,
    frame: Option<FrameHandle>,
    input_bound: bool,
    frames: u64,
}

pub struct Viewer<H: ViewerHost> {
    host: H,
    refs: Arc<dyn LocalRefStore>,
    config: Option<ViewerConfig>,
    generation: u64,
    status: ViewerStatus,
    mount: Option<Mount<H::Renderer>>,
    resource: Option<FetchedResource>,
}

impl<H: ViewerHost> Viewer<H> {
    pub fn new(host: H, refs: Arc<dyn LocalRefStore>) -> Self {
        Self {
            host,
            refs,
            config: None,
            generation: 0,
            status: ViewerStatus::Idle,
            mount: None,
            resource: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> Option<&ViewerConfig> {
        self.config.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn scene(&self) -> Option<&SceneState> {
        self.mount.as_ref().map(|mount| &mount.scene)
    }

    pub fn renderer(&self) -> Option<&H::Renderer> {
        self.mount.as_ref().map(|mount| &mount.renderer)
    }

    pub fn rotation(&self) -> Option<RotationState> {
        self.mount.as_ref().map(|mount| mount.controller.rotation())
    }

    /// Frames rendered by the current mount.
    pub fn frames_rendered(&self) -> u64 {
        self.mount.as_ref().map_or(0, |mount| mount.frames)
    }

    /// Applies new inputs. Returns the load to run, or `None` when nothing changed.
    pub fn configure(&mut self, config: ViewerConfig) -> Option<LoadRequest> {
        if self.config.as_ref() == Some(&config) {
            return None;
        }
        self.begin_load(config)
    }

    /// Rebuilds with the current inputs.
    pub fn reload(&mut self) -> Option<LoadRequest> {
        let config = self.config.clone()?;
        self.begin_load(config)
    }

    pub fn unmount(&mut self) {
        self.teardown();
        self.generation += 1;
        self.config = None;
        self.status = ViewerStatus::Idle;
    }

    fn begin_load(&mut self, config: ViewerConfig) -> Option<LoadRequest> {
        self.teardown();
        self.generation += 1;
        info!("load #{} requested for {}", self.generation, config.source_url);
        self.config = Some(config.clone());
        self.status = ViewerStatus::Loading { progress: None };
        self.present_overlay();
        Some(LoadRequest {
            generation: self.generation,
            config,
        })
    }

    pub fn report_progress(&mut self, generation: u64, progress: LoadProgress) {
        if generation != self.generation {
            return;
        }
        if let ViewerStatus::Loading { progress: current } = &mut self.status {
            *current = Some(progress);
            self.present_overlay();
        }
    }

    /// Applies a finished load if it still belongs to the current mount.
    pub fn finish_load(&mut self, completion: LoadCompletion) -> LoadStatus {
        let LoadCompletion {
            generation,
            mut resource,
            outcome,
        } = completion;

        let pending = matches!(self.status, ViewerStatus::Loading { .. });
        if generation != self.generation || !pending {
            resource.release(&*self.refs);
            debug!("{}", ViewerError::StaleCompletion { generation });
            return LoadStatus::Stale;
        }

        self.resource = Some(resource);
        match outcome.and_then(|model| self.build(model)) {
            Ok(()) => {
                self.status = ViewerStatus::Ready;
                self.present_overlay();
                LoadStatus::Ready
            }
            Err(err) => {
                let url = self.config.as_ref().map_or("", |config| config.source_url.as_str());
                error!("failed to load {url}: {err}");
                self.status = ViewerStatus::Failed(err);
                self.present_overlay();
                LoadStatus::Failed
            }
        }
    }

    fn build(&mut self, model: ModelNode) -> Result<(), ViewerError> {
        let Some(config) = self.config.as_ref() else {
            return Err(ViewerError::RendererUnavailable {
                message: "viewer is not configured".into(),
            });
        };
        let (width, height, aspect) = (config.viewport_width, config.viewport_height, config.aspect());
        let (auto_rotate, interactive) = (config.auto_rotate, config.interactive);

        let mut renderer = self.host.create_renderer(width, height)?;
        if let Err(err) = renderer.upload_model(&model.mesh) {
            renderer.dispose();
            return Err(ViewerError::RendererUnavailable {
                message: format!("{err:#}"),
            });
        }

        let mut scene = SceneState::new(aspect);
        scene.attach(model);

        if interactive {
            self.host.bind_input();
        }
        let frame = self.host.request_frame();
        self.mount = Some(Mount {
            renderer,
            scene,
            controller: InteractionController::new(auto_rotate, interactive),
            frame: Some(frame),
            input_bound: interactive,
            frames: 0,
        });
        Ok(())
    }

    /// Runs one frame. Frames with a handle other than the pending one are ignored.
    pub fn on_frame(&mut self, handle: FrameHandle) {
        let Some(mount) = self.mount.as_mut() else {
            return;
        };
        if mount.frame != Some(handle) {
            debug!("ignoring stale frame {handle:?}");
            return;
        }
        mount.frame = None;

        for event in self.host.drain_input() {
            mount.controller.handle(event);
        }
        mount.controller.tick();
        mount.scene.set_rotation(mount.controller.rotation().to_quat());
        if let Err(err) = mount.renderer.render(&mount.scene) {
            error!("render failed: {err:#}");
        }
        mount.frames += 1;
        mount.frame = Some(self.host.request_frame());
    }

    /// Feeds one input event to the controller. Rotation is applied on the next frame.
    pub fn handle_input(&mut self, event: InputEvent) {
        if let Some(mount) = self.mount.as_mut() {
            mount.controller.handle(event);
        }
    }

    /// Resizes the output without rebuilding.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(config) = self.config.as_mut() {
            config.viewport_width = width;
            config.viewport_height = height;
        }
        if let Some(mount) = self.mount.as_mut() {
            mount.scene.camera.aspect = width as f32 / height as f32;
            mount.renderer.resize(width, height);
        }
    }

    pub fn overlay(&self) -> Overlay {
        match &self.status {
            ViewerStatus::Idle => Overlay::None,
            ViewerStatus::Loading { progress } => Overlay::Loading {
                percent: progress.and_then(|progress| progress.percent()),
            },
            ViewerStatus::Failed(err) if err.is_user_visible() => Overlay::Error {
                message: err.user_message(),
                cross_origin: err.is_cross_origin(),
            },
            ViewerStatus::Failed(_) => Overlay::None,
            ViewerStatus::Ready => {
                if self.config.as_ref().is_some_and(|config| config.interactive) {
                    Overlay::Hint(DRAG_HINT)
                } else {
                    Overlay::None
                }
            }
        }
    }

    fn present_overlay(&mut self) {
        let overlay = self.overlay();
        self.host.present_overlay(&overlay);
    }

    /// Releases everything the current mount holds. Safe to call repeatedly.
    fn teardown(&mut self) {
        let dirty = self.mount.is_some()
            || self.resource.is_some()
            || !matches!(self.status, ViewerStatus::Idle);
        let mount = self.mount.take();

        let mut renderer = mount.map(|mut mount| {
            if let Some(frame) = mount.frame.take() {
                self.host.cancel_frame(frame);
            }
            if mount.input_bound {
                self.host.unbind_input();
            }
            if mount.scene.detach().is_some() {
                mount.renderer.release_model();
            }
            mount.renderer
        });

        if let Some(mut resource) = self.resource.take() {
            if resource.release(&*self.refs) {
                debug!("released {}", resource.load_url);
            }
        }

        if let Some(renderer) = renderer.as_mut() {
            renderer.dispose();
        }
        if dirty {
            self.host.clear_output();
        }
        if renderer.is_some() {
            debug!("viewer mount #{} torn down", self.generation);
        }
    }
}

impl<H: ViewerHost> Drop for Viewer<H> {
    fn drop(&mut self) {
        if self.mount.is_some() || self.resource.is_some() {
            warn!("viewer dropped while mounted; tearing down");
        }
        self.teardown();
    }
}
