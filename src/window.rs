//! Native window host: winit drives frames and input, wgpu draws.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, Touch, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::app::{NativePipeline, Session, WindowInitError};
use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::input::InputEvent;
use crate::refs::MemoryRefStore;
use crate::render::GpuRenderer;
use crate::viewer::{FrameHandle, Overlay, Viewer, ViewerHost};

const WINDOW_TITLE: &str = "Artifact Viewer";

/// [`ViewerHost`] backed by one winit window.
pub struct NativeHost {
    window: Arc<Window>,
    next_frame: u64,
    pending: Option<FrameHandle>,
    input_bound: bool,
    input: Vec<InputEvent>,
}

impl NativeHost {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            next_frame: 0,
            pending: None,
            input_bound: false,
            input: Vec::new(),
        }
    }

    pub fn take_frame(&mut self) -> Option<FrameHandle> {
        self.pending.take()
    }

    pub fn push_input(&mut self, event: InputEvent) {
        if self.input_bound {
            self.input.push(event);
        }
    }
}

impl ViewerHost for NativeHost {
    type Renderer = GpuRenderer;

    fn create_renderer(&mut self, width: u32, height: u32) -> Result<GpuRenderer, ViewerError> {
        block_on(GpuRenderer::new(Arc::clone(&self.window), width, height)).map_err(|err| {
            ViewerError::RendererUnavailable {
                message: format!("{err:#}"),
            }
        })
    }

    fn request_frame(&mut self) -> FrameHandle {
        self.next_frame += 1;
        let handle = FrameHandle(self.next_frame);
        self.pending = Some(handle);
        self.window.request_redraw();
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }

    fn bind_input(&mut self) {
        self.input_bound = true;
    }

    fn unbind_input(&mut self) {
        self.input_bound = false;
        self.input.clear();
    }

    fn drain_input(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.input)
    }

    fn clear_output(&mut self) {
        self.window.set_title(WINDOW_TITLE);
    }

    fn present_overlay(&mut self, overlay: &Overlay) {
        let title = match overlay {
            Overlay::None => WINDOW_TITLE.to_string(),
            Overlay::Loading { percent: Some(percent) } => format!("{WINDOW_TITLE} | Loading {percent}%"),
            Overlay::Loading { percent: None } => format!("{WINDOW_TITLE} | Loading..."),
            Overlay::Error { message, .. } => format!("{WINDOW_TITLE} | {message}"),
            Overlay::Hint(hint) => format!("{WINDOW_TITLE} | {hint}"),
        };
        self.window.set_title(&title);
    }
}

struct NativeApp {
    session: Session,
    refs: Arc<MemoryRefStore>,
    pipeline: NativePipeline,
    viewer: Option<Viewer<NativeHost>>,
    model_index: usize,
    cursor: Vec2,
    touches: u32,
    last_error: Option<anyhow::Error>,
}

impl NativeApp {
    fn new(session: Session) -> Self {
        let refs = Arc::new(MemoryRefStore::new());
        let pipeline = session.pipeline(Arc::clone(&refs));
        Self {
            session,
            refs,
            pipeline,
            viewer: None,
            model_index: 0,
            cursor: Vec2::ZERO,
            touches: 0,
            last_error: None,
        }
    }

    /// Reconfigures the viewer and, if the inputs changed, loads synchronously.
    fn apply(&mut self, config: ViewerConfig) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        let Some(request) = viewer.configure(config) else {
            return;
        };
        let generation = request.generation;
        let completion = block_on(self.pipeline.load(&request, &mut |progress| {
            viewer.report_progress(generation, progress)
        }));
        viewer.finish_load(completion);
    }

    fn current_config(&self) -> ViewerConfig {
        self.viewer
            .as_ref()
            .and_then(|viewer| viewer.config().cloned())
            .unwrap_or_else(|| self.session.config_for(self.model_index))
    }

    fn show_next_model(&mut self) {
        self.model_index = (self.model_index + 1) % self.session.models.len();
        let next = self.session.config_for(self.model_index);
        let config = ViewerConfig {
            source_url: next.source_url,
            ..self.current_config()
        };
        self.apply(config);
    }

    fn toggle(&mut self, change: impl FnOnce(&mut ViewerConfig)) {
        let mut config = self.current_config();
        change(&mut config);
        self.apply(config);
    }

    fn reload(&mut self) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        if let Some(request) = viewer.reload() {
            let generation = request.generation;
            let completion = block_on(self.pipeline.load(&request, &mut |progress| {
                viewer.report_progress(generation, progress)
            }));
            viewer.finish_load(completion);
        }
    }

    fn push_input(&mut self, event: InputEvent) {
        if let Some(viewer) = self.viewer.as_mut() {
            viewer.host_mut().push_input(event);
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => self.shutdown(event_loop),
            Key::Named(NamedKey::ArrowRight) => self.show_next_model(),
            Key::Character(text) => match text.to_ascii_lowercase().as_str() {
                "n" => self.show_next_model(),
                "a" => self.toggle(|config| config.auto_rotate = !config.auto_rotate),
                "i" => self.toggle(|config| config.interactive = !config.interactive),
                "r" => self.reload(),
                _ => {}
            },
            _ => {}
        }
    }

    fn handle_touch(&mut self, touch: Touch) {
        let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
        let event = match touch.phase {
            TouchPhase::Started => {
                self.touches += 1;
                InputEvent::TouchStart {
                    touches: self.touches,
                    position,
                }
            }
            TouchPhase::Moved => InputEvent::TouchMove {
                touches: self.touches,
                position,
            },
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.touches = self.touches.saturating_sub(1);
                InputEvent::TouchEnd
            }
        };
        self.push_input(event);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut viewer) = self.viewer.take() {
            viewer.unmount();
        }
        info!("released {} local reference(s)", self.refs.release_calls());
        event_loop.exit();
    }
}

impl ApplicationHandler for NativeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        let template = &self.session.template;
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(
                template.viewport_width as f64,
                template.viewport_height as f64,
            ));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.last_error = Some(WindowInitError::from_error("window", err).into());
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        let mut config = self.session.config_for(self.model_index);
        if size.width > 0 && size.height > 0 {
            config.viewport_width = size.width;
            config.viewport_height = size.height;
        }
        self.viewer = Some(Viewer::new(NativeHost::new(window), self.refs.clone()));
        self.apply(config);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Resized(size) => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(viewer) = self.viewer.as_mut() {
                    if let Some(handle) = viewer.host_mut().take_frame() {
                        viewer.on_frame(handle);
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let event = match state {
                    ElementState::Pressed => InputEvent::PointerDown {
                        position: self.cursor,
                    },
                    ElementState::Released => InputEvent::PointerUp,
                };
                self.push_input(event);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                self.push_input(InputEvent::PointerMove {
                    position: self.cursor,
                });
            }
            WindowEvent::CursorLeft { .. } => self.push_input(InputEvent::PointerLeave),
            WindowEvent::Touch(touch) => self.handle_touch(touch),
            _ => {}
        }
    }
}

/// Opens a window and runs until it is closed.
pub fn run_windowed(session: Session) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let mut app = NativeApp::new(session);
    event_loop.run_app(&mut app)?;

    if let Some(mut viewer) = app.viewer.take() {
        warn!("event loop ended with a mounted viewer");
        viewer.unmount();
    }
    match app.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
