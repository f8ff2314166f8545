//! Window-less host used by `--summary-only` runs and by tests.

use log::debug;

use crate::error::ViewerError;
use crate::input::InputEvent;
use crate::render::HeadlessRenderer;
use crate::viewer::{FrameHandle, Overlay, Viewer, ViewerHost};

/// Records every request a [`Viewer`] makes of its host.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    next_frame: u64,
    pending: Option<FrameHandle>,
    queued_input: Vec<InputEvent>,
    renderer_failure: Option<String>,
    pub frames_requested: u64,
    pub frames_cancelled: u64,
    pub input_bound: bool,
    pub input_binds: u32,
    pub input_unbinds: u32,
    pub clears: u32,
    pub renderers_created: u32,
    pub overlays_presented: u64,
    last_overlay: Option<Overlay>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host whose renderer allocation always fails with `message`.
    pub fn failing_renderer(message: impl Into<String>) -> Self {
        Self {
            renderer_failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.pending
    }

    pub fn take_frame(&mut self) -> Option<FrameHandle> {
        self.pending.take()
    }

    /// Queues input for the next frame. Dropped while no listeners are bound.
    pub fn push_input(&mut self, event: InputEvent) {
        if self.input_bound {
            self.queued_input.push(event);
        }
    }

    pub fn last_overlay(&self) -> Option<&Overlay> {
        self.last_overlay.as_ref()
    }
}

impl ViewerHost for HeadlessHost {
    type Renderer = HeadlessRenderer;

    fn create_renderer(&mut self, width: u32, height: u32) -> Result<HeadlessRenderer, ViewerError> {
        if let Some(message) = &self.renderer_failure {
            return Err(ViewerError::RendererUnavailable {
                message: message.clone(),
            });
        }
        self.renderers_created += 1;
        Ok(HeadlessRenderer::new(width, height))
    }

    fn request_frame(&mut self) -> FrameHandle {
        self.next_frame += 1;
        self.frames_requested += 1;
        let handle = FrameHandle(self.next_frame);
        self.pending = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
            self.frames_cancelled += 1;
        }
    }

    fn bind_input(&mut self) {
        self.input_bound = true;
        self.input_binds += 1;
    }

    fn unbind_input(&mut self) {
        self.input_bound = false;
        self.input_unbinds += 1;
        self.queued_input.clear();
    }

    fn drain_input(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.queued_input)
    }

    fn clear_output(&mut self) {
        self.clears += 1;
    }

    fn present_overlay(&mut self, overlay: &Overlay) {
        debug!("overlay: {overlay:?}");
        self.overlays_presented += 1;
        self.last_overlay = Some(overlay.clone());
    }
}

/// Delivers up to `count` pending frames. Returns how many ran.
pub fn run_frames(viewer: &mut Viewer<HeadlessHost>, count: u64) -> u64 {
    let mut ran = 0;
    while ran < count {
        let Some(handle) = viewer.host_mut().take_frame() else {
            break;
        };
        viewer.on_frame(handle);
        ran += 1;
    }
    ran
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;

    #[test]
    fn input_is_dropped_while_unbound() {
        let mut host = HeadlessHost::new();
        host.push_input(InputEvent::PointerUp);
        host.bind_input();
        host.push_input(InputEvent::PointerDown {
            position: Vec2::ZERO,
        });
        assert_eq!(host.drain_input().len(), 1);
        assert!(host.drain_input().is_empty());
    }

    #[test]
    fn cancelling_an_old_handle_keeps_the_pending_one() {
        let mut host = HeadlessHost::new();
        let first = host.request_frame();
        let second = host.request_frame();
        host.cancel_frame(first);
        assert_eq!(host.pending_frame(), Some(second));
        assert_eq!(host.frames_cancelled, 0);
        host.cancel_frame(second);
        assert_eq!(host.pending_frame(), None);
    }

    #[test]
    fn only_the_latest_overlay_is_kept() {
        let mut host = HeadlessHost::new();
        for percent in 0..=100 {
            host.present_overlay(&Overlay::Loading {
                percent: Some(percent),
            });
        }
        host.present_overlay(&Overlay::None);
        assert_eq!(host.overlays_presented, 102);
        assert_eq!(host.last_overlay(), Some(&Overlay::None));
    }
}
