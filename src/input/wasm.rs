use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use gloo_events::{EventListener, EventListenerOptions};
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, MouseEvent, TouchEvent, Window};

use super::InputEvent;

/// Input queued by DOM listeners until the next frame drains it.
pub type InputQueue = Rc<RefCell<Vec<InputEvent>>>;

/// Mouse and touch listeners on the canvas, plus a global mouse-up so drags
/// end even when released outside it. Dropping the binding removes them all.
pub struct DomInputBinding {
    listeners: Vec<EventListener>,
}

impl DomInputBinding {
    pub fn attach(canvas: &HtmlCanvasElement, window: &Window, queue: InputQueue) -> Self {
        let mut listeners = Vec::new();

        listeners.push(mouse_listener(canvas, "mousedown", &queue, |position| {
            InputEvent::PointerDown { position }
        }));
        listeners.push(mouse_listener(canvas, "mousemove", &queue, |position| {
            InputEvent::PointerMove { position }
        }));
        listeners.push(mouse_listener(canvas, "mouseup", &queue, |_| InputEvent::PointerUp));
        listeners.push(mouse_listener(canvas, "mouseleave", &queue, |_| {
            InputEvent::PointerLeave
        }));
        listeners.push(mouse_listener(window, "mouseup", &queue, |_| InputEvent::PointerUp));

        listeners.push(touch_listener(canvas, "touchstart", &queue, |touches, position| {
            InputEvent::TouchStart { touches, position }
        }));
        listeners.push(touch_listener(canvas, "touchmove", &queue, |touches, position| {
            InputEvent::TouchMove { touches, position }
        }));
        for kind in ["touchend", "touchcancel"] {
            let queue = Rc::clone(&queue);
            listeners.push(EventListener::new(canvas, kind, move |_| {
                queue.borrow_mut().push(InputEvent::TouchEnd);
            }));
        }

        Self { listeners }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for DomInputBinding {
    fn drop(&mut self) {
        self.listeners.clear();
    }
}

fn mouse_listener(
    target: &web_sys::EventTarget,
    kind: &'static str,
    queue: &InputQueue,
    map: impl Fn(Vec2) -> InputEvent + 'static,
) -> EventListener {
    let queue = Rc::clone(queue);
    EventListener::new(target, kind, move |event| {
        let Some(event) = event.dyn_ref::<MouseEvent>() else {
            return;
        };
        let position = Vec2::new(event.offset_x() as f32, event.offset_y() as f32);
        queue.borrow_mut().push(map(position));
    })
}

fn touch_listener(
    target: &web_sys::EventTarget,
    kind: &'static str,
    queue: &InputQueue,
    map: impl Fn(u32, Vec2) -> InputEvent + 'static,
) -> EventListener {
    let queue = Rc::clone(queue);
    // Non-passive so the page does not scroll while dragging.
    let options = EventListenerOptions::enable_prevent_default();
    EventListener::new_with_options(target, kind, options, move |event| {
        let Some(event) = event.dyn_ref::<TouchEvent>() else {
            return;
        };
        event.prevent_default();
        let touches = event.touches();
        let Some(first) = touches.item(0) else {
            return;
        };
        let position = Vec2::new(first.client_x() as f32, first.client_y() as f32);
        queue.borrow_mut().push(map(touches.length(), position));
    })
}
