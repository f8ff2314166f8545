use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Quat, Vec2};
use serde::{Deserialize, Serialize};

#[cfg(target_arch = "wasm32")]
pub mod wasm;

/// Radians of rotation per pixel dragged.
pub const DRAG_SENSITIVITY: f32 = 0.01;
/// Radians of yaw added per frame while idle. Tied to frame count, not time.
pub const AUTO_ROTATE_STEP: f32 = 0.005;

/// Pointer and touch input, in host pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { position: Vec2 },
    PointerMove { position: Vec2 },
    PointerUp,
    PointerLeave,
    /// `touches` is the number of active touch points after the change.
    TouchStart { touches: u32, position: Vec2 },
    TouchMove { touches: u32, position: Vec2 },
    TouchEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationState {
    pub yaw: f32,
    pub pitch: f32,
}

impl RotationState {
    pub fn rotate_by(&mut self, yaw: f32, pitch: f32) {
        self.yaw = wrap_angle(self.yaw + yaw);
        self.pitch = (self.pitch + pitch).clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    pub fn to_quat(self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }
}

/// Wraps into `[-π, π)`.
fn wrap_angle(angle: f32) -> f32 {
    if (-PI..PI).contains(&angle) {
        angle
    } else {
        (angle + PI).rem_euclid(TAU) - PI
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging { last: Vec2 },
}

/// Turns drags into rotation and spins the model while idle.
#[derive(Debug, Clone)]
pub struct InteractionController {
    rotation: RotationState,
    drag: DragState,
    auto_rotate: bool,
    interactive: bool,
}

impl InteractionController {
    pub fn new(auto_rotate: bool, interactive: bool) -> Self {
        Self {
            rotation: RotationState::default(),
            drag: DragState::Idle,
            auto_rotate,
            interactive,
        }
    }

    pub fn rotation(&self) -> RotationState {
        self.rotation
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    pub fn handle(&mut self, event: InputEvent) {
        if !self.interactive {
            return;
        }
        match event {
            InputEvent::PointerDown { position } => self.begin(position),
            InputEvent::TouchStart { touches, position } => {
                if touches == 1 {
                    self.begin(position);
                } else {
                    self.drag = DragState::Idle;
                }
            }
            InputEvent::PointerMove { position } => self.drag_to(position),
            InputEvent::TouchMove { touches, position } => {
                if touches == 1 {
                    self.drag_to(position);
                } else {
                    self.drag = DragState::Idle;
                }
            }
            InputEvent::PointerUp | InputEvent::PointerLeave | InputEvent::TouchEnd => {
                self.drag = DragState::Idle;
            }
        }
    }

    /// Advances one frame of idle rotation.
    pub fn tick(&mut self) {
        if self.auto_rotate && !self.is_dragging() {
            self.rotation.rotate_by(AUTO_ROTATE_STEP, 0.0);
        }
    }

    fn begin(&mut self, position: Vec2) {
        self.drag = DragState::Dragging { last: position };
    }

    fn drag_to(&mut self, position: Vec2) {
        let DragState::Dragging { last } = self.drag else {
            return;
        };
        let delta = (position - last) * DRAG_SENSITIVITY;
        self.rotation.rotate_by(delta.x, delta.y);
        self.drag = DragState::Dragging { last: position };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32, y: f32) -> Vec2 {
        Vec2::new(x, y)
    }

    #[test]
    fn drag_accumulates_scaled_delta() {
        let mut controller = InteractionController::new(false, true);
        controller.handle(InputEvent::PointerDown { position: at(100.0, 100.0) });
        controller.handle(InputEvent::PointerMove { position: at(150.0, 120.0) });
        let rotation = controller.rotation();
        assert!((rotation.yaw - 0.5).abs() < 1e-6);
        assert!((rotation.pitch - 0.2).abs() < 1e-6);
    }

    #[test]
    fn moves_without_drag_are_ignored() {
        let mut controller = InteractionController::new(false, true);
        controller.handle(InputEvent::PointerMove { position: at(10.0, 10.0) });
        controller.handle(InputEvent::PointerMove { position: at(90.0, 40.0) });
        assert_eq!(controller.rotation(), RotationState::default());
    }

    #[test]
    fn pitch_stays_clamped() {
        let mut controller = InteractionController::new(false, true);
        controller.handle(InputEvent::PointerDown { position: at(0.0, 0.0) });
        let mut y = 0.0;
        for step in [400.0, 900.0, -3000.0, 50.0, 10_000.0, -25.0] {
            y += step;
            controller.handle(InputEvent::PointerMove { position: at(0.0, y) });
            let pitch = controller.rotation().pitch;
            assert!((-FRAC_PI_2..=FRAC_PI_2).contains(&pitch), "pitch {pitch}");
        }
    }

    #[test]
    fn yaw_wraps() {
        let mut rotation = RotationState::default();
        rotation.rotate_by(2.5 * PI, 0.0);
        assert!((rotation.yaw - FRAC_PI_2).abs() < 1e-5);
        rotation.rotate_by(-2.0 * PI, 0.0);
        assert!((rotation.yaw - FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn second_touch_cancels_drag() {
        let mut controller = InteractionController::new(false, true);
        controller.handle(InputEvent::TouchStart { touches: 1, position: at(0.0, 0.0) });
        assert!(controller.is_dragging());
        controller.handle(InputEvent::TouchStart { touches: 2, position: at(5.0, 5.0) });
        assert!(!controller.is_dragging());
        controller.handle(InputEvent::TouchMove { touches: 1, position: at(50.0, 0.0) });
        assert_eq!(controller.rotation(), RotationState::default());
    }

    #[test]
    fn leave_and_touch_end_stop_dragging() {
        let mut controller = InteractionController::new(false, true);
        controller.handle(InputEvent::PointerDown { position: at(0.0, 0.0) });
        controller.handle(InputEvent::PointerLeave);
        assert_eq!(controller.drag_state(), DragState::Idle);
        controller.handle(InputEvent::TouchStart { touches: 1, position: at(0.0, 0.0) });
        controller.handle(InputEvent::TouchEnd);
        assert_eq!(controller.drag_state(), DragState::Idle);
    }

    #[test]
    fn auto_rotation_pauses_while_dragging() {
        let mut controller = InteractionController::new(true, true);
        controller.tick();
        controller.tick();
        assert!((controller.rotation().yaw - 2.0 * AUTO_ROTATE_STEP).abs() < 1e-7);

        controller.handle(InputEvent::PointerDown { position: at(0.0, 0.0) });
        controller.tick();
        assert!((controller.rotation().yaw - 2.0 * AUTO_ROTATE_STEP).abs() < 1e-7);
    }

    #[test]
    fn small_steps_accumulate_without_drift() {
        let mut rotation = RotationState::default();
        rotation.rotate_by(AUTO_ROTATE_STEP, 0.0);
        rotation.rotate_by(AUTO_ROTATE_STEP, 0.0);
        assert!((rotation.yaw - 2.0 * AUTO_ROTATE_STEP).abs() < 1e-7);

        let mut rotation = RotationState::default();
        for _ in 0..1000 {
            rotation.rotate_by(1e-4, 0.0);
        }
        assert!((rotation.yaw - 0.1).abs() < 1e-5);
    }

    #[test]
    fn non_interactive_ignores_input() {
        let mut controller = InteractionController::new(true, false);
        controller.handle(InputEvent::PointerDown { position: at(0.0, 0.0) });
        assert!(!controller.is_dragging());
        controller.tick();
        assert!(controller.rotation().yaw > 0.0);
    }
}
