//! Keyboard camera controller

use std::collections::HashSet;
use std::f32::consts::TAU;

use nalgebra::Vector3;
use splatcrate_core::TransformComponent;
use winit::event::ElementState;
use winit::keyboard::KeyCode;

const PITCH_LIMIT: f32 = 1.5;

/// Key bindings for movement and looking around
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMappings {
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_backward: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub look_left: KeyCode,
    pub look_right: KeyCode,
    pub look_up: KeyCode,
    pub look_down: KeyCode,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            move_forward: KeyCode::KeyW,
            move_backward: KeyCode::KeyS,
            move_up: KeyCode::KeyE,
            move_down: KeyCode::KeyQ,
            look_left: KeyCode::ArrowLeft,
            look_right: KeyCode::ArrowRight,
            look_up: KeyCode::ArrowUp,
            look_down: KeyCode::ArrowDown,
        }
    }
}

/// Moves a transform in the XZ plane from the keys currently held down
#[derive(Debug, Clone)]
pub struct KeyboardMovementController {
    pub keys: KeyMappings,
    pub move_speed: f32,
    pub look_speed: f32,
    pressed: HashSet<KeyCode>,
}

impl Default for KeyboardMovementController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_speed: 1.5,
            pressed: HashSet::new(),
        }
    }
}

impl KeyboardMovementController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_key(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.pressed.insert(key);
            }
            ElementState::Released => {
                self.pressed.remove(&key);
            }
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Forget every held key, e.g. when the window loses focus
    pub fn release_all(&mut self) {
        self.pressed.clear();
    }

    fn axis(&self, positive: KeyCode, negative: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_pressed(positive) {
            value += 1.0;
        }
        if self.is_pressed(negative) {
            value -= 1.0;
        }
        value
    }

    /// Apply one frame of movement to `transform`.
    ///
    /// Positive pitch looks down. Pitch is clamped to +-1.5 rad and yaw wraps into [0, 2pi).
    pub fn move_in_plane_xz(&self, dt: f32, transform: &mut TransformComponent) {
        let k = self.keys;
        let rotate = Vector3::new(
            self.axis(k.look_down, k.look_up),
            self.axis(k.look_right, k.look_left),
            0.0,
        );
        if rotate.norm_squared() > f32::EPSILON {
            transform.rotation += self.look_speed * dt * rotate.normalize();
        }
        transform.rotation.x = transform.rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        transform.rotation.y = transform.rotation.y.rem_euclid(TAU);

        let yaw = transform.rotation.y;
        let forward = Vector3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vector3::new(forward.z, 0.0, -forward.x);
        let up = Vector3::new(0.0, 1.0, 0.0);

        let step = forward * self.axis(k.move_forward, k.move_backward)
            + right * self.axis(k.move_right, k.move_left)
            + up * self.axis(k.move_up, k.move_down);
        if step.norm_squared() > f32::EPSILON {
            transform.translation += self.move_speed * dt * step.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_idle_controller_leaves_transform_alone() {
        let controller = KeyboardMovementController::new();
        let mut transform = TransformComponent::identity();
        controller.move_in_plane_xz(0.5, &mut transform);
        assert_eq!(transform, TransformComponent::identity());
    }

    #[test]
    fn test_forward_follows_yaw() {
        let mut controller = KeyboardMovementController::new();
        controller.handle_key(KeyCode::KeyW, ElementState::Pressed);

        let mut transform = TransformComponent::identity();
        controller.move_in_plane_xz(1.0, &mut transform);
        assert_relative_eq!(transform.translation, Vector3::new(0.0, 0.0, 3.0), epsilon = 1e-6);

        let mut turned = TransformComponent::identity();
        turned.rotation.y = std::f32::consts::FRAC_PI_2;
        controller.move_in_plane_xz(1.0, &mut turned);
        assert_relative_eq!(turned.translation, Vector3::new(3.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let mut controller = KeyboardMovementController::new();
        controller.handle_key(KeyCode::KeyW, ElementState::Pressed);
        controller.handle_key(KeyCode::KeyD, ElementState::Pressed);

        let mut transform = TransformComponent::identity();
        controller.move_in_plane_xz(1.0, &mut transform);
        assert_relative_eq!(transform.translation.norm(), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped_and_yaw_wraps() {
        let mut controller = KeyboardMovementController::new();
        controller.handle_key(KeyCode::ArrowUp, ElementState::Pressed);

        let mut transform = TransformComponent::identity();
        controller.move_in_plane_xz(10.0, &mut transform);
        assert_relative_eq!(transform.rotation.x, -PITCH_LIMIT);

        controller.release_all();
        controller.handle_key(KeyCode::ArrowLeft, ElementState::Pressed);
        let mut transform = TransformComponent::identity();
        controller.move_in_plane_xz(1.0, &mut transform);
        assert!(transform.rotation.y >= 0.0 && transform.rotation.y < TAU);
        assert_relative_eq!(transform.rotation.y, TAU - 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_release_stops_movement() {
        let mut controller = KeyboardMovementController::new();
        controller.handle_key(KeyCode::KeyE, ElementState::Pressed);
        controller.handle_key(KeyCode::KeyE, ElementState::Released);
        assert!(!controller.is_pressed(KeyCode::KeyE));
    }
}
