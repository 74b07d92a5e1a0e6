//! Mouse and keyboard bindings.

use mocap_platform::{InputState, KeyCode, MouseButton};
use mocap_scene::OrbitCamera;

/// Discrete actions triggered by a key press this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    TogglePause,
    Restart,
    ToggleAxes,
    Exit,
}

const BINDINGS: [(KeyCode, Action); 4] = [
    (KeyCode::Space, Action::TogglePause),
    (KeyCode::KeyR, Action::Restart),
    (KeyCode::KeyA, Action::ToggleAxes),
    (KeyCode::Escape, Action::Exit),
];

/// Actions whose key went down since the last `begin_frame`.
pub fn pressed_actions(input: &InputState) -> impl Iterator<Item = Action> + '_ {
    BINDINGS
        .iter()
        .filter(|(key, _)| input.is_key_just_pressed(*key))
        .map(|(_, action)| *action)
}

/// Left drag orbits; shift + left drag or middle drag pans; the wheel zooms,
/// faster with ctrl held.
pub fn apply_camera_input(input: &InputState, camera: &mut OrbitCamera) {
    let (dx, dy) = input.mouse_delta();
    let modifiers = input.modifiers();

    if dx != 0.0 || dy != 0.0 {
        let left = input.is_mouse_pressed(MouseButton::Left);
        if input.is_mouse_pressed(MouseButton::Middle) || (left && modifiers.shift) {
            camera.pan(dx, dy);
        } else if left {
            camera.orbit(dx, dy);
        }
    }

    let (_, scroll) = input.scroll_delta();
    if scroll != 0.0 {
        camera.zoom(scroll, modifiers.ctrl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_platform::Modifiers;

    fn dragged(button: MouseButton, modifiers: Modifiers) -> InputState {
        let mut input = InputState::new();
        input.on_modifiers_changed(modifiers);
        input.on_mouse_pressed(button);
        input.on_mouse_moved(100.0, 100.0);
        input.on_mouse_moved(120.0, 90.0);
        input
    }

    #[test]
    fn test_left_drag_orbits() {
        let mut camera = OrbitCamera::default();
        let before = camera.clone();
        apply_camera_input(&dragged(MouseButton::Left, Modifiers::default()), &mut camera);
        assert_ne!(camera.yaw, before.yaw);
        assert_eq!(camera.target, before.target);
    }

    #[test]
    fn test_shift_drag_pans() {
        let mut camera = OrbitCamera::default();
        let before = camera.clone();
        let shift = Modifiers {
            shift: true,
            ..Default::default()
        };
        apply_camera_input(&dragged(MouseButton::Left, shift), &mut camera);
        assert_ne!(camera.target, before.target);
        assert_eq!(camera.yaw, before.yaw);
    }

    #[test]
    fn test_middle_drag_pans() {
        let mut camera = OrbitCamera::default();
        let before = camera.clone();
        apply_camera_input(&dragged(MouseButton::Middle, Modifiers::default()), &mut camera);
        assert_ne!(camera.target, before.target);
    }

    #[test]
    fn test_ctrl_scroll_zooms_faster() {
        let mut slow = OrbitCamera::default();
        let mut fast = OrbitCamera::default();
        let start = slow.distance;

        let mut input = InputState::new();
        input.on_scroll(0.0, 1.0);
        apply_camera_input(&input, &mut slow);

        input.on_modifiers_changed(Modifiers {
            ctrl: true,
            ..Default::default()
        });
        apply_camera_input(&input, &mut fast);

        assert!((start - fast.distance).abs() > (start - slow.distance).abs());
    }

    #[test]
    fn test_key_bindings() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        input.on_key_pressed(KeyCode::Escape);
        let actions: Vec<Action> = pressed_actions(&input).collect();
        assert_eq!(actions, vec![Action::TogglePause, Action::Exit]);

        input.begin_frame();
        assert_eq!(pressed_actions(&input).count(), 0);
    }
}
