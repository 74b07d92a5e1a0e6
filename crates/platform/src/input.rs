//! Input handling for keyboard and mouse.
//!
//! [`InputState`] is the per-window snapshot the application reads each
//! frame. [`InputContext`] owns the states and routes winit window events to
//! the one registered for the event's window; there is no global lookup.

use std::collections::{HashMap, HashSet};

use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::{ModifiersState, PhysicalKey};
use winit::window::WindowId;

pub use winit::keyboard::KeyCode;

/// Pixels per scroll "line" for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f32 = 40.0;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Held modifier keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl From<ModifiersState> for Modifiers {
    fn from(state: ModifiersState) -> Self {
        Self {
            shift: state.shift_key(),
            ctrl: state.control_key(),
            alt: state.alt_key(),
        }
    }
}

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,

    modifiers: Modifiers,

    mouse_position: Option<(f32, f32)>,
    /// Accumulated since the last `begin_frame`
    mouse_delta: (f32, f32),
    /// Accumulated since the last `begin_frame`, in lines
    scroll_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state; call after the frame has consumed it.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = (0.0, 0.0);
        self.scroll_delta = (0.0, 0.0);
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Records the cursor position. The first position after the cursor
    /// enters produces no delta.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    pub fn on_cursor_left(&mut self) {
        self.mouse_position = None;
    }

    pub fn on_scroll(&mut self, delta_x: f32, delta_y: f32) {
        self.scroll_delta.0 += delta_x;
        self.scroll_delta.1 += delta_y;
    }

    pub fn on_modifiers_changed(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    /// Releases everything held; used when the window loses focus so keys
    /// released elsewhere do not stay stuck.
    pub fn on_focus_lost(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
        self.modifiers = Modifiers::default();
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> (f32, f32) {
        self.scroll_delta
    }

    /// Applies one window event. Returns whether it was an input event.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.on_key_pressed(code),
                        ElementState::Released => self.on_key_released(code),
                    }
                }
                true
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.on_modifiers_changed(modifiers.state().into());
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => self.on_mouse_pressed((*button).into()),
                    ElementState::Released => self.on_mouse_released((*button).into()),
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.on_mouse_moved(position.x as f32, position.y as f32);
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.on_cursor_left();
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                match delta {
                    MouseScrollDelta::LineDelta(x, y) => self.on_scroll(*x, *y),
                    MouseScrollDelta::PixelDelta(pos) => self.on_scroll(
                        pos.x as f32 / PIXELS_PER_LINE,
                        pos.y as f32 / PIXELS_PER_LINE,
                    ),
                }
                true
            }
            WindowEvent::Focused(false) => {
                self.on_focus_lost();
                true
            }
            _ => false,
        }
    }
}

/// Input states keyed by the window they were registered for.
#[derive(Debug, Default)]
pub struct InputContext {
    windows: HashMap<WindowId, InputState>,
}

impl InputContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking input for `window`. Re-registering keeps the
    /// existing state.
    pub fn register(&mut self, window: WindowId) {
        self.windows.entry(window).or_default();
    }

    pub fn unregister(&mut self, window: WindowId) -> Option<InputState> {
        self.windows.remove(&window)
    }

    /// Routes `event` to the state registered for `window`.
    ///
    /// Returns `false` when the window is not registered or the event is not
    /// an input event.
    pub fn handle_window_event(&mut self, window: WindowId, event: &WindowEvent) -> bool {
        self.windows
            .get_mut(&window)
            .is_some_and(|state| state.handle_event(event))
    }

    pub fn state_mut(&mut self, window: WindowId) -> Option<&mut InputState> {
        self.windows.get_mut(&window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_edges_last_one_frame() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_just_pressed(KeyCode::Space));

        // Key repeat does not produce a second edge.
        input.begin_frame();
        input.on_key_pressed(KeyCode::Space);
        assert!(!input.is_key_just_pressed(KeyCode::Space));

        // A release re-arms the edge.
        input.on_key_released(KeyCode::Space);
        input.begin_frame();
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_just_pressed(KeyCode::Space));
    }

    #[test]
    fn test_mouse_delta_accumulates_within_frame() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 10.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.on_mouse_moved(15.0, 12.0);
        input.on_mouse_moved(20.0, 8.0);
        assert_eq!(input.mouse_delta(), (10.0, -2.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
        input.on_mouse_moved(21.0, 8.0);
        assert_eq!(input.mouse_delta(), (1.0, 0.0));
    }

    #[test]
    fn test_cursor_reentry_has_no_jump() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_cursor_left();
        input.on_mouse_moved(500.0, 500.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_scroll_accumulates() {
        let mut input = InputState::new();
        input.on_scroll(0.0, 1.0);
        input.on_scroll(0.0, 2.0);
        assert_eq!(input.scroll_delta(), (0.0, 3.0));
    }

    #[test]
    fn test_focus_loss_releases_everything() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyR);
        input.on_mouse_pressed(MouseButton::Left);
        input.on_modifiers_changed(Modifiers {
            shift: true,
            ..Default::default()
        });

        input.on_focus_lost();
        input.begin_frame();
        input.on_key_pressed(KeyCode::KeyR);
        assert!(input.is_key_just_pressed(KeyCode::KeyR), "key stayed held");
        assert!(!input.is_mouse_pressed(MouseButton::Left));
        assert_eq!(input.modifiers(), Modifiers::default());
    }

    #[test]
    fn test_modifiers_from_winit_state() {
        let modifiers = Modifiers::from(ModifiersState::SHIFT | ModifiersState::CONTROL);
        assert!(modifiers.shift);
        assert!(modifiers.ctrl);
        assert!(!modifiers.alt);
    }

    #[test]
    fn test_context_routes_only_registered_windows() {
        let registered = WindowId::from(1u64);
        let other = WindowId::from(2u64);

        let mut context = InputContext::new();
        context.register(registered);

        let event = WindowEvent::Focused(false);
        assert!(context.handle_window_event(registered, &event));
        assert!(!context.handle_window_event(other, &event));
        assert!(context.state_mut(other).is_none());

        let modifiers = WindowEvent::ModifiersChanged(ModifiersState::ALT.into());
        assert!(context.handle_window_event(registered, &modifiers));
        assert!(context.state_mut(registered).is_some_and(|s| s.modifiers().alt));
    }

    #[test]
    fn test_non_input_events_are_ignored() {
        let id = WindowId::from(7u64);
        let mut context = InputContext::new();
        context.register(id);
        assert!(!context.handle_window_event(id, &WindowEvent::RedrawRequested));
    }

    #[test]
    fn test_reregister_keeps_state() {
        let id = WindowId::from(3u64);
        let mut context = InputContext::new();
        context.register(id);
        if let Some(state) = context.state_mut(id) {
            state.on_key_pressed(KeyCode::Escape);
        }
        context.register(id);
        assert!(
            context
                .state_mut(id)
                .is_some_and(|s| s.is_key_just_pressed(KeyCode::Escape))
        );
        assert!(context.unregister(id).is_some());
        assert!(context.state_mut(id).is_none());
    }
}
