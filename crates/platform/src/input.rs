//! Raw keyboard and mouse state, fed from winit events.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Buttons other than the three we track are ignored.
    pub fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Keyboard and mouse state for the current frame.
///
/// Call [`end_frame`](Self::end_frame) once per rendered frame to clear the
/// edge-triggered sets and the accumulated deltas.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    /// `None` until the first cursor event, so the first move is not a jump
    mouse_position: Option<(f32, f32)>,
    /// Accumulated since the last `end_frame`
    mouse_delta: (f32, f32),
    scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn end_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = (0.0, 0.0);
        self.scroll_delta = 0.0;
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

    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    /// Vertical scroll in lines.
    pub fn on_scroll(&mut self, lines: f32) {
        self.scroll_delta += lines;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    /// Cursor movement while `button` is held, zero otherwise.
    pub fn drag_delta(&self, button: MouseButton) -> (f32, f32) {
        if self.is_mouse_pressed(button) {
            self.mouse_delta
        } else {
            (0.0, 0.0)
        }
    }

    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_is_edge_triggered() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_just_pressed(KeyCode::Space));

        // Key repeat does not re-trigger.
        input.end_frame();
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(!input.is_key_just_pressed(KeyCode::Space));

        input.on_key_released(KeyCode::Space);
        assert!(!input.is_key_pressed(KeyCode::Space));
    }

    #[test]
    fn test_drag_delta_requires_button() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 10.0);
        input.on_mouse_moved(15.0, 12.0);
        assert_eq!(input.drag_delta(MouseButton::Left), (0.0, 0.0));

        input.on_mouse_pressed(MouseButton::Left);
        assert_eq!(input.drag_delta(MouseButton::Left), (5.0, 2.0));

        input.end_frame();
        assert_eq!(input.drag_delta(MouseButton::Left), (0.0, 0.0));
    }

    #[test]
    fn test_first_cursor_event_has_no_delta() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Left);
        input.on_mouse_moved(300.0, 200.0);
        assert_eq!(input.drag_delta(MouseButton::Left), (0.0, 0.0));
    }

    #[test]
    fn test_scroll_accumulates_until_end_frame() {
        let mut input = InputState::new();
        input.on_scroll(1.0);
        input.on_scroll(0.5);
        assert_eq!(input.scroll_delta(), 1.5);
        input.end_frame();
        assert_eq!(input.scroll_delta(), 0.0);
    }

    #[test]
    fn test_unknown_mouse_buttons_are_ignored() {
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Back),
            None
        );
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Right),
            Some(MouseButton::Right)
        );
    }
}
