//! Keyboard and mouse state polled by scripts.
//!
//! The window layer feeds events in; scripts read a level (`is_down`) or an edge
//! (`was_pressed`) that lasts until [`InputState::end_frame`].

use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

impl KeyCode {
    /// Parses the key names scripts use, such as `"Space"`, `"w"`, `"7"` or `"F5"`.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = NamedKey::from_name(name) {
            return Some(Self::Named(key));
        }
        let mut chars = name.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if ch.is_ascii_alphabetic() {
                return Some(Self::Character(ch.to_ascii_uppercase()));
            }
            if let Some(digit) = ch.to_digit(10) {
                return Some(Self::Digit(digit as u8));
            }
            return None;
        }
        let index = name
            .strip_prefix(['F', 'f'])
            .and_then(|rest| rest.parse::<u8>().ok())?;
        (1..=25).contains(&index).then_some(Self::Function(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Backspace,
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
}

impl NamedKey {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Space" => Self::Space,
            "Enter" | "Return" => Self::Enter,
            "Tab" => Self::Tab,
            "Left" => Self::Left,
            "Right" => Self::Right,
            "Up" => Self::Up,
            "Down" => Self::Down,
            "Escape" | "Esc" => Self::Escape,
            "Backspace" => Self::Backspace,
            "LeftShift" | "LShift" => Self::LeftShift,
            "RightShift" | "RShift" => Self::RightShift,
            "LeftCtrl" | "LControl" => Self::LeftCtrl,
            "RightCtrl" | "RControl" => Self::RightCtrl,
            "LeftAlt" | "LAlt" => Self::LeftAlt,
            "RightAlt" | "RAlt" => Self::RightAlt,
            _ => return None,
        })
    }
}

/// Mouse button index; the left button is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Input {
    Key(KeyCode),
    Mouse(MouseButton),
}

impl Input {
    /// `"Mouse"` and `"Mouse1"` are the left button, `"Mouse2"` the right one.
    fn from_name(name: &str) -> Option<Self> {
        let prefix = name.get(..5).filter(|p| p.eq_ignore_ascii_case("mouse"));
        if prefix.is_some() {
            let suffix = &name[5..];
            if suffix.is_empty() {
                return Some(Self::Mouse(MouseButton::LEFT));
            }
            let index = suffix.parse::<u8>().ok()?;
            return Some(Self::Mouse(MouseButton::new(index.saturating_sub(1))));
        }
        KeyCode::from_name(name).map(Self::Key)
    }
}

#[derive(Debug, Default)]
struct Frame {
    down: HashSet<Input>,
    pressed: HashSet<Input>,
    released: HashSet<Input>,
    mouse_position: Vec2,
    mouse_delta: Vec2,
}

/// Input snapshot shared between the window layer and script hosts.
#[derive(Debug, Default)]
pub struct InputState {
    frame: RwLock<Frame>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    fn press(&self, input: Input) {
        let mut frame = self.frame.write();
        if frame.down.insert(input) {
            frame.pressed.insert(input);
        }
    }

    fn release(&self, input: Input) {
        let mut frame = self.frame.write();
        if frame.down.remove(&input) {
            frame.released.insert(input);
        }
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.press(Input::Key(key));
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.release(Input::Key(key));
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.press(Input::Mouse(button));
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.release(Input::Mouse(button));
    }

    pub fn set_mouse_position(&self, position: Vec2) {
        let mut frame = self.frame.write();
        let delta = position - frame.mouse_position;
        frame.mouse_delta += delta;
        frame.mouse_position = position;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.frame.read().down.contains(&Input::Key(key))
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.frame.read().down.contains(&Input::Mouse(button))
    }

    /// Level query by script name. Unknown names are never down.
    pub fn is_down(&self, name: &str) -> bool {
        Input::from_name(name).is_some_and(|input| self.frame.read().down.contains(&input))
    }

    /// True only during the frame the key or button went down.
    pub fn was_pressed(&self, name: &str) -> bool {
        Input::from_name(name).is_some_and(|input| self.frame.read().pressed.contains(&input))
    }

    pub fn was_released(&self, name: &str) -> bool {
        Input::from_name(name).is_some_and(|input| self.frame.read().released.contains(&input))
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.frame.read().mouse_position
    }

    /// Movement accumulated since the last [`InputState::end_frame`].
    pub fn mouse_delta(&self) -> Vec2 {
        self.frame.read().mouse_delta
    }

    /// Clears the per-frame edges. Held keys stay down.
    pub fn end_frame(&self) {
        let mut frame = self.frame.write();
        frame.pressed.clear();
        frame.released.clear();
        frame.mouse_delta = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Space"),
            Some(KeyCode::Named(NamedKey::Space))
        );
        assert_eq!(KeyCode::from_name("a"), Some(KeyCode::Character('A')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("F12"), Some(KeyCode::Function(12)));
        assert_eq!(KeyCode::from_name("F30"), None);
        assert_eq!(KeyCode::from_name("?"), None);
    }

    #[test]
    fn mouse_names_map_to_button_indices() {
        assert_eq!(
            Input::from_name("Mouse"),
            Some(Input::Mouse(MouseButton::LEFT))
        );
        assert_eq!(
            Input::from_name("mouse3"),
            Some(Input::Mouse(MouseButton::MIDDLE))
        );
    }

    #[test]
    fn pressed_edge_lasts_one_frame() {
        let state = InputState::new();
        state.set_key_down(KeyCode::Named(NamedKey::Space));
        assert!(state.is_down("Space"));
        assert!(state.was_pressed("Space"));

        state.end_frame();
        assert!(state.is_down("Space"));
        assert!(!state.was_pressed("Space"));

        // Key repeat does not produce a second edge.
        state.set_key_down(KeyCode::Named(NamedKey::Space));
        assert!(!state.was_pressed("Space"));

        state.set_key_up(KeyCode::Named(NamedKey::Space));
        assert!(!state.is_down("Space"));
        assert!(state.was_released("Space"));
    }

    #[test]
    fn mouse_delta_accumulates_until_end_of_frame() {
        let state = InputState::new();
        state.set_mouse_position(Vec2::new(10.0, 0.0));
        state.set_mouse_position(Vec2::new(15.0, 5.0));
        assert_eq!(state.mouse_delta(), Vec2::new(15.0, 5.0));
        state.end_frame();
        assert_eq!(state.mouse_delta(), Vec2::ZERO);
        assert_eq!(state.mouse_position(), Vec2::new(15.0, 5.0));
    }
}
