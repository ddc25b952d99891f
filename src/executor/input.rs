// Physical input synthesis. The executor only talks to `InputBackend`;
// `EnigoInput` is the OS implementation.
use std::fmt;
use std::str::FromStr;

use enigo::{Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use thiserror::Error;

use crate::errors::{PilotError, PilotResult};
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Press,
    Release,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Escape,
    Enter,
    Tab,
    Space,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Shift,
    Control,
    Alt,
    F(u8),
}

#[derive(Debug, Error)]
#[error("unknown key name '{0}'")]
pub struct UnknownKey(pub String);

impl FromStr for KeyCode {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let mut chars = lower.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(KeyCode::Char(c));
        }
        let key = match lower.as_str() {
            "esc" | "escape" => KeyCode::Escape,
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "space" => KeyCode::Space,
            "backspace" => KeyCode::Backspace,
            "delete" | "del" => KeyCode::Delete,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            "pageup" => KeyCode::PageUp,
            "pagedown" => KeyCode::PageDown,
            "shift" => KeyCode::Shift,
            "ctrl" | "control" => KeyCode::Control,
            "alt" => KeyCode::Alt,
            f if f.starts_with('f') => match f[1..].parse::<u8>() {
                Ok(n @ 1..=12) => KeyCode::F(n),
                _ => return Err(UnknownKey(s.to_string())),
            },
            _ => return Err(UnknownKey(s.to_string())),
        };
        Ok(key)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCode::Char(c) => write!(f, "{c}"),
            KeyCode::F(n) => write!(f, "f{n}"),
            other => write!(f, "{}", format!("{other:?}").to_ascii_lowercase()),
        }
    }
}

/// Synchronous OS input. Every failure is returned to the caller.
pub trait InputBackend: Send {
    fn move_to(&mut self, point: Point) -> PilotResult<()>;
    fn button(&mut self, button: MouseButton, action: ButtonAction) -> PilotResult<()>;
    fn key(&mut self, key: KeyCode, action: ButtonAction) -> PilotResult<()>;
}

pub struct EnigoInput {
    enigo: Enigo,
}

impl EnigoInput {
    pub fn new() -> PilotResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| PilotError::Input(format!("enigo init: {e}")))?;
        Ok(Self { enigo })
    }
}

fn direction(action: ButtonAction) -> Direction {
    match action {
        ButtonAction::Press => Direction::Press,
        ButtonAction::Release => Direction::Release,
        ButtonAction::Click => Direction::Click,
    }
}

fn enigo_key(key: KeyCode) -> enigo::Key {
    use enigo::Key;
    match key {
        KeyCode::Char(c) => Key::Unicode(c),
        KeyCode::Escape => Key::Escape,
        KeyCode::Enter => Key::Return,
        KeyCode::Tab => Key::Tab,
        KeyCode::Space => Key::Space,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Left => Key::LeftArrow,
        KeyCode::Right => Key::RightArrow,
        KeyCode::Up => Key::UpArrow,
        KeyCode::Down => Key::DownArrow,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Shift => Key::Shift,
        KeyCode::Control => Key::Control,
        KeyCode::Alt => Key::Alt,
        KeyCode::F(1) => Key::F1,
        KeyCode::F(2) => Key::F2,
        KeyCode::F(3) => Key::F3,
        KeyCode::F(4) => Key::F4,
        KeyCode::F(5) => Key::F5,
        KeyCode::F(6) => Key::F6,
        KeyCode::F(7) => Key::F7,
        KeyCode::F(8) => Key::F8,
        KeyCode::F(9) => Key::F9,
        KeyCode::F(10) => Key::F10,
        KeyCode::F(11) => Key::F11,
        KeyCode::F(_) => Key::F12,
    }
}

impl InputBackend for EnigoInput {
    fn move_to(&mut self, point: Point) -> PilotResult<()> {
        self.enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(|e| PilotError::Input(format!("move to ({}, {}): {e}", point.x, point.y)))
    }

    fn button(&mut self, button: MouseButton, action: ButtonAction) -> PilotResult<()> {
        let b = match button {
            MouseButton::Left => enigo::Button::Left,
            MouseButton::Right => enigo::Button::Right,
        };
        self.enigo
            .button(b, direction(action))
            .map_err(|e| PilotError::Input(format!("{button:?} {action:?}: {e}")))
    }

    fn key(&mut self, key: KeyCode, action: ButtonAction) -> PilotResult<()> {
        self.enigo
            .key(enigo_key(key), direction(action))
            .map_err(|e| PilotError::Input(format!("key {key} {action:?}: {e}")))
    }
}
