use winit::keyboard::{KeyCode, ModifiersState};

use super::Command;
use super::state::{ViewScale, WindowMode};

/// What a key press asks the presentation layer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Command(Command),
    ToggleFullscreen,
    ToggleFloatOnTop,
    Scale(ViewScale),
}

pub fn map_key(key: KeyCode, modifiers: ModifiersState, mode: WindowMode) -> Option<KeyAction> {
    if modifiers.control_key() || modifiers.super_key() {
        return match key {
            KeyCode::Digit0 => Some(KeyAction::Scale(ViewScale::Half)),
            KeyCode::Digit1 => Some(KeyAction::Scale(ViewScale::Actual)),
            KeyCode::Digit2 => Some(KeyAction::Scale(ViewScale::Double)),
            _ => None,
        };
    }

    let command = match key {
        KeyCode::Escape if mode == WindowMode::Fullscreen => {
            return Some(KeyAction::ToggleFullscreen);
        }
        KeyCode::KeyF => return Some(KeyAction::ToggleFullscreen),
        KeyCode::KeyT => return Some(KeyAction::ToggleFloatOnTop),
        KeyCode::Space | KeyCode::KeyP => "pause",
        KeyCode::ArrowLeft => "seek -10",
        KeyCode::ArrowRight => "seek 10",
        KeyCode::ArrowDown => "seek -60",
        KeyCode::ArrowUp => "seek 60",
        KeyCode::PageDown => "seek -600",
        KeyCode::PageUp => "seek 600",
        KeyCode::KeyM => "mute",
        KeyCode::Digit9 => "volume -1",
        KeyCode::Digit0 => "volume 1",
        KeyCode::KeyO => "osd",
        KeyCode::KeyQ | KeyCode::Escape => "quit",
        _ => return None,
    };
    Some(KeyAction::Command(Command::new(command)))
}
