pub mod keymap;
pub mod state;
pub mod window;

use std::fmt;

use crossbeam_channel::{Sender, TrySendError};
use winit::keyboard::{KeyCode, ModifiersState};

use crate::renderer::types::DisplaySize;
use keymap::KeyAction;
use state::{PresentationState, ViewScale, WindowMode, fit_size};
use window::WindowSurface;

/// Opaque instruction for the player. The shell never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn quit() -> Self {
        Self::new("quit")
    }

    pub fn is_quit(&self) -> bool {
        self.0 == "quit"
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receives user-originated commands.
pub trait CommandSink {
    fn send_command(&mut self, command: Command);
}

impl CommandSink for Sender<Command> {
    fn send_command(&mut self, command: Command) {
        match self.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                log::warn!("Command queue full, dropping '{command}'");
            }
            Err(TrySendError::Disconnected(command)) => {
                log::warn!("Command queue closed, dropping '{command}'");
            }
        }
    }
}

/// Launch preferences applied when the first stream starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchPrefs {
    pub fullscreen: bool,
    pub float_on_top: bool,
}

/// Owns window state and reacts to renderer lifecycle and user input.
pub struct PresentationController<W: WindowSurface, C: CommandSink> {
    window: W,
    commands: C,
    state: PresentationState,
    prefs: Option<LaunchPrefs>,
}

impl<W: WindowSurface, C: CommandSink> PresentationController<W, C> {
    pub fn new(window: W, commands: C, prefs: LaunchPrefs) -> Self {
        Self {
            window,
            commands,
            state: PresentationState::default(),
            prefs: Some(prefs),
        }
    }

    pub fn start_rendering_with_display_size(&mut self, size: DisplaySize) {
        if self.state.closed {
            return;
        }
        self.state.display = Some(size);
        let target = self.target_content_size(size);
        match self.state.mode {
            WindowMode::Windowed => self.resize_window(target),
            WindowMode::Fullscreen => self.state.windowed_size = Some(target),
        }
        log::info!("Presenting {size} in a {target} window");

        self.state.surface_visible = true;
        if !self.state.window_visible {
            self.window.set_visible(true);
            self.state.window_visible = true;
        }

        if let Some(prefs) = self.prefs.take() {
            if prefs.fullscreen && self.state.mode == WindowMode::Windowed {
                self.toggle_fullscreen();
            }
            if prefs.float_on_top && !self.state.float_on_top {
                self.toggle_float_on_top();
            }
        }
        self.window.request_redraw();
    }

    /// Clear the video area. The window stays where it is.
    pub fn stop_rendering(&mut self) {
        if self.state.closed {
            return;
        }
        self.state.surface_visible = false;
        self.window.request_redraw();
    }

    pub fn toggle_fullscreen(&mut self) {
        if self.state.closed {
            return;
        }
        match self.state.mode {
            WindowMode::Windowed => {
                // resize requests may still be in flight, so prefer what we asked for
                let size = self
                    .state
                    .content
                    .unwrap_or_else(|| self.window.content_size());
                self.state.windowed_size = Some(size);
                self.window.set_fullscreen(true);
                self.state.mode = WindowMode::Fullscreen;
            }
            WindowMode::Fullscreen => {
                self.window.set_fullscreen(false);
                self.state.mode = WindowMode::Windowed;
                if let Some(size) = self.state.windowed_size {
                    self.resize_window(size);
                }
            }
        }
        log::debug!("Window mode: {:?}", self.state.mode);
    }

    pub fn toggle_float_on_top(&mut self) {
        if self.state.closed {
            return;
        }
        self.state.float_on_top = !self.state.float_on_top;
        self.window.set_float_on_top(self.state.float_on_top);
        log::debug!("Float on top: {}", self.state.float_on_top);
    }

    pub fn set_view_scale(&mut self, scale: ViewScale) {
        if self.state.closed {
            return;
        }
        self.state.view_scale = scale;
        let Some(display) = self.state.display else {
            return;
        };
        let target = self.target_content_size(display);
        match self.state.mode {
            WindowMode::Windowed => self.resize_window(target),
            WindowMode::Fullscreen => self.state.windowed_size = Some(target),
        }
    }

    /// The window system reports a new content size. Ignored while fullscreen.
    pub fn content_resized(&mut self, size: DisplaySize) {
        if self.state.closed
            || self.state.mode == WindowMode::Fullscreen
            || size.width == 0
            || size.height == 0
        {
            return;
        }
        self.state.content = Some(size);
    }

    /// Apply the key binding for `key`, if any. Returns whether the key was bound.
    pub fn handle_key(&mut self, key: KeyCode, modifiers: ModifiersState) -> bool {
        if self.state.closed {
            return false;
        }
        let Some(action) = keymap::map_key(key, modifiers, self.state.mode) else {
            return false;
        };
        match action {
            KeyAction::Command(command) => self.commands.send_command(command),
            KeyAction::ToggleFullscreen => self.toggle_fullscreen(),
            KeyAction::ToggleFloatOnTop => self.toggle_float_on_top(),
            KeyAction::Scale(scale) => self.set_view_scale(scale),
        }
        true
    }

    /// The window is going away: tell the player to quit. Later calls do nothing.
    pub fn window_will_close(&mut self) {
        if self.state.closed {
            return;
        }
        self.commands.send_command(Command::quit());
        self.state = PresentationState {
            closed: true,
            ..PresentationState::default()
        };
    }

    #[cfg(test)]
    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    #[cfg(test)]
    pub fn display_size(&self) -> Option<DisplaySize> {
        self.state.display
    }

    #[cfg(test)]
    pub fn is_surface_visible(&self) -> bool {
        self.state.surface_visible
    }

    fn resize_window(&mut self, size: DisplaySize) {
        self.window.resize_content(size);
        self.state.content = Some(size);
    }

    fn target_content_size(&self, display: DisplaySize) -> DisplaySize {
        let scaled = self.state.view_scale.apply(display);
        match self.window.screen_size() {
            Some(screen) => fit_size(scaled, screen),
            None => scaled,
        }
    }
}
