mod app;
mod backend;
mod cli;
mod config;
mod error;
mod frame;
mod gpu;
mod presentation;
mod protocol;
mod renderer;
mod test_pattern;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::PhysicalKey;
use winit::window::{WindowAttributes, WindowId};

use app::{App, ShellEvent};
use cli::Cli;
use config::ShellConfig;
use renderer::types::DisplaySize;

/// How often the loop wakes without events, to reap the player and drain commands.
const IDLE_POLL: Duration = Duration::from_millis(250);

struct MpShell {
    config: ShellConfig,
    test_pattern: Option<DisplaySize>,
    proxy: EventLoopProxy<ShellEvent>,
    app: Option<App>,
}

impl ApplicationHandler<ShellEvent> for MpShell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }

        // Hidden until the first stream arrives
        let attrs = WindowAttributes::default()
            .with_title("mpshell")
            .with_inner_size(LogicalSize::new(640, 360))
            .with_visible(false);
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match App::new(window, &self.config, self.test_pattern, self.proxy.clone()) {
            Ok(app) => {
                self.app = Some(app);
                log::info!("mpshell initialized");
            }
            Err(e) => {
                log::error!("Failed to initialize: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ShellEvent) {
        if let Some(app) = self.app.as_mut() {
            app.handle_shell_event(event);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(app) = self.app.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                app.window_will_close();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                app.resize(size.width, size.height);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                app.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                app.handle_key(key);
            }
            WindowEvent::RedrawRequested => match app.render() {
                Ok(()) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    app.gpu.reconfigure();
                    app.window.request_redraw();
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    log::error!("Out of GPU memory");
                    event_loop.exit();
                }
                Err(e) => {
                    log::warn!("Surface error: {e}");
                }
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(app) = self.app.as_mut() else {
            return;
        };
        if app.pump_commands() || app.player_exited() {
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::wait_duration(IDLE_POLL));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(app) = self.app.as_mut() {
            app.shutdown();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ShellConfig::load_from(path),
        None => {
            let config = ShellConfig::load();
            // leave an editable template behind on first run
            if ShellConfig::default_path().is_some_and(|path| !path.exists()) {
                config.save();
            }
            config
        }
    };
    config.apply_cli(&cli);

    let event_loop = EventLoop::<ShellEvent>::with_user_event().build()?;
    let mut shell = MpShell {
        config,
        test_pattern: cli.test_pattern,
        proxy: event_loop.create_proxy(),
        app: None,
    };
    event_loop.run_app(&mut shell)?;

    Ok(())
}
