use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event_loop::EventLoopProxy;
use winit::keyboard::{KeyCode, ModifiersState};
use winit::window::Window;

use crate::backend::PlayerBackend;
use crate::config::ShellConfig;
use crate::frame::FrameExchange;
use crate::gpu::{GpuContext, VideoLayer};
use crate::presentation::{Command, LaunchPrefs, PresentationController};
use crate::protocol::VoServer;
use crate::renderer::types::DisplaySize;
use crate::renderer::{RenderSink, VideoRenderer};
use crate::test_pattern::TestPattern;

const PLAYER_QUIT_GRACE: Duration = Duration::from_secs(2);

/// Renderer notifications delivered to the event loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShellEvent {
    StartRendering { size: DisplaySize, generation: u64 },
    StopRendering,
    ToggleFullscreen,
    ToggleFloatOnTop,
    FrameReady,
}

/// Coalesces frame notifications to one wakeup per composite pass.
#[derive(Debug, Clone, Default)]
pub struct FrameDoorbell(Arc<AtomicBool>);

impl FrameDoorbell {
    /// Returns true when no wakeup is outstanding and the caller should post one.
    pub fn ring(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// The composite pass is running; frames after this point ring again.
    pub fn answer(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Forwards renderer callbacks from the protocol thread to the event loop.
pub struct ProxySink {
    proxy: EventLoopProxy<ShellEvent>,
    doorbell: FrameDoorbell,
}

impl ProxySink {
    fn post(&self, event: ShellEvent) {
        if self.proxy.send_event(event).is_err() {
            log::debug!("Event loop closed, dropping {event:?}");
        }
    }
}

impl RenderSink for ProxySink {
    fn start_rendering(&mut self, size: DisplaySize, generation: u64) {
        self.post(ShellEvent::StartRendering { size, generation });
    }

    fn stop_rendering(&mut self) {
        self.post(ShellEvent::StopRendering);
    }

    fn toggle_fullscreen(&mut self) {
        self.post(ShellEvent::ToggleFullscreen);
    }

    fn toggle_float_on_top(&mut self) {
        self.post(ShellEvent::ToggleFloatOnTop);
    }

    fn frame_ready(&mut self) {
        if self.doorbell.ring() {
            self.post(ShellEvent::FrameReady);
        }
    }
}

pub struct App {
    pub window: Arc<Window>,
    pub gpu: GpuContext,
    pub modifiers: ModifiersState,
    video: VideoLayer,
    exchange: Arc<FrameExchange>,
    doorbell: FrameDoorbell,
    renderer: Arc<Mutex<VideoRenderer<ProxySink>>>,
    server: VoServer,
    presentation: PresentationController<Arc<Window>, Sender<Command>>,
    commands: Receiver<Command>,
    backend: PlayerBackend,
    test_pattern: Option<TestPattern>,
    shut_down: bool,
}

impl App {
    pub fn new(
        window: Arc<Window>,
        config: &ShellConfig,
        test_pattern: Option<DisplaySize>,
        proxy: EventLoopProxy<ShellEvent>,
    ) -> Result<Self> {
        let gpu = GpuContext::new(window.clone())?;
        let (width, height) = gpu.size();
        let video = VideoLayer::new(&gpu.device, &gpu.queue, gpu.format, width, height);

        let exchange = Arc::new(FrameExchange::new());
        let doorbell = FrameDoorbell::default();
        let segment = config.segment_path()?;
        let max_texture = gpu.device.limits().max_texture_dimension_2d;
        let limits = config.limits().within_texture_limit(max_texture);
        if limits.max_dimension < config.max_dimension {
            log::info!(
                "Frame size limited to {} by the GPU (configured {})",
                limits.max_dimension,
                config.max_dimension
            );
        }
        let sink = ProxySink {
            proxy,
            doorbell: doorbell.clone(),
        };
        let renderer = Arc::new(Mutex::new(VideoRenderer::new(
            sink,
            exchange.clone(),
            segment.clone(),
            limits,
        )));

        let mut server = VoServer::new();
        let addr = server.start(&config.listen_addr, renderer.clone())?;
        log::info!("Shared frame segment: {}", segment.display());

        let (tx, rx) = crossbeam_channel::bounded(64);
        let presentation = PresentationController::new(
            window.clone(),
            tx,
            LaunchPrefs {
                fullscreen: config.fullscreen,
                float_on_top: config.float_on_top,
            },
        );

        let backend = match &config.player {
            Some(player) => PlayerBackend::spawn(player, &segment, addr)?,
            None => PlayerBackend::none(),
        };

        let test_pattern = test_pattern
            .map(|size| TestPattern::start(addr, segment.clone(), size, limits.aspect))
            .transpose()?;

        Ok(Self {
            window,
            gpu,
            modifiers: ModifiersState::empty(),
            video,
            exchange,
            doorbell,
            renderer,
            server,
            presentation,
            commands: rx,
            backend,
            test_pattern,
            shut_down: false,
        })
    }

    pub fn handle_shell_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::StartRendering { size, generation } => {
                self.video.set_display_size(&self.gpu.queue, size, generation);
                self.presentation.start_rendering_with_display_size(size);
            }
            ShellEvent::StopRendering => {
                self.video.clear(&self.gpu.queue);
                self.presentation.stop_rendering();
            }
            ShellEvent::ToggleFullscreen => self.presentation.toggle_fullscreen(),
            ShellEvent::ToggleFloatOnTop => self.presentation.toggle_float_on_top(),
            ShellEvent::FrameReady => self.window.request_redraw(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.video.resize(&self.gpu.queue, width, height);
        let logical: LogicalSize<u32> =
            PhysicalSize::new(width, height).to_logical(self.window.scale_factor());
        self.presentation
            .content_resized(DisplaySize::new(logical.width, logical.height));
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        self.presentation.handle_key(key, self.modifiers);
    }

    pub fn window_will_close(&mut self) {
        self.presentation.window_will_close();
    }

    /// Composite pass: upload the newest frame and draw it into the surface.
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.doorbell.answer();
        self.video
            .present_latest(&self.gpu.device, &self.gpu.queue, &self.exchange);

        let output = self.gpu.surface.get_current_texture()?;
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mpshell-encoder"),
            });

        self.video.draw(&mut encoder, &surface_view);

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }

    /// Forward queued commands to the player. Returns true when the shell should exit.
    pub fn pump_commands(&mut self) -> bool {
        let mut exit = false;
        for command in self.commands.try_iter() {
            // without a player, quit ends the shell itself
            if command.is_quit() && !self.backend.is_running() {
                exit = true;
            } else {
                self.backend.send(&command);
            }
        }
        exit
    }

    pub fn player_exited(&mut self) -> bool {
        self.backend.poll_exit().is_some()
    }

    /// Stop feeding, end the session, close the socket, then let the player go.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Some(mut pattern) = self.test_pattern.take() {
            pattern.stop();
        }
        self.renderer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        if let Some(addr) = self.server.local_addr() {
            log::info!("Closing video output on {addr}");
        }
        self.server.stop();
        self.backend.shutdown(PLAYER_QUIT_GRACE);

        let stats = self.exchange.stats();
        log::info!(
            "Shut down: {} frames published, {} presented, {} dropped",
            stats.published,
            stats.presented,
            stats.dropped
        );
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn doorbell_rings_once_per_composite_pass() {
        let doorbell = FrameDoorbell::default();
        assert!(doorbell.ring());
        // a burst before the redraw needs no further wakeups
        assert!(!doorbell.ring());
        assert!(!doorbell.ring());

        doorbell.answer();
        assert!(doorbell.ring());
    }

    #[test]
    fn doorbell_coalesces_across_threads() {
        let doorbell = FrameDoorbell::default();
        let rings: usize = (0..4)
            .map(|_| {
                let doorbell = doorbell.clone();
                thread::spawn(move || (0..100).filter(|_| doorbell.ring()).count())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .sum();
        assert_eq!(rings, 1);
    }
}
