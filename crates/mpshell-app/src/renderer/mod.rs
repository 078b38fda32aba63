pub mod shared;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StartError;
use crate::frame::{FrameExchange, convert};
use shared::SharedBuffer;
use types::{DisplaySize, FrameDescriptor, RendererLimits};

/// Receives the renderer's session and readiness events.
///
/// Calls arrive on the protocol thread; implementations must hand off without blocking.
pub trait RenderSink {
    /// A session began. Only frames tagged with `generation` belong to it.
    fn start_rendering(&mut self, size: DisplaySize, generation: u64);
    fn stop_rendering(&mut self);
    fn toggle_fullscreen(&mut self);
    fn toggle_float_on_top(&mut self);
    /// A new frame is waiting in the exchange.
    fn frame_ready(&mut self) {}
}

struct Session {
    generation: u64,
    descriptor: FrameDescriptor,
    display: DisplaySize,
    segment: SharedBuffer,
}

/// Server side of the frame-delivery protocol.
pub struct VideoRenderer<S: RenderSink> {
    sink: S,
    exchange: Arc<FrameExchange>,
    segment_path: PathBuf,
    limits: RendererLimits,
    session: Option<Session>,
}

impl<S: RenderSink> VideoRenderer<S> {
    pub fn new(
        sink: S,
        exchange: Arc<FrameExchange>,
        segment_path: PathBuf,
        limits: RendererLimits,
    ) -> Self {
        Self {
            sink,
            exchange,
            segment_path,
            limits,
            session: None,
        }
    }

    /// Begin (or replace) a session. The previous session survives any failure.
    pub fn start(
        &mut self,
        width: i32,
        height: i32,
        bytes: i32,
        aspect: i32,
    ) -> Result<DisplaySize, StartError> {
        let descriptor = FrameDescriptor::validate(width, height, bytes, aspect, &self.limits)?;
        let segment = SharedBuffer::open(&self.segment_path, descriptor.segment_len())?;
        let generation = self.exchange.begin_session(descriptor)?;
        let display = descriptor.display_size(self.limits.aspect.mode);

        if let Some(old) = self.session.take() {
            log::info!(
                "Replacing {}x{} session with {}x{}",
                old.descriptor.width,
                old.descriptor.height,
                descriptor.width,
                descriptor.height
            );
        }
        log::info!(
            "Video session started: {}x{} {:?} (aspect {:.3}), display {display}, segment {}",
            descriptor.width,
            descriptor.height,
            descriptor.format,
            descriptor.aspect,
            segment.path().display()
        );

        self.session = Some(Session {
            generation,
            descriptor,
            display,
            segment,
        });
        self.sink.start_rendering(display, generation);
        Ok(display)
    }

    /// Wire form of [`start`](Self::start): 0 on success, a nonzero status otherwise.
    pub fn start_status(&mut self, width: i32, height: i32, bytes: i32, aspect: i32) -> i32 {
        match self.start(width, height, bytes, aspect) {
            Ok(_) => crate::error::STATUS_OK,
            Err(e) => {
                log::warn!("Rejected start {width}x{height} bytes={bytes} aspect={aspect}: {e}");
                e.status()
            }
        }
    }

    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.exchange.end_session();
        let stats = self.exchange.stats();
        log::info!(
            "Video session stopped ({}x{}, display {}); {} frames published, {} dropped",
            session.descriptor.width,
            session.descriptor.height,
            session.display,
            stats.published,
            stats.dropped
        );
        self.sink.stop_rendering();
    }

    /// Copy the segment's current frame into the exchange and ring the doorbell.
    pub fn render(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let src = session.segment.frame();
        let format = session.descriptor.format;
        if self
            .exchange
            .publish(session.generation, |dst| convert::to_rgba(format, src, dst))
        {
            self.sink.frame_ready();
        }
    }

    pub fn toggle_fullscreen(&mut self) {
        if self.session.is_some() {
            self.sink.toggle_fullscreen();
        }
    }

    pub fn ontop(&mut self) {
        if self.session.is_some() {
            self.sink.toggle_float_on_top();
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[cfg(test)]
    pub fn display_size(&self) -> Option<DisplaySize> {
        self.session.as_ref().map(|s| s.display)
    }

    #[cfg(test)]
    pub fn descriptor(&self) -> Option<FrameDescriptor> {
        self.session.as_ref().map(|s| s.descriptor)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkEvent {
        Start(DisplaySize),
        Stop,
        Fullscreen,
        OnTop,
        FrameReady,
    }

    #[derive(Clone, Default)]
    pub struct RecordingSink(pub Arc<Mutex<Vec<SinkEvent>>>);

    impl RecordingSink {
        pub fn events(&self) -> Vec<SinkEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    impl RenderSink for RecordingSink {
        fn start_rendering(&mut self, size: DisplaySize, _generation: u64) {
            self.0.lock().unwrap().push(SinkEvent::Start(size));
        }
        fn stop_rendering(&mut self) {
            self.0.lock().unwrap().push(SinkEvent::Stop);
        }
        fn toggle_fullscreen(&mut self) {
            self.0.lock().unwrap().push(SinkEvent::Fullscreen);
        }
        fn toggle_float_on_top(&mut self) {
            self.0.lock().unwrap().push(SinkEvent::OnTop);
        }
        fn frame_ready(&mut self) {
            self.0.lock().unwrap().push(SinkEvent::FrameReady);
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        sink: RecordingSink,
        exchange: Arc<FrameExchange>,
        renderer: VideoRenderer<RecordingSink>,
    }

    fn fixture(segment_len: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment");
        std::fs::write(&path, vec![0u8; segment_len]).unwrap();
        let sink = RecordingSink::default();
        let exchange = Arc::new(FrameExchange::new());
        let renderer = VideoRenderer::new(
            sink.clone(),
            exchange.clone(),
            path.clone(),
            RendererLimits::default(),
        );
        Fixture {
            _dir: dir,
            path,
            sink,
            exchange,
            renderer,
        }
    }

    /// Overwrite the segment the way the decoder would, then ring `render`.
    fn write_bgra(f: &mut Fixture, value: u8) {
        let len = std::fs::metadata(&f.path).unwrap().len() as usize;
        std::fs::write(&f.path, vec![value; len]).unwrap();
        f.renderer.render();
    }

    #[test]
    fn hd_session_scenario() {
        let mut f = fixture(1920 * 1080 * 4);

        assert_eq!(f.renderer.start_status(1920, 1080, 4, 100), 0);
        assert_eq!(f.renderer.display_size(), Some(DisplaySize::new(1920, 1080)));
        assert_eq!(
            f.sink.events(),
            vec![SinkEvent::Start(DisplaySize::new(1920, 1080))]
        );

        for value in [10, 20, 30] {
            write_bgra(&mut f, value);
        }
        let frame = f.exchange.take_latest().expect("one frame");
        // BGRA 30,30,30,30 → RGBA 30,30,30,255
        assert_eq!(&frame.pixels[..4], &[30, 30, 30, 255]);
        assert!(f.exchange.take_latest().is_none());
        f.exchange.recycle(frame);

        f.renderer.stop();
        assert_eq!(f.sink.events().last(), Some(&SinkEvent::Stop));
        assert!(!f.renderer.is_active());
        assert!(f.exchange.descriptor().is_none());
    }

    #[test]
    fn start_then_stop_restores_idle_state() {
        let mut f = fixture(64 * 64 * 4);
        f.renderer.start(64, 64, 4, 100).unwrap();
        f.renderer.stop();

        assert!(!f.renderer.is_active());
        assert!(f.renderer.descriptor().is_none());
        assert!(f.exchange.descriptor().is_none());
        assert!(!f.exchange.has_pending());

        // stopping again stays quiet
        let before = f.sink.events().len();
        f.renderer.stop();
        assert_eq!(f.sink.events().len(), before);
    }

    #[test]
    fn stop_without_start_is_silent() {
        let mut f = fixture(16);
        f.renderer.stop();
        f.renderer.render();
        f.renderer.toggle_fullscreen();
        f.renderer.ontop();
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn bad_geometry_keeps_existing_session() {
        let mut f = fixture(320 * 240 * 4);
        f.renderer.start(320, 240, 4, 100).unwrap();
        let generation = f.exchange.generation();

        for (w, h) in [(0, 240), (320, 0), (-1, 240), (320, -240)] {
            assert_eq!(f.renderer.start_status(w, h, 4, 100), 1);
        }
        assert_eq!(f.renderer.start_status(320, 240, 5, 100), 2);

        assert_eq!(f.exchange.generation(), generation);
        assert_eq!(f.renderer.display_size(), Some(DisplaySize::new(320, 240)));
        assert_eq!(f.sink.events().len(), 1);

        // the old session still renders
        write_bgra(&mut f, 1);
        assert!(f.exchange.take_latest().is_some());
    }

    #[test]
    fn first_start_failure_leaves_renderer_stopped() {
        let mut f = fixture(16);
        assert_eq!(f.renderer.start_status(0, 0, 4, 100), 1);
        assert!(!f.renderer.is_active());
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn undersized_segment_is_an_allocation_failure() {
        let mut f = fixture(100);
        assert_eq!(f.renderer.start_status(64, 64, 4, 100), 4);
        assert!(!f.renderer.is_active());
        assert!(f.exchange.descriptor().is_none());
    }

    #[test]
    fn restart_replaces_geometry() {
        let mut f = fixture(640 * 480 * 4);
        f.renderer.start(320, 240, 4, 100).unwrap();
        write_bgra(&mut f, 3);

        f.renderer.start(640, 480, 4, 100).unwrap();
        // the pending 320x240 frame must not surface with the new geometry
        assert!(f.exchange.take_latest().is_none());

        write_bgra(&mut f, 4);
        let frame = f.exchange.take_latest().unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(
            f.sink.events()
                .into_iter()
                .filter(|e| matches!(e, SinkEvent::Start(_)))
                .count(),
            2
        );
    }

    #[test]
    fn toggles_forward_during_session() {
        let mut f = fixture(4 * 4 * 3);
        f.renderer.start(4, 4, 3, 100).unwrap();
        f.renderer.toggle_fullscreen();
        f.renderer.ontop();
        assert_eq!(
            f.sink.events()[1..],
            [SinkEvent::Fullscreen, SinkEvent::OnTop]
        );
    }

    #[test]
    fn render_rings_doorbell_per_frame() {
        let mut f = fixture(2 * 2 * 2);
        f.renderer.start(2, 2, 2, 100).unwrap();
        write_bgra(&mut f, 128);
        write_bgra(&mut f, 128);
        let rings = f
            .sink
            .events()
            .into_iter()
            .filter(|e| *e == SinkEvent::FrameReady)
            .count();
        assert_eq!(rings, 2);
    }
}
