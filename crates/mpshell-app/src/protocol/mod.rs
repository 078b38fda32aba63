pub mod client;
pub mod server;
pub mod wire;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::renderer::{RenderSink, VideoRenderer};

/// Owns the protocol accept thread and its shutdown flag.
pub struct VoServer {
    shutdown: Option<Arc<AtomicBool>>,
    accept_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl VoServer {
    pub fn new() -> Self {
        Self {
            shutdown: None,
            accept_handle: None,
            local_addr: None,
        }
    }

    /// Bind `addr` and start serving requests into `renderer`.
    pub fn start<S>(
        &mut self,
        addr: &str,
        renderer: Arc<Mutex<VideoRenderer<S>>>,
    ) -> anyhow::Result<SocketAddr>
    where
        S: RenderSink + Send + 'static,
    {
        self.stop();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (local_addr, handle) = server::spawn_accept_loop(addr, renderer, shutdown.clone())?;
        self.shutdown = Some(shutdown);
        self.accept_handle = Some(handle);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Stop accepting and drop any connected decoder. Blocks until the thread exits.
    pub fn stop(&mut self) {
        if let Some(ref shutdown) = self.shutdown {
            shutdown.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        self.shutdown = None;
        self.local_addr = None;
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| !s.load(Ordering::Relaxed))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Default for VoServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VoServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::path::PathBuf;

    use super::client::VoClient;
    use super::*;
    use crate::frame::FrameExchange;
    use crate::renderer::tests::{RecordingSink, SinkEvent};
    use crate::renderer::types::{DisplaySize, RendererLimits};

    struct Harness {
        _dir: tempfile::TempDir,
        segment: PathBuf,
        sink: RecordingSink,
        exchange: Arc<FrameExchange>,
        renderer: Arc<Mutex<VideoRenderer<RecordingSink>>>,
        server: VoServer,
        addr: SocketAddr,
    }

    fn harness(segment_len: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let segment = dir.path().join("vo");
        std::fs::write(&segment, vec![0u8; segment_len]).unwrap();
        let sink = RecordingSink::default();
        let exchange = Arc::new(FrameExchange::new());
        let renderer = Arc::new(Mutex::new(VideoRenderer::new(
            sink.clone(),
            exchange.clone(),
            segment.clone(),
            RendererLimits::default(),
        )));
        let mut server = VoServer::new();
        let addr = server.start("127.0.0.1:0", renderer.clone()).unwrap();
        Harness {
            _dir: dir,
            segment,
            sink,
            exchange,
            renderer,
            server,
            addr,
        }
    }

    #[test]
    fn full_session_over_loopback() {
        let h = harness(8 * 8 * 4);
        let mut client = VoClient::connect(h.addr).unwrap();

        assert_eq!(client.start(8, 8, 4, 100).unwrap(), 0);
        std::fs::write(&h.segment, [200u8; 8 * 8 * 4]).unwrap();
        client.render().unwrap();

        let frame = h.exchange.take_latest().expect("rendered frame");
        assert_eq!(&frame.pixels[..4], &[200, 200, 200, 255]);

        client.toggle_fullscreen().unwrap();
        client.ontop().unwrap();
        client.stop().unwrap();

        assert_eq!(
            h.sink.events(),
            vec![
                SinkEvent::Start(DisplaySize::new(8, 8)),
                SinkEvent::FrameReady,
                SinkEvent::Fullscreen,
                SinkEvent::OnTop,
                SinkEvent::Stop,
            ]
        );
    }

    #[test]
    fn rejected_start_reports_status() {
        let h = harness(16);
        let mut client = VoClient::connect(h.addr).unwrap();
        assert_eq!(client.start(0, 10, 4, 100).unwrap(), 1);
        assert_eq!(client.start(2, 2, 7, 100).unwrap(), 2);
        assert_eq!(client.start(2, 2, 4, 0).unwrap(), 3);
        assert!(h.sink.events().is_empty());
    }

    #[test]
    fn unknown_opcode_keeps_connection_open() {
        let h = harness(2 * 2 * 4);
        let mut stream = TcpStream::connect(h.addr).unwrap();
        let mut frame = [0u8; wire::REQUEST_LEN];
        frame[0] = 99;
        stream.write_all(&frame).unwrap();
        let mut reply = [0u8; wire::REPLY_LEN];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(wire::decode_reply(reply), crate::error::STATUS_MALFORMED);

        stream
            .write_all(&wire::Request::Start {
                width: 2,
                height: 2,
                bytes: 4,
                aspect: 100,
            }
            .encode())
            .unwrap();
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(wire::decode_reply(reply), 0);
    }

    #[test]
    fn split_writes_are_reassembled() {
        let h = harness(4 * 4 * 4);
        let mut stream = TcpStream::connect(h.addr).unwrap();
        let frame = wire::Request::Start {
            width: 4,
            height: 4,
            bytes: 4,
            aspect: 100,
        }
        .encode();
        stream.write_all(&frame[..7]).unwrap();
        stream.flush().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        stream.write_all(&frame[7..]).unwrap();

        let mut reply = [0u8; wire::REPLY_LEN];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(wire::decode_reply(reply), 0);
    }

    #[test]
    fn disconnect_keeps_session_until_stop() {
        let h = harness(4 * 4 * 4);
        {
            let mut client = VoClient::connect(h.addr).unwrap();
            assert_eq!(client.start(4, 4, 4, 100).unwrap(), 0);
        }
        // a later decoder can still drive the same renderer
        let mut client = VoClient::connect(h.addr).unwrap();
        client.stop().unwrap();
        assert!(!h.renderer.lock().unwrap().is_active());
    }

    #[test]
    fn stop_joins_accept_thread() {
        let mut h = harness(4);
        assert!(h.server.is_running());
        assert_eq!(h.server.local_addr(), Some(h.addr));
        h.server.stop();
        assert!(!h.server.is_running());
        assert!(h.server.local_addr().is_none());
    }
}
