use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::wire::{self, REQUEST_LEN, Request};
use crate::error::{ProtocolError, STATUS_MALFORMED, STATUS_OK};
use crate::renderer::{RenderSink, VideoRenderer};

/// Spawn the accept loop thread. Returns the bound address and the thread handle.
///
/// One decoder is served at a time; a second connection waits until the first closes.
pub fn spawn_accept_loop<S>(
    addr: &str,
    renderer: Arc<Mutex<VideoRenderer<S>>>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)>
where
    S: RenderSink + Send + 'static,
{
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    log::info!("Video output protocol listening on {local_addr}");

    let handle = thread::Builder::new()
        .name("mpshell-vo-accept".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        log::info!("Decoder connected from {peer}");
                        match serve_connection(stream, &renderer, &shutdown) {
                            Ok(()) | Err(ProtocolError::Closed) => {
                                log::info!("Decoder {peer} disconnected");
                            }
                            Err(e) => log::warn!("Decoder {peer} connection error: {e}"),
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        if !shutdown.load(Ordering::Relaxed) {
                            log::error!("Video output accept error: {e}");
                        }
                        break;
                    }
                }
            }
            log::info!("Video output accept thread shutting down");
        })?;

    Ok((local_addr, handle))
}

fn serve_connection<S: RenderSink>(
    mut stream: TcpStream,
    renderer: &Mutex<VideoRenderer<S>>,
    shutdown: &AtomicBool,
) -> Result<(), ProtocolError> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    // Short timeout so the shutdown flag is checked between requests
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;

    let mut frame = [0u8; REQUEST_LEN];
    loop {
        if !read_frame(&mut stream, &mut frame, shutdown)? {
            return Ok(());
        }
        let status = match Request::decode(&frame) {
            Ok(request) => {
                let mut renderer = renderer.lock().unwrap_or_else(PoisonError::into_inner);
                dispatch(&mut renderer, request)
            }
            Err(e) => {
                log::warn!("Malformed request: {e}");
                STATUS_MALFORMED
            }
        };
        stream.write_all(&wire::encode_reply(status))?;
    }
}

/// Apply one request to the renderer and produce the reply status.
pub fn dispatch<S: RenderSink>(renderer: &mut VideoRenderer<S>, request: Request) -> i32 {
    match request {
        Request::Start {
            width,
            height,
            bytes,
            aspect,
        } => return renderer.start_status(width, height, bytes, aspect),
        Request::Stop => renderer.stop(),
        Request::Render => renderer.render(),
        Request::ToggleFullscreen => renderer.toggle_fullscreen(),
        Request::OnTop => renderer.ontop(),
    }
    STATUS_OK
}

/// Fill `frame` completely. Returns false on shutdown; `Closed` on EOF.
fn read_frame(
    stream: &mut TcpStream,
    frame: &mut [u8; REQUEST_LEN],
    shutdown: &AtomicBool,
) -> Result<bool, ProtocolError> {
    let mut filled = 0;
    while filled < REQUEST_LEN {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(false);
        }
        match stream.read(&mut frame[filled..]) {
            Ok(0) => return Err(ProtocolError::Closed),
            Ok(n) => filled += n,
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
