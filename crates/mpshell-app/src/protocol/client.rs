use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::wire::{self, REPLY_LEN, Request};
use crate::error::{ProtocolError, STATUS_OK};

/// Decoder side of the frame-delivery protocol.
pub struct VoClient {
    stream: TcpStream,
}

impl VoClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self { stream })
    }

    /// Send one request and wait for its status.
    pub fn call(&mut self, request: Request) -> Result<i32, ProtocolError> {
        self.stream.write_all(&request.encode())?;
        let mut reply = [0u8; REPLY_LEN];
        match self.stream.read_exact(&mut reply) {
            Ok(()) => Ok(wire::decode_reply(reply)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the server's status; 0 means the session is live.
    pub fn start(
        &mut self,
        width: i32,
        height: i32,
        bytes: i32,
        aspect: i32,
    ) -> Result<i32, ProtocolError> {
        self.call(Request::Start {
            width,
            height,
            bytes,
            aspect,
        })
    }

    pub fn stop(&mut self) -> Result<(), ProtocolError> {
        self.call_void(Request::Stop)
    }

    pub fn render(&mut self) -> Result<(), ProtocolError> {
        self.call_void(Request::Render)
    }

    #[cfg(test)]
    pub fn toggle_fullscreen(&mut self) -> Result<(), ProtocolError> {
        self.call_void(Request::ToggleFullscreen)
    }

    #[cfg(test)]
    pub fn ontop(&mut self) -> Result<(), ProtocolError> {
        self.call_void(Request::OnTop)
    }

    fn call_void(&mut self, request: Request) -> Result<(), ProtocolError> {
        let status = self.call(request)?;
        if status != STATUS_OK {
            log::debug!("{request:?} answered with status {status}");
        }
        Ok(())
    }
}
