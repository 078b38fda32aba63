//! Fixed-size frames of the frame-delivery protocol.
//!
//! Request: `opcode: u32` followed by four `i32` arguments, all little endian.
//! Reply: one `i32` status, little endian. Every request gets a reply.

use crate::error::ProtocolError;

pub const REQUEST_LEN: usize = 20;
pub const REPLY_LEN: usize = 4;

const OP_START: u32 = 1;
const OP_STOP: u32 = 2;
const OP_RENDER: u32 = 3;
const OP_TOGGLE_FULLSCREEN: u32 = 4;
const OP_ONTOP: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Start {
        width: i32,
        height: i32,
        bytes: i32,
        aspect: i32,
    },
    Stop,
    Render,
    ToggleFullscreen,
    OnTop,
}

impl Request {
    pub fn opcode(&self) -> u32 {
        match self {
            Request::Start { .. } => OP_START,
            Request::Stop => OP_STOP,
            Request::Render => OP_RENDER,
            Request::ToggleFullscreen => OP_TOGGLE_FULLSCREEN,
            Request::OnTop => OP_ONTOP,
        }
    }

    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let args = match *self {
            Request::Start {
                width,
                height,
                bytes,
                aspect,
            } => [width, height, bytes, aspect],
            _ => [0; 4],
        };
        let mut frame = [0u8; REQUEST_LEN];
        frame[..4].copy_from_slice(&self.opcode().to_le_bytes());
        for (slot, arg) in frame[4..].chunks_exact_mut(4).zip(args) {
            slot.copy_from_slice(&arg.to_le_bytes());
        }
        frame
    }

    pub fn decode(frame: &[u8; REQUEST_LEN]) -> Result<Self, ProtocolError> {
        let word = |i: usize| [frame[i], frame[i + 1], frame[i + 2], frame[i + 3]];
        let arg = |n: usize| i32::from_le_bytes(word(4 + n * 4));

        match u32::from_le_bytes(word(0)) {
            OP_START => Ok(Request::Start {
                width: arg(0),
                height: arg(1),
                bytes: arg(2),
                aspect: arg(3),
            }),
            OP_STOP => Ok(Request::Stop),
            OP_RENDER => Ok(Request::Render),
            OP_TOGGLE_FULLSCREEN => Ok(Request::ToggleFullscreen),
            OP_ONTOP => Ok(Request::OnTop),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

pub fn encode_reply(status: i32) -> [u8; REPLY_LEN] {
    status.to_le_bytes()
}

pub fn decode_reply(frame: [u8; REPLY_LEN]) -> i32 {
    i32::from_le_bytes(frame)
}
