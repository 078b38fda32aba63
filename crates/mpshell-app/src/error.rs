use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Status returned to the decoder for a successful `start` (and for every void operation).
pub const STATUS_OK: i32 = 0;
/// Status returned for a request frame the server could not decode.
pub const STATUS_MALFORMED: i32 = -1;

/// Why a `start` request was rejected. Each variant maps to a stable wire status.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid frame geometry {width}x{height}")]
    InvalidGeometry { width: i32, height: i32 },
    #[error("unsupported pixel format: {0} bytes per pixel")]
    UnsupportedPixelFormat(i32),
    #[error("invalid aspect value {0}")]
    InvalidAspect(i32),
    #[error("shared buffer unavailable: {0}")]
    SharedBuffer(#[from] SharedBufferError),
    #[error("frame buffer allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
}

impl StartError {
    pub fn status(&self) -> i32 {
        match self {
            StartError::InvalidGeometry { .. } => 1,
            StartError::UnsupportedPixelFormat(_) => 2,
            StartError::InvalidAspect(_) => 3,
            StartError::SharedBuffer(_) | StartError::Allocation(_) => 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum SharedBufferError {
    #[error("invalid segment name {0:?}")]
    InvalidName(String),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("segment {path} holds {actual} bytes, frame needs {required}")]
    TooSmall {
        path: PathBuf,
        required: usize,
        actual: u64,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
