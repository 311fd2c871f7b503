use std::io::ErrorKind;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Bad start or end marker, or a buffer too short to be a frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// Zero or out-of-range length, or declared/actual length mismatch.
    #[error("length error: {0}")]
    Length(String),

    /// The trailer checksum does not match the user-data region.
    #[error("checksum mismatch (declared 0x{declared:02X}, computed 0x{computed:02X})")]
    Checksum { declared: u8, computed: u8 },

    /// The stream ended part way through a frame.
    #[error("incomplete frame: expected {expected} more bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a frame started.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Data-level failures leave the stream usable; the next frame can still
    /// be attempted. I/O failures and end of stream do not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::Framing(_) | FrameError::Length(_) | FrameError::Checksum { .. }
        )
    }

    /// A read or write deadline expired. A reader keeps the partial frame
    /// and resumes it on the next call.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
