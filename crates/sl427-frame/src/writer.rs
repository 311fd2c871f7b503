use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use sl427_transport::LinkStream;
use tracing::debug;

use crate::codec::{encode_frame, hex_dump, Frame, FrameConfig, FRAME_OVERHEAD, MAX_USER_DATA_LEN};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_USER_DATA_LEN + FRAME_OVERHEAD),
            config,
        }
    }

    /// Write an already-built frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(&frame.to_bytes());
        self.write_buffered()
    }

    /// Frame a user-data region and send it.
    ///
    /// When the write timeout expires part way through, the peer may hold a
    /// partial frame and the stream should be closed.
    pub fn send(&mut self, user_data: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(user_data, &mut self.buf)?;
        self.write_buffered()
    }

    /// Flush the underlying stream.
    ///
    /// A write timeout surfaces as `FrameError::Io`; see
    /// [`FrameError::is_timeout`].
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn write_buffered(&mut self) -> Result<()> {
        debug!(len = self.buf.len(), raw = %hex_dump(&self.buf), "writing raw frame");

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }
}

impl FrameWriter<LinkStream> {
    /// Create a frame writer for `LinkStream` and apply write timeout from config.
    pub fn with_config_link(inner: LinkStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
