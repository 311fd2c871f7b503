use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use sl427_transport::LinkStream;
use tracing::{debug, trace};

use crate::codec::{
    decode_frame, hex_dump, Frame, FrameConfig, FRAME_OVERHEAD, HEADER_SIZE, MAX_USER_DATA_LEN,
    START_MARKER, TRAILER_SIZE,
};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Position of the framer within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekStart,
    ReadLength,
    ReadSecondStart { length: u8 },
    ReadBody { length: u8 },
}

/// Reads complete frames from any `Read` stream.
///
/// Bytes before a start marker are discarded, so the reader recovers from
/// line noise and from the tail of a frame that failed to decode. Once a
/// start marker has been seen the attempt is committed: a bad length or a
/// bad second marker fails the call and scanning resumes on the next one.
///
/// A read timeout part way through a frame keeps the bytes read so far, and
/// the next call carries on from the same position.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    state: State,
    attempt: Vec<u8>,
    consumed: u64,
    skipped: u64,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            state: State::SeekStart,
            attempt: Vec::with_capacity(MAX_USER_DATA_LEN + FRAME_OVERHEAD),
            consumed: 0,
            skipped: 0,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ends before
    /// a start marker, and `Err(FrameError::IncompleteFrame)` when it ends
    /// inside a frame. A timeout error leaves a partial frame pending; every
    /// other error abandons it.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let result = self.advance();
        match &result {
            Err(err) if err.is_timeout() => {}
            _ => self.state = State::SeekStart,
        }
        result
    }

    /// Whether a started frame is waiting for more bytes.
    pub fn in_frame(&self) -> bool {
        self.state != State::SeekStart
    }

    fn advance(&mut self) -> Result<Frame> {
        let mut skipped_now = 0u64;

        loop {
            self.state = match self.state {
                State::SeekStart => {
                    let byte = self.next_byte()?.ok_or(FrameError::ConnectionClosed)?;
                    if byte == START_MARKER {
                        self.attempt.clear();
                        self.attempt.push(byte);
                        if skipped_now > 0 {
                            debug!(skipped = skipped_now, "resynchronized on start marker");
                        }
                        State::ReadLength
                    } else {
                        trace!(byte, "discarding byte before start marker");
                        skipped_now += 1;
                        self.skipped += 1;
                        State::SeekStart
                    }
                }
                State::ReadLength => {
                    let length = self.committed_byte(1)?;
                    self.attempt.push(length);
                    if length == 0 {
                        return Err(FrameError::Length("declared length 0".to_string()));
                    }
                    State::ReadSecondStart { length }
                }
                State::ReadSecondStart { length } => {
                    let marker = self.committed_byte(1)?;
                    self.attempt.push(marker);
                    if marker != START_MARKER {
                        return Err(FrameError::Framing(format!(
                            "invalid second start marker 0x{marker:02X}"
                        )));
                    }
                    State::ReadBody { length }
                }
                State::ReadBody { length } => {
                    self.fill_body(usize::from(length) + TRAILER_SIZE)?;

                    debug!(
                        len = self.attempt.len(),
                        raw = %hex_dump(&self.attempt),
                        "read raw frame"
                    );
                    return decode_frame(&self.attempt);
                }
            };
        }
    }

    /// Total bytes taken off the stream, noise included.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Total bytes discarded while searching for a start marker.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Bytes of the most recent frame attempt, from its start marker up to
    /// where reading stopped. Useful for logging a frame that failed.
    pub fn last_attempt(&self) -> &[u8] {
        &self.attempt
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Bytes already buffered but not yet consumed are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Read one byte inside a committed frame; end of stream is an
    /// incomplete frame.
    fn committed_byte(&mut self, expected: usize) -> Result<u8> {
        self.next_byte()?.ok_or(FrameError::IncompleteFrame {
            expected,
            actual: 0,
        })
    }

    /// Top the attempt up to header plus `body_len` bytes.
    fn fill_body(&mut self, body_len: usize) -> Result<()> {
        let total = HEADER_SIZE + body_len;
        while self.attempt.len() < total {
            if self.buf.is_empty() && !self.fill()? {
                return Err(FrameError::IncompleteFrame {
                    expected: body_len,
                    actual: self.attempt.len() - HEADER_SIZE,
                });
            }
            let take = (total - self.attempt.len()).min(self.buf.len());
            self.attempt.extend_from_slice(&self.buf[..take]);
            self.buf.advance(take);
            self.consumed += take as u64;
        }
        Ok(())
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.buf.is_empty() && !self.fill()? {
            return Ok(None);
        }
        self.consumed += 1;
        Ok(Some(self.buf.get_u8()))
    }

    /// Pull one chunk from the stream. Returns `false` at end of stream.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl FrameReader<LinkStream> {
    /// Create a frame reader for `LinkStream` and apply read timeout from config.
    pub fn with_config_link(inner: LinkStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: sl427_transport::TransportError) -> FrameError {
    match err {
        sl427_transport::TransportError::Io(io)
        | sl427_transport::TransportError::Accept(io) => FrameError::Io(io),
        sl427_transport::TransportError::Bind { source, .. }
        | sl427_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
