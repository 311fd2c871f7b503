//! `tokio_util::codec` adapter for the SL427 wire format.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::codec::{decode_frame, encode_frame, hex_dump, Frame, FRAME_OVERHEAD, START_MARKER};
use crate::error::FrameError;

/// Frame codec for `FramedRead` / `FramedWrite`.
///
/// Decoding follows the same resynchronization rules as
/// [`FrameReader`](crate::FrameReader): leading noise is dropped, and a bad
/// length or second marker consumes the committed header bytes.
///
/// `FramedRead` ends the stream after the first decoder error, so frames that
/// fail with a recoverable error are logged, counted and skipped here instead
/// of being yielded. Only end-of-stream errors reach the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sl427Codec {
    skipped: u64,
    dropped: u64,
}

impl Sl427Codec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes discarded while searching for a start marker.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Frames discarded for a bad length, marker or checksum.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    fn decode_one(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let noise = src
            .iter()
            .position(|b| *b == START_MARKER)
            .unwrap_or(src.len());
        if noise > 0 {
            trace!(skipped = noise, "discarding bytes before start marker");
            self.skipped += noise as u64;
            src.advance(noise);
        }

        if src.len() < 2 {
            return Ok(None);
        }
        let length = src[1];
        if length == 0 {
            src.advance(2);
            return Err(FrameError::Length("declared length 0".to_string()));
        }

        if src.len() < 3 {
            return Ok(None);
        }
        if src[2] != START_MARKER {
            let marker = src[2];
            src.advance(3);
            return Err(FrameError::Framing(format!(
                "invalid second start marker 0x{marker:02X}"
            )));
        }

        let total = usize::from(length) + FRAME_OVERHEAD;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let wire = src.split_to(total);
        debug!(len = wire.len(), raw = %hex_dump(&wire), "decoded raw frame");
        decode_frame(&wire).map(Some)
    }
}

impl Decoder for Sl427Codec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.decode_one(src) {
                Err(err) if err.is_recoverable() => {
                    self.dropped += 1;
                    warn!(error = %err, "dropping bad frame");
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let actual = src.len();
                let expected = match src.get(1) {
                    Some(len) => usize::from(*len) + FRAME_OVERHEAD,
                    None => actual + 1,
                };
                src.clear();
                Err(FrameError::IncompleteFrame { expected, actual })
            }
        }
    }
}

impl Encoder<Frame> for Sl427Codec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        dst.extend_from_slice(&item.to_bytes());
        Ok(())
    }
}

impl Encoder<&[u8]> for Sl427Codec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(item, dst)
    }
}
