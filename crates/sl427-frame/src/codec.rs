use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::checksum;
use crate::error::{FrameError, Result};

/// Start marker, sent twice in every header.
pub const START_MARKER: u8 = 0x68;

/// End marker, last byte of every frame.
pub const END_MARKER: u8 = 0x16;

/// Frame header: start (1) + length (1) + start (1) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Frame trailer: checksum (1) + end (1) = 2 bytes.
pub const TRAILER_SIZE: usize = 2;

/// Bytes a frame adds around its user-data region.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Shortest byte sequence `decode_frame` accepts: a two-byte region.
///
/// `encode_frame` still builds a six-byte frame from a one-byte region,
/// which no decoder here will accept. Real user data is never that short.
pub const MIN_FRAME_LEN: usize = 7;

/// Largest user-data region a one-byte length can describe.
pub const MAX_USER_DATA_LEN: usize = 255;

/// One validated wire frame.
///
/// Constructed only by [`Frame::new`] or [`decode_frame`], so the length and
/// checksum always agree with the user-data region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    user_data: Bytes,
    checksum: u8,
}

impl Frame {
    /// Build a frame around a user-data region.
    pub fn new(user_data: impl Into<Bytes>) -> Result<Self> {
        let user_data = user_data.into();
        check_region_len(user_data.len())?;
        let checksum = checksum(&user_data);
        Ok(Self {
            user_data,
            checksum,
        })
    }

    /// Declared length `L` of the user-data region.
    pub fn length(&self) -> u8 {
        self.user_data.len() as u8
    }

    /// The user-data region.
    pub fn user_data(&self) -> &Bytes {
        &self.user_data
    }

    /// The checksum byte carried in the trailer.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// The total wire size of this frame (`L + 5`).
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.user_data.len()
    }

    /// Encode the frame back into its wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        put_frame(&self.user_data, self.checksum, &mut dst);
        dst.freeze()
    }
}

/// Encode a user-data region into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────┬──────┬─────────────────┬──────────┬──────┐
/// │ 0x68 │ L (1B)   │ 0x68 │ user data (L B) │ CS (1B)  │ 0x16 │
/// └──────┴──────────┴──────┴─────────────────┴──────────┴──────┘
/// ```
///
/// Regions of 1 to 255 bytes are accepted; see [`MIN_FRAME_LEN`] for why a
/// one-byte region does not decode again.
pub fn encode_frame(user_data: &[u8], dst: &mut BytesMut) -> Result<()> {
    check_region_len(user_data.len())?;
    put_frame(user_data, checksum(user_data), dst);
    Ok(())
}

/// Decode exactly one frame from `wire`.
///
/// The slice must hold the whole frame and nothing else.
pub fn decode_frame(wire: &[u8]) -> Result<Frame> {
    if wire.len() < MIN_FRAME_LEN {
        return Err(FrameError::Framing(format!(
            "frame too short ({} bytes, min {MIN_FRAME_LEN})",
            wire.len()
        )));
    }

    if wire[0] != START_MARKER {
        return Err(FrameError::Framing(format!(
            "invalid first start marker 0x{:02X}",
            wire[0]
        )));
    }
    if wire[2] != START_MARKER {
        return Err(FrameError::Framing(format!(
            "invalid second start marker 0x{:02X}",
            wire[2]
        )));
    }

    let length = usize::from(wire[1]);
    if wire.len() != length + FRAME_OVERHEAD {
        return Err(FrameError::Length(format!(
            "declared length {length} needs {} bytes, got {}",
            length + FRAME_OVERHEAD,
            wire.len()
        )));
    }

    let end = wire[wire.len() - 1];
    if end != END_MARKER {
        return Err(FrameError::Framing(format!("invalid end marker 0x{end:02X}")));
    }

    let user_data = &wire[HEADER_SIZE..HEADER_SIZE + length];
    let declared = wire[HEADER_SIZE + length];
    let computed = checksum(user_data);
    if declared != computed {
        return Err(FrameError::Checksum { declared, computed });
    }

    Ok(Frame {
        user_data: Bytes::copy_from_slice(user_data),
        checksum: declared,
    })
}

/// Format bytes as space-separated upper-case hex, e.g. `68 08 68`.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

fn check_region_len(len: usize) -> Result<()> {
    if len == 0 || len > MAX_USER_DATA_LEN {
        return Err(FrameError::Length(format!(
            "user data length {len} outside 1..={MAX_USER_DATA_LEN}"
        )));
    }
    Ok(())
}

fn put_frame(user_data: &[u8], cs: u8, dst: &mut BytesMut) {
    dst.reserve(FRAME_OVERHEAD + user_data.len());
    dst.put_u8(START_MARKER);
    dst.put_u8(user_data.len() as u8);
    dst.put_u8(START_MARKER);
    dst.put_slice(user_data);
    dst.put_u8(cs);
    dst.put_u8(END_MARKER);
}
