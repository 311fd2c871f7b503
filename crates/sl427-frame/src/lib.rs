//! SL427 link-layer framing.
//!
//! Every frame on the wire is:
//! - the start marker `0x68`, a 1-byte user-data length `L`, and `0x68` again
//! - `L` bytes of user data
//! - a 7-bit CRC over the user data, then the end marker `0x16`
//!
//! [`FrameReader`] resynchronizes on the start marker, so noise on a serial
//! line or a half-delivered frame costs one error instead of the connection.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod bcd;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::Sl427Codec;
pub use checksum::checksum;
pub use codec::{
    decode_frame, encode_frame, hex_dump, Frame, FrameConfig, END_MARKER, FRAME_OVERHEAD,
    HEADER_SIZE, MAX_USER_DATA_LEN, MIN_FRAME_LEN, START_MARKER, TRAILER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
