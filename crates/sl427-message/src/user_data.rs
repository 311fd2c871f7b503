//! The user-data region of a frame.
//!
//! ```text
//! [control (1-2)] [address (5)] [AFN (1)] [user AFN (0-1)]
//! [data (var)] [password (0-2)] [time label (0-7)]
//! ```
//!
//! Nothing on the wire says whether the password or time label is present.
//! Decoding infers both from the tail: the last seven bytes are a time label
//! when they pass [`TimeLabel::is_plausible`], and on downlink frames the
//! last two bytes before that are the password. A data field that happens to
//! end in a plausible date is therefore misread; encoders that interoperate
//! with deployed stations rely on the same rule.

use std::fmt;

use bytes::{Bytes, BytesMut};
use sl427_frame::{decode_frame, encode_frame, hex_dump, Frame};
use tracing::trace;

use crate::address::{Address, ADDRESS_LEN};
use crate::afn::Afn;
use crate::control::{Control, Direction};
use crate::error::{MessageError, Result};
use crate::time_label::{TimeLabel, TIME_LABEL_LEN};

pub const PASSWORD_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub control: Control,
    pub address: Address,
    pub afn: Afn,
    /// Present iff `afn` is [`Afn::USER_DEFINED`].
    pub user_afn: Option<u8>,
    pub data: Vec<u8>,
    /// Downlink only.
    pub password: Option<u16>,
    pub time_label: Option<TimeLabel>,
}

impl UserData {
    pub fn new(control: Control, address: Address, afn: Afn) -> Self {
        Self {
            control,
            address,
            afn,
            user_afn: None,
            data: Vec::new(),
            password: None,
            time_label: None,
        }
    }

    pub fn with_user_afn(mut self, user_afn: u8) -> Self {
        self.user_afn = Some(user_afn);
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_password(mut self, password: u16) -> Self {
        self.password = Some(password);
        self
    }

    pub fn with_time_label(mut self, time_label: TimeLabel) -> Self {
        self.time_label = Some(time_label);
        self
    }

    /// Decompose a user-data region.
    ///
    /// Only structure is checked here; call [`UserData::validate`] for the
    /// semantic rules.
    pub fn decode(region: &[u8]) -> Result<Self> {
        let control = Control::decode(region)?;
        let mut offset = control.wire_len();

        let address_bytes = region.get(offset..offset + ADDRESS_LEN).ok_or_else(|| {
            MessageError::Address(format!(
                "address needs {ADDRESS_LEN} bytes, {} remain",
                region.len().saturating_sub(offset)
            ))
        })?;
        let address = Address::decode(address_bytes)?;
        offset += ADDRESS_LEN;

        let afn = Afn(*region
            .get(offset)
            .ok_or_else(|| MessageError::Data("missing functional code".to_string()))?);
        offset += 1;

        let user_afn = if afn.is_user_defined() {
            let byte = *region.get(offset).ok_or_else(|| {
                MessageError::Data("user-defined AFN without user AFN byte".to_string())
            })?;
            offset += 1;
            Some(byte)
        } else {
            None
        };

        let mut rest = &region[offset..];

        let mut time_label = None;
        if rest.len() >= TIME_LABEL_LEN {
            let (head, tail) = rest.split_at(rest.len() - TIME_LABEL_LEN);
            if TimeLabel::is_plausible(tail) {
                trace!(tail = %hex_dump(tail), "trailing bytes read as time label");
                time_label = Some(TimeLabel::decode(tail)?);
                rest = head;
            }
        }

        let mut password = None;
        if control.direction() == Direction::Downlink && rest.len() >= PASSWORD_LEN {
            let (head, tail) = rest.split_at(rest.len() - PASSWORD_LEN);
            password = Some(u16::from_be_bytes([tail[0], tail[1]]));
            rest = head;
        }

        Ok(Self {
            control,
            address,
            afn,
            user_afn,
            data: rest.to_vec(),
            password,
            time_label,
        })
    }

    /// Size of [`UserData::encode`]'s output.
    pub fn encoded_len(&self) -> usize {
        self.control.wire_len()
            + ADDRESS_LEN
            + 1
            + usize::from(self.user_afn.is_some())
            + self.data.len()
            + if self.password.is_some() { PASSWORD_LEN } else { 0 }
            + if self.time_label.is_some() { TIME_LABEL_LEN } else { 0 }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.control.encode_into(&mut out);
        out.extend_from_slice(&self.address.encode());
        out.push(self.afn.0);
        if let Some(user_afn) = self.user_afn {
            out.push(user_afn);
        }
        out.extend_from_slice(&self.data);
        if let Some(password) = self.password {
            out.extend_from_slice(&password.to_be_bytes());
        }
        if let Some(label) = &self.time_label {
            out.extend_from_slice(&label.encode());
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        self.address.validate()?;

        if !self.afn.is_known() && !self.afn.is_user_defined() {
            return Err(MessageError::Data(format!(
                "unknown functional code 0x{:02X}",
                self.afn.0
            )));
        }
        if self.afn.is_user_defined() && self.user_afn.is_none() {
            return Err(MessageError::Data(
                "user-defined AFN without user AFN byte".to_string(),
            ));
        }
        if self.control.direction() == Direction::Downlink && self.password.is_none() {
            return Err(MessageError::Auth("downlink frame without password".to_string()));
        }
        Ok(())
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::new(self.encode())?)
    }

    /// Encode and wrap in the wire envelope.
    pub fn to_frame_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len() + sl427_frame::FRAME_OVERHEAD);
        encode_frame(&self.encode(), &mut buf)?;
        Ok(buf.freeze())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::decode(frame.user_data())
    }

    /// Unwrap one complete wire frame and decode its user data.
    pub fn from_frame_bytes(wire: &[u8]) -> Result<Self> {
        Self::from_frame(&decode_frame(wire)?)
    }
}

impl fmt::Display for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.control, self.address, self.afn)?;
        if let Some(user_afn) = self.user_afn {
            write!(f, " user_afn=0x{user_afn:02X}")?;
        }
        write!(f, " data=[{}]", hex_dump(&self.data))?;
        if let Some(password) = self.password {
            write!(f, " pw=0x{password:04X}")?;
        }
        if let Some(label) = &self.time_label {
            write!(f, " tp={label}")?;
        }
        Ok(())
    }
}
