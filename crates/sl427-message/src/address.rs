//! Station address: five bytes in one of two layouts.
//!
//! ```text
//! admin:  [BCD admin code (3)] [station id (u16 BE)]
//! coded:  [0x00] [station code (4, free hex)]
//! ```
//!
//! The first byte discriminates: `0x00` can never start a valid admin code,
//! so it marks the coded layout.

use std::fmt;

use sl427_frame::bcd;

use crate::error::{MessageError, Result};

/// Wire size of every address.
pub const ADDRESS_LEN: usize = 5;

/// Leading byte of a coded address.
pub const CODED_FEATURE_BYTE: u8 = 0x00;

/// Lowest id of an ordinary monitoring station.
pub const MIN_MONITORING_ID: u16 = 1;
/// Highest id of an ordinary monitoring station.
pub const MAX_MONITORING_ID: u16 = 60000;
/// Lowest id reserved for relay stations.
pub const MIN_RELAY_ID: u16 = 60001;
/// Highest id reserved for relay stations.
pub const MAX_RELAY_ID: u16 = 65534;
/// Station id addressing every station under an admin code.
pub const BROADCAST_ID: u16 = 65535;

/// Role a station id falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationKind {
    /// Ids 1 to 60000.
    Monitoring,
    /// Ids 60001 to 65534.
    Relay,
    /// Id 65535.
    Broadcast,
    /// Id 0, never valid on the wire.
    Invalid,
}

impl StationKind {
    /// Classify a binary station id.
    pub fn from_id(id: u16) -> Self {
        match id {
            0 => StationKind::Invalid,
            MIN_MONITORING_ID..=MAX_MONITORING_ID => StationKind::Monitoring,
            MIN_RELAY_ID..=MAX_RELAY_ID => StationKind::Relay,
            BROADCAST_ID => StationKind::Broadcast,
        }
    }

    /// Lower-case name used in CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            StationKind::Monitoring => "monitoring",
            StationKind::Relay => "relay",
            StationKind::Broadcast => "broadcast",
            StationKind::Invalid => "invalid",
        }
    }
}

/// Administrative-division code plus a binary station id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdminAddress {
    /// Three BCD bytes, six decimal digits.
    pub admin_code: [u8; 3],
    /// Binary station id, big-endian on the wire.
    pub station_id: u16,
}

impl AdminAddress {
    /// Build and validate an admin address.
    pub fn new(admin_code: [u8; 3], station_id: u16) -> Result<Self> {
        let addr = Self {
            admin_code,
            station_id,
        };
        addr.validate()?;
        Ok(addr)
    }

    /// Build from a six-digit decimal admin code such as `"210525"`.
    pub fn from_digits(admin_code: &str, station_id: u16) -> Result<Self> {
        if admin_code.len() != 6 {
            return Err(MessageError::Address(format!(
                "admin code must be 6 digits, got {admin_code:?}"
            )));
        }
        let packed = bcd::encode_digits(admin_code).ok_or_else(|| {
            MessageError::Address(format!("admin code is not decimal: {admin_code:?}"))
        })?;
        let mut code = [0u8; 3];
        code.copy_from_slice(&packed);
        Self::new(code, station_id)
    }

    /// Role of this station id.
    pub fn kind(&self) -> StationKind {
        StationKind::from_id(self.station_id)
    }

    /// Six decimal digits of the admin code.
    pub fn admin_code_digits(&self) -> String {
        self.admin_code
            .iter()
            .map(|b| format!("{:X}{:X}", b >> 4, b & 0x0F))
            .collect()
    }

    /// Admin code bytes must be BCD and the station id non-zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.admin_code.iter().find(|b| !bcd::is_valid_bcd(**b)) {
            return Err(MessageError::Address(format!(
                "admin code byte 0x{bad:02X} is not BCD"
            )));
        }
        if self.station_id == 0 {
            return Err(MessageError::Address("station id 0 is invalid".to_string()));
        }
        Ok(())
    }
}

/// Free-form four byte station code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodedAddress {
    /// Sent as-is after the leading zero byte.
    pub station_code: [u8; 4],
}

impl CodedAddress {
    /// Wrap four raw station-code bytes.
    pub fn new(station_code: [u8; 4]) -> Self {
        Self { station_code }
    }

    /// Parse an eight-digit hex station code such as `"80000001"`.
    pub fn from_hex(code: &str) -> Result<Self> {
        if code.len() != 8 || !code.bytes().all(|c| c.is_ascii_hexdigit()) {
            return Err(MessageError::Address(format!(
                "station code must be 8 hex digits, got {code:?}"
            )));
        }
        let mut station_code = [0u8; 4];
        for (i, slot) in station_code.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&code[i * 2..i * 2 + 2], 16)
                .map_err(|err| MessageError::Address(err.to_string()))?;
        }
        Ok(Self { station_code })
    }

    /// Eight upper-case hex digits.
    pub fn hex(&self) -> String {
        self.station_code.iter().map(|b| format!("{b:02X}")).collect()
    }
}

/// A decoded station address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Leading byte is the first BCD byte of an admin code.
    Admin(AdminAddress),
    /// Leading byte is [`CODED_FEATURE_BYTE`].
    Coded(CodedAddress),
}

impl Address {
    /// Decode exactly [`ADDRESS_LEN`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADDRESS_LEN {
            return Err(MessageError::Address(format!(
                "address needs {ADDRESS_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        if bytes[0] == CODED_FEATURE_BYTE {
            let mut station_code = [0u8; 4];
            station_code.copy_from_slice(&bytes[1..5]);
            return Ok(Address::Coded(CodedAddress { station_code }));
        }

        let mut admin_code = [0u8; 3];
        admin_code.copy_from_slice(&bytes[0..3]);
        let station_id = u16::from_be_bytes([bytes[3], bytes[4]]);
        AdminAddress::new(admin_code, station_id).map(Address::Admin)
    }

    /// Five wire bytes for either variant.
    pub fn encode(&self) -> [u8; ADDRESS_LEN] {
        let mut out = [0u8; ADDRESS_LEN];
        match self {
            Address::Admin(a) => {
                out[0..3].copy_from_slice(&a.admin_code);
                out[3..5].copy_from_slice(&a.station_id.to_be_bytes());
            }
            Address::Coded(c) => {
                out[0] = CODED_FEATURE_BYTE;
                out[1..5].copy_from_slice(&c.station_code);
            }
        }
        out
    }

    /// Coded addresses carry no range restriction.
    pub fn validate(&self) -> Result<()> {
        match self {
            Address::Admin(a) => a.validate(),
            Address::Coded(_) => Ok(()),
        }
    }

    /// Compact station identifier: admin digits plus the zero-padded id, or
    /// the coded hex string.
    pub fn station_string(&self) -> String {
        match self {
            Address::Admin(a) => format!("{}{:04}", a.admin_code_digits(), a.station_id),
            Address::Coded(c) => c.hex(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Admin(a) => write!(
                f,
                "Admin{{code:{},station:{}}}",
                a.admin_code_digits(),
                a.station_id
            ),
            Address::Coded(c) => write!(f, "Coded{{code:{}}}", c.hex()),
        }
    }
}

impl From<AdminAddress> for Address {
    fn from(value: AdminAddress) -> Self {
        Address::Admin(value)
    }
}

impl From<CodedAddress> for Address {
    fn from(value: CodedAddress) -> Self {
        Address::Coded(value)
    }
}
