//! Control field: one bit-packed byte plus an optional split counter.
//!
//! ```text
//!  D7   D6     D5..D4       D3..D0
//! [DIR][SPLIT][FRAME COUNT][CODE]   [split count]?
//! ```

use std::fmt;

use crate::error::{MessageError, Result};

/// D7: set on uplink (station to center) frames.
pub const DIR_BIT: u8 = 0x80;
/// D6: set when a split-count byte follows.
pub const SPLIT_BIT: u8 = 0x40;
/// D5..D4: frame count, 0 to 3.
pub const FRAME_COUNT_MASK: u8 = 0x30;
/// D3..D0: command or type code.
pub const CODE_MASK: u8 = 0x0F;

/// Command and type codes carried in D3..D0.
pub mod code {
    /// Confirmation; heartbeats and acknowledgements.
    pub const CONFIRM: u8 = 0x0;
    /// Rainfall.
    pub const RAIN: u8 = 0x1;
    /// Water level.
    pub const WATER_LEVEL: u8 = 0x2;
    /// Flow rate.
    pub const FLOW: u8 = 0x3;
    /// Flow velocity.
    pub const VELOCITY: u8 = 0x4;
    /// Gate position.
    pub const GATE: u8 = 0x5;
    /// Power supply.
    pub const POWER: u8 = 0x6;
    /// Weather.
    pub const WEATHER: u8 = 0x7;
    /// Electrical quantities.
    pub const ELECTRIC: u8 = 0x8;
    /// Water temperature.
    pub const WATER_TEMP: u8 = 0x9;
    /// Water quality.
    pub const WATER_QUALITY: u8 = 0xA;
    /// Soil moisture.
    pub const SOIL_MOISTURE: u8 = 0xB;
    /// Evaporation.
    pub const EVAPORATION: u8 = 0xC;
    /// Alarm or status report.
    pub const ALARM: u8 = 0xD;
    /// Rainfall statistics.
    pub const RAIN_STATS: u8 = 0xE;
    /// Pressure.
    pub const PRESSURE: u8 = 0xF;

    /// Short name for a type code.
    pub fn name(code: u8) -> &'static str {
        match code & super::CODE_MASK {
            CONFIRM => "confirm",
            RAIN => "rain",
            WATER_LEVEL => "water-level",
            FLOW => "flow",
            VELOCITY => "velocity",
            GATE => "gate",
            POWER => "power",
            WEATHER => "weather",
            ELECTRIC => "electric",
            WATER_TEMP => "water-temp",
            WATER_QUALITY => "water-quality",
            SOIL_MOISTURE => "soil-moisture",
            EVAPORATION => "evaporation",
            ALARM => "alarm",
            RAIN_STATS => "rain-stats",
            _ => "pressure",
        }
    }
}

/// Transmission direction (D7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Center to terminal.
    Downlink,
    /// Terminal to center.
    Uplink,
}

impl Direction {
    /// Lower-case name used in CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Downlink => "downlink",
            Direction::Uplink => "uplink",
        }
    }
}

/// Decoded control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    value: u8,
    split_count: Option<u8>,
}

impl Control {
    /// Decode from the start of `bytes`, consuming one byte, or two when the
    /// split flag is set.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = *bytes
            .first()
            .ok_or_else(|| MessageError::Control("missing control byte".to_string()))?;

        let split_count = if value & SPLIT_BIT != 0 {
            let count = bytes.get(1).ok_or_else(|| {
                MessageError::Control("split flag set but split count missing".to_string())
            })?;
            Some(*count)
        } else {
            None
        };

        Ok(Self { value, split_count })
    }

    /// Wrap a raw first byte. The split flag is cleared since no count is
    /// known; use [`Control::with_split`] to set one.
    pub fn from_byte(value: u8) -> Self {
        Self {
            value: value & !SPLIT_BIT,
            split_count: None,
        }
    }

    /// Station-to-center control with frame count 0.
    pub fn uplink(code: u8) -> Self {
        Self {
            value: DIR_BIT | (code & CODE_MASK),
            split_count: None,
        }
    }

    /// Center-to-station control with frame count 0.
    pub fn downlink(code: u8) -> Self {
        Self {
            value: code & CODE_MASK,
            split_count: None,
        }
    }

    /// Set the 2-bit frame count; higher bits are dropped.
    pub fn with_frame_count(mut self, count: u8) -> Self {
        self.value = (self.value & !FRAME_COUNT_MASK) | ((count & 0x03) << 4);
        self
    }

    /// Mark the frame as split and carry the split counter.
    pub fn with_split(mut self, count: u8) -> Self {
        self.value |= SPLIT_BIT;
        self.split_count = Some(count);
        self
    }

    pub fn direction(&self) -> Direction {
        if self.value & DIR_BIT != 0 {
            Direction::Uplink
        } else {
            Direction::Downlink
        }
    }

    pub fn is_uplink(&self) -> bool {
        self.direction() == Direction::Uplink
    }

    pub fn is_split(&self) -> bool {
        self.split_count.is_some()
    }

    /// Counter byte of a split frame.
    pub fn split_count(&self) -> Option<u8> {
        self.split_count
    }

    /// Frame count, 0 to 3.
    pub fn frame_count(&self) -> u8 {
        (self.value & FRAME_COUNT_MASK) >> 4
    }

    /// Command or type code; see the `code` module.
    pub fn code(&self) -> u8 {
        self.value & CODE_MASK
    }

    /// First byte as sent on the wire.
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Wire size: 1, or 2 with a split counter.
    pub fn wire_len(&self) -> usize {
        if self.split_count.is_some() {
            2
        } else {
            1
        }
    }

    /// Wire bytes, one or two.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2);
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.value);
        if let Some(count) = self.split_count {
            out.push(count);
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} fcb={}",
            self.direction().as_str(),
            code::name(self.code()),
            self.frame_count()
        )?;
        if let Some(count) = self.split_count {
            write!(f, " split={count}")?;
        }
        Ok(())
    }
}
