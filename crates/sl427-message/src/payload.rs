//! Data-item payload carried in the data field of upload frames.
//!
//! ```text
//! [yy mm dd hh mi ss (BCD)] [count (1)]
//! count x [id (u16 BE)] [type (1)] [value]
//! ```
//!
//! Value layout by type: Int8 one byte, Int16 and Int32 big-endian, String a
//! length byte followed by that many bytes.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use sl427_frame::bcd::{from_bcd, is_valid_bcd, to_bcd};

use crate::error::{MessageError, Result};

pub const TYPE_INT8: u8 = 0x01;
pub const TYPE_INT16: u8 = 0x02;
pub const TYPE_INT32: u8 = 0x03;
pub const TYPE_STRING: u8 = 0x04;

const TIMESTAMP_LEN: usize = 6;
const ITEM_HEADER_LEN: usize = 3;
const MAX_ITEMS: usize = u8::MAX as usize;
const MAX_STRING_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Text(String),
}

impl DataValue {
    /// Wire type byte.
    pub fn type_code(&self) -> u8 {
        match self {
            DataValue::Int8(_) => TYPE_INT8,
            DataValue::Int16(_) => TYPE_INT16,
            DataValue::Int32(_) => TYPE_INT32,
            DataValue::Text(_) => TYPE_STRING,
        }
    }

    /// Integer value, `None` for text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Int8(v) => Some(i64::from(*v)),
            DataValue::Int16(v) => Some(i64::from(*v)),
            DataValue::Int32(v) => Some(i64::from(*v)),
            DataValue::Text(_) => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Int8(v) => write!(f, "{v}"),
            DataValue::Int16(v) => write!(f, "{v}"),
            DataValue::Int32(v) => write!(f, "{v}"),
            DataValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    pub id: u16,
    pub value: DataValue,
}

impl DataItem {
    pub fn new(id: u16, value: DataValue) -> Self {
        Self { id, value }
    }
}

/// One timestamped batch of data items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload {
    /// Second precision; the year is sent as two digits and read back as 20yy.
    pub timestamp: NaiveDateTime,
    pub items: Vec<DataItem>,
}

impl DataPayload {
    pub fn new(timestamp: NaiveDateTime, items: Vec<DataItem>) -> Self {
        Self { timestamp, items }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.items.len() > MAX_ITEMS {
            return Err(MessageError::Data(format!(
                "{} data items exceed the limit of {MAX_ITEMS}",
                self.items.len()
            )));
        }

        let ts = &self.timestamp;
        let mut out = vec![
            to_bcd(ts.year().rem_euclid(100) as u8),
            to_bcd(ts.month() as u8),
            to_bcd(ts.day() as u8),
            to_bcd(ts.hour() as u8),
            to_bcd(ts.minute() as u8),
            to_bcd(ts.second() as u8),
            self.items.len() as u8,
        ];

        for item in &self.items {
            out.extend_from_slice(&item.id.to_be_bytes());
            out.push(item.value.type_code());
            match &item.value {
                DataValue::Int8(v) => out.extend_from_slice(&v.to_be_bytes()),
                DataValue::Int16(v) => out.extend_from_slice(&v.to_be_bytes()),
                DataValue::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
                DataValue::Text(s) => {
                    if s.len() > MAX_STRING_LEN {
                        return Err(MessageError::Data(format!(
                            "string item {} is {} bytes, max {MAX_STRING_LEN}",
                            item.id,
                            s.len()
                        )));
                    }
                    out.push(s.len() as u8);
                    out.extend_from_slice(s.as_bytes());
                }
            }
        }

        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let ts = cursor.take(TIMESTAMP_LEN, "timestamp")?;
        let timestamp = decode_timestamp(ts)?;
        let count = cursor.take(1, "item count")?[0];

        let mut items = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let header = cursor.take(ITEM_HEADER_LEN, "item header")?;
            let id = u16::from_be_bytes([header[0], header[1]]);
            let value = match header[2] {
                TYPE_INT8 => DataValue::Int8(i8::from_be_bytes([cursor.take(1, "int8")?[0]])),
                TYPE_INT16 => {
                    let v = cursor.take(2, "int16")?;
                    DataValue::Int16(i16::from_be_bytes([v[0], v[1]]))
                }
                TYPE_INT32 => {
                    let v = cursor.take(4, "int32")?;
                    DataValue::Int32(i32::from_be_bytes([v[0], v[1], v[2], v[3]]))
                }
                TYPE_STRING => {
                    let len = cursor.take(1, "string length")?[0];
                    let raw = cursor.take(usize::from(len), "string")?;
                    let text = String::from_utf8(raw.to_vec()).map_err(|err| {
                        MessageError::Data(format!("string item {id} is not UTF-8: {err}"))
                    })?;
                    DataValue::Text(text)
                }
                other => {
                    return Err(MessageError::Data(format!(
                        "item {id} has unknown type 0x{other:02X}"
                    )))
                }
            };
            items.push(DataItem { id, value });
        }

        if cursor.remaining() > 0 {
            return Err(MessageError::Data(format!(
                "{} trailing bytes after {count} items",
                cursor.remaining()
            )));
        }

        Ok(Self { timestamp, items })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + n).ok_or_else(|| {
            MessageError::Data(format!(
                "truncated {what}: need {n} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            ))
        })?;
        self.pos += n;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }
}

fn decode_timestamp(ts: &[u8]) -> Result<NaiveDateTime> {
    if let Some(bad) = ts.iter().find(|b| !is_valid_bcd(**b)) {
        return Err(MessageError::Data(format!(
            "timestamp byte 0x{bad:02X} is not BCD"
        )));
    }
    let v: Vec<u32> = ts.iter().map(|b| u32::from(from_bcd(*b))).collect();
    NaiveDate::from_ymd_opt(2000 + v[0] as i32, v[1], v[2])
        .and_then(|d| d.and_hms_opt(v[3], v[4], v[5]))
        .ok_or_else(|| {
            MessageError::Data(format!(
                "timestamp {:02}-{:02}-{:02} {:02}:{:02}:{:02} is not a valid time",
                v[0], v[1], v[2], v[3], v[4], v[5]
            ))
        })
}
