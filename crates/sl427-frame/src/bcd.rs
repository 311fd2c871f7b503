//! Binary-coded decimal helpers.
//!
//! One byte carries two decimal digits: tens in the high nibble, ones in the
//! low nibble. Multi-byte integers are base 100, most significant byte first.

/// Pack a value in `0..=99` into one BCD byte.
///
/// Values above 99 keep only their last two decimal digits.
pub fn to_bcd(value: u8) -> u8 {
    let value = value % 100;
    ((value / 10) << 4) | (value % 10)
}

/// Unpack one BCD byte.
///
/// The result is meaningless when either nibble exceeds 9; check
/// [`is_valid_bcd`] first when the byte comes off the wire.
pub fn from_bcd(byte: u8) -> u8 {
    ((byte >> 4) & 0x0F) * 10 + (byte & 0x0F)
}

/// True when both nibbles are decimal digits.
pub fn is_valid_bcd(byte: u8) -> bool {
    (byte >> 4) <= 9 && (byte & 0x0F) <= 9
}

/// Pack an ASCII decimal string, two digits per byte.
///
/// An odd trailing digit lands in the high nibble with a zero low nibble.
/// Returns `None` if the string contains anything but `0-9`.
pub fn encode_digits(digits: &str) -> Option<Vec<u8>> {
    let digits = digits.as_bytes();
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    Some(
        digits
            .chunks(2)
            .map(|pair| {
                let high = (pair[0] - b'0') << 4;
                let low = pair.get(1).map_or(0, |d| d - b'0');
                high | low
            })
            .collect(),
    )
}

/// Unpack BCD bytes into an ASCII decimal string, two digits per byte.
///
/// Returns `None` if any nibble is not a decimal digit.
pub fn decode_digits(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        if !is_valid_bcd(byte) {
            return None;
        }
        out.push(char::from(b'0' + (byte >> 4)));
        out.push(char::from(b'0' + (byte & 0x0F)));
    }
    Some(out)
}

/// Encode `value` as a `byte_count`-byte BCD integer.
///
/// Digits that do not fit are dropped from the most significant end.
pub fn encode_int(mut value: u64, byte_count: usize) -> Vec<u8> {
    let mut out = vec![0u8; byte_count];
    for slot in out.iter_mut().rev() {
        *slot = to_bcd((value % 100) as u8);
        value /= 100;
    }
    out
}

/// Decode a multi-byte BCD integer, most significant byte first.
pub fn decode_int(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| acc.wrapping_mul(100).wrapping_add(u64::from(from_bcd(b))))
}
