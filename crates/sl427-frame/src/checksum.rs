//! Frame check sequence.
//!
//! A CRC over the user-data region with generator polynomial
//! x^7 + x^6 + x^5 + x^2 + 1 (`1110_0100`). The register is shifted MSB first
//! and only its low seven bits are transmitted.

/// Generator polynomial.
pub const POLYNOMIAL: u8 = 0xE4;

/// Compute the checksum byte for a user-data region.
///
/// An empty region yields `0x00`.
pub fn checksum(region: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in region {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc & 0x7F
}

/// Recompute the checksum of `region` and compare it to `declared`.
pub fn verify(region: &[u8], declared: u8) -> bool {
    checksum(region) == declared
}
