//! ZYBL checksum algorithm
//!
//! CRC-16 with polynomial 0x1021, initial value 0x0000, MSB first, no
//! reflection and no final XOR (the XMODEM parameterisation). Computed over
//! the data section only and packed little-endian after it.

use tracing::trace;

const POLY: u16 = 0x1021;

/// Byte-indexed lookup table, built at compile time
static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Calculate the checksum of a data section
///
/// # Examples
///
/// ```
/// use zybl_core::checksum;
///
/// assert_eq!(checksum::calculate(b"123456789"), 0x31C3);
/// ```
pub fn calculate(data: &[u8]) -> u16 {
    let checksum = data.iter().fold(0u16, |crc, &byte| {
        (crc << 8) ^ TABLE[usize::from((crc >> 8) as u8 ^ byte)]
    });
    
    trace!(
        len = data.len(),
        checksum = format!("0x{:04X}", checksum),
        "Calculated checksum"
    );
    
    checksum
}

/// Verify checksum
pub fn verify(data: &[u8], expected: u16) -> bool {
    calculate(data) == expected
}
