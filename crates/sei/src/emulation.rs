//! Emulation prevention for NAL unit payloads.
//!
//! Inside a NAL unit, `00 00` followed by a byte in `00..=03` is escaped by
//! inserting `emulation_prevention_three_byte` (`03`) after the zeros.

/// Strips emulation prevention bytes, turning a NAL unit payload into its RBSP.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        rbsp.push(byte);
    }

    rbsp
}

/// Escapes an RBSP for carriage in a NAL unit.
pub fn insert_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0;

    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            data.push(0x03);
            zeros = 0;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        data.push(byte);
    }

    data
}
