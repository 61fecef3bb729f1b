//! Bit-level helpers shared by the OBU parsers.

use std::io;

use bytes_util::{BitReader, BitWriter};

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn check_range(name: &str, value: u64, min: u32, max: u32) -> io::Result<()> {
    if value < u64::from(min) || value > u64::from(max) {
        return Err(invalid_data(format!("{name} value {value} outside of {min}..={max}")));
    }
    Ok(())
}

/// `FloorLog2(x)`, with `floor_log2(0) == 0`.
pub const fn floor_log2(value: u64) -> u32 {
    if value == 0 { 0 } else { 63 - value.leading_zeros() }
}

/// `tile_log2(blkSize, target)`
/// AV1-Spec-2 - 5.9.15
///
/// Smallest `k` such that `blk_size << k >= target`.
pub fn tile_log2(blk_size: u32, target: u32) -> u32 {
    let mut k = 0;
    while (u64::from(blk_size) << k) < u64::from(target) {
        k += 1;
    }
    k
}

/// Read a little-endian variable-length integer.
/// AV1-Spec-2 - 4.10.5
///
/// Conforming bitstreams produce values `<= (1 << 32) - 1`.
/// This function rejects values exceeding that limit.
pub fn read_leb128<T: io::Read>(reader: &mut BitReader<T>) -> io::Result<u64> {
    let mut result = 0;
    for i in 0..8 {
        let byte = reader.read_bits(8)?;
        result |= (byte & 0x7f) << (i * 7);
        if byte & 0x80 == 0 {
            break;
        }
    }
    if result > u32::MAX as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "LEB128 value exceeds u32::MAX",
        ));
    }
    Ok(result)
}

/// Write a little-endian variable-length integer.
/// AV1-Spec-2 - 4.10.5
///
/// Returns the number of bytes written (1-8).
pub fn write_leb128<W: io::Write>(writer: &mut W, mut value: u64) -> io::Result<usize> {
    let mut bytes_written = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        bytes_written += 1;
        if value == 0 {
            break;
        }
    }
    Ok(bytes_written)
}

/// Returns the number of bytes needed to encode `value` as LEB128.
pub fn leb128_size(mut value: u64) -> usize {
    let mut size = 1;
    while value >= 0x80 {
        value >>= 7;
        size += 1;
    }
    size
}

/// Read a variable-length unsigned integer and check it against `min..=max`.
/// AV1-Spec-2 - 4.10.3
///
/// 32 or more leading zeros decode to `u32::MAX` without reading a suffix.
pub fn read_uvlc<T: io::Read>(reader: &mut BitReader<T>, min: u32, max: u32) -> io::Result<u32> {
    let mut leading_zeros = 0u32;
    while !reader.read_bit()? {
        leading_zeros = leading_zeros.saturating_add(1);
    }

    let value = if leading_zeros >= 32 {
        u64::from(u32::MAX)
    } else {
        reader.read_bits(leading_zeros as u8)? + (1 << leading_zeros) - 1
    };

    check_range("uvlc", value, min, max)?;
    Ok(value as u32)
}

/// Write a variable-length unsigned integer.
/// AV1-Spec-2 - 4.10.3
///
/// `u32::MAX` is written as 32 zeros followed by the marker bit.
pub fn write_uvlc<W: io::Write>(writer: &mut BitWriter<W>, value: u32, min: u32, max: u32) -> io::Result<()> {
    check_range("uvlc", u64::from(value), min, max)?;

    if value == u32::MAX {
        writer.write_bits(0, 32)?;
        return writer.write_bit(true);
    }

    let coded = u64::from(value) + 1;
    let leading_zeros = floor_log2(coded) as u8;
    writer.write_bits(0, leading_zeros)?;
    writer.write_bits(coded, leading_zeros + 1)
}

struct NsParams {
    w: u8,
    m: u64,
}

fn ns_params(n: u32) -> io::Result<NsParams> {
    if n == 0 {
        return Err(invalid_data("ns(n) requires n > 0"));
    }
    let w = floor_log2(u64::from(n)) + 1;
    Ok(NsParams {
        w: w as u8,
        m: (1u64 << w) - u64::from(n),
    })
}

/// Read a non-symmetric unsigned value in `0..n`.
/// AV1-Spec-2 - 4.10.7
pub fn read_ns<T: io::Read>(reader: &mut BitReader<T>, n: u32) -> io::Result<u32> {
    let NsParams { w, m } = ns_params(n)?;
    let v = reader.read_bits(w - 1)?;
    if v < m {
        return Ok(v as u32);
    }
    let extra_bit = u64::from(reader.read_bit()?);
    Ok(((v << 1) - m + extra_bit) as u32)
}

/// Write a non-symmetric unsigned value in `0..n`.
/// AV1-Spec-2 - 4.10.7
pub fn write_ns<W: io::Write>(writer: &mut BitWriter<W>, value: u32, n: u32) -> io::Result<()> {
    let NsParams { w, m } = ns_params(n)?;
    if value >= n {
        return Err(invalid_data(format!("ns value {value} outside of 0..{n}")));
    }

    let value = u64::from(value);
    if value < m {
        return writer.write_bits(value, w - 1);
    }

    let v = m + ((value - m) >> 1);
    writer.write_bits(v, w - 1)?;
    writer.write_bit((value - m) & 1 == 1)
}

/// Read a unary increment starting at `min` that stops at a `0` bit or at `max`.
///
/// This is the `increment_tile_cols_log2` style loop.
pub fn read_increment<T: io::Read>(reader: &mut BitReader<T>, min: u32, max: u32) -> io::Result<u32> {
    let mut value = min;
    while value < max {
        if !reader.read_bit()? {
            break;
        }
        value += 1;
    }
    Ok(value)
}

/// Write a unary increment, the inverse of [`read_increment`].
pub fn write_increment<W: io::Write>(writer: &mut BitWriter<W>, value: u32, min: u32, max: u32) -> io::Result<()> {
    check_range("increment", u64::from(value), min, max.max(min))?;

    for _ in min..value {
        writer.write_bit(true)?;
    }
    if value < max {
        writer.write_bit(false)?;
    }
    Ok(())
}

struct SubexpBin {
    len: u32,
    range_bits: u8,
    offset: u32,
}

impl SubexpBin {
    const fn new(len: u32) -> Self {
        if len > 0 {
            Self {
                len,
                range_bits: (2 + len) as u8,
                offset: 1 << (2 + len),
            }
        } else {
            Self {
                len,
                range_bits: 3,
                offset: 0,
            }
        }
    }
}

fn subexp_max_len(range_max: u32) -> io::Result<u32> {
    if range_max == 0 {
        return Err(invalid_data("subexp requires range_max > 0"));
    }
    Ok(floor_log2(u64::from(range_max - 1)).saturating_sub(3))
}

/// Read a subexponential value in `0..range_max`.
///
/// Values are split into exponentially growing bins: a unary bin index is
/// followed by raw bits, except for the top bin which is coded with `ns()`.
pub fn read_subexp<T: io::Read>(reader: &mut BitReader<T>, range_max: u32) -> io::Result<u32> {
    let max_len = subexp_max_len(range_max)?;
    let bin = SubexpBin::new(read_increment(reader, 0, max_len)?);

    let value = if bin.len < max_len {
        reader.read_bits(bin.range_bits)? as u32
    } else {
        read_ns(reader, range_max - bin.offset)?
    };

    Ok(value + bin.offset)
}

/// Write a subexponential value in `0..range_max`, the inverse of [`read_subexp`].
pub fn write_subexp<W: io::Write>(writer: &mut BitWriter<W>, value: u32, range_max: u32) -> io::Result<()> {
    let max_len = subexp_max_len(range_max)?;
    if value >= range_max {
        return Err(invalid_data(format!("subexp value {value} outside of 0..{range_max}")));
    }

    let natural_len = if value < 8 { 0 } else { floor_log2(u64::from(value)) - 2 };
    // Everything past the last raw bin is coded in the top bin.
    let bin = SubexpBin::new(natural_len.min(max_len));

    write_increment(writer, bin.len, 0, max_len)?;
    if bin.len < max_len {
        writer.write_bits(u64::from(value - bin.offset), bin.range_bits)
    } else {
        write_ns(writer, value - bin.offset, range_max - bin.offset)
    }
}

/// Read an `n` byte little-endian value.
/// AV1-Spec-2 - 4.10.4
pub fn read_le<T: io::Read>(reader: &mut BitReader<T>, n: u8) -> io::Result<u64> {
    if n > 8 {
        return Err(invalid_data(format!("le({n}) exceeds 8 bytes")));
    }
    let mut value = 0u64;
    for i in 0..n {
        value |= reader.read_bits(8)? << (8 * u32::from(i));
    }
    Ok(value)
}

/// Write an `n` byte little-endian value.
pub fn write_le<W: io::Write>(writer: &mut BitWriter<W>, value: u64, n: u8) -> io::Result<()> {
    if n > 8 || (n < 8 && value >> (8 * u32::from(n)) != 0) {
        return Err(invalid_data(format!("{value} does not fit in le({n})")));
    }
    for i in 0..n {
        writer.write_bits((value >> (8 * u32::from(i))) & 0xff, 8)?;
    }
    Ok(())
}

/// Bit position of the `trailing_one_bit` in an OBU payload.
///
/// Everything before the returned offset is header content.
pub fn trailing_bits_position(payload: &[u8]) -> io::Result<u64> {
    let (idx, byte) = payload
        .iter()
        .enumerate()
        .rev()
        .find(|(_, byte)| **byte != 0)
        .ok_or_else(|| invalid_data("payload has no trailing one bit"))?;

    Ok(idx as u64 * 8 + u64::from(7 - byte.trailing_zeros()))
}
