//! Declarative syntax element descriptors.
//!
//! A [`Field`] describes how one syntax element is coded together with its
//! legal range. The same descriptor drives both [`decode_field`] and
//! [`encode_field`], and syntax functions written against [`SyntaxIo`] run
//! unchanged in both directions.

use std::io;

use bytes_util::{BitReader, BitWriter};

use super::utils::{
    read_increment, read_le, read_leb128, read_ns, read_subexp, read_uvlc, write_increment, write_le,
    write_leb128, write_ns, write_subexp, write_uvlc,
};

/// The coding of a syntax element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    /// `f(n)`, fixed width big-endian.
    Bits(u8),
    /// `le(n)`, `n` little-endian bytes.
    Le(u8),
    /// `leb128()`
    Leb128,
    /// `uvlc()`
    Uvlc,
    /// `ns(n)`
    Ns(u32),
    /// Unary increment between the field's `min` and `max`.
    Increment,
    /// Subexponential code in `0..range_max`.
    Subexp(u32),
}

/// A syntax element: its name, coding and legal value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Syntax element name, used in error messages.
    pub name: &'static str,
    /// How the value is coded.
    pub coding: Coding,
    /// Smallest legal value.
    pub min: u32,
    /// Largest legal value.
    pub max: u32,
}

const fn bits_max(n: u8) -> u32 {
    if n >= 32 { u32::MAX } else { (1 << n) - 1 }
}

impl Field {
    /// `f(n)` with the full `n` bit range.
    pub const fn bits(name: &'static str, n: u8) -> Self {
        Self {
            name,
            coding: Coding::Bits(n),
            min: 0,
            max: bits_max(n),
        }
    }

    /// A single bit flag.
    pub const fn flag(name: &'static str) -> Self {
        Self::bits(name, 1)
    }

    /// `le(n)` with the full range of `n` bytes.
    pub const fn le(name: &'static str, n: u8) -> Self {
        Self {
            name,
            coding: Coding::Le(n),
            min: 0,
            max: bits_max(n.saturating_mul(8)),
        }
    }

    /// `leb128()`
    pub const fn leb128(name: &'static str) -> Self {
        Self {
            name,
            coding: Coding::Leb128,
            min: 0,
            max: u32::MAX,
        }
    }

    /// `uvlc()`
    pub const fn uvlc(name: &'static str) -> Self {
        Self {
            name,
            coding: Coding::Uvlc,
            min: 0,
            max: u32::MAX,
        }
    }

    /// `ns(n)`, values in `0..n`.
    pub const fn ns(name: &'static str, n: u32) -> Self {
        Self {
            name,
            coding: Coding::Ns(n),
            min: 0,
            max: n.saturating_sub(1),
        }
    }

    /// Unary increment in `min..=max`.
    pub const fn increment(name: &'static str, min: u32, max: u32) -> Self {
        Self {
            name,
            coding: Coding::Increment,
            min,
            max,
        }
    }

    /// Subexponential code, values in `0..range_max`.
    pub const fn subexp(name: &'static str, range_max: u32) -> Self {
        Self {
            name,
            coding: Coding::Subexp(range_max),
            min: 0,
            max: range_max.saturating_sub(1),
        }
    }

    /// Narrows the legal range.
    pub const fn with_range(mut self, min: u32, max: u32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    fn check(&self, value: u64) -> io::Result<u32> {
        if value < u64::from(self.min) || value > u64::from(self.max) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} value {value} outside of {}..={}",
                    self.name, self.min, self.max
                ),
            ));
        }
        Ok(value as u32)
    }
}

/// Reads one syntax element.
pub fn decode_field<T: io::Read>(reader: &mut BitReader<T>, field: &Field) -> io::Result<u32> {
    let value = match field.coding {
        Coding::Bits(n) => reader.read_bits(n)?,
        Coding::Le(n) => read_le(reader, n)?,
        Coding::Leb128 => read_leb128(reader)?,
        Coding::Uvlc => u64::from(read_uvlc(reader, 0, u32::MAX)?),
        Coding::Ns(n) => u64::from(read_ns(reader, n)?),
        Coding::Increment => u64::from(read_increment(reader, field.min, field.max)?),
        Coding::Subexp(range_max) => u64::from(read_subexp(reader, range_max)?),
    };
    field.check(value)
}

/// Writes one syntax element.
pub fn encode_field<W: io::Write>(writer: &mut BitWriter<W>, field: &Field, value: u32) -> io::Result<()> {
    field.check(u64::from(value))?;
    match field.coding {
        Coding::Bits(n) => writer.write_bits(u64::from(value), n),
        Coding::Le(n) => write_le(writer, u64::from(value), n),
        Coding::Leb128 => write_leb128(writer, u64::from(value)).map(|_| ()),
        Coding::Uvlc => write_uvlc(writer, value, 0, u32::MAX),
        Coding::Ns(n) => write_ns(writer, value, n),
        Coding::Increment => write_increment(writer, value, field.min, field.max),
        Coding::Subexp(range_max) => write_subexp(writer, value, range_max),
    }
}

/// A syntax direction: reading fills `value`, writing emits it.
pub trait SyntaxIo {
    /// Processes one syntax element.
    fn field(&mut self, field: &Field, value: &mut u32) -> io::Result<()>;

    /// Processes a one bit flag.
    fn flag(&mut self, field: &Field, value: &mut bool) -> io::Result<()> {
        let mut raw = u32::from(*value);
        self.field(field, &mut raw)?;
        *value = raw != 0;
        Ok(())
    }

    /// `byte_alignment()`, zero bits up to the next byte boundary.
    fn byte_alignment(&mut self) -> io::Result<()>;
}

/// Runs syntax functions in the reading direction.
pub struct FieldReader<'a, T>(pub &'a mut BitReader<T>);

impl<T: io::Read> SyntaxIo for FieldReader<'_, T> {
    fn field(&mut self, field: &Field, value: &mut u32) -> io::Result<()> {
        *value = decode_field(self.0, field)?;
        Ok(())
    }

    fn byte_alignment(&mut self) -> io::Result<()> {
        while !self.0.is_aligned() {
            if self.0.read_bit()? {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "non-zero byte_alignment bit",
                ));
            }
        }
        Ok(())
    }
}

/// Runs syntax functions in the writing direction.
pub struct FieldWriter<'a, W>(pub &'a mut BitWriter<W>);

impl<W: io::Write> SyntaxIo for FieldWriter<'_, W> {
    fn field(&mut self, field: &Field, value: &mut u32) -> io::Result<()> {
        encode_field(self.0, field, *value)
    }

    fn byte_alignment(&mut self) -> io::Result<()> {
        self.0.align()
    }
}
