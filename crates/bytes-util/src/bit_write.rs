use std::io;
use std::ops::Range;

use crate::BitReader;

/// A writer that writes individual bits, most significant bit first.
///
/// Completed bytes are forwarded to the inner writer immediately, so once the
/// writer is aligned everything written so far is visible in the inner writer.
#[derive(Debug)]
pub struct BitWriter<W> {
    writer: W,
    current_byte: u8,
    /// Bits already placed into `current_byte`, `0` when aligned.
    bit_pos: u8,
    written: u64,
}

impl<W: Default> Default for BitWriter<W> {
    fn default() -> Self {
        Self::new(W::default())
    }
}

impl<W> BitWriter<W> {
    /// Creates a new bit writer.
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            current_byte: 0,
            bit_pos: 0,
            written: 0,
        }
    }

    /// Returns `true` if the writer sits on a byte boundary.
    pub const fn is_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Total number of bits written since construction.
    pub const fn bits_written(&self) -> u64 {
        self.written
    }

    /// Returns a reference to the inner writer.
    pub const fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Returns a mutable reference to the inner writer.
    ///
    /// Patching bytes through this reference is only coherent while the
    /// writer is aligned.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: io::Write> BitWriter<W> {
    /// Writes a single bit.
    pub fn write_bit(&mut self, bit: bool) -> io::Result<()> {
        if bit {
            self.current_byte |= 1 << (7 - self.bit_pos);
        }

        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.writer.write_all(&[self.current_byte])?;
            self.current_byte = 0;
            self.bit_pos = 0;
        }

        self.written += 1;
        Ok(())
    }

    /// Writes the low `count` bits (at most 64) of `value`, big-endian.
    pub fn write_bits(&mut self, value: u64, count: u8) -> io::Result<()> {
        if count > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot write more than 64 bits at once",
            ));
        }

        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 == 1)?;
        }

        Ok(())
    }

    /// Pads the current byte with zero bits.
    pub fn align(&mut self) -> io::Result<()> {
        while !self.is_aligned() {
            self.write_bit(false)?;
        }
        Ok(())
    }

    /// Aligns the writer and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.align()?;
        Ok(self.writer)
    }
}

impl<W: io::Write> io::Write for BitWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_aligned() {
            self.writer.write_all(buf)?;
            self.written += buf.len() as u64 * 8;
        } else {
            for byte in buf {
                self.write_bits(u64::from(*byte), 8)?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Copies the bits `range` (bit offsets into `src`) into `writer`.
///
/// The destination does not need to share the source alignment.
pub fn copy_bits<W: io::Write>(src: &[u8], range: Range<u64>, writer: &mut BitWriter<W>) -> io::Result<()> {
    if range.start > range.end || range.end > src.len() as u64 * 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "bit range {}..{} outside of a {} byte buffer",
                range.start,
                range.end,
                src.len()
            ),
        ));
    }

    if range.start % 8 == 0 && range.end % 8 == 0 && writer.is_aligned() {
        let bytes = &src[(range.start / 8) as usize..(range.end / 8) as usize];
        return io::Write::write_all(writer, bytes);
    }

    let mut reader = BitReader::new(io::Cursor::new(src));
    reader.skip_bits(range.start)?;

    let mut remaining = range.end - range.start;
    while remaining > 0 {
        let step = remaining.min(32) as u8;
        let value = reader.read_bits(step)?;
        writer.write_bits(value, step)?;
        remaining -= u64::from(step);
    }

    Ok(())
}
