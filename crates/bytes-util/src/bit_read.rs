use std::io;

/// A reader that reads individual bits, most significant bit first.
///
/// Bytes are pulled from the inner reader one at a time, so wrapping an
/// `io::Cursor` leaves the cursor positioned right after the last byte that
/// was (partially) consumed.
#[derive(Debug)]
pub struct BitReader<T> {
    data: T,
    current_byte: u8,
    /// Bits already consumed from `current_byte`, `0` when aligned.
    bit_pos: u8,
    consumed: u64,
}

impl<T> BitReader<T> {
    /// Creates a new bit reader.
    pub const fn new(data: T) -> Self {
        Self {
            data,
            current_byte: 0,
            bit_pos: 0,
            consumed: 0,
        }
    }

    /// Returns `true` if the reader sits on a byte boundary.
    pub const fn is_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Total number of bits consumed since construction.
    pub const fn bits_read(&self) -> u64 {
        self.consumed
    }

    /// Returns a reference to the inner reader.
    pub const fn get_ref(&self) -> &T {
        &self.data
    }

    /// Consumes the bit reader and returns the inner reader.
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: io::Read> BitReader<T> {
    fn next_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        match self.data.read(&mut byte)? {
            0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("bitstream exhausted after {} bits", self.consumed),
            )),
            _ => Ok(byte[0]),
        }
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> io::Result<bool> {
        if self.bit_pos == 0 {
            self.current_byte = self.next_byte()?;
        }

        let bit = (self.current_byte >> (7 - self.bit_pos)) & 1 == 1;
        self.bit_pos = (self.bit_pos + 1) % 8;
        self.consumed += 1;
        Ok(bit)
    }

    /// Reads `count` bits (at most 64) as an unsigned big-endian value.
    pub fn read_bits(&mut self, count: u8) -> io::Result<u64> {
        if count > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot read more than 64 bits at once",
            ));
        }

        let mut value = 0u64;
        let mut remaining = count;

        // Fast path for whole bytes once aligned.
        while remaining > 0 {
            if self.bit_pos == 0 && remaining >= 8 {
                let byte = self.next_byte()?;
                value = (value << 8) | u64::from(byte);
                self.consumed += 8;
                remaining -= 8;
            } else {
                value = (value << 1) | u64::from(self.read_bit()?);
                remaining -= 1;
            }
        }

        Ok(value)
    }

    /// Skips `count` bits.
    pub fn skip_bits(&mut self, mut count: u64) -> io::Result<()> {
        while count > 0 {
            let step = count.min(64) as u8;
            self.read_bits(step)?;
            count -= u64::from(step);
        }
        Ok(())
    }

    /// Discards the remaining bits of the current byte.
    pub fn align(&mut self) {
        if self.bit_pos != 0 {
            self.consumed += u64::from(8 - self.bit_pos);
            self.bit_pos = 0;
        }
    }
}

impl<T: io::Read> io::Read for BitReader<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_aligned() {
            let read = self.data.read(buf)?;
            self.consumed += read as u64 * 8;
            return Ok(read);
        }

        for (idx, slot) in buf.iter_mut().enumerate() {
            match self.read_bits(8) {
                Ok(byte) => *slot = byte as u8,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(idx),
                Err(err) => return Err(err),
            }
        }

        Ok(buf.len())
    }
}
