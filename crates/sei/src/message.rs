//! SEI message framing.
//!
//! An SEI RBSP is a sequence of messages followed by `rbsp_trailing_bits()`.
//! Each message starts with its payload type and payload size, both coded as
//! a run of `0xFF` bytes (255 each) ended by one byte below `0xFF`:
//!
//! ```text
//! ff ff 2d | 05 | 5 payload bytes     type 555, size 5
//! ```

use std::io;

use bytes::Bytes;
use bytes_util::BytesCursorExt;

use crate::error::{Result, SeiError};

/// `rbsp_stop_one_bit` followed by alignment zeros.
pub const RBSP_TRAILING_BITS: u8 = 0x80;

/// One SEI message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiMessage {
    /// `payloadType`.
    pub payload_type: u32,
    /// Offset of the message's first byte in the RBSP.
    pub offset: usize,
    /// The `sei_payload()` bytes.
    pub payload: Bytes,
}

impl SeiMessage {
    /// Creates a message for writing.
    pub fn new(payload_type: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            payload_type,
            offset: 0,
            payload: payload.into(),
        }
    }

    /// Writes the message framing and payload, returning the bytes written.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = write_ff_coded(writer, self.payload_type)?;
        written += write_ff_coded(writer, self.payload.len() as u32)?;
        writer.write_all(&self.payload)?;
        Ok(written + self.payload.len())
    }
}

/// Iterator over the messages of an SEI RBSP.
///
/// Iteration stops at the trailing bits. Truncated framing yields one error
/// and ends the iteration.
pub struct SeiReader {
    cursor: io::Cursor<Bytes>,
    failed: bool,
}

impl SeiReader {
    /// Creates a reader over an SEI RBSP with emulation prevention removed.
    pub fn new(rbsp: Bytes) -> Self {
        Self {
            cursor: io::Cursor::new(rbsp),
            failed: false,
        }
    }

    /// `more_rbsp_data()` for the message loop.
    fn more_data(&self) -> bool {
        let pos = self.cursor.position() as usize;
        match self.cursor.get_ref().get(pos..) {
            None | Some([]) => false,
            Some([RBSP_TRAILING_BITS, rest @ ..]) => rest.iter().any(|byte| *byte != 0),
            Some(_) => true,
        }
    }

    fn read_ff_coded(&mut self) -> Result<u32> {
        let mut value = 0u32;
        loop {
            let offset = self.cursor.position() as usize;
            let byte = self.cursor.extract_bytes(1).map_err(|_| SeiError::Truncated {
                offset,
                needed: 1,
                available: 0,
            })?[0];
            value = value.saturating_add(u32::from(byte));
            if byte != 0xFF {
                return Ok(value);
            }
        }
    }

    fn read_message(&mut self) -> Result<SeiMessage> {
        let offset = self.cursor.position() as usize;
        let payload_type = self.read_ff_coded()?;
        let payload_size = self.read_ff_coded()? as usize;

        let payload_offset = self.cursor.position() as usize;
        let available = self.cursor.remaining_len();
        let payload = self
            .cursor
            .extract_bytes(payload_size)
            .map_err(|_| SeiError::Truncated {
                offset: payload_offset,
                needed: payload_size,
                available,
            })?;

        Ok(SeiMessage {
            payload_type,
            offset,
            payload,
        })
    }
}

impl Iterator for SeiReader {
    type Item = Result<SeiMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.more_data() {
            return None;
        }

        let message = self.read_message();
        self.failed = message.is_err();
        Some(message)
    }
}

fn write_ff_coded<W: io::Write>(writer: &mut W, mut value: u32) -> io::Result<usize> {
    let mut written = 0;
    while value >= 0xFF {
        writer.write_all(&[0xFF])?;
        value -= 0xFF;
        written += 1;
    }
    writer.write_all(&[value as u8])?;
    Ok(written + 1)
}

/// Builds an SEI RBSP from `messages`, trailing bits included.
pub fn write_rbsp<'a>(messages: impl IntoIterator<Item = &'a SeiMessage>) -> Bytes {
    let mut rbsp = Vec::new();
    for message in messages {
        // Writing to a Vec cannot fail.
        let _ = message.write(&mut rbsp);
    }
    rbsp.push(RBSP_TRAILING_BITS);
    Bytes::from(rbsp)
}
