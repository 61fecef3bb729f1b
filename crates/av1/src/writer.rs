//! OBU serialization into a fixed capacity buffer.
//!
//! The payload size of an OBU is rarely known before the payload is written.
//! [`ObuWriter`] reserves the widest possible `obu_size`, writes the payload
//! behind it and then patches in the minimal leb128, moving the payload down
//! to close the gap.

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use bytes_util::{BitWriter, BoundedBuffer};

use crate::error::{Av1Error, Result};
use crate::obu::ObuHeader;
use crate::obu::utils::write_leb128;

/// Bytes reserved for `obu_size` before the payload is known.
pub const SIZE_FIELD_RESERVATION: usize = 8;

/// A reserved `obu_size` placeholder awaiting its value.
#[derive(Debug)]
#[must_use = "a reserved size field must be finalized"]
pub struct SizeField {
    offset: usize,
}

/// Writes OBUs into a [`BoundedBuffer`].
#[derive(Debug)]
pub struct ObuWriter {
    writer: BitWriter<BoundedBuffer>,
}

impl ObuWriter {
    /// Creates a writer that produces at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            writer: BitWriter::new(BoundedBuffer::new(capacity)),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.writer.get_ref().len()
    }

    /// Returns `true` if nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.writer.get_ref().is_empty()
    }

    /// The bit writer positioned at the end of the output.
    pub fn bit_writer(&mut self) -> &mut BitWriter<BoundedBuffer> {
        &mut self.writer
    }

    fn ensure_aligned(&self, what: &str) -> Result<()> {
        if self.writer.is_aligned() {
            Ok(())
        } else {
            Err(Av1Error::InvalidData(format!("{what} requires byte alignment")))
        }
    }

    /// Reserves room for an `obu_size` written later by
    /// [`finalize_size_field`](Self::finalize_size_field).
    pub fn reserve_size_field(&mut self) -> Result<SizeField> {
        self.ensure_aligned("reserving obu_size")?;
        let offset = self.len();
        // two 32-bit words
        self.writer.write_u32::<BigEndian>(0)?;
        self.writer.write_u32::<BigEndian>(0)?;
        Ok(SizeField { offset })
    }

    /// Writes everything after `field` as the OBU payload size and moves the
    /// payload to directly follow the leb128.
    ///
    /// Returns the payload size.
    pub fn finalize_size_field(&mut self, field: SizeField) -> Result<usize> {
        self.ensure_aligned("finalizing obu_size")?;
        let payload_start = field.offset + SIZE_FIELD_RESERVATION;
        let end = self.len();
        let payload_len = end - payload_start;
        if payload_len as u64 > u64::from(u32::MAX) {
            return Err(Av1Error::Leb128Overflow);
        }

        let mut leb128 = io::Cursor::new([0u8; SIZE_FIELD_RESERVATION]);
        let leb128_len = write_leb128(&mut leb128, payload_len as u64)?;

        let buffer = self.writer.get_mut();
        buffer.patch(field.offset, &leb128.get_ref()[..leb128_len])?;
        buffer.copy_within(payload_start..end, field.offset + leb128_len)?;
        buffer.truncate(field.offset + leb128_len + payload_len);

        Ok(payload_len)
    }

    /// `trailing_bits()`: a one bit, then zeros up to the byte boundary.
    pub fn trailing_bits(&mut self) -> Result<()> {
        self.writer.write_bit(true)?;
        self.writer.align()?;
        Ok(())
    }

    /// Writes one complete OBU.
    ///
    /// The header is written with `obu_has_size_field=1`, `payload` fills in
    /// the content and the size is backpatched. With `trailing_bits` the
    /// payload is closed by `trailing_bits()`, otherwise it must end on a
    /// byte boundary.
    ///
    /// Returns the payload size.
    pub fn write_obu<F>(&mut self, header: &ObuHeader, trailing_bits: bool, payload: F) -> Result<usize>
    where
        F: FnOnce(&mut BitWriter<BoundedBuffer>) -> Result<()>,
    {
        self.ensure_aligned("starting an OBU")?;
        header.mux_without_size(&mut self.writer)?;
        let size_field = self.reserve_size_field()?;

        payload(&mut self.writer)?;
        if trailing_bits {
            self.trailing_bits()?;
        }
        self.ensure_aligned("ending an OBU")?;

        self.finalize_size_field(size_field)
    }

    /// Appends already serialized bytes.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    /// The written bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.writer.get_ref().as_slice()
    }

    /// Consumes the writer and returns the output.
    pub fn finish(self) -> Result<Bytes> {
        Ok(self.writer.finish()?.freeze())
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::obu::ObuType;
    use crate::obu_stream::ObuIterator;

    fn header(obu_type: ObuType) -> ObuHeader {
        ObuHeader {
            obu_type,
            size: None,
            extension_header: None,
        }
    }

    #[rstest]
    #[case(0, 1)]
    #[case(10, 1)]
    #[case(127, 1)]
    #[case(128, 2)]
    #[case(200, 2)]
    #[case(20000, 3)]
    fn test_size_backpatch(#[case] len: usize, #[case] leb128_len: usize) {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();

        let mut writer = ObuWriter::new(64 * 1024);
        let size = writer
            .write_obu(&header(ObuType::TileGroup), false, |w| {
                w.write_all(&payload)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(size, len);
        assert_eq!(writer.len(), 1 + leb128_len + len);

        let out = writer.finish().unwrap();
        let mut cursor = io::Cursor::new(out.clone());
        let obu = ObuIterator::new(&mut cursor).next().unwrap().unwrap();
        assert_eq!(obu.header.size, Some(len as u64));
        assert_eq!(obu.data.as_ref(), payload.as_slice());
        assert_eq!(&out[1 + leb128_len..], payload.as_slice());
    }

    #[test]
    fn test_obu_sequence() {
        let mut writer = ObuWriter::new(256);
        writer
            .write_obu(&header(ObuType::TemporalDelimiter), false, |_| Ok(()))
            .unwrap();
        writer
            .write_obu(&header(ObuType::FrameHeader), true, |w| {
                w.write_bits(0b101, 3)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(
            writer.finish().unwrap(),
            Bytes::from_static(&[0x12, 0x00, 0x1a, 0x01, 0b1011_0000])
        );
    }

    #[test]
    fn test_unaligned_payload_rejected() {
        let mut writer = ObuWriter::new(256);
        let err = writer
            .write_obu(&header(ObuType::TileGroup), false, |w| {
                w.write_bit(true)?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_invalid_data());
    }

    #[test]
    fn test_no_space() {
        // header and reservation fit, the payload does not
        let mut writer = ObuWriter::new(12);
        let err = writer
            .write_obu(&header(ObuType::TileGroup), false, |w| {
                w.write_all(&[0u8; 8])?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_no_space(), "{err:?}");

        // the reservation itself does not fit
        let mut writer = ObuWriter::new(4);
        let err = writer
            .write_obu(&header(ObuType::TemporalDelimiter), false, |_| Ok(()))
            .unwrap_err();
        assert!(err.is_no_space(), "{err:?}");

        // the final output would fit but the reservation needs 8 bytes
        let mut writer = ObuWriter::new(9);
        assert!(
            writer
                .write_obu(&header(ObuType::TemporalDelimiter), false, |_| Ok(()))
                .is_ok()
        );
        assert_eq!(writer.as_slice(), &[0x12, 0x00]);
    }
}
