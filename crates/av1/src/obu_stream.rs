//! Low-overhead OBU bitstream iteration.
//!
//! A temporal unit in the low-overhead format (Section 5.2) is a plain
//! concatenation of OBUs with `obu_has_size_field=1`. Every OBU yielded here
//! remembers where it sits in the unit, so tile payloads can later be
//! addressed by absolute byte offset.

use std::io;

use bytes::Bytes;
use bytes_util::BytesCursorExt;

use crate::error::{Av1Error, Result};
use crate::obu::{ObuExtensionHeader, ObuHeader, ObuType};

/// A single OBU with its header and payload data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obu {
    /// Parsed OBU header.
    pub header: ObuHeader,
    /// Offset of the first header byte in the temporal unit.
    pub offset: usize,
    /// Header bytes including the `obu_size` field.
    pub header_len: usize,
    /// Raw OBU payload (not including the header or size field).
    pub data: Bytes,
}

impl Obu {
    /// Offset of the payload in the temporal unit.
    pub const fn payload_offset(&self) -> usize {
        self.offset + self.header_len
    }

    /// Total bytes of this OBU in the temporal unit.
    pub fn unit_size(&self) -> usize {
        self.header_len + self.data.len()
    }
}

/// Iterator over OBUs in a low-overhead bitstream.
///
/// Each call to `next()` parses one OBU header and extracts its payload.
/// Requires `obu_has_size_field=1` for all OBUs.
pub struct ObuIterator<'a> {
    reader: &'a mut io::Cursor<Bytes>,
}

impl<'a> ObuIterator<'a> {
    /// Creates a new iterator over OBUs in a low-overhead bitstream.
    pub fn new(reader: &'a mut io::Cursor<Bytes>) -> Self {
        Self { reader }
    }
}

impl Iterator for ObuIterator<'_> {
    type Item = Result<Obu>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.remaining_len() == 0 {
            return None;
        }

        Some(parse_obu(self.reader))
    }
}

/// Parses a single OBU from a `Cursor<Bytes>`, using zero-copy for the payload.
fn parse_obu(reader: &mut io::Cursor<Bytes>) -> Result<Obu> {
    let offset = reader.position() as usize;
    let header = ObuHeader::parse(reader).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => Av1Error::InvalidObu(format!("truncated OBU header at byte {offset}")),
        _ => Av1Error::from(err),
    })?;

    let size = header.size.ok_or_else(|| {
        Av1Error::InvalidObu(format!(
            "obu_has_size_field must be 1 in low-overhead bitstream (OBU at byte {offset})"
        ))
    })?;
    let header_len = reader.position() as usize - offset;

    let available = reader.remaining_len();
    let data = reader
        .extract_bytes(size as usize)
        .map_err(|_| Av1Error::UnexpectedEof {
            expected: size as usize,
            actual: available,
        })?;

    Ok(Obu {
        header,
        offset,
        header_len,
        data,
    })
}

/// Writes a single OBU in low-overhead bitstream format.
///
/// Constructs the OBU header with `obu_has_size_field=1` and writes the
/// header followed by the payload data.
///
/// Returns the total number of bytes written (header + payload).
pub fn write_obu<W: io::Write>(
    writer: &mut W,
    obu_type: ObuType,
    extension_header: Option<ObuExtensionHeader>,
    payload: &[u8],
) -> Result<usize> {
    let header = ObuHeader {
        obu_type,
        size: Some(payload.len() as u64),
        extension_header,
    };

    let header_bytes = header.mux(writer)?;
    writer.write_all(payload)?;

    Ok(header_bytes + payload.len())
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_obu() {
        // Sequence header OBU: type=1, has_size=1, size=15
        let data = b"\n\x0f\0\0\0j\xef\xbf\xe1\xbc\x02\x19\x90\x10\x10\x10@";
        let mut cursor = io::Cursor::new(Bytes::from_static(data));

        let mut iter = ObuIterator::new(&mut cursor);
        let obu = iter.next().unwrap().unwrap();
        assert_eq!(obu.header.obu_type, ObuType::SequenceHeader);
        assert_eq!(obu.header.size, Some(15));
        assert_eq!(obu.data.len(), 15);
        assert_eq!((obu.offset, obu.header_len, obu.unit_size()), (0, 2, 17));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_offsets_across_obus() {
        let mut data = Vec::new();
        write_obu(&mut data, ObuType::TemporalDelimiter, None, &[]).unwrap();
        write_obu(&mut data, ObuType::SequenceHeader, None, &[0xAA, 0xBB]).unwrap();
        write_obu(
            &mut data,
            ObuType::TileGroup,
            Some(ObuExtensionHeader {
                temporal_id: 2,
                spatial_id: 1,
            }),
            &[0x11; 200],
        )
        .unwrap();

        let mut cursor = io::Cursor::new(Bytes::from(data));
        let obus = ObuIterator::new(&mut cursor).collect::<Result<Vec<_>>>().unwrap();

        let layout: Vec<_> = obus
            .iter()
            .map(|obu| (obu.header.obu_type, obu.offset, obu.payload_offset(), obu.unit_size()))
            .collect();
        assert_eq!(
            layout,
            vec![
                (ObuType::TemporalDelimiter, 0, 2, 2),
                (ObuType::SequenceHeader, 2, 4, 4),
                // two header bytes and a two byte leb128 size
                (ObuType::TileGroup, 6, 10, 204),
            ]
        );
        assert_eq!(obus[2].header.temporal_id(), 2);
        assert_eq!(obus[2].header.spatial_id(), 1);
    }

    #[test]
    fn test_empty_stream() {
        let mut cursor = io::Cursor::new(Bytes::new());
        let mut iter = ObuIterator::new(&mut cursor);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_truncated_payload() {
        // tile group claiming 16 payload bytes, 2 present
        let data = [0x22, 0x10, 0x00, 0x00];
        let mut cursor = io::Cursor::new(Bytes::from(data.to_vec()));
        let err = ObuIterator::new(&mut cursor).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Av1Error::UnexpectedEof {
                expected: 16,
                actual: 2,
            }
        ));
        assert!(err.is_invalid_data());
    }

    #[test]
    fn test_obu_without_size_field_errors() {
        // OBU header byte: type=1, extension=0, has_size=0, reserved=0
        // 0b0_0001_0_0_0 = 0x08
        let data = [0x08, 0xFF];
        let mut cursor = io::Cursor::new(Bytes::from(data.to_vec()));
        let mut iter = ObuIterator::new(&mut cursor);
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err, Av1Error::InvalidObu(_)));
    }
}
