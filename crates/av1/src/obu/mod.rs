use std::io;
use std::ops::Range;

use bytes_util::{BitReader, BitWriter};
use field::{Field, decode_field, encode_field};
use utils::{read_leb128, write_leb128};

pub mod field;
pub mod frame;
pub mod seq;
#[cfg(test)]
pub(crate) mod testing;
pub mod tile;
pub mod utils;

/// A half-open range of bit offsets inside an OBU payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitSpan {
    /// First bit of the span.
    pub start: u64,
    /// One past the last bit of the span.
    pub end: u64,
}

impl BitSpan {
    /// Creates a span covering `start..end`.
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bits covered.
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the span covers no bits.
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The span as a range.
    pub const fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// `obu_header()`, AV1 5.3.2.
///
/// ```text
/// forbidden(1) | obu_type(4) | extension_flag(1) | has_size_field(1) | reserved(1)
/// [temporal_id(3) | spatial_id(2) | reserved(3)]
/// [obu_size leb128]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct ObuHeader {
    /// `obu_type`
    pub obu_type: ObuType,
    /// `obu_size`, present when `obu_has_size_field` is 1.
    pub size: Option<u64>,
    /// `obu_extension_header()`, present when `obu_extension_flag` is 1.
    pub extension_header: Option<ObuExtensionHeader>,
}

/// `obu_extension_header()`, AV1 5.3.3.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct ObuExtensionHeader {
    /// `temporal_id`
    pub temporal_id: u8,
    /// `spatial_id`
    pub spatial_id: u8,
}

const FORBIDDEN_BIT: Field = Field::flag("obu_forbidden_bit").with_range(0, 0);
const OBU_TYPE: Field = Field::bits("obu_type", 4);
const EXTENSION_FLAG: Field = Field::flag("obu_extension_flag");
const HAS_SIZE_FIELD: Field = Field::flag("obu_has_size_field");
const RESERVED_1BIT: Field = Field::flag("obu_reserved_1bit");
const TEMPORAL_ID: Field = Field::bits("temporal_id", 3);
const SPATIAL_ID: Field = Field::bits("spatial_id", 2);
const EXTENSION_RESERVED: Field = Field::bits("extension_header_reserved_3bits", 3);

impl ObuHeader {
    /// Parses an OBU header, `obu_size` included, from `reader`.
    pub fn parse(reader: &mut impl io::Read) -> io::Result<Self> {
        let mut bit_reader = BitReader::new(reader);
        decode_field(&mut bit_reader, &FORBIDDEN_BIT)?;
        let obu_type = ObuType::from(decode_field(&mut bit_reader, &OBU_TYPE)? as u8);
        let extension_flag = decode_field(&mut bit_reader, &EXTENSION_FLAG)? == 1;
        let has_size_field = decode_field(&mut bit_reader, &HAS_SIZE_FIELD)? == 1;
        decode_field(&mut bit_reader, &RESERVED_1BIT)?;

        let extension_header = if extension_flag {
            let temporal_id = decode_field(&mut bit_reader, &TEMPORAL_ID)? as u8;
            let spatial_id = decode_field(&mut bit_reader, &SPATIAL_ID)? as u8;
            decode_field(&mut bit_reader, &EXTENSION_RESERVED)?;
            Some(ObuExtensionHeader {
                temporal_id,
                spatial_id,
            })
        } else {
            None
        };

        let size = if has_size_field {
            Some(read_leb128(&mut bit_reader)?)
        } else {
            None
        };

        Ok(ObuHeader {
            obu_type,
            size,
            extension_header,
        })
    }

    /// Returns `true` if `obu_has_size_field` is 1.
    pub const fn has_size_field(&self) -> bool {
        self.size.is_some()
    }

    /// `temporal_id`, 0 without an extension header.
    pub fn temporal_id(&self) -> u8 {
        self.extension_header.map_or(0, |ext| ext.temporal_id)
    }

    /// `spatial_id`, 0 without an extension header.
    pub fn spatial_id(&self) -> u8 {
        self.extension_header.map_or(0, |ext| ext.spatial_id)
    }

    /// Writes the one or two bytes before `obu_size`.
    fn write_fixed_part<W: io::Write>(&self, bit_writer: &mut BitWriter<W>, has_size_field: bool) -> io::Result<usize> {
        encode_field(bit_writer, &FORBIDDEN_BIT, 0)?;
        encode_field(bit_writer, &OBU_TYPE, u32::from(u8::from(self.obu_type)))?;
        encode_field(bit_writer, &EXTENSION_FLAG, u32::from(self.extension_header.is_some()))?;
        encode_field(bit_writer, &HAS_SIZE_FIELD, u32::from(has_size_field))?;
        encode_field(bit_writer, &RESERVED_1BIT, 0)?;

        let Some(ext) = &self.extension_header else {
            return Ok(1);
        };
        encode_field(bit_writer, &TEMPORAL_ID, u32::from(ext.temporal_id))?;
        encode_field(bit_writer, &SPATIAL_ID, u32::from(ext.spatial_id))?;
        encode_field(bit_writer, &EXTENSION_RESERVED, 0)?;
        Ok(2)
    }

    /// Writes the header, with `obu_size` when `self.size` is set.
    ///
    /// Returns the number of bytes written.
    pub fn mux<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bit_writer = BitWriter::new(writer);
        let fixed = self.write_fixed_part(&mut bit_writer, self.size.is_some())?;
        let writer = bit_writer.finish()?;

        match self.size {
            Some(size) => Ok(fixed + write_leb128(writer, size)?),
            None => Ok(fixed),
        }
    }

    /// Writes the header bytes with `obu_has_size_field=1` but without the
    /// `obu_size` itself, which the caller fills in once the payload is known.
    pub fn mux_without_size<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bit_writer = BitWriter::new(writer);
        let bytes_written = self.write_fixed_part(&mut bit_writer, true)?;
        bit_writer.finish()?;
        Ok(bytes_written)
    }

    /// Encoded size of this header in bytes.
    pub fn header_size(&self) -> usize {
        let fixed = if self.extension_header.is_some() { 2 } else { 1 };
        fixed + self.size.map_or(0, utils::leb128_size)
    }
}

/// `obu_type`, AV1 6.2.2.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ObuType {
    /// `OBU_SEQUENCE_HEADER`
    SequenceHeader,
    /// `OBU_TEMPORAL_DELIMITER`
    TemporalDelimiter,
    /// `OBU_FRAME_HEADER`
    FrameHeader,
    /// `OBU_TILE_GROUP`
    TileGroup,
    /// `OBU_METADATA`
    Metadata,
    /// `OBU_FRAME`
    Frame,
    /// `OBU_REDUNDANT_FRAME_HEADER`
    RedundantFrameHeader,
    /// `OBU_TILE_LIST`
    TileList,
    /// `OBU_PADDING`
    Padding,
    /// A reserved type value.
    Reserved(u8),
}

const OBU_TYPES: [(ObuType, u8); 9] = [
    (ObuType::SequenceHeader, 1),
    (ObuType::TemporalDelimiter, 2),
    (ObuType::FrameHeader, 3),
    (ObuType::TileGroup, 4),
    (ObuType::Metadata, 5),
    (ObuType::Frame, 6),
    (ObuType::RedundantFrameHeader, 7),
    (ObuType::TileList, 8),
    (ObuType::Padding, 15),
];

impl From<u8> for ObuType {
    fn from(value: u8) -> Self {
        OBU_TYPES
            .iter()
            .find(|(_, code)| *code == value)
            .map_or(ObuType::Reserved(value), |(obu_type, _)| *obu_type)
    }
}

impl From<ObuType> for u8 {
    fn from(value: ObuType) -> Self {
        match value {
            ObuType::Reserved(code) => code,
            known => OBU_TYPES
                .iter()
                .find(|(obu_type, _)| *obu_type == known)
                .map_or(0, |(_, code)| *code),
        }
    }
}
