//! The per-tile header the splitter puts in front of each tile packet.
//!
//! A tile packet is the fixed size [`TileInfo`] header followed by the
//! temporal unit the tile came from. All integers are little-endian `u32`,
//! laid out in the order paired split and repack stages expect.
//!
//! ```text
//! Offset  Size  Field
//! 0       64    obu_type[16]
//! 64      64    obu_size[16]            header, size field and payload
//! 128     64    obu_payload_size[16]
//! 192     4     num_obu
//! 196     8     width, height           frame size
//! 204     8     column, row             tile grid
//! 212     16    x, y, x_w, y_h          tile placement
//! 228     4     total_raw_data_pos      temporal unit length
//! 232     4     num_tile_group
//! 236     32    tile_raw_data_size[8]
//! 268     32    tile_raw_data_pos[8]
//! ```
//!
//! Unused array entries are zero. Tile data positions are relative to the
//! first byte of the temporal unit.

use std::io;

use av1::{Obu, ObuType};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::{Bytes, BytesMut};

use crate::config::TileGeometry;
use crate::error::{Result, TileError};

/// OBUs a temporal unit may hold to be described by a [`TileInfo`].
pub const MAX_OBU_COUNT: usize = 16;

/// Tile group OBUs a temporal unit may hold to be described by a [`TileInfo`].
pub const MAX_TILE_GROUP_COUNT: usize = 8;

/// One OBU of the originating temporal unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObuEntry {
    /// OBU type.
    pub obu_type: ObuType,
    /// Header, size field and payload bytes.
    pub unit_size: u32,
    /// Payload bytes.
    pub payload_size: u32,
}

impl From<&Obu> for ObuEntry {
    fn from(obu: &Obu) -> Self {
        Self {
            obu_type: obu.header.obu_type,
            unit_size: obu.unit_size() as u32,
            payload_size: obu.data.len() as u32,
        }
    }
}

/// Where the tile's data sits inside one tile group OBU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileDataSpan {
    /// Bytes of tile data, 0 if the tile group does not carry this tile.
    pub size: u32,
    /// Offset of the tile data in the temporal unit.
    pub offset: u32,
}

impl TileDataSpan {
    /// Returns `true` if the tile group does not carry this tile.
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Byte range in the temporal unit.
    pub const fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.size as usize
    }
}

/// Out-of-band description of one tile packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileInfo {
    /// Frame size, grid and tile placement.
    pub geometry: TileGeometry,
    /// Every OBU of the temporal unit, in order.
    pub obus: Vec<ObuEntry>,
    /// Length of the temporal unit following the header.
    pub total_raw_data_pos: u32,
    /// One entry per tile group OBU of the temporal unit, in order.
    pub tile_groups: Vec<TileDataSpan>,
}

fn read_array<R: io::Read, const N: usize>(reader: &mut R) -> io::Result<[u32; N]> {
    let mut values = [0; N];
    reader.read_u32_into::<LittleEndian>(&mut values)?;
    Ok(values)
}

fn write_array<W: io::Write>(writer: &mut W, len: usize, value: impl Fn(usize) -> u32) -> io::Result<()> {
    (0..len).try_for_each(|idx| writer.write_u32::<LittleEndian>(value(idx)))
}

impl TileInfo {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = MAX_OBU_COUNT * 12 + 11 * 4 + MAX_TILE_GROUP_COUNT * 8;

    /// Demuxes a header from the given reader.
    pub fn demux<R: io::Read>(reader: &mut R) -> Result<Self> {
        let obu_types: [u32; MAX_OBU_COUNT] = read_array(reader)?;
        let unit_sizes: [u32; MAX_OBU_COUNT] = read_array(reader)?;
        let payload_sizes: [u32; MAX_OBU_COUNT] = read_array(reader)?;

        let obu_count = reader.read_u32::<LittleEndian>()? as usize;
        if obu_count > MAX_OBU_COUNT {
            return Err(TileError::InvalidTileInfo(format!(
                "OBU count {obu_count} exceeds {MAX_OBU_COUNT}"
            )));
        }
        let obus = (0..obu_count)
            .map(|idx| {
                let obu_type = u8::try_from(obu_types[idx]).map_err(|_| {
                    TileError::InvalidTileInfo(format!("OBU type {} out of range", obu_types[idx]))
                })?;
                Ok(ObuEntry {
                    obu_type: ObuType::from(obu_type),
                    unit_size: unit_sizes[idx],
                    payload_size: payload_sizes[idx],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let geometry = TileGeometry {
            width: reader.read_u32::<LittleEndian>()?,
            height: reader.read_u32::<LittleEndian>()?,
            column: reader.read_u32::<LittleEndian>()?,
            row: reader.read_u32::<LittleEndian>()?,
            x: reader.read_u32::<LittleEndian>()?,
            y: reader.read_u32::<LittleEndian>()?,
            x_w: reader.read_u32::<LittleEndian>()?,
            y_h: reader.read_u32::<LittleEndian>()?,
        };
        let total_raw_data_pos = reader.read_u32::<LittleEndian>()?;

        let tile_group_count = reader.read_u32::<LittleEndian>()? as usize;
        if tile_group_count > MAX_TILE_GROUP_COUNT {
            return Err(TileError::InvalidTileInfo(format!(
                "tile group count {tile_group_count} exceeds {MAX_TILE_GROUP_COUNT}"
            )));
        }
        let sizes: [u32; MAX_TILE_GROUP_COUNT] = read_array(reader)?;
        let offsets: [u32; MAX_TILE_GROUP_COUNT] = read_array(reader)?;
        let tile_groups = sizes
            .into_iter()
            .zip(offsets)
            .take(tile_group_count)
            .map(|(size, offset)| TileDataSpan { size, offset })
            .collect();

        Ok(Self {
            geometry,
            obus,
            total_raw_data_pos,
            tile_groups,
        })
    }

    /// Muxes this header to the given writer.
    pub fn mux<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        if self.obus.len() > MAX_OBU_COUNT {
            return Err(TileError::InvalidTileInfo(format!(
                "{} OBUs exceed {MAX_OBU_COUNT}",
                self.obus.len()
            )));
        }
        if self.tile_groups.len() > MAX_TILE_GROUP_COUNT {
            return Err(TileError::InvalidTileInfo(format!(
                "{} tile groups exceed {MAX_TILE_GROUP_COUNT}",
                self.tile_groups.len()
            )));
        }

        let obu = |idx: usize| self.obus.get(idx);
        write_array(writer, MAX_OBU_COUNT, |idx| obu(idx).map_or(0, |obu| u32::from(u8::from(obu.obu_type))))?;
        write_array(writer, MAX_OBU_COUNT, |idx| obu(idx).map_or(0, |obu| obu.unit_size))?;
        write_array(writer, MAX_OBU_COUNT, |idx| obu(idx).map_or(0, |obu| obu.payload_size))?;
        writer.write_u32::<LittleEndian>(self.obus.len() as u32)?;

        let g = &self.geometry;
        for value in [g.width, g.height, g.column, g.row, g.x, g.y, g.x_w, g.y_h] {
            writer.write_u32::<LittleEndian>(value)?;
        }
        writer.write_u32::<LittleEndian>(self.total_raw_data_pos)?;

        let span = |idx: usize| self.tile_groups.get(idx).copied().unwrap_or_default();
        writer.write_u32::<LittleEndian>(self.tile_groups.len() as u32)?;
        write_array(writer, MAX_TILE_GROUP_COUNT, |idx| span(idx).size)?;
        write_array(writer, MAX_TILE_GROUP_COUNT, |idx| span(idx).offset)?;

        Ok(())
    }

    /// Builds a tile packet payload: this header followed by `unit`.
    pub fn prepend_to(&self, unit: &[u8]) -> Result<Bytes> {
        if self.total_raw_data_pos as usize != unit.len() {
            return Err(TileError::InvalidTileInfo(format!(
                "header describes {} bytes, temporal unit has {}",
                self.total_raw_data_pos,
                unit.len()
            )));
        }
        let mut buf = Vec::with_capacity(Self::SIZE + unit.len());
        self.mux(&mut buf)?;
        buf.extend_from_slice(unit);
        Ok(Bytes::from(buf))
    }

    /// Splits a tile packet payload into its header and temporal unit.
    ///
    /// The temporal unit length and tile data spans are checked against the
    /// bytes that follow the header.
    pub fn split_packet(data: &Bytes) -> Result<(Self, Bytes)> {
        if data.len() < Self::SIZE {
            return Err(TileError::InvalidTileInfo(format!(
                "packet of {} bytes is shorter than the {} byte tile info",
                data.len(),
                Self::SIZE
            )));
        }

        let info = Self::demux(&mut io::Cursor::new(&data[..Self::SIZE]))?;
        let unit = data.slice(Self::SIZE..);
        if info.total_raw_data_pos as usize != unit.len() {
            return Err(TileError::InvalidTileInfo(format!(
                "header describes {} bytes, temporal unit has {}",
                info.total_raw_data_pos,
                unit.len()
            )));
        }

        if let Some(span) = info
            .tile_groups
            .iter()
            .find(|span| span.offset as usize + span.size as usize > unit.len())
        {
            return Err(TileError::InvalidTileInfo(format!(
                "tile data {}..{} outside the {} byte temporal unit",
                span.offset,
                span.offset as usize + span.size as usize,
                unit.len()
            )));
        }

        Ok((info, unit))
    }

    /// Returns `true` if `obus` are the OBUs this header was built from.
    pub fn describes(&self, obus: &[&Obu]) -> bool {
        self.obus.len() == obus.len() && self.obus.iter().zip(obus).all(|(entry, obu)| *entry == ObuEntry::from(*obu))
    }

    /// This tile's data from the tile groups `groups`, out of `unit`.
    pub fn tile_data(&self, unit: &Bytes, groups: std::ops::Range<usize>) -> Bytes {
        let mut spans = self.tile_groups[groups].iter().filter(|span| !span.is_empty());
        match (spans.next(), spans.clone().next()) {
            (None, _) => Bytes::new(),
            (Some(span), None) => unit.slice(span.range()),
            (Some(first), Some(_)) => {
                let mut data = BytesMut::from(&unit[first.range()]);
                for span in spans {
                    data.extend_from_slice(&unit[span.range()]);
                }
                data.freeze()
            }
        }
    }
}
