//! Tile packets back to one temporal unit.
//!
//! The repacker collects one packet per tile index. Once every slot is
//! filled, the temporal unit carried by tile 0 serves as the template: its
//! sequence header is rewritten to the full frame size, its frame headers to
//! the collected tile grid, and each frame's tile groups are replaced by a
//! single tile group holding every tile's data in index order.

use std::ops::Range;

use av1::frame::FrameHeader;
use av1::seq::SequenceHeaderObu;
use av1::tile::{SuperblockGrid, TileGroup, TileLayout};
use av1::utils::trailing_bits_position;
use av1::{Av1Error, Obu, ObuContent, ObuType, ObuWriter, ParsedObu, ParserContext};
use bytes::Bytes;
use bytes_util::copy_bits;
use tracing::{debug, trace, warn};

use crate::config::{RepackConfig, TileGeometry};
use crate::error::{Result, TileError};
use crate::packet::Packet;
use crate::tile_info::TileInfo;

/// A received tile waiting for the rest of its temporal unit.
#[derive(Debug, Clone)]
struct TileSlot {
    info: TileInfo,
    /// The temporal unit following the tile info header.
    unit: Bytes,
    packet: Packet,
}

/// Reassembles tile packets into temporal units.
#[derive(Debug)]
pub struct TileRepacker {
    config: RepackConfig,
    slots: Vec<Option<TileSlot>>,
    filled: usize,
    context: ParserContext,
}

impl TileRepacker {
    /// Creates a repacker, failing if the configuration is out of range.
    pub fn new(config: RepackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            slots: vec![None; config.tile_num as usize],
            config,
            filled: 0,
            context: ParserContext::new(),
        })
    }

    /// The configuration this repacker was opened with.
    pub fn config(&self) -> &RepackConfig {
        &self.config
    }

    /// Number of tiles received for the pending temporal unit.
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Drops pending tiles and all stream state.
    pub fn reset(&mut self) {
        self.clear();
        self.context.reset();
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.filled = 0;
    }

    /// Accepts one tile packet.
    ///
    /// Returns the repacked temporal unit once every tile arrived and `None`
    /// before that. Any error discards the pending tiles.
    pub fn filter(&mut self, packet: Packet) -> Result<Option<Packet>> {
        let result = self.accept(packet);
        if result.is_err() {
            self.abort();
        }
        result
    }

    /// Drops the pending tiles, keeping the reference state their temporal
    /// unit leaves behind.
    fn abort(&mut self) {
        if let Some(slot) = self.slots.iter().flatten().next() {
            let mut context = self.context.clone();
            match context.parse_temporal_unit(&slot.unit) {
                Ok(_) => self.context = context,
                Err(err) => warn!(error = %err, "discarded temporal unit left unparsed"),
            }
        }
        self.clear();
    }

    fn accept(&mut self, packet: Packet) -> Result<Option<Packet>> {
        let index = packet.tile_index.ok_or(TileError::MissingTileIndex)?;
        if index >= self.config.tile_num {
            return Err(TileError::TileIndexOutOfRange {
                index,
                tile_num: self.config.tile_num,
            });
        }
        if self.slots[index as usize].is_some() {
            return Err(TileError::DuplicateTile { index });
        }
        if let Some(reference) = self.slots.iter().flatten().next() {
            check_metadata(index, &reference.packet, &packet)?;
        }

        let (info, unit) = TileInfo::split_packet(&packet.data)?;
        trace!(tile_index = index, size = unit.len(), "tile received");
        self.slots[index as usize] = Some(TileSlot {
            info,
            packet: packet.with_data(unit.clone()),
            unit,
        });
        self.filled += 1;

        if self.filled < self.slots.len() {
            return Ok(None);
        }

        let slots: Vec<TileSlot> = self.slots.iter_mut().filter_map(Option::take).collect();
        self.filled = 0;
        self.merge(&slots).map(Some)
    }

    fn merge(&mut self, slots: &[TileSlot]) -> Result<Packet> {
        let slots: Vec<&TileSlot> = slots.iter().collect();
        let template = slots[0];

        // A unit that fails to parse leaves the stream state untouched.
        let mut context = self.context.clone();
        let parsed = context.parse_temporal_unit(&template.unit)?;
        self.context = context;

        let grid = TileGrid::collect(&slots)?;
        let obus: Vec<&Obu> = parsed.iter().map(|p| &p.obu).collect();
        if !template.info.describes(&obus) {
            return Err(TileError::InvalidTileInfo(
                "OBU inventory does not match the temporal unit".to_string(),
            ));
        }
        let tile_group_count = obus.iter().filter(|obu| obu.header.obu_type == ObuType::TileGroup).count();
        if let Some(idx) = slots.iter().position(|slot| slot.info.tile_groups.len() != tile_group_count) {
            return Err(TileError::GeometryMismatch {
                index: idx as u32,
                field: "tile group count",
            });
        }

        let seq = self.context.sequence_header();
        let resize = match seq {
            Some(seq) if !grid.matches_frame_size(&parsed, seq) => {
                Some(seq.with_dimensions(grid.geometry.width, grid.geometry.height)?)
            }
            _ => None,
        };

        let mut writer = ObuWriter::new(self.config.max_output_size);
        // Tile layouts of the template frame and of the repacked frame.
        let mut frame: Option<(&TileLayout, TileLayout)> = None;
        let mut tile_group_idx = 0;
        let mut frame_tile_groups = 0..0;

        for p in &parsed {
            let obu = &p.obu;
            match &p.content {
                ObuContent::TemporalDelimiter => {
                    writer.write_obu(&obu.header, false, |_| Ok(()))?;
                }
                ObuContent::SequenceHeader(seq_header) => {
                    let (width, height) = match &resize {
                        Some(target) => (target.max_frame_width, target.max_frame_height),
                        None => (seq_header.max_frame_width, seq_header.max_frame_height),
                    };
                    writer.write_obu(&obu.header, true, |w| {
                        seq_header.write_with_dimensions(&obu.data, width, height, w)?;
                        Ok(())
                    })?;
                }
                ObuContent::FrameHeader(fh) if fh.show_existing_frame => {
                    writer.write_obu(&obu.header, true, |w| {
                        let end = trailing_bits_position(&obu.data)?;
                        copy_bits(&obu.data, 0..end, w)?;
                        Ok(())
                    })?;
                }
                ObuContent::FrameHeader(fh) => {
                    let layout = grid.layout_for(fh, seq.ok_or(Av1Error::MissingSequenceHeader)?)?;
                    writer.write_obu(&obu.header, true, |w| fh.write_rewritten(&obu.data, resize.as_ref(), &layout, w))?;
                    frame = fh.tile_layout.as_ref().map(|template_layout| (template_layout, layout));
                    frame_tile_groups = tile_group_idx..tile_group_idx;
                }
                ObuContent::TileGroup(tg) => {
                    tile_group_idx += 1;
                    frame_tile_groups.end = tile_group_idx;

                    // The frame header may have come with an earlier unit.
                    let (template_layout, layout) = frame
                        .as_ref()
                        .ok_or(TileError::MissingFrameHeader { offset: obu.offset })?;
                    if !tg.ends_frame(template_layout) {
                        continue;
                    }

                    let tiles = collect_tiles(&slots, frame_tile_groups.clone());
                    let tiles: Vec<&[u8]> = tiles.iter().map(|tile| tile.as_ref()).collect();
                    writer.write_obu(&obu.header, false, |w| {
                        TileGroup::write_all_tiles(w, layout, &tiles)?;
                        Ok(())
                    })?;
                    frame = None;
                }
                ObuContent::FrameHeaderCopy | ObuContent::Frame(_) => {
                    debug!(obu_type = ?obu.header.obu_type, offset = obu.offset, "OBU dropped");
                }
                ObuContent::Other if obu.header.obu_type == ObuType::Metadata => {
                    debug!(obu_type = ?obu.header.obu_type, offset = obu.offset, "OBU dropped");
                }
                ObuContent::Other => {
                    return Err(TileError::UnsupportedObu {
                        obu_type: obu.header.obu_type,
                        offset: obu.offset,
                    });
                }
            }
        }

        let data = writer.finish()?;
        debug!(
            tiles = slots.len(),
            width = grid.geometry.width,
            height = grid.geometry.height,
            size = data.len(),
            "repacked temporal unit"
        );
        Ok(template.packet.with_data(data))
    }
}

fn check_metadata(index: u32, reference: &Packet, packet: &Packet) -> Result<()> {
    let field = if packet.pts != reference.pts {
        "pts"
    } else if packet.dts != reference.dts {
        "dts"
    } else if packet.flags != reference.flags {
        "flags"
    } else if packet.stream_index != reference.stream_index {
        "stream index"
    } else {
        return Ok(());
    };
    Err(TileError::MetadataMismatch { index, field })
}

/// Each tile's data from the tile groups `groups`, in tile index order.
fn collect_tiles(slots: &[&TileSlot], groups: Range<usize>) -> Vec<Bytes> {
    slots
        .iter()
        .map(|slot| slot.info.tile_data(&slot.unit, groups.clone()))
        .collect()
}

/// The frame geometry agreed on by every tile.
#[derive(Debug)]
struct TileGrid {
    geometry: TileGeometry,
    col_x: Vec<u32>,
    row_y: Vec<u32>,
}

impl TileGrid {
    fn collect(slots: &[&TileSlot]) -> Result<Self> {
        let geometry = slots[0].info.geometry;
        let columns = geometry.column as usize;
        if geometry.tile_count() as usize != slots.len() {
            return Err(TileError::GeometryMismatch { index: 0, field: "grid" });
        }

        for (idx, slot) in slots.iter().enumerate() {
            let g = &slot.info.geometry;
            let field = if (g.width, g.height) != (geometry.width, geometry.height) {
                "frame size"
            } else if (g.column, g.row) != (geometry.column, geometry.row) {
                "grid"
            } else if g.x != slots[idx % columns].info.geometry.x {
                "x"
            } else if g.y != slots[idx - idx % columns].info.geometry.y {
                "y"
            } else {
                continue;
            };
            return Err(TileError::GeometryMismatch {
                index: idx as u32,
                field,
            });
        }

        Ok(Self {
            geometry,
            col_x: slots[..columns].iter().map(|slot| slot.info.geometry.x).collect(),
            row_y: slots.iter().step_by(columns).map(|slot| slot.info.geometry.y).collect(),
        })
    }

    /// Returns `true` if the template frames already have the full frame
    /// size, so no dimension needs rewriting.
    fn matches_frame_size(&self, parsed: &[ParsedObu], seq: &SequenceHeaderObu) -> bool {
        let target = (self.geometry.width, self.geometry.height);
        let frame_size = parsed.iter().find_map(|p| match &p.content {
            ObuContent::FrameHeader(fh) if fh.tile_layout.is_some() => Some((fh.size.frame_width, fh.size.frame_height)),
            _ => None,
        });
        frame_size.unwrap_or((seq.max_frame_width, seq.max_frame_height)) == target
    }

    /// The layout for the repacked frame. The template's own layout is kept
    /// when it already cuts the full frame the same way.
    fn layout_for(&self, fh: &FrameHeader, seq: &SequenceHeaderObu) -> Result<TileLayout> {
        let grid = SuperblockGrid::new(self.geometry.width, self.geometry.height, seq.use_128x128_superblock);
        let layout = TileLayout::from_pixel_starts(grid, &self.col_x, &self.row_y)?;
        match &fh.tile_layout {
            Some(template) if template.grid == grid && template.same_grid(&layout) => Ok(template.clone()),
            _ => Ok(layout),
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;
    use crate::packet::PacketFlags;
    use crate::tile_info::{ObuEntry, TileDataSpan};

    fn geometry(x: u32, y: u32) -> TileGeometry {
        TileGeometry {
            width: 256,
            height: 256,
            column: 2,
            row: 2,
            x,
            y,
            x_w: 128,
            y_h: 128,
        }
    }

    /// A tile packet carrying just a temporal delimiter.
    fn tile(index: u32, geometry: TileGeometry) -> Packet {
        let info = TileInfo {
            geometry,
            obus: vec![ObuEntry {
                obu_type: ObuType::TemporalDelimiter,
                unit_size: 2,
                payload_size: 0,
            }],
            total_raw_data_pos: 2,
            tile_groups: Vec::new(),
        };
        Packet::new(info.prepend_to(&[0x12, 0x00]).unwrap())
            .with_timestamps(Some(1000), Some(900))
            .with_flags(PacketFlags::KEY)
            .with_tile_index(index)
    }

    fn quad() -> [Packet; 4] {
        [
            tile(0, geometry(0, 0)),
            tile(1, geometry(128, 0)),
            tile(2, geometry(0, 128)),
            tile(3, geometry(128, 128)),
        ]
    }

    fn repacker() -> TileRepacker {
        TileRepacker::new(RepackConfig {
            tile_num: 4,
            ..RepackConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_zero_tiles_rejected() {
        let err = TileRepacker::new(RepackConfig {
            tile_num: 0,
            ..RepackConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, TileError::InvalidConfig(_)));
    }

    #[test]
    fn test_out_of_range_and_duplicate() {
        let mut repacker = repacker();
        let [t0, t1, t2, t3] = quad();

        assert!(repacker.filter(t0.clone()).unwrap().is_none());
        let err = repacker.filter(tile(5, geometry(0, 0))).unwrap_err();
        assert!(matches!(err, TileError::TileIndexOutOfRange { index: 5, tile_num: 4 }));
        assert!(err.is_protocol());
        assert_eq!(repacker.pending(), 0);

        assert!(repacker.filter(t2.clone()).unwrap().is_none());
        let err = repacker.filter(t2.clone()).unwrap_err();
        assert!(matches!(err, TileError::DuplicateTile { index: 2 }));
        assert_eq!(repacker.pending(), 0);

        // still usable
        for packet in [t3, t1, t0] {
            assert!(repacker.filter(packet).unwrap().is_none());
        }
        let out = repacker.filter(t2).unwrap().unwrap();
        assert_eq!(out.data.as_ref(), &[0x12, 0x00]);
        assert_eq!((out.pts, out.dts, out.tile_index), (Some(1000), Some(900), None));
        assert!(out.is_key());
        assert_eq!(repacker.pending(), 0);
    }

    #[test]
    fn test_metadata_mismatch() {
        let mut repacker = repacker();
        let [t0, t1, ..] = quad();

        repacker.filter(t0).unwrap();
        let t1 = t1.with_timestamps(Some(2000), Some(900));
        let err = repacker.filter(t1).unwrap_err();
        assert!(matches!(err, TileError::MetadataMismatch { index: 1, field: "pts" }));

        let [t0, t1, ..] = quad();
        repacker.filter(t1).unwrap();
        let err = repacker.filter(t0.with_flags(PacketFlags::empty())).unwrap_err();
        assert!(matches!(err, TileError::MetadataMismatch { index: 0, field: "flags" }));
    }

    #[test]
    fn test_missing_tile_index() {
        let mut repacker = repacker();
        let err = repacker.filter(Packet::new(Bytes::from_static(&[0x12, 0x00]))).unwrap_err();
        assert!(matches!(err, TileError::MissingTileIndex));
    }

    #[test]
    fn test_geometry_mismatch() {
        let mut repacker = repacker();
        let [t0, t1, t2, _] = quad();
        for packet in [t0, t1, t2] {
            repacker.filter(packet).unwrap();
        }
        let err = repacker.filter(tile(3, geometry(64, 128))).unwrap_err();
        assert!(matches!(err, TileError::GeometryMismatch { index: 3, field: "x" }));

        let mut repacker = TileRepacker::new(RepackConfig::default()).unwrap();
        let err = repacker.filter(tile(0, geometry(0, 0))).unwrap_err();
        assert!(matches!(err, TileError::GeometryMismatch { index: 0, field: "grid" }));
    }

    #[test]
    fn test_invalid_tile_info() {
        let mut repacker = repacker();
        let [t0, ..] = quad();
        let mut data = t0.data.to_vec();
        data.truncate(TileInfo::SIZE - 1);

        let err = repacker.filter(Packet { data: data.into(), ..t0 }).unwrap_err();
        assert!(err.is_invalid_data());
        assert!(!err.is_protocol());
    }

    #[test]
    fn test_inventory_mismatch() {
        let mut repacker = repacker();
        let [t0, t1, t2, t3] = quad();

        // claims a tile group the unit does not carry
        let (mut info, unit) = TileInfo::split_packet(&t0.data).unwrap();
        info.tile_groups.push(TileDataSpan { size: 0, offset: 0 });
        let t0 = Packet {
            data: info.prepend_to(&unit).unwrap(),
            ..t0
        };

        for packet in [t0, t1, t2] {
            repacker.filter(packet).unwrap();
        }
        let err = repacker.filter(t3).unwrap_err();
        assert!(matches!(err, TileError::GeometryMismatch { index: 0, field: "tile group count" }));
    }

    #[test]
    fn test_reset() {
        let mut repacker = repacker();
        let [t0, ..] = quad();
        repacker.filter(t0.clone()).unwrap();
        assert_eq!(repacker.pending(), 1);

        repacker.reset();
        assert_eq!(repacker.pending(), 0);
        assert!(repacker.filter(t0).unwrap().is_none());
    }
}
