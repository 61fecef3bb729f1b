//! Temporal unit to tile packets.
//!
//! Every tile packet carries a [`TileInfo`] header followed by the unchanged
//! temporal unit. The header locates the tile's data inside each tile group
//! and records where the tile sits in the full frame.
//!
//! A temporal unit whose frames hold a single tile (one hardware encoder
//! instance per tile) becomes one packet placed by the configured geometry.
//! A temporal unit with several tiles per frame becomes one packet per tile
//! placed by the frame header's tile layout.

use av1::tile::TileLayout;
use av1::{ObuContent, ObuType, ParsedObu, ParserContext};
use tracing::{debug, trace, warn};

use crate::config::{SplitConfig, TileGeometry};
use crate::error::{Result, TileError};
use crate::packet::Packet;
use crate::tile_info::{MAX_TILE_GROUP_COUNT, ObuEntry, TileDataSpan, TileInfo};

/// Splits temporal units into tagged tile packets.
#[derive(Debug, Clone)]
pub struct TileSplitter {
    config: SplitConfig,
    context: ParserContext,
    /// Tile layout of the last multi-tile frame, reused for units without
    /// tile groups.
    last_layout: Option<TileLayout>,
}

impl TileSplitter {
    /// Creates a splitter, failing if the configuration is out of range.
    pub fn new(config: SplitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            context: ParserContext::new(),
            last_layout: None,
        })
    }

    /// The configuration this splitter was opened with.
    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Forgets all stream state.
    pub fn reset(&mut self) {
        self.context.reset();
        self.last_layout = None;
    }

    /// Splits one temporal unit.
    ///
    /// A unit that cannot be parsed or described is returned unchanged as the
    /// only packet.
    pub fn filter(&mut self, packet: Packet) -> Vec<Packet> {
        let mut context = self.context.clone();
        let parsed = match context.parse_temporal_unit(&packet.data) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, size = packet.data.len(), "unparsable temporal unit passed through");
                return vec![packet];
            }
        };
        self.context = context;

        match self.split(&packet, &parsed) {
            Ok(packets) => packets,
            Err(err) => {
                warn!(error = %err, size = packet.data.len(), "temporal unit passed through unsplit");
                vec![packet]
            }
        }
    }

    fn split(&mut self, packet: &Packet, parsed: &[ParsedObu]) -> Result<Vec<Packet>> {
        let obus = parsed.iter().map(|p| ObuEntry::from(&p.obu)).collect::<Vec<_>>();

        let mut layout: Option<&TileLayout> = None;
        let mut tile_groups = Vec::new();
        let mut tile_count = None;
        for p in parsed {
            match &p.content {
                ObuContent::FrameHeader(fh) => {
                    if let Some(frame_layout) = &fh.tile_layout {
                        layout = Some(frame_layout);
                    }
                }
                ObuContent::TileGroup(tg) => {
                    let frame_layout = layout.ok_or(TileError::MissingFrameHeader { offset: p.obu.offset })?;
                    let num_tiles = frame_layout.num_tiles();
                    let count = *tile_count.get_or_insert(num_tiles);
                    if count != num_tiles {
                        return Err(TileError::InvalidTileInfo(format!(
                            "frames of {count} and {num_tiles} tiles in one temporal unit"
                        )));
                    }
                    tile_groups.push((p.obu.payload_offset(), tg));
                }
                ObuContent::Frame(_) => {
                    return Err(TileError::UnsupportedObu {
                        obu_type: ObuType::Frame,
                        offset: p.obu.offset,
                    });
                }
                _ if p.obu.header.obu_type == ObuType::TileList => {
                    return Err(TileError::UnsupportedObu {
                        obu_type: ObuType::TileList,
                        offset: p.obu.offset,
                    });
                }
                _ => {}
            }
        }

        if tile_groups.len() > MAX_TILE_GROUP_COUNT {
            return Err(TileError::InvalidTileInfo(format!(
                "{} tile groups exceed {MAX_TILE_GROUP_COUNT}",
                tile_groups.len()
            )));
        }

        // Single-tile frames are placed by the configuration, multi-tile
        // frames by their own layout.
        let multi_layout = match (tile_count, layout) {
            (Some(count), Some(layout)) if count > 1 => {
                self.last_layout = Some(layout.clone());
                Some(layout.clone())
            }
            (None, _) => self.last_layout.clone(),
            _ => None,
        };

        let tile_spans = |tile_idx: u32| -> Vec<TileDataSpan> {
            tile_groups
                .iter()
                .map(|(payload_offset, tg)| {
                    tg.tiles
                        .iter()
                        .find(|tile| tile.tile_idx == tile_idx)
                        .map_or_else(TileDataSpan::default, |tile| TileDataSpan {
                            size: tile.size as u32,
                            offset: (payload_offset + tile.offset) as u32,
                        })
                })
                .collect()
        };

        let total_raw_data_pos = packet.data.len() as u32;
        let mut packets = Vec::new();
        match multi_layout {
            Some(layout) => {
                for tile_idx in 0..layout.num_tiles() {
                    let rect = layout.tile_rect(tile_idx).ok_or_else(|| {
                        TileError::InvalidTileInfo(format!("tile {tile_idx} outside the frame"))
                    })?;
                    let geometry = TileGeometry {
                        width: layout.grid.frame_width,
                        height: layout.grid.frame_height,
                        column: layout.tile_cols(),
                        row: layout.tile_rows(),
                        x: rect.x,
                        y: rect.y,
                        x_w: rect.width,
                        y_h: rect.height,
                    };
                    let info = TileInfo {
                        geometry,
                        obus: obus.clone(),
                        total_raw_data_pos,
                        tile_groups: tile_spans(tile_idx),
                    };
                    trace!(tile_index = tile_idx, x = rect.x, y = rect.y, "tile packet");
                    packets.push(self.tile_packet(packet, &info, tile_idx)?);
                }
            }
            None => {
                let geometry = match (self.config.geometry, layout) {
                    (Some(geometry), _) => geometry,
                    (None, Some(layout)) => TileGeometry::full_frame(layout.grid.frame_width, layout.grid.frame_height),
                    (None, None) => {
                        let seq = self.context.sequence_header().ok_or(av1::Av1Error::MissingSequenceHeader)?;
                        TileGeometry::full_frame(seq.max_frame_width, seq.max_frame_height)
                    }
                };
                let info = TileInfo {
                    geometry,
                    obus,
                    total_raw_data_pos,
                    tile_groups: tile_spans(0),
                };
                let tile_idx = self.config.tile_index.unwrap_or(0);
                packets.push(self.tile_packet(packet, &info, tile_idx)?);
            }
        }

        debug!(
            tiles = packets.len(),
            tile_groups = tile_groups.len(),
            size = packet.data.len(),
            "split temporal unit"
        );
        Ok(packets)
    }

    fn tile_packet(&self, packet: &Packet, info: &TileInfo, tile_idx: u32) -> Result<Packet> {
        let data = info.prepend_to(&packet.data)?;
        Ok(packet.with_data(data).with_tile_index(tile_idx))
    }
}
