//! Stateful temporal unit parsing.
//!
//! AV1 frame headers cannot be parsed in isolation: they depend on the active
//! sequence header and on the reference frame slots left behind by earlier
//! frames. [`ParserContext`] carries that state from one temporal unit to the
//! next.

use std::io;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Av1Error, Result};
use crate::obu::frame::{FrameHeader, RefFrames};
use crate::obu::seq::SequenceHeaderObu;
use crate::obu::tile::TileGroup;
use crate::obu::ObuType;
use crate::obu_stream::{Obu, ObuIterator};

/// What an OBU turned out to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObuContent {
    /// `OBU_TEMPORAL_DELIMITER`
    TemporalDelimiter,
    /// `OBU_SEQUENCE_HEADER`
    SequenceHeader(Box<SequenceHeaderObu>),
    /// A frame header starting a new frame.
    FrameHeader(Box<FrameHeader>),
    /// A copy of the active frame header (`frame_header_copy()`).
    FrameHeaderCopy,
    /// `OBU_TILE_GROUP`, tile offsets relative to the OBU payload.
    TileGroup(TileGroup),
    /// `OBU_FRAME`. Only the frame header part is interpreted.
    Frame(Box<FrameHeader>),
    /// Anything this parser does not interpret.
    Other,
}

/// One OBU of a temporal unit together with its interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedObu {
    /// The raw OBU and its position in the temporal unit.
    pub obu: Obu,
    /// The interpreted content.
    pub content: ObuContent,
}

/// Decoder-side state needed to interpret frame headers.
#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    sequence_header: Option<SequenceHeaderObu>,
    refs: RefFrames,
    /// The frame whose tiles are still arriving.
    frame_header: Option<FrameHeader>,
}

impl ParserContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent sequence header.
    pub fn sequence_header(&self) -> Option<&SequenceHeaderObu> {
        self.sequence_header.as_ref()
    }

    /// The frame header whose tile groups are still expected.
    pub fn frame_header(&self) -> Option<&FrameHeader> {
        self.frame_header.as_ref()
    }

    /// Reference frame slots as left by the last completed frame.
    pub fn refs(&self) -> &RefFrames {
        &self.refs
    }

    /// Forgets everything, as if no OBU had been seen.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Parses every OBU of a low-overhead temporal unit.
    ///
    /// On error the context may hold a partially consumed frame; callers that
    /// continue with the next unit should [`reset`](Self::reset) first if the
    /// stream cannot be trusted.
    pub fn parse_temporal_unit(&mut self, data: &Bytes) -> Result<Vec<ParsedObu>> {
        let mut cursor = io::Cursor::new(data.clone());
        let mut parsed = Vec::new();

        for obu in ObuIterator::new(&mut cursor) {
            let obu = obu?;
            let content = self.parse_obu(&obu)?;
            parsed.push(ParsedObu { obu, content });
        }

        debug!(obus = parsed.len(), bytes = data.len(), "parsed temporal unit");
        Ok(parsed)
    }

    /// Interprets a single OBU and updates the context.
    pub fn parse_obu(&mut self, obu: &Obu) -> Result<ObuContent> {
        trace!(
            obu_type = ?obu.header.obu_type,
            offset = obu.offset,
            size = obu.data.len(),
            "parsing OBU"
        );

        match obu.header.obu_type {
            ObuType::TemporalDelimiter => {
                self.frame_header = None;
                Ok(ObuContent::TemporalDelimiter)
            }
            ObuType::SequenceHeader => {
                let seq = SequenceHeaderObu::parse(obu.header, &mut io::Cursor::new(&obu.data))?;
                self.sequence_header = Some(seq.clone());
                Ok(ObuContent::SequenceHeader(Box::new(seq)))
            }
            ObuType::FrameHeader | ObuType::RedundantFrameHeader if self.frame_header.is_some() => {
                Ok(ObuContent::FrameHeaderCopy)
            }
            ObuType::FrameHeader | ObuType::RedundantFrameHeader => {
                let fh = self.parse_frame_header(obu)?;
                if fh.show_existing_frame {
                    fh.update_refs(&mut self.refs);
                } else {
                    self.frame_header = Some(fh.clone());
                }
                Ok(ObuContent::FrameHeader(Box::new(fh)))
            }
            ObuType::TileGroup => {
                let missing = || Av1Error::MissingFrameHeader { offset: obu.offset };
                let fh = self.frame_header.as_ref().ok_or_else(missing)?;
                let layout = fh.tile_layout.as_ref().ok_or_else(missing)?;
                let tg = TileGroup::parse(&obu.data, layout)?;

                if tg.ends_frame(layout) {
                    fh.update_refs(&mut self.refs);
                    self.frame_header = None;
                }
                Ok(ObuContent::TileGroup(tg))
            }
            ObuType::Frame => {
                // The embedded tile group is not located, the frame is taken
                // as complete.
                let fh = self.parse_frame_header(obu)?;
                fh.update_refs(&mut self.refs);
                self.frame_header = None;
                Ok(ObuContent::Frame(Box::new(fh)))
            }
            _ => Ok(ObuContent::Other),
        }
    }

    fn parse_frame_header(&mut self, obu: &Obu) -> Result<FrameHeader> {
        let seq = self.sequence_header.as_ref().ok_or(Av1Error::MissingSequenceHeader)?;
        FrameHeader::parse(seq, &mut self.refs, obu.header, &obu.data)
    }
}
