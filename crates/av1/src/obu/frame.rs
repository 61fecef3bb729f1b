//! Frame header OBU, parsed up to and including `tile_info()`.
//!
//! AV1-Spec-2 - 5.9
//!
//! Only the syntax in front of `tile_info()` is interpreted. The rest of the
//! uncompressed header is carried as opaque bits, which is enough to locate
//! the tiles and to re-emit the header for a different frame size or tile
//! grid.

use std::io;

use bytes_util::{BitReader, BitWriter, copy_bits};
use tracing::trace;

use super::field::{Field, encode_field};
use super::seq::{SELECT_INTEGER_MV, SELECT_SCREEN_CONTENT_TOOLS, SequenceHeaderObu};
use super::tile::{SuperblockGrid, TileLayout};
use super::utils::trailing_bits_position;
use super::{BitSpan, ObuHeader, ObuType};
use crate::error::{Av1Error, Result};

/// `NUM_REF_FRAMES`
pub const NUM_REF_FRAMES: usize = 8;
/// `REFS_PER_FRAME`
pub const REFS_PER_FRAME: usize = 7;
/// `PRIMARY_REF_NONE`
pub const PRIMARY_REF_NONE: u8 = 7;

const SUPERRES_NUM: u32 = 8;
const SUPERRES_DENOM_MIN: u32 = 9;
const SUPERRES_DENOM_BITS: u8 = 3;
const ALL_FRAMES: u8 = 0xff;

/// `frame_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    /// `KEY_FRAME`
    #[default]
    Key,
    /// `INTER_FRAME`
    Inter,
    /// `INTRA_ONLY_FRAME`
    IntraOnly,
    /// `S_FRAME`
    Switch,
}

impl FrameType {
    /// `FrameIsIntra`
    pub const fn is_intra(self) -> bool {
        matches!(self, FrameType::Key | FrameType::IntraOnly)
    }
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => FrameType::Key,
            1 => FrameType::Inter,
            2 => FrameType::IntraOnly,
            _ => FrameType::Switch,
        }
    }
}

/// Saved state of one reference frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefFrame {
    /// `RefValid`
    pub valid: bool,
    /// `RefFrameId`
    pub frame_id: u32,
    /// `RefFrameType`
    pub frame_type: FrameType,
    /// `RefOrderHint`
    pub order_hint: u32,
    /// `RefShowableFrame`
    pub showable: bool,
    /// Frame and render size of the stored frame.
    pub size: FrameSize,
}

/// The eight reference slots tracked across frames.
pub type RefFrames = [RefFrame; NUM_REF_FRAMES];

/// Frame dimensions derived from `frame_size()`, `superres_params()` and
/// `render_size()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSize {
    /// `UpscaledWidth`
    pub upscaled_width: u32,
    /// `FrameWidth`
    pub frame_width: u32,
    /// `FrameHeight`
    pub frame_height: u32,
    /// `RenderWidth`
    pub render_width: u32,
    /// `RenderHeight`
    pub render_height: u32,
    /// `SuperresDenom`
    pub superres_denom: u32,
}

impl FrameSize {
    /// `MiCols`
    pub const fn mi_cols(&self) -> u32 {
        2 * ((self.frame_width + 7) >> 3)
    }

    /// `MiRows`
    pub const fn mi_rows(&self) -> u32 {
        2 * ((self.frame_height + 7) >> 3)
    }

    fn downscaled_width(upscaled_width: u32, superres_denom: u32) -> u32 {
        (upscaled_width * SUPERRES_NUM + superres_denom / 2) / superres_denom
    }
}

/// Frame Header OBU
///
/// AV1-Spec-2 - 5.9.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// The OBU header carrying this frame header.
    pub header: ObuHeader,
    /// `show_existing_frame`
    pub show_existing_frame: bool,
    /// `frame_to_show_map_idx`
    pub frame_to_show_map_idx: u8,
    /// `frame_type`
    pub frame_type: FrameType,
    /// `show_frame`
    pub show_frame: bool,
    /// `showable_frame`
    pub showable_frame: bool,
    /// `error_resilient_mode`
    pub error_resilient_mode: bool,
    /// `disable_cdf_update`
    pub disable_cdf_update: bool,
    /// `allow_screen_content_tools`
    pub allow_screen_content_tools: bool,
    /// `force_integer_mv`
    pub force_integer_mv: bool,
    /// `current_frame_id`
    pub current_frame_id: u32,
    /// `frame_size_override_flag`
    pub frame_size_override_flag: bool,
    /// `order_hint`
    pub order_hint: u32,
    /// `primary_ref_frame`
    pub primary_ref_frame: u8,
    /// `refresh_frame_flags`
    pub refresh_frame_flags: u8,
    /// `frame_refs_short_signaling`
    pub frame_refs_short_signaling: bool,
    /// `ref_frame_idx`
    pub ref_frame_idx: [u8; REFS_PER_FRAME],
    /// `allow_intrabc`
    pub allow_intrabc: bool,
    /// `allow_high_precision_mv`
    pub allow_high_precision_mv: bool,
    /// `interpolation_filter`, 4 when switchable.
    pub interpolation_filter: u8,
    /// `is_motion_mode_switchable`
    pub is_motion_mode_switchable: bool,
    /// `use_ref_frame_mvs`
    pub use_ref_frame_mvs: bool,
    /// `disable_frame_end_update_cdf`
    pub disable_frame_end_update_cdf: bool,
    /// Frame dimensions.
    pub size: FrameSize,
    /// `tile_info()`, absent for `show_existing_frame`.
    pub tile_layout: Option<TileLayout>,
    /// Bits of `frame_width_minus_1` and `frame_height_minus_1` when coded.
    pub frame_size_span: Option<BitSpan>,
    /// Bits of `render_size()` when coded.
    pub render_size_span: Option<BitSpan>,
    /// Bits of `tile_info()`.
    pub tile_info_span: Option<BitSpan>,
}

impl FrameHeader {
    fn empty(header: ObuHeader) -> Self {
        Self {
            header,
            show_existing_frame: false,
            frame_to_show_map_idx: 0,
            frame_type: FrameType::Key,
            show_frame: true,
            showable_frame: false,
            error_resilient_mode: false,
            disable_cdf_update: false,
            allow_screen_content_tools: false,
            force_integer_mv: false,
            current_frame_id: 0,
            frame_size_override_flag: false,
            order_hint: 0,
            primary_ref_frame: PRIMARY_REF_NONE,
            refresh_frame_flags: 0,
            frame_refs_short_signaling: false,
            ref_frame_idx: [0; REFS_PER_FRAME],
            allow_intrabc: false,
            allow_high_precision_mv: false,
            interpolation_filter: 0,
            is_motion_mode_switchable: false,
            use_ref_frame_mvs: false,
            disable_frame_end_update_cdf: true,
            size: FrameSize::default(),
            tile_layout: None,
            frame_size_span: None,
            render_size_span: None,
            tile_info_span: None,
        }
    }

    /// `FrameIsIntra`
    pub const fn frame_is_intra(&self) -> bool {
        self.frame_type.is_intra()
    }

    /// Parses a frame header payload.
    ///
    /// `refs` is read for inter prediction state and updated where the syntax
    /// itself invalidates slots. Call [`FrameHeader::update_refs`] once the
    /// frame is complete to run the reference update process.
    pub fn parse(seq: &SequenceHeaderObu, refs: &mut RefFrames, header: ObuHeader, payload: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(io::Cursor::new(payload));
        let mut fh = Self::empty(header);

        let id_len = seq.frame_ids.map(|ids| ids.id_len());
        let temporal_point_info_present = seq.decoder_model_info_present() && !seq.equal_picture_interval();
        let frame_presentation_time_length = seq
            .decoder_model_info
            .map_or(0, |info| info.frame_presentation_time_length);

        if seq.reduced_still_picture_header {
            fh.frame_type = FrameType::Key;
            fh.show_frame = true;
            fh.showable_frame = false;
            fh.error_resilient_mode = true;
        } else {
            fh.show_existing_frame = reader.read_bit()?;
            if fh.show_existing_frame {
                if header.obu_type == ObuType::Frame {
                    return Err(Av1Error::InvalidData(
                        "show_existing_frame in a frame OBU".to_string(),
                    ));
                }
                return fh.parse_show_existing(seq, refs, &mut reader, id_len, temporal_point_info_present);
            }

            fh.frame_type = FrameType::from(reader.read_bits(2)? as u8);
            fh.show_frame = reader.read_bit()?;
            if fh.show_frame && temporal_point_info_present {
                reader.read_bits(frame_presentation_time_length)?; // frame_presentation_time
            }
            fh.showable_frame = if fh.show_frame {
                fh.frame_type != FrameType::Key
            } else {
                reader.read_bit()?
            };
            fh.error_resilient_mode =
                if fh.frame_type == FrameType::Switch || (fh.frame_type == FrameType::Key && fh.show_frame) {
                    true
                } else {
                    reader.read_bit()?
                };
        }

        if fh.frame_type == FrameType::Key && fh.show_frame {
            for slot in refs.iter_mut() {
                slot.valid = false;
                slot.order_hint = 0;
            }
        }

        fh.disable_cdf_update = reader.read_bit()?;
        fh.allow_screen_content_tools = if seq.seq_force_screen_content_tools == SELECT_SCREEN_CONTENT_TOOLS {
            reader.read_bit()?
        } else {
            seq.seq_force_screen_content_tools != 0
        };
        fh.force_integer_mv = if fh.allow_screen_content_tools {
            if seq.seq_force_integer_mv == SELECT_INTEGER_MV {
                reader.read_bit()?
            } else {
                seq.seq_force_integer_mv != 0
            }
        } else {
            false
        };
        if fh.frame_is_intra() {
            fh.force_integer_mv = true;
        }

        if let (Some(ids), Some(id_len)) = (seq.frame_ids, id_len) {
            fh.current_frame_id = reader.read_bits(id_len)? as u32;
            mark_ref_frames(refs, fh.current_frame_id, id_len, ids.delta_frame_id_length);
        }

        fh.frame_size_override_flag = if fh.frame_type == FrameType::Switch {
            true
        } else if seq.reduced_still_picture_header {
            false
        } else {
            reader.read_bit()?
        };

        fh.order_hint = reader.read_bits(seq.order_hint_bits)? as u32;
        fh.primary_ref_frame = if fh.frame_is_intra() || fh.error_resilient_mode {
            PRIMARY_REF_NONE
        } else {
            reader.read_bits(3)? as u8
        };

        if let Some(decoder_model_info) = seq.decoder_model_info {
            let buffer_removal_time_present = reader.read_bit()?;
            if buffer_removal_time_present {
                for op in &seq.operating_points {
                    if op.operating_parameters_info.is_some()
                        && op.contains_layer(header.temporal_id(), header.spatial_id())
                    {
                        reader.read_bits(decoder_model_info.buffer_removal_time_length)?;
                    }
                }
            }
        }

        fh.refresh_frame_flags =
            if fh.frame_type == FrameType::Switch || (fh.frame_type == FrameType::Key && fh.show_frame) {
                ALL_FRAMES
            } else {
                reader.read_bits(8)? as u8
            };
        if fh.frame_type == FrameType::IntraOnly && fh.refresh_frame_flags == ALL_FRAMES {
            return Err(Av1Error::InvalidData(
                "intra only frame refreshing every reference".to_string(),
            ));
        }

        if (!fh.frame_is_intra() || fh.refresh_frame_flags != ALL_FRAMES)
            && fh.error_resilient_mode
            && seq.enable_order_hint
        {
            for slot in refs.iter_mut() {
                let ref_order_hint = reader.read_bits(seq.order_hint_bits)? as u32;
                if ref_order_hint != slot.order_hint {
                    *slot = RefFrame {
                        order_hint: ref_order_hint,
                        ..RefFrame::default()
                    };
                }
            }
        }

        if fh.frame_is_intra() {
            fh.parse_frame_size(seq, &mut reader)?;
            fh.parse_render_size(&mut reader)?;
            if fh.allow_screen_content_tools && fh.size.upscaled_width == fh.size.frame_width {
                fh.allow_intrabc = reader.read_bit()?;
            }
        } else {
            fh.parse_inter_refs(seq, refs, &mut reader, id_len)?;

            if fh.frame_size_override_flag && !fh.error_resilient_mode {
                fh.parse_frame_size_with_refs(seq, refs, &mut reader)?;
            } else {
                fh.parse_frame_size(seq, &mut reader)?;
                fh.parse_render_size(&mut reader)?;
            }

            fh.allow_high_precision_mv = if fh.force_integer_mv {
                false
            } else {
                reader.read_bit()?
            };
            let is_filter_switchable = reader.read_bit()?;
            fh.interpolation_filter = if is_filter_switchable {
                4
            } else {
                reader.read_bits(2)? as u8
            };
            fh.is_motion_mode_switchable = reader.read_bit()?;
            fh.use_ref_frame_mvs = if fh.error_resilient_mode || !seq.enable_ref_frame_mvs {
                false
            } else {
                reader.read_bit()?
            };
        }

        fh.disable_frame_end_update_cdf = if seq.reduced_still_picture_header || fh.disable_cdf_update {
            true
        } else {
            reader.read_bit()?
        };

        if fh.primary_ref_frame != PRIMARY_REF_NONE {
            let slot = fh.ref_frame_idx[fh.primary_ref_frame as usize];
            if !refs[slot as usize].valid {
                return Err(Av1Error::InvalidData(format!(
                    "primary reference frame slot {slot} is not valid"
                )));
            }
        }

        let grid = SuperblockGrid::new(
            fh.size.frame_width,
            fh.size.frame_height,
            seq.use_128x128_superblock,
        );
        let start = reader.bits_read();
        let layout = TileLayout::parse(&mut reader, grid)?;
        fh.tile_info_span = Some(BitSpan::new(start, reader.bits_read()));

        trace!(
            frame_type = ?fh.frame_type,
            width = fh.size.frame_width,
            height = fh.size.frame_height,
            tiles = layout.num_tiles(),
            "parsed frame header"
        );
        fh.tile_layout = Some(layout);

        Ok(fh)
    }

    fn parse_show_existing<T: io::Read>(
        mut self,
        seq: &SequenceHeaderObu,
        refs: &RefFrames,
        reader: &mut BitReader<T>,
        id_len: Option<u8>,
        temporal_point_info_present: bool,
    ) -> Result<Self> {
        self.frame_to_show_map_idx = reader.read_bits(3)? as u8;
        if temporal_point_info_present {
            let length = seq
                .decoder_model_info
                .map_or(0, |info| info.frame_presentation_time_length);
            reader.read_bits(length)?; // frame_presentation_time
        }

        let slot = &refs[self.frame_to_show_map_idx as usize];
        if let Some(id_len) = id_len {
            let display_frame_id = reader.read_bits(id_len)? as u32;
            if display_frame_id != slot.frame_id {
                return Err(Av1Error::InvalidData(format!(
                    "display_frame_id {display_frame_id} does not match slot {}",
                    self.frame_to_show_map_idx
                )));
            }
        }

        if !slot.valid || !slot.showable {
            return Err(Av1Error::InvalidData(format!(
                "reference slot {} cannot be shown",
                self.frame_to_show_map_idx
            )));
        }

        self.frame_type = slot.frame_type;
        self.order_hint = slot.order_hint;
        self.current_frame_id = slot.frame_id;
        self.size = slot.size;
        self.showable_frame = false;
        self.refresh_frame_flags = if self.frame_type == FrameType::Key { ALL_FRAMES } else { 0 };

        Ok(self)
    }

    fn parse_inter_refs<T: io::Read>(
        &mut self,
        seq: &SequenceHeaderObu,
        refs: &RefFrames,
        reader: &mut BitReader<T>,
        id_len: Option<u8>,
    ) -> Result<()> {
        if seq.enable_order_hint {
            self.frame_refs_short_signaling = reader.read_bit()?;
            if self.frame_refs_short_signaling {
                let last_frame_idx = reader.read_bits(3)? as u8;
                let gold_frame_idx = reader.read_bits(3)? as u8;
                self.ref_frame_idx = set_frame_refs(seq, refs, self.order_hint, last_frame_idx, gold_frame_idx)?;
            }
        }

        for i in 0..REFS_PER_FRAME {
            if !self.frame_refs_short_signaling {
                self.ref_frame_idx[i] = reader.read_bits(3)? as u8;
            }

            if let (Some(ids), Some(id_len)) = (seq.frame_ids, id_len) {
                let delta_frame_id = reader.read_bits(ids.delta_frame_id_length)? as u32 + 1;
                let modulus = 1u32 << id_len;
                let expected = (self.current_frame_id + modulus - delta_frame_id) % modulus;
                let actual = refs[self.ref_frame_idx[i] as usize].frame_id;
                if expected != actual {
                    return Err(Av1Error::InvalidData(format!(
                        "reference {i} expected frame id {expected}, slot holds {actual}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// `frame_size()`
    fn parse_frame_size<T: io::Read>(&mut self, seq: &SequenceHeaderObu, reader: &mut BitReader<T>) -> Result<()> {
        let start = reader.bits_read();
        let (width, height) = if self.frame_size_override_flag {
            let width = reader.read_bits(seq.frame_width_bits)? as u32 + 1;
            let height = reader.read_bits(seq.frame_height_bits)? as u32 + 1;
            self.frame_size_span = Some(BitSpan::new(start, reader.bits_read()));
            (width, height)
        } else {
            (seq.max_frame_width, seq.max_frame_height)
        };

        self.size.upscaled_width = width;
        self.size.frame_height = height;
        self.parse_superres_params(seq, reader)
    }

    /// `superres_params()`
    fn parse_superres_params<T: io::Read>(&mut self, seq: &SequenceHeaderObu, reader: &mut BitReader<T>) -> Result<()> {
        let use_superres = seq.enable_superres && reader.read_bit()?;
        self.size.superres_denom = if use_superres {
            reader.read_bits(SUPERRES_DENOM_BITS)? as u32 + SUPERRES_DENOM_MIN
        } else {
            SUPERRES_NUM
        };
        self.size.frame_width = FrameSize::downscaled_width(self.size.upscaled_width, self.size.superres_denom);
        Ok(())
    }

    /// `render_size()`
    fn parse_render_size<T: io::Read>(&mut self, reader: &mut BitReader<T>) -> Result<()> {
        let start = reader.bits_read();
        let render_and_frame_size_different = reader.read_bit()?;
        if render_and_frame_size_different {
            self.size.render_width = reader.read_bits(16)? as u32 + 1;
            self.size.render_height = reader.read_bits(16)? as u32 + 1;
        } else {
            self.size.render_width = self.size.upscaled_width;
            self.size.render_height = self.size.frame_height;
        }
        self.render_size_span = Some(BitSpan::new(start, reader.bits_read()));
        Ok(())
    }

    /// `frame_size_with_refs()`
    fn parse_frame_size_with_refs<T: io::Read>(
        &mut self,
        seq: &SequenceHeaderObu,
        refs: &RefFrames,
        reader: &mut BitReader<T>,
    ) -> Result<()> {
        for i in 0..REFS_PER_FRAME {
            let found_ref = reader.read_bit()?;
            if found_ref {
                let slot = &refs[self.ref_frame_idx[i] as usize];
                self.size.upscaled_width = slot.size.upscaled_width;
                self.size.frame_height = slot.size.frame_height;
                self.size.render_width = slot.size.render_width;
                self.size.render_height = slot.size.render_height;
                return self.parse_superres_params(seq, reader);
            }
        }

        self.parse_frame_size(seq, reader)?;
        self.parse_render_size(reader)
    }

    /// Runs the reference frame update process for this frame.
    pub fn update_refs(&self, refs: &mut RefFrames) {
        if self.show_existing_frame && self.frame_type != FrameType::Key {
            return;
        }

        let saved = if self.show_existing_frame {
            refs[self.frame_to_show_map_idx as usize]
        } else {
            RefFrame {
                valid: true,
                frame_id: self.current_frame_id,
                frame_type: self.frame_type,
                order_hint: self.order_hint,
                showable: self.showable_frame,
                size: self.size,
            }
        };

        for (i, slot) in refs.iter_mut().enumerate() {
            if self.refresh_frame_flags & (1 << i) != 0 {
                *slot = saved;
            }
        }
    }

    /// Writes this header for a frame cut into `layout`.
    ///
    /// `payload` is the OBU payload the header was parsed from. With
    /// `resize`, the sequence header that will precede the output, explicit
    /// frame sizes are rewritten to its maximum dimensions and
    /// `render_size()` collapses to the frame size. Without it both are
    /// copied. `tile_info()` is replaced unless it already matches `layout`.
    /// All other bits are copied. Trailing bits are not written.
    pub fn write_rewritten<W: io::Write>(
        &self,
        payload: &[u8],
        resize: Option<&SequenceHeaderObu>,
        layout: &TileLayout,
        writer: &mut BitWriter<W>,
    ) -> Result<()> {
        let content_end = trailing_bits_position(payload)?;
        let Some(tile_info_span) = self.tile_info_span else {
            copy_bits(payload, 0..content_end, writer)?;
            return Ok(());
        };
        if content_end < tile_info_span.end {
            return Err(Av1Error::InvalidData(
                "frame header payload ends inside tile_info()".to_string(),
            ));
        }

        let mut pos = 0;
        if let (Some(seq), Some(span)) = (resize, self.frame_size_span) {
            copy_bits(payload, pos..span.start, writer)?;
            encode_field(
                writer,
                &Field::bits("frame_width_minus_1", seq.frame_width_bits),
                seq.max_frame_width - 1,
            )?;
            encode_field(
                writer,
                &Field::bits("frame_height_minus_1", seq.frame_height_bits),
                seq.max_frame_height - 1,
            )?;
            pos = span.end;
        }

        if let (Some(_), Some(span)) = (resize, self.render_size_span) {
            copy_bits(payload, pos..span.start, writer)?;
            writer.write_bit(false)?; // render_and_frame_size_different
            pos = span.end;
        }

        copy_bits(payload, pos..tile_info_span.start, writer)?;
        if self.tile_layout.as_ref() == Some(layout) {
            copy_bits(payload, tile_info_span.range(), writer)?;
        } else {
            layout.write(writer)?;
        }
        copy_bits(payload, tile_info_span.end..content_end, writer)?;

        Ok(())
    }
}

/// `mark_ref_frames(idLen)`
fn mark_ref_frames(refs: &mut RefFrames, current_frame_id: u32, id_len: u8, delta_frame_id_length: u8) {
    let diff_len = 1u32 << delta_frame_id_length;
    let id_range = 1u32 << id_len;

    for slot in refs.iter_mut() {
        if current_frame_id > diff_len {
            if slot.frame_id > current_frame_id || slot.frame_id < current_frame_id - diff_len {
                slot.valid = false;
            }
        } else if slot.frame_id > current_frame_id && slot.frame_id < id_range + current_frame_id - diff_len {
            slot.valid = false;
        }
    }
}

/// `get_relative_dist(a, b)`
fn relative_dist(seq: &SequenceHeaderObu, a: u32, b: u32) -> i32 {
    if !seq.enable_order_hint {
        return 0;
    }

    let diff = a as i32 - b as i32;
    let m = 1i32 << (seq.order_hint_bits - 1);
    (diff & (m - 1)) - (diff & m)
}

/// Set frame refs process.
///
/// AV1-Spec-2 - 7.8
fn set_frame_refs(
    seq: &SequenceHeaderObu,
    refs: &RefFrames,
    order_hint: u32,
    last_frame_idx: u8,
    gold_frame_idx: u8,
) -> Result<[u8; REFS_PER_FRAME]> {
    const LAST: usize = 0;
    const LAST2: usize = 1;
    const LAST3: usize = 2;
    const GOLDEN: usize = 3;
    const BWDREF: usize = 4;
    const ALTREF2: usize = 5;
    const ALTREF: usize = 6;

    let mut ref_frame_idx: [Option<usize>; REFS_PER_FRAME] = [None; REFS_PER_FRAME];
    ref_frame_idx[LAST] = Some(last_frame_idx as usize);
    ref_frame_idx[GOLDEN] = Some(gold_frame_idx as usize);

    let mut used_frame = [false; NUM_REF_FRAMES];
    used_frame[last_frame_idx as usize] = true;
    used_frame[gold_frame_idx as usize] = true;

    let cur_frame_hint = 1i32 << (seq.order_hint_bits - 1);
    let shifted_order_hints: [i32; NUM_REF_FRAMES] =
        std::array::from_fn(|i| cur_frame_hint + relative_dist(seq, refs[i].order_hint, order_hint));

    if shifted_order_hints[last_frame_idx as usize] >= cur_frame_hint {
        return Err(Av1Error::InvalidData(
            "last_frame_idx refers to a frame that is not in the past".to_string(),
        ));
    }
    if shifted_order_hints[gold_frame_idx as usize] >= cur_frame_hint {
        return Err(Av1Error::InvalidData(
            "gold_frame_idx refers to a frame that is not in the past".to_string(),
        ));
    }

    // find_latest_backward
    let backward = (0..NUM_REF_FRAMES)
        .filter(|&i| !used_frame[i] && shifted_order_hints[i] >= cur_frame_hint)
        .fold(None, |best: Option<usize>, i| match best {
            Some(b) if shifted_order_hints[i] < shifted_order_hints[b] => Some(b),
            _ => Some(i),
        });
    if let Some(i) = backward {
        ref_frame_idx[ALTREF] = Some(i);
        used_frame[i] = true;
    }

    // find_earliest_backward, twice
    for target in [BWDREF, ALTREF2] {
        let earliest = (0..NUM_REF_FRAMES)
            .filter(|&i| !used_frame[i] && shifted_order_hints[i] >= cur_frame_hint)
            .fold(None, |best: Option<usize>, i| match best {
                Some(b) if shifted_order_hints[i] >= shifted_order_hints[b] => Some(b),
                _ => Some(i),
            });
        if let Some(i) = earliest {
            ref_frame_idx[target] = Some(i);
            used_frame[i] = true;
        }
    }

    // find_latest_forward for the remaining slots
    for target in [LAST2, LAST3, BWDREF, ALTREF2, ALTREF] {
        if ref_frame_idx[target].is_some() {
            continue;
        }
        let latest = (0..NUM_REF_FRAMES)
            .filter(|&i| !used_frame[i] && shifted_order_hints[i] < cur_frame_hint)
            .fold(None, |best: Option<usize>, i| match best {
                Some(b) if shifted_order_hints[i] < shifted_order_hints[b] => Some(b),
                _ => Some(i),
            });
        if let Some(i) = latest {
            ref_frame_idx[target] = Some(i);
            used_frame[i] = true;
        }
    }

    // everything left points at the earliest frame
    let mut earliest = 0;
    for i in 1..NUM_REF_FRAMES {
        if shifted_order_hints[i] < shifted_order_hints[earliest] {
            earliest = i;
        }
    }

    Ok(ref_frame_idx.map(|idx| idx.unwrap_or(earliest) as u8))
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;
    use crate::obu::testing::{self, SeqParams};

    fn frame_obu_header() -> ObuHeader {
        ObuHeader {
            obu_type: ObuType::FrameHeader,
            size: None,
            extension_header: None,
        }
    }

    fn parse_seq(params: &SeqParams) -> SequenceHeaderObu {
        let payload = testing::seq_payload(params);
        SequenceHeaderObu::parse(testing::seq_obu_header(), &mut io::Cursor::new(payload)).unwrap()
    }

    #[test]
    fn test_key_frame_header() {
        let params = SeqParams::new(256, 256);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();

        let layout = testing::uniform_layout(&seq, 1, 1);
        let payload = testing::key_frame_payload(&layout);
        let fh = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &payload).unwrap();

        assert_eq!(fh.frame_type, FrameType::Key);
        assert!(fh.show_frame);
        assert!(!fh.showable_frame);
        assert!(fh.error_resilient_mode);
        assert!(fh.force_integer_mv);
        assert_eq!(fh.refresh_frame_flags, 0xff);
        assert_eq!(fh.primary_ref_frame, PRIMARY_REF_NONE);
        assert_eq!(
            fh.size,
            FrameSize {
                upscaled_width: 256,
                frame_width: 256,
                frame_height: 256,
                render_width: 256,
                render_height: 256,
                superres_denom: 8,
            }
        );
        assert_eq!(fh.size.mi_cols(), 64);
        assert_eq!(fh.frame_size_span, None);
        assert_eq!(fh.render_size_span, Some(BitSpan::new(14, 15)));
        assert_eq!(fh.tile_info_span, Some(BitSpan::new(16, 25)));
        assert_eq!(fh.tile_layout, Some(layout));

        fh.update_refs(&mut refs);
        assert!(refs.iter().all(|slot| slot.valid && slot.size == fh.size));
    }

    #[test]
    fn test_inter_frame_size_from_refs() {
        let params = SeqParams::new(256, 256);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();

        let layout = testing::uniform_layout(&seq, 0, 0);
        let key = testing::key_frame_payload(&layout);
        FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &key)
            .unwrap()
            .update_refs(&mut refs);

        let payload = testing::inter_frame_payload(&layout, 1);
        let fh = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &payload).unwrap();
        assert_eq!(fh.frame_type, FrameType::Inter);
        assert!(fh.frame_size_override_flag);
        assert_eq!(fh.order_hint, 1);
        assert_eq!(fh.primary_ref_frame, 0);
        assert_eq!(fh.refresh_frame_flags, 0x01);
        assert_eq!(fh.interpolation_filter, 4);
        assert_eq!(fh.size.frame_width, 256);
        // size came from the reference, nothing to rewrite
        assert_eq!(fh.frame_size_span, None);
        assert_eq!(fh.render_size_span, None);
        assert_eq!(fh.tile_layout, Some(layout));

        fh.update_refs(&mut refs);
        assert_eq!(refs[0].order_hint, 1);
        assert_eq!(refs[1].order_hint, 0);
    }

    #[test]
    fn test_inter_frame_without_reference() {
        let params = SeqParams::new(256, 256);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();

        let layout = testing::uniform_layout(&seq, 0, 0);
        let payload = testing::inter_frame_payload(&layout, 1);
        let err = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &payload).unwrap_err();
        assert!(err.is_invalid_data());
    }

    #[test]
    fn test_truncated_frame_header() {
        let params = SeqParams::new(256, 256);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();

        let err = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &[0x10]).unwrap_err();
        assert!(err.is_invalid_data());
    }

    #[test]
    fn test_rewrite_tile_grid() {
        let params = SeqParams::new(128, 128);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();

        let layout = testing::uniform_layout(&seq, 0, 0);
        let payload = testing::key_frame_payload(&layout);
        let fh = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &payload).unwrap();

        // same sequence, same grid: bit exact
        let mut writer = BitWriter::new(Vec::new());
        fh.write_rewritten(&payload, Some(&seq), &layout, &mut writer).unwrap();
        writer.write_bit(true).unwrap();
        assert_eq!(writer.finish().unwrap(), payload);

        // 256x256 cut in 2x2
        let target_seq = seq.with_dimensions(256, 256).unwrap();
        let target_layout = testing::uniform_layout(&target_seq, 1, 1);
        let mut writer = BitWriter::new(Vec::new());
        fh.write_rewritten(&payload, Some(&target_seq), &target_layout, &mut writer).unwrap();
        writer.write_bit(true).unwrap();
        let rewritten = writer.finish().unwrap();
        assert_eq!(rewritten, testing::key_frame_payload(&target_layout));

        let mut refs = RefFrames::default();
        let reparsed = FrameHeader::parse(&target_seq, &mut refs, frame_obu_header(), &rewritten).unwrap();
        assert_eq!(reparsed.size.frame_width, 256);
        assert_eq!(reparsed.tile_layout, Some(target_layout));
    }

    #[test]
    fn test_rewrite_explicit_frame_size() {
        let params = SeqParams::new(128, 128);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();

        let mut payload_params = params.clone();
        payload_params.frame_size = Some((128, 64));
        payload_params.render_size = Some((100, 50));
        let layout = TileLayout::from_superblock_starts(SuperblockGrid::new(128, 64, false), &[0], &[0]).unwrap();
        let payload = testing::key_frame_payload_with(&payload_params, &layout);
        let fh = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &payload).unwrap();
        assert!(fh.frame_size_override_flag);
        assert_eq!((fh.size.frame_width, fh.size.frame_height), (128, 64));
        assert_eq!((fh.size.render_width, fh.size.render_height), (100, 50));
        assert_eq!(fh.frame_size_span.map(|span| span.len()), Some(14));
        assert_eq!(fh.render_size_span.map(|span| span.len()), Some(33));

        let target_seq = seq.with_dimensions(256, 256).unwrap();
        let target_layout = testing::uniform_layout(&target_seq, 1, 0);
        let mut writer = BitWriter::new(Vec::new());
        fh.write_rewritten(&payload, Some(&target_seq), &target_layout, &mut writer).unwrap();
        writer.write_bit(true).unwrap();
        let rewritten = writer.finish().unwrap();

        let mut refs = RefFrames::default();
        let reparsed = FrameHeader::parse(&target_seq, &mut refs, frame_obu_header(), &rewritten).unwrap();
        assert_eq!((reparsed.size.frame_width, reparsed.size.frame_height), (256, 256));
        assert_eq!((reparsed.size.render_width, reparsed.size.render_height), (256, 256));
        assert_eq!(reparsed.tile_layout, Some(target_layout));

        // without resizing only tile_info() changes
        let split_layout = TileLayout::from_superblock_starts(layout.grid, &[0, 1], &[0]).unwrap();
        let mut writer = BitWriter::new(Vec::new());
        fh.write_rewritten(&payload, None, &split_layout, &mut writer).unwrap();
        writer.write_bit(true).unwrap();
        let rewritten = writer.finish().unwrap();
        assert_eq!(rewritten, testing::key_frame_payload_with(&payload_params, &split_layout));

        let mut refs = RefFrames::default();
        let reparsed = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &rewritten).unwrap();
        assert_eq!((reparsed.size.frame_width, reparsed.size.frame_height), (128, 64));
        assert_eq!((reparsed.size.render_width, reparsed.size.render_height), (100, 50));
    }

    #[test]
    fn test_show_existing_frame() {
        let params = SeqParams::new(256, 256);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();

        // nothing stored yet
        let err = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &[0b1010_1000]).unwrap_err();
        assert!(err.is_invalid_data());

        refs[2] = RefFrame {
            valid: true,
            frame_type: FrameType::Inter,
            order_hint: 9,
            showable: true,
            size: FrameSize {
                upscaled_width: 256,
                frame_width: 256,
                frame_height: 256,
                render_width: 256,
                render_height: 256,
                superres_denom: 8,
            },
            ..RefFrame::default()
        };
        // show_existing_frame 1, frame_to_show_map_idx 010, trailing bits
        let fh = FrameHeader::parse(&seq, &mut refs, frame_obu_header(), &[0b1010_1000]).unwrap();
        assert!(fh.show_existing_frame);
        assert_eq!(fh.frame_to_show_map_idx, 2);
        assert_eq!(fh.order_hint, 9);
        assert_eq!(fh.refresh_frame_flags, 0);
        assert_eq!(fh.tile_layout, None);

        let frame = ObuHeader {
            obu_type: ObuType::Frame,
            ..frame_obu_header()
        };
        let err = FrameHeader::parse(&seq, &mut refs, frame, &[0b1010_1000]).unwrap_err();
        assert!(err.is_invalid_data());
    }

    #[test]
    fn test_set_frame_refs() {
        let params = SeqParams::new(256, 256);
        let seq = parse_seq(&params);
        let mut refs = RefFrames::default();
        for (i, slot) in refs.iter_mut().enumerate() {
            slot.valid = true;
            slot.order_hint = i as u32;
        }

        // current frame 5: slots 0..5 are in the past, 5..8 in the future
        let idx = set_frame_refs(&seq, &refs, 5, 4, 0).unwrap();
        assert_eq!(idx[0], 4); // LAST
        assert_eq!(idx[3], 0); // GOLDEN
        assert_eq!(idx[6], 7); // ALTREF, latest backward
        assert_eq!(idx[4], 5); // BWDREF, earliest backward
        assert_eq!(idx[5], 6); // ALTREF2
        assert_eq!(idx[1], 3); // LAST2, latest forward left
        assert_eq!(idx[2], 2); // LAST3

        let err = set_frame_refs(&seq, &refs, 5, 6, 0).unwrap_err();
        assert!(err.is_invalid_data());
    }
}
