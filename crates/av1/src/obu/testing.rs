//! Synthetic OBU payloads for unit tests.

use bytes_util::BitWriter;

use super::seq::SequenceHeaderObu;
use super::tile::{SuperblockGrid, TileLayout};
use super::utils::floor_log2;
use super::{ObuHeader, ObuType};

/// Knobs for the generated sequence and frame headers.
#[derive(Debug, Clone)]
pub(crate) struct SeqParams {
    pub width: u32,
    pub height: u32,
    pub use_128x128_superblock: bool,
    /// Explicit `frame_size()` in the frame header.
    pub frame_size: Option<(u32, u32)>,
    /// Explicit `render_size()` in the frame header.
    pub render_size: Option<(u32, u32)>,
}

impl SeqParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            use_128x128_superblock: false,
            frame_size: None,
            render_size: None,
        }
    }

    fn width_bits(&self) -> u8 {
        floor_log2(u64::from(self.width - 1)) as u8 + 1
    }

    fn height_bits(&self) -> u8 {
        floor_log2(u64::from(self.height - 1)) as u8 + 1
    }
}

pub(crate) fn seq_obu_header() -> ObuHeader {
    ObuHeader {
        obu_type: ObuType::SequenceHeader,
        size: None,
        extension_header: None,
    }
}

fn finish(mut writer: BitWriter<Vec<u8>>) -> Vec<u8> {
    writer.write_bit(true).unwrap(); // trailing_one_bit
    writer.align().unwrap();
    writer.finish().unwrap()
}

/// Main profile, level 5.0, 8-bit 4:2:0, 7 bit order hints, selectable
/// screen content tools.
pub(crate) fn seq_payload(params: &SeqParams) -> Vec<u8> {
    let mut w = BitWriter::new(Vec::new());
    w.write_bits(0, 3).unwrap(); // seq_profile
    w.write_bit(false).unwrap(); // still_picture
    w.write_bit(false).unwrap(); // reduced_still_picture_header
    w.write_bit(false).unwrap(); // timing_info_present_flag
    w.write_bit(false).unwrap(); // initial_display_delay_present_flag
    w.write_bits(0, 5).unwrap(); // operating_points_cnt_minus_1
    w.write_bits(0, 12).unwrap(); // operating_point_idc
    w.write_bits(12, 5).unwrap(); // seq_level_idx
    w.write_bit(false).unwrap(); // seq_tier

    w.write_bits(u64::from(params.width_bits() - 1), 4).unwrap();
    w.write_bits(u64::from(params.height_bits() - 1), 4).unwrap();
    w.write_bits(u64::from(params.width - 1), params.width_bits()).unwrap();
    w.write_bits(u64::from(params.height - 1), params.height_bits()).unwrap();

    w.write_bit(false).unwrap(); // frame_id_numbers_present_flag
    w.write_bit(params.use_128x128_superblock).unwrap();
    w.write_bits(0b11, 2).unwrap(); // enable_filter_intra, enable_intra_edge_filter
    w.write_bits(0, 4).unwrap(); // interintra, masked, warped, dual filter
    w.write_bit(true).unwrap(); // enable_order_hint
    w.write_bits(0, 2).unwrap(); // enable_jnt_comp, enable_ref_frame_mvs
    w.write_bit(true).unwrap(); // seq_choose_screen_content_tools
    w.write_bit(true).unwrap(); // seq_choose_integer_mv
    w.write_bits(6, 3).unwrap(); // order_hint_bits_minus_1
    w.write_bit(false).unwrap(); // enable_superres
    w.write_bits(0b11, 2).unwrap(); // enable_cdef, enable_restoration

    w.write_bit(false).unwrap(); // high_bitdepth
    w.write_bit(false).unwrap(); // mono_chrome
    w.write_bit(false).unwrap(); // color_description_present_flag
    w.write_bit(false).unwrap(); // color_range
    w.write_bits(0, 2).unwrap(); // chroma_sample_position
    w.write_bit(false).unwrap(); // separate_uv_delta_q
    w.write_bit(false).unwrap(); // film_grain_params_present

    finish(w)
}

/// Uniformly spaced layout for `seq`'s full frame size.
pub(crate) fn uniform_layout(seq: &SequenceHeaderObu, cols_log2: u32, rows_log2: u32) -> TileLayout {
    let grid = SuperblockGrid::new(seq.max_frame_width, seq.max_frame_height, seq.use_128x128_superblock);
    let starts = |sb_count: u32, log2: u32| -> Vec<u32> {
        let size = (sb_count + (1 << log2) - 1) >> log2;
        (0..sb_count).step_by(size as usize).collect()
    };
    TileLayout::from_superblock_starts(
        grid,
        &starts(grid.sb_cols, cols_log2),
        &starts(grid.sb_rows, rows_log2),
    )
    .unwrap()
}

/// Opaque bits standing in for the syntax after `tile_info()`.
fn header_tail(w: &mut BitWriter<Vec<u8>>) {
    w.write_bits(0b1011_0110, 8).unwrap();
}

pub(crate) fn key_frame_payload(layout: &TileLayout) -> Vec<u8> {
    key_frame_payload_with(&SeqParams::new(layout.grid.frame_width, layout.grid.frame_height), layout)
}

/// A shown key frame using `params`' explicit sizes, if any.
pub(crate) fn key_frame_payload_with(params: &SeqParams, layout: &TileLayout) -> Vec<u8> {
    let mut w = BitWriter::new(Vec::new());
    w.write_bit(false).unwrap(); // show_existing_frame
    w.write_bits(0, 2).unwrap(); // KEY_FRAME
    w.write_bit(true).unwrap(); // show_frame
    w.write_bit(false).unwrap(); // disable_cdf_update
    w.write_bit(false).unwrap(); // allow_screen_content_tools
    w.write_bit(params.frame_size.is_some()).unwrap(); // frame_size_override_flag
    w.write_bits(0, 7).unwrap(); // order_hint

    if let Some((width, height)) = params.frame_size {
        w.write_bits(u64::from(width - 1), params.width_bits()).unwrap();
        w.write_bits(u64::from(height - 1), params.height_bits()).unwrap();
    }
    match params.render_size {
        Some((width, height)) => {
            w.write_bit(true).unwrap();
            w.write_bits(u64::from(width - 1), 16).unwrap();
            w.write_bits(u64::from(height - 1), 16).unwrap();
        }
        None => w.write_bit(false).unwrap(),
    }

    w.write_bit(false).unwrap(); // disable_frame_end_update_cdf
    layout.write(&mut w).unwrap();
    header_tail(&mut w);
    finish(w)
}

/// A shown inter frame predicting from slot 0 and taking its size from it.
pub(crate) fn inter_frame_payload(layout: &TileLayout, order_hint: u32) -> Vec<u8> {
    let mut w = BitWriter::new(Vec::new());
    w.write_bit(false).unwrap(); // show_existing_frame
    w.write_bits(1, 2).unwrap(); // INTER_FRAME
    w.write_bit(true).unwrap(); // show_frame
    w.write_bit(false).unwrap(); // error_resilient_mode
    w.write_bit(false).unwrap(); // disable_cdf_update
    w.write_bit(false).unwrap(); // allow_screen_content_tools
    w.write_bit(true).unwrap(); // frame_size_override_flag
    w.write_bits(u64::from(order_hint), 7).unwrap();
    w.write_bits(0, 3).unwrap(); // primary_ref_frame
    w.write_bits(0x01, 8).unwrap(); // refresh_frame_flags
    w.write_bit(false).unwrap(); // frame_refs_short_signaling
    w.write_bits(0, 21).unwrap(); // ref_frame_idx[0..7]
    w.write_bit(true).unwrap(); // found_ref
    w.write_bit(false).unwrap(); // allow_high_precision_mv
    w.write_bit(true).unwrap(); // is_filter_switchable
    w.write_bit(false).unwrap(); // is_motion_mode_switchable
    w.write_bit(false).unwrap(); // disable_frame_end_update_cdf
    layout.write(&mut w).unwrap();
    header_tail(&mut w);
    finish(w)
}
