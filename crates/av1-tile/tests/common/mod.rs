//! Synthetic AV1 temporal units.

#![allow(dead_code)]

use av1::tile::{SuperblockGrid, TileGroup, TileLayout};
use av1::{ObuType, write_obu};
use bytes::Bytes;
use bytes_util::BitWriter;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn dimension_bits(value: u32) -> u8 {
    (32 - (value - 1).leading_zeros()).max(1) as u8
}

fn finish(mut w: BitWriter<Vec<u8>>) -> Vec<u8> {
    w.write_bit(true).unwrap(); // trailing_one_bit
    w.align().unwrap();
    w.finish().unwrap()
}

/// Main profile, 8-bit 4:2:0, 64x64 superblocks, 7 bit order hints.
pub fn seq_payload(width: u32, height: u32) -> Vec<u8> {
    let (width_bits, height_bits) = (dimension_bits(width), dimension_bits(height));

    let mut w = BitWriter::new(Vec::new());
    w.write_bits(0, 3).unwrap(); // seq_profile
    w.write_bits(0, 2).unwrap(); // still_picture, reduced_still_picture_header
    w.write_bits(0, 2).unwrap(); // timing_info_present_flag, initial_display_delay_present_flag
    w.write_bits(0, 5).unwrap(); // operating_points_cnt_minus_1
    w.write_bits(0, 12).unwrap(); // operating_point_idc
    w.write_bits(12, 5).unwrap(); // seq_level_idx
    w.write_bit(false).unwrap(); // seq_tier
    w.write_bits(u64::from(width_bits - 1), 4).unwrap();
    w.write_bits(u64::from(height_bits - 1), 4).unwrap();
    w.write_bits(u64::from(width - 1), width_bits).unwrap();
    w.write_bits(u64::from(height - 1), height_bits).unwrap();
    w.write_bit(false).unwrap(); // frame_id_numbers_present_flag
    w.write_bit(false).unwrap(); // use_128x128_superblock
    w.write_bits(0b11, 2).unwrap(); // enable_filter_intra, enable_intra_edge_filter
    w.write_bits(0, 4).unwrap(); // interintra, masked, warped, dual filter
    w.write_bit(true).unwrap(); // enable_order_hint
    w.write_bits(0, 2).unwrap(); // enable_jnt_comp, enable_ref_frame_mvs
    w.write_bits(0b11, 2).unwrap(); // seq_choose_screen_content_tools, seq_choose_integer_mv
    w.write_bits(6, 3).unwrap(); // order_hint_bits_minus_1
    w.write_bit(false).unwrap(); // enable_superres
    w.write_bits(0b11, 2).unwrap(); // enable_cdef, enable_restoration
    w.write_bits(0, 4).unwrap(); // high_bitdepth, mono_chrome, color_description_present_flag, color_range
    w.write_bits(0, 2).unwrap(); // chroma_sample_position
    w.write_bits(0, 2).unwrap(); // separate_uv_delta_q, film_grain_params_present
    finish(w)
}

/// A layout for a `width`x`height` frame cut at the given pixel positions.
pub fn layout(width: u32, height: u32, col_x: &[u32], row_y: &[u32]) -> TileLayout {
    TileLayout::from_pixel_starts(SuperblockGrid::new(width, height, false), col_x, row_y).unwrap()
}

fn header_tail(w: &mut BitWriter<Vec<u8>>) {
    w.write_bits(0b0110_1001, 8).unwrap();
}

/// A shown key frame with the sequence's frame size.
pub fn key_frame_payload(layout: &TileLayout) -> Vec<u8> {
    let mut w = BitWriter::new(Vec::new());
    w.write_bit(false).unwrap(); // show_existing_frame
    w.write_bits(0, 2).unwrap(); // KEY_FRAME
    w.write_bit(true).unwrap(); // show_frame
    w.write_bit(false).unwrap(); // disable_cdf_update
    w.write_bit(false).unwrap(); // allow_screen_content_tools
    w.write_bit(false).unwrap(); // frame_size_override_flag
    w.write_bits(0, 7).unwrap(); // order_hint
    w.write_bit(false).unwrap(); // render_and_frame_size_different
    w.write_bit(false).unwrap(); // disable_frame_end_update_cdf
    layout.write(&mut w).unwrap();
    header_tail(&mut w);
    finish(w)
}

/// A shown inter frame taking its size from reference slot 0.
pub fn inter_frame_payload(layout: &TileLayout, order_hint: u32) -> Vec<u8> {
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

/// A tile group carrying every tile of `layout`.
pub fn tile_group_payload(layout: &TileLayout, tiles: &[Vec<u8>]) -> Vec<u8> {
    let tiles: Vec<&[u8]> = tiles.iter().map(Vec::as_slice).collect();
    let mut w = BitWriter::new(Vec::new());
    TileGroup::write_all_tiles(&mut w, layout, &tiles).unwrap();
    w.finish().unwrap()
}

/// Temporal delimiter, optional sequence header, frame header and one tile
/// group.
pub fn temporal_unit(seq: Option<&[u8]>, frame_header: &[u8], layout: &TileLayout, tiles: &[Vec<u8>]) -> Bytes {
    let mut data = Vec::new();
    write_obu(&mut data, ObuType::TemporalDelimiter, None, &[]).unwrap();
    if let Some(seq) = seq {
        write_obu(&mut data, ObuType::SequenceHeader, None, seq).unwrap();
    }
    write_obu(&mut data, ObuType::FrameHeader, None, frame_header).unwrap();
    write_obu(&mut data, ObuType::TileGroup, None, &tile_group_payload(layout, tiles)).unwrap();
    Bytes::from(data)
}

/// Recognizable tile data.
pub fn tile_data(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_mul(31).wrapping_add(i as u8)).collect()
}
