//! Sequence Header

use std::io;

use byteorder::{BigEndian, ReadBytesExt};
use bytes_util::{BitReader, BitWriter, copy_bits};

use super::field::{Field, encode_field};
use super::utils::{floor_log2, read_uvlc, trailing_bits_position};
use super::{BitSpan, ObuHeader};

/// `SELECT_SCREEN_CONTENT_TOOLS`
pub const SELECT_SCREEN_CONTENT_TOOLS: u8 = 2;
/// `SELECT_INTEGER_MV`
pub const SELECT_INTEGER_MV: u8 = 2;

/// Sequence Header OBU
///
/// AV1-Spec-2 - 5.5
///
/// Besides the parsed syntax, the position of the frame dimension fields is
/// kept so the header can be re-emitted for a different frame size while
/// every other bit stays untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeaderObu {
    /// The OBU header that precedes the sequence header
    pub header: ObuHeader,
    /// `seq_profile`
    ///
    /// 3 bits
    pub seq_profile: u8,
    /// `still_picture`
    pub still_picture: bool,
    /// `reduced_still_picture_header`
    pub reduced_still_picture_header: bool,
    /// `timing_info` if `timing_info_present_flag` is 1
    pub timing_info: Option<TimingInfo>,
    /// `decoder_model_info` if `decoder_model_info_present_flag` is 1
    pub decoder_model_info: Option<DecoderModelInfo>,
    /// All operating points
    pub operating_points: Vec<OperatingPoint>,
    /// `frame_width_bits_minus_1 + 1`
    pub frame_width_bits: u8,
    /// `frame_height_bits_minus_1 + 1`
    pub frame_height_bits: u8,
    /// `max_frame_width_minus_1 + 1`
    pub max_frame_width: u32,
    /// `max_frame_height_minus_1 + 1`
    pub max_frame_height: u32,
    /// Bits from `frame_width_bits_minus_1` through `max_frame_height_minus_1`.
    pub frame_dimensions_span: BitSpan,
    /// The [`FrameIds`] if `frame_id_numbers_present_flag` is 1
    pub frame_ids: Option<FrameIds>,
    /// `use_128x128_superblock`
    pub use_128x128_superblock: bool,
    /// `enable_filter_intra`
    pub enable_filter_intra: bool,
    /// `enable_intra_edge_filter`
    pub enable_intra_edge_filter: bool,
    /// `enable_interintra_compound`
    pub enable_interintra_compound: bool,
    /// `enable_masked_compound`
    pub enable_masked_compound: bool,
    /// `enable_warped_motion`
    pub enable_warped_motion: bool,
    /// `enable_dual_filter`
    pub enable_dual_filter: bool,
    /// `enable_order_hint`
    pub enable_order_hint: bool,
    /// `enable_jnt_comp`
    pub enable_jnt_comp: bool,
    /// `enable_ref_frame_mvs`
    pub enable_ref_frame_mvs: bool,
    /// `seq_force_screen_content_tools`
    pub seq_force_screen_content_tools: u8,
    /// `seq_force_integer_mv`
    pub seq_force_integer_mv: u8,
    /// `OrderHintBits`
    pub order_hint_bits: u8,
    /// `enable_superres`
    pub enable_superres: bool,
    /// `enable_cdef`
    pub enable_cdef: bool,
    /// `enable_restoration`
    pub enable_restoration: bool,
    /// `color_config()`
    pub color_config: ColorConfig,
    /// `film_grain_params_present`
    pub film_grain_params_present: bool,
}

/// Frame IDs
///
/// Can be part of the [`SequenceHeaderObu`].
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct FrameIds {
    /// `delta_frame_id_length_minus_2 + 2`
    pub delta_frame_id_length: u8,
    /// `additional_frame_id_length_minus_1 + 1`
    pub additional_frame_id_length: u8,
}

impl FrameIds {
    /// `idLen`, the width of `current_frame_id`.
    pub const fn id_len(&self) -> u8 {
        self.additional_frame_id_length + self.delta_frame_id_length
    }
}

/// Operating Point
///
/// Part of the [`SequenceHeaderObu`].
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct OperatingPoint {
    /// `operating_point_idc`
    ///
    /// 12 bits
    pub idc: u16,
    /// `seq_level_idx`
    ///
    /// 5 bits
    pub seq_level_idx: u8,
    /// `seq_tier`
    pub seq_tier: bool,
    /// `operating_parameters_info` if `decoder_model_present_for_this_op` is 1
    pub operating_parameters_info: Option<OperatingParametersInfo>,
    /// `initial_display_delay_minus_1 + 1` if present for this operating point
    pub initial_display_delay: Option<u8>,
}

impl OperatingPoint {
    /// Returns `true` if a frame in layer `temporal_id`/`spatial_id` belongs to this operating point.
    pub const fn contains_layer(&self, temporal_id: u8, spatial_id: u8) -> bool {
        if self.idc == 0 {
            return true;
        }
        let in_temporal = (self.idc >> temporal_id) & 1 == 1;
        let in_spatial = (self.idc >> (spatial_id + 8)) & 1 == 1;
        in_temporal && in_spatial
    }
}

/// Timing info
///
/// AV1-Spec-2 - 5.5.3
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct TimingInfo {
    /// `num_units_in_display_tick`
    pub num_units_in_display_tick: u32,
    /// `time_scale`
    pub time_scale: u32,
    /// `num_ticks_per_picture_minus_1 + 1` if `equal_picture_interval` is 1
    pub num_ticks_per_picture: Option<u32>,
}

impl TimingInfo {
    /// Parses the timing info from the given reader.
    pub fn parse(bit_reader: &mut BitReader<impl io::Read>) -> io::Result<Self> {
        let num_units_in_display_tick = bit_reader.read_u32::<BigEndian>()?;
        let time_scale = bit_reader.read_u32::<BigEndian>()?;
        let equal_picture_interval = bit_reader.read_bit()?;
        let num_ticks_per_picture = if equal_picture_interval {
            Some(read_uvlc(bit_reader, 0, u32::MAX - 1)? + 1)
        } else {
            None
        };

        Ok(Self {
            num_units_in_display_tick,
            time_scale,
            num_ticks_per_picture,
        })
    }
}

/// Decoder model info
///
/// AV1-Spec-2 - 5.5.4
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct DecoderModelInfo {
    /// `buffer_delay_length_minus_1 + 1`
    pub buffer_delay_length: u8,
    /// `num_units_in_decoding_tick`
    pub num_units_in_decoding_tick: u32,
    /// `buffer_removal_time_length_minus_1 + 1`
    pub buffer_removal_time_length: u8,
    /// `frame_presentation_time_length_minus_1 + 1`
    pub frame_presentation_time_length: u8,
}

impl DecoderModelInfo {
    /// Parses the decoder model info from the given reader.
    pub fn parse(bit_reader: &mut BitReader<impl io::Read>) -> io::Result<Self> {
        let buffer_delay_length = bit_reader.read_bits(5)? as u8 + 1;
        let num_units_in_decoding_tick = bit_reader.read_u32::<BigEndian>()?;
        let buffer_removal_time_length = bit_reader.read_bits(5)? as u8 + 1;
        let frame_presentation_time_length = bit_reader.read_bits(5)? as u8 + 1;

        Ok(Self {
            buffer_delay_length,
            num_units_in_decoding_tick,
            buffer_removal_time_length,
            frame_presentation_time_length,
        })
    }
}

/// Operating parameters info
///
/// AV1-Spec-2 - 5.5.5
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct OperatingParametersInfo {
    /// `decoder_buffer_delay`
    pub decoder_buffer_delay: u64,
    /// `encoder_buffer_delay`
    pub encoder_buffer_delay: u64,
    /// `low_delay_mode_flag`
    pub low_delay_mode_flag: bool,
}

impl OperatingParametersInfo {
    /// Parses the operating parameters info from the given reader.
    pub fn parse(delay_bit_length: u8, bit_reader: &mut BitReader<impl io::Read>) -> io::Result<Self> {
        Ok(Self {
            decoder_buffer_delay: bit_reader.read_bits(delay_bit_length)?,
            encoder_buffer_delay: bit_reader.read_bits(delay_bit_length)?,
            low_delay_mode_flag: bit_reader.read_bit()?,
        })
    }
}

/// Color config
///
/// AV1-Spec-2 - 5.5.2
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct ColorConfig {
    /// `BitDepth`
    pub bit_depth: u8,
    /// `mono_chrome`
    pub mono_chrome: bool,
    /// `color_primaries`
    pub color_primaries: u8,
    /// `transfer_characteristics`
    pub transfer_characteristics: u8,
    /// `matrix_coefficients`
    pub matrix_coefficients: u8,
    /// `color_range`
    pub full_color_range: bool,
    /// `subsampling_x`
    pub subsampling_x: bool,
    /// `subsampling_y`
    pub subsampling_y: bool,
    /// `chroma_sample_position`
    pub chroma_sample_position: u8,
    /// `separate_uv_delta_q`
    pub separate_uv_delta_q: bool,
}

const CP_BT_709: u8 = 1;
const CP_UNSPECIFIED: u8 = 2;
const TC_UNSPECIFIED: u8 = 2;
const TC_SRGB: u8 = 13;
const MC_IDENTITY: u8 = 0;
const MC_UNSPECIFIED: u8 = 2;
const CSP_UNKNOWN: u8 = 0;

impl ColorConfig {
    /// `NumPlanes`
    pub const fn num_planes(&self) -> u8 {
        if self.mono_chrome { 1 } else { 3 }
    }

    /// Parses the color config from the given reader.
    pub fn parse(seq_profile: u8, bit_reader: &mut BitReader<impl io::Read>) -> io::Result<Self> {
        let high_bitdepth = bit_reader.read_bit()?;
        let bit_depth = match (seq_profile, high_bitdepth) {
            (2, true) if bit_reader.read_bit()? => 12,
            (_, true) => 10,
            (_, false) => 8,
        };

        let mono_chrome = seq_profile != 1 && bit_reader.read_bit()?;

        let (color_primaries, transfer_characteristics, matrix_coefficients) = if bit_reader.read_bit()? {
            (
                bit_reader.read_bits(8)? as u8,
                bit_reader.read_bits(8)? as u8,
                bit_reader.read_bits(8)? as u8,
            )
        } else {
            (CP_UNSPECIFIED, TC_UNSPECIFIED, MC_UNSPECIFIED)
        };

        let mut config = ColorConfig {
            bit_depth,
            mono_chrome,
            color_primaries,
            transfer_characteristics,
            matrix_coefficients,
            full_color_range: true,
            subsampling_x: true,
            subsampling_y: true,
            chroma_sample_position: CSP_UNKNOWN,
            separate_uv_delta_q: false,
        };

        if mono_chrome {
            config.full_color_range = bit_reader.read_bit()?;
            return Ok(config);
        }

        let srgb = color_primaries == CP_BT_709 && transfer_characteristics == TC_SRGB && matrix_coefficients == MC_IDENTITY;
        if srgb {
            config.subsampling_x = false;
            config.subsampling_y = false;
        } else {
            config.full_color_range = bit_reader.read_bit()?;
            (config.subsampling_x, config.subsampling_y) = match (seq_profile, bit_depth) {
                (0, _) => (true, true),
                (1, _) => (false, false),
                (_, 12) => {
                    let x = bit_reader.read_bit()?;
                    (x, x && bit_reader.read_bit()?)
                }
                _ => (true, false),
            };
            if config.subsampling_x && config.subsampling_y {
                config.chroma_sample_position = bit_reader.read_bits(2)? as u8;
            }
        }

        config.separate_uv_delta_q = bit_reader.read_bit()?;
        Ok(config)
    }
}

fn dimension_bits(name: &str, current: u8, value: u32) -> io::Result<u8> {
    if value == 0 || value > 1 << 16 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{name} {value} outside of 1..=65536"),
        ));
    }
    let needed = floor_log2(u64::from(value - 1)) as u8 + 1;
    Ok(current.max(needed))
}

impl SequenceHeaderObu {
    /// Returns a reference to the header of the OBU.
    pub const fn header(&self) -> &ObuHeader {
        &self.header
    }

    /// `decoder_model_info_present_flag`
    pub const fn decoder_model_info_present(&self) -> bool {
        self.decoder_model_info.is_some()
    }

    /// `equal_picture_interval`
    pub fn equal_picture_interval(&self) -> bool {
        self.timing_info.is_some_and(|info| info.num_ticks_per_picture.is_some())
    }

    /// Size of a superblock in pixels.
    pub const fn superblock_size(&self) -> u32 {
        if self.use_128x128_superblock { 128 } else { 64 }
    }

    /// Parses the sequence header from the given reader.
    ///
    /// The given header will be part of the returned struct and can be accessed through the [`SequenceHeaderObu::header`] function.
    pub fn parse(header: ObuHeader, reader: &mut impl io::Read) -> io::Result<Self> {
        let mut bit_reader = BitReader::new(reader);

        let seq_profile = bit_reader.read_bits(3)? as u8;
        let still_picture = bit_reader.read_bit()?;
        let reduced_still_picture_header = bit_reader.read_bit()?;

        if !still_picture && reduced_still_picture_header {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "reduced_still_picture_header is true but still_picture is false",
            ));
        }

        let mut timing_info = None;
        let mut decoder_model_info = None;
        let mut operating_points = Vec::new();

        if reduced_still_picture_header {
            operating_points.push(OperatingPoint {
                idc: 0,
                seq_level_idx: bit_reader.read_bits(5)? as u8,
                seq_tier: false,
                operating_parameters_info: None,
                initial_display_delay: None,
            });
        } else {
            if bit_reader.read_bit()? {
                timing_info = Some(TimingInfo::parse(&mut bit_reader)?);
                if bit_reader.read_bit()? {
                    decoder_model_info = Some(DecoderModelInfo::parse(&mut bit_reader)?);
                }
            }

            let initial_display_delay_present = bit_reader.read_bit()?;
            let operating_points_cnt = bit_reader.read_bits(5)? as u8 + 1;
            for _ in 0..operating_points_cnt {
                let idc = bit_reader.read_bits(12)? as u16;
                let seq_level_idx = bit_reader.read_bits(5)? as u8;
                let seq_tier = seq_level_idx > 7 && bit_reader.read_bit()?;

                let operating_parameters_info = match decoder_model_info {
                    Some(info) if bit_reader.read_bit()? => {
                        Some(OperatingParametersInfo::parse(info.buffer_delay_length, &mut bit_reader)?)
                    }
                    _ => None,
                };

                let initial_display_delay = if initial_display_delay_present && bit_reader.read_bit()? {
                    Some(bit_reader.read_bits(4)? as u8 + 1)
                } else {
                    None
                };

                operating_points.push(OperatingPoint {
                    idc,
                    seq_level_idx,
                    seq_tier,
                    operating_parameters_info,
                    initial_display_delay,
                });
            }
        }

        let dims_start = bit_reader.bits_read();
        let frame_width_bits = bit_reader.read_bits(4)? as u8 + 1;
        let frame_height_bits = bit_reader.read_bits(4)? as u8 + 1;
        let max_frame_width = bit_reader.read_bits(frame_width_bits)? as u32 + 1;
        let max_frame_height = bit_reader.read_bits(frame_height_bits)? as u32 + 1;
        let frame_dimensions_span = BitSpan::new(dims_start, bit_reader.bits_read());

        let frame_ids = if !reduced_still_picture_header && bit_reader.read_bit()? {
            Some(FrameIds {
                delta_frame_id_length: bit_reader.read_bits(4)? as u8 + 2,
                additional_frame_id_length: bit_reader.read_bits(3)? as u8 + 1,
            })
        } else {
            None
        };

        let use_128x128_superblock = bit_reader.read_bit()?;
        let enable_filter_intra = bit_reader.read_bit()?;
        let enable_intra_edge_filter = bit_reader.read_bit()?;

        let mut seq = Self {
            header,
            seq_profile,
            still_picture,
            reduced_still_picture_header,
            timing_info,
            decoder_model_info,
            operating_points,
            frame_width_bits,
            frame_height_bits,
            max_frame_width,
            max_frame_height,
            frame_dimensions_span,
            frame_ids,
            use_128x128_superblock,
            enable_filter_intra,
            enable_intra_edge_filter,
            enable_interintra_compound: false,
            enable_masked_compound: false,
            enable_warped_motion: false,
            enable_dual_filter: false,
            enable_order_hint: false,
            enable_jnt_comp: false,
            enable_ref_frame_mvs: false,
            seq_force_screen_content_tools: SELECT_SCREEN_CONTENT_TOOLS,
            seq_force_integer_mv: SELECT_INTEGER_MV,
            order_hint_bits: 0,
            enable_superres: false,
            enable_cdef: false,
            enable_restoration: false,
            color_config: ColorConfig {
                bit_depth: 8,
                mono_chrome: false,
                color_primaries: CP_UNSPECIFIED,
                transfer_characteristics: TC_UNSPECIFIED,
                matrix_coefficients: MC_UNSPECIFIED,
                full_color_range: false,
                subsampling_x: true,
                subsampling_y: true,
                chroma_sample_position: CSP_UNKNOWN,
                separate_uv_delta_q: false,
            },
            film_grain_params_present: false,
        };

        if !reduced_still_picture_header {
            seq.enable_interintra_compound = bit_reader.read_bit()?;
            seq.enable_masked_compound = bit_reader.read_bit()?;
            seq.enable_warped_motion = bit_reader.read_bit()?;
            seq.enable_dual_filter = bit_reader.read_bit()?;
            seq.enable_order_hint = bit_reader.read_bit()?;
            if seq.enable_order_hint {
                seq.enable_jnt_comp = bit_reader.read_bit()?;
                seq.enable_ref_frame_mvs = bit_reader.read_bit()?;
            }

            let seq_choose_screen_content_tools = bit_reader.read_bit()?;
            if !seq_choose_screen_content_tools {
                seq.seq_force_screen_content_tools = bit_reader.read_bits(1)? as u8;
            }

            if seq.seq_force_screen_content_tools > 0 {
                let seq_choose_integer_mv = bit_reader.read_bit()?;
                if !seq_choose_integer_mv {
                    seq.seq_force_integer_mv = bit_reader.read_bits(1)? as u8;
                }
            }

            if seq.enable_order_hint {
                seq.order_hint_bits = bit_reader.read_bits(3)? as u8 + 1;
            }
        }

        seq.enable_superres = bit_reader.read_bit()?;
        seq.enable_cdef = bit_reader.read_bit()?;
        seq.enable_restoration = bit_reader.read_bit()?;
        seq.color_config = ColorConfig::parse(seq_profile, &mut bit_reader)?;
        seq.film_grain_params_present = bit_reader.read_bit()?;

        Ok(seq)
    }

    /// Returns a copy of this header describing a `width`x`height` stream.
    ///
    /// The dimension field widths only ever grow, so a header that already
    /// fits the new size keeps its exact bit layout.
    pub fn with_dimensions(&self, width: u32, height: u32) -> io::Result<Self> {
        let frame_width_bits = dimension_bits("frame width", self.frame_width_bits, width)?;
        let frame_height_bits = dimension_bits("frame height", self.frame_height_bits, height)?;

        let start = self.frame_dimensions_span.start;
        let len = 8 + u64::from(frame_width_bits) + u64::from(frame_height_bits);

        Ok(Self {
            frame_width_bits,
            frame_height_bits,
            max_frame_width: width,
            max_frame_height: height,
            frame_dimensions_span: BitSpan::new(start, start + len),
            ..self.clone()
        })
    }

    /// Writes the header content for a `width`x`height` stream.
    ///
    /// `payload` is the OBU payload this header was parsed from. Everything
    /// except the frame dimension fields is copied bit for bit. Trailing bits
    /// are not written. Returns the header describing what was written.
    pub fn write_with_dimensions<W: io::Write>(
        &self,
        payload: &[u8],
        width: u32,
        height: u32,
        writer: &mut BitWriter<W>,
    ) -> io::Result<Self> {
        let target = self.with_dimensions(width, height)?;
        let span = self.frame_dimensions_span;
        let content_end = trailing_bits_position(payload)?;
        if content_end < span.end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "sequence header payload ends inside the frame dimensions",
            ));
        }

        copy_bits(payload, 0..span.start, writer)?;
        encode_field(
            writer,
            &Field::bits("frame_width_bits_minus_1", 4),
            u32::from(target.frame_width_bits - 1),
        )?;
        encode_field(
            writer,
            &Field::bits("frame_height_bits_minus_1", 4),
            u32::from(target.frame_height_bits - 1),
        )?;
        encode_field(
            writer,
            &Field::bits("max_frame_width_minus_1", target.frame_width_bits),
            width - 1,
        )?;
        encode_field(
            writer,
            &Field::bits("max_frame_height_minus_1", target.frame_height_bits),
            height - 1,
        )?;
        copy_bits(payload, span.end..content_end, writer)?;

        Ok(target)
    }
}
