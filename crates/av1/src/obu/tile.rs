//! Tile layout (`tile_info()`) and tile group OBUs.
//!
//! AV1-Spec-2 - 5.9.15 and 5.11.1

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian};
use bytes_util::{BitReader, BitWriter};

use super::field::{Field, FieldReader, FieldWriter, SyntaxIo};
use super::utils::{tile_log2, write_le};
use crate::error::{Av1Error, Result};

/// `MAX_TILE_WIDTH`
pub const MAX_TILE_WIDTH: u32 = 4096;
/// `MAX_TILE_AREA`
pub const MAX_TILE_AREA: u32 = 4096 * 2304;
/// `MAX_TILE_ROWS`
pub const MAX_TILE_ROWS: u32 = 64;
/// `MAX_TILE_COLS`
pub const MAX_TILE_COLS: u32 = 64;

/// `TileSizeBytes` used when the header does not code it.
pub const DEFAULT_TILE_SIZE_BYTES: u8 = 4;

const UNIFORM_TILE_SPACING_FLAG: Field = Field::flag("uniform_tile_spacing_flag");
const TILE_SIZE_BYTES_MINUS_1: Field = Field::bits("tile_size_bytes_minus_1", 2);
const TILE_START_AND_END_PRESENT_FLAG: Field = Field::flag("tile_start_and_end_present_flag");

/// The superblock grid of a frame and the tiling limits derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperblockGrid {
    /// `FrameWidth`
    pub frame_width: u32,
    /// `FrameHeight`
    pub frame_height: u32,
    /// `MiCols`
    pub mi_cols: u32,
    /// `MiRows`
    pub mi_rows: u32,
    /// Superblock columns.
    pub sb_cols: u32,
    /// Superblock rows.
    pub sb_rows: u32,
    /// log2 of the superblock size in pixels.
    pub sb_size_log2: u32,
    max_tile_width_sb: u32,
    min_log2_tile_cols: u32,
    max_log2_tile_cols: u32,
    max_log2_tile_rows: u32,
    min_log2_tiles: u32,
}

impl SuperblockGrid {
    /// Derives the grid for a `frame_width`x`frame_height` frame.
    pub fn new(frame_width: u32, frame_height: u32, use_128x128_superblock: bool) -> Self {
        let mi_cols = 2 * ((frame_width + 7) >> 3);
        let mi_rows = 2 * ((frame_height + 7) >> 3);
        let sb_shift = if use_128x128_superblock { 5 } else { 4 };
        let sb_cols = (mi_cols + (1 << sb_shift) - 1) >> sb_shift;
        let sb_rows = (mi_rows + (1 << sb_shift) - 1) >> sb_shift;
        let sb_size_log2 = sb_shift + 2;

        let max_tile_width_sb = MAX_TILE_WIDTH >> sb_size_log2;
        let max_tile_area_sb = MAX_TILE_AREA >> (2 * sb_size_log2);
        let min_log2_tile_cols = tile_log2(max_tile_width_sb, sb_cols);

        Self {
            frame_width,
            frame_height,
            mi_cols,
            mi_rows,
            sb_cols,
            sb_rows,
            sb_size_log2,
            max_tile_width_sb,
            min_log2_tile_cols,
            max_log2_tile_cols: tile_log2(1, sb_cols.min(MAX_TILE_COLS)),
            max_log2_tile_rows: tile_log2(1, sb_rows.min(MAX_TILE_ROWS)),
            min_log2_tiles: min_log2_tile_cols.max(tile_log2(max_tile_area_sb, sb_rows * sb_cols)),
        }
    }

    /// Superblock size in pixels.
    pub const fn superblock_size(&self) -> u32 {
        1 << self.sb_size_log2
    }

    fn min_log2_tile_rows(&self, tile_cols_log2: u32) -> u32 {
        self.min_log2_tiles.saturating_sub(tile_cols_log2)
    }

    fn max_tile_height_sb(&self, widest_tile_sb: u32) -> u32 {
        let area = self.sb_rows * self.sb_cols;
        let max_tile_area_sb = if self.min_log2_tiles > 0 {
            area >> (self.min_log2_tiles + 1)
        } else {
            area
        };
        (max_tile_area_sb / widest_tile_sb.max(1)).max(1)
    }
}

/// Start positions, in superblocks, of uniformly spaced tiles plus the end.
fn uniform_starts(sb_count: u32, log2: u32) -> Vec<u32> {
    let tile_size_sb = (sb_count + (1 << log2) - 1) >> log2;
    let mut starts: Vec<u32> = (0..sb_count).step_by(tile_size_sb.max(1) as usize).collect();
    starts.push(sb_count);
    starts
}

fn starts_from_sizes(sizes_minus_1: &[u32]) -> Vec<u32> {
    let mut starts = Vec::with_capacity(sizes_minus_1.len() + 1);
    let mut start = 0;
    starts.push(start);
    for size in sizes_minus_1 {
        start += size + 1;
        starts.push(start);
    }
    starts
}

fn sizes_minus_1(starts: &[u32]) -> Vec<u32> {
    starts.windows(2).map(|w| w[1] - w[0] - 1).collect()
}

/// Raw `tile_info()` syntax element values.
#[derive(Debug, Default)]
struct TileInfoSyntax {
    uniform_tile_spacing_flag: bool,
    tile_cols_log2: u32,
    tile_rows_log2: u32,
    width_in_sbs_minus_1: Vec<u32>,
    height_in_sbs_minus_1: Vec<u32>,
    context_update_tile_id: u32,
    tile_size_bytes_minus_1: u32,
}

/// Codes explicit tile sizes along one axis, returning the largest size.
fn explicit_sizes<S: SyntaxIo>(
    s: &mut S,
    name: &'static str,
    sb_count: u32,
    max_size_sb: u32,
    sizes: &mut Vec<u32>,
) -> io::Result<u32> {
    let mut largest = 0;
    let mut start = 0;
    let mut i = 0;
    while start < sb_count {
        if i as u32 >= MAX_TILE_COLS.max(MAX_TILE_ROWS) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("more than {i} explicit tiles"),
            ));
        }
        if i == sizes.len() {
            sizes.push(0);
        }
        let max_size = (sb_count - start).min(max_size_sb);
        s.field(&Field::ns(name, max_size), &mut sizes[i])?;
        let size = sizes[i] + 1;
        largest = largest.max(size);
        start += size;
        i += 1;
    }
    sizes.truncate(i);
    Ok(largest)
}

fn tile_info_syntax<S: SyntaxIo>(s: &mut S, grid: &SuperblockGrid, ti: &mut TileInfoSyntax) -> io::Result<()> {
    s.flag(&UNIFORM_TILE_SPACING_FLAG, &mut ti.uniform_tile_spacing_flag)?;

    let (tile_cols, tile_rows) = if ti.uniform_tile_spacing_flag {
        let cols_field = Field::increment(
            "increment_tile_cols_log2",
            grid.min_log2_tile_cols,
            grid.max_log2_tile_cols,
        );
        s.field(&cols_field, &mut ti.tile_cols_log2)?;

        let rows_field = Field::increment(
            "increment_tile_rows_log2",
            grid.min_log2_tile_rows(ti.tile_cols_log2),
            grid.max_log2_tile_rows,
        );
        s.field(&rows_field, &mut ti.tile_rows_log2)?;

        (
            uniform_starts(grid.sb_cols, ti.tile_cols_log2).len() as u32 - 1,
            uniform_starts(grid.sb_rows, ti.tile_rows_log2).len() as u32 - 1,
        )
    } else {
        let widest = explicit_sizes(
            s,
            "width_in_sbs_minus_1",
            grid.sb_cols,
            grid.max_tile_width_sb,
            &mut ti.width_in_sbs_minus_1,
        )?;
        ti.tile_cols_log2 = tile_log2(1, ti.width_in_sbs_minus_1.len() as u32);

        explicit_sizes(
            s,
            "height_in_sbs_minus_1",
            grid.sb_rows,
            grid.max_tile_height_sb(widest),
            &mut ti.height_in_sbs_minus_1,
        )?;
        ti.tile_rows_log2 = tile_log2(1, ti.height_in_sbs_minus_1.len() as u32);

        (
            ti.width_in_sbs_minus_1.len() as u32,
            ti.height_in_sbs_minus_1.len() as u32,
        )
    };

    if tile_cols > MAX_TILE_COLS || tile_rows > MAX_TILE_ROWS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{tile_cols}x{tile_rows} tiles exceed the tile grid limits"),
        ));
    }

    let tile_bits = ti.tile_cols_log2 + ti.tile_rows_log2;
    if tile_bits > 0 {
        let context_field =
            Field::bits("context_update_tile_id", tile_bits as u8).with_range(0, tile_cols * tile_rows - 1);
        s.field(&context_field, &mut ti.context_update_tile_id)?;
        s.field(&TILE_SIZE_BYTES_MINUS_1, &mut ti.tile_size_bytes_minus_1)?;
    } else {
        ti.context_update_tile_id = 0;
        ti.tile_size_bytes_minus_1 = u32::from(DEFAULT_TILE_SIZE_BYTES - 1);
    }

    Ok(())
}

/// The pixel rectangle covered by one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    /// Tile column index.
    pub column: u32,
    /// Tile row index.
    pub row: u32,
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels, clipped to the frame.
    pub width: u32,
    /// Height in pixels, clipped to the frame.
    pub height: u32,
}

/// A decoded `tile_info()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    /// The grid this layout was coded against.
    pub grid: SuperblockGrid,
    /// `uniform_tile_spacing_flag`
    pub uniform_tile_spacing: bool,
    /// `TileColsLog2`
    pub tile_cols_log2: u32,
    /// `TileRowsLog2`
    pub tile_rows_log2: u32,
    /// Superblock column where each tile column starts, followed by `sb_cols`.
    pub col_starts_sb: Vec<u32>,
    /// Superblock row where each tile row starts, followed by `sb_rows`.
    pub row_starts_sb: Vec<u32>,
    /// `context_update_tile_id`
    pub context_update_tile_id: u32,
    /// `TileSizeBytes`
    pub tile_size_bytes: u8,
}

impl TileLayout {
    fn from_syntax(grid: SuperblockGrid, ti: TileInfoSyntax) -> Self {
        let (col_starts_sb, row_starts_sb) = if ti.uniform_tile_spacing_flag {
            (
                uniform_starts(grid.sb_cols, ti.tile_cols_log2),
                uniform_starts(grid.sb_rows, ti.tile_rows_log2),
            )
        } else {
            (
                starts_from_sizes(&ti.width_in_sbs_minus_1),
                starts_from_sizes(&ti.height_in_sbs_minus_1),
            )
        };

        Self {
            grid,
            uniform_tile_spacing: ti.uniform_tile_spacing_flag,
            tile_cols_log2: ti.tile_cols_log2,
            tile_rows_log2: ti.tile_rows_log2,
            col_starts_sb,
            row_starts_sb,
            context_update_tile_id: ti.context_update_tile_id,
            tile_size_bytes: ti.tile_size_bytes_minus_1 as u8 + 1,
        }
    }

    fn to_syntax(&self) -> TileInfoSyntax {
        TileInfoSyntax {
            uniform_tile_spacing_flag: self.uniform_tile_spacing,
            tile_cols_log2: self.tile_cols_log2,
            tile_rows_log2: self.tile_rows_log2,
            width_in_sbs_minus_1: sizes_minus_1(&self.col_starts_sb),
            height_in_sbs_minus_1: sizes_minus_1(&self.row_starts_sb),
            context_update_tile_id: self.context_update_tile_id,
            tile_size_bytes_minus_1: u32::from(self.tile_size_bytes.saturating_sub(1)),
        }
    }

    /// Parses `tile_info()`.
    pub fn parse<T: io::Read>(reader: &mut BitReader<T>, grid: SuperblockGrid) -> io::Result<Self> {
        let mut ti = TileInfoSyntax::default();
        tile_info_syntax(&mut FieldReader(reader), &grid, &mut ti)?;
        Ok(Self::from_syntax(grid, ti))
    }

    /// Writes `tile_info()`.
    pub fn write<W: io::Write>(&self, writer: &mut BitWriter<W>) -> io::Result<()> {
        let mut ti = self.to_syntax();
        tile_info_syntax(&mut FieldWriter(writer), &self.grid, &mut ti)
    }

    /// Builds the layout whose tile columns and rows start at the given
    /// superblock positions.
    ///
    /// Uniform spacing is used whenever it reproduces the requested grid,
    /// explicit sizes otherwise. Layouts that `tile_info()` cannot express
    /// are rejected.
    pub fn from_superblock_starts(grid: SuperblockGrid, col_starts: &[u32], row_starts: &[u32]) -> Result<Self> {
        let col_starts_sb = close_starts("column", col_starts, grid.sb_cols)?;
        let row_starts_sb = close_starts("row", row_starts, grid.sb_rows)?;

        let tile_cols = col_starts_sb.len() as u32 - 1;
        let tile_rows = row_starts_sb.len() as u32 - 1;
        if tile_cols > MAX_TILE_COLS || tile_rows > MAX_TILE_ROWS {
            return Err(Av1Error::InvalidTileLayout(format!(
                "{tile_cols}x{tile_rows} tiles exceed the tile grid limits"
            )));
        }

        let uniform_cols = (grid.min_log2_tile_cols..=grid.max_log2_tile_cols)
            .find(|log2| uniform_starts(grid.sb_cols, *log2) == col_starts_sb);
        let uniform_rows = uniform_cols.and_then(|cols_log2| {
            (grid.min_log2_tile_rows(cols_log2)..=grid.max_log2_tile_rows)
                .find(|log2| uniform_starts(grid.sb_rows, *log2) == row_starts_sb)
        });

        let tile_size_bytes = DEFAULT_TILE_SIZE_BYTES;
        if let (Some(tile_cols_log2), Some(tile_rows_log2)) = (uniform_cols, uniform_rows) {
            return Ok(Self {
                grid,
                uniform_tile_spacing: true,
                tile_cols_log2,
                tile_rows_log2,
                col_starts_sb,
                row_starts_sb,
                context_update_tile_id: 0,
                tile_size_bytes,
            });
        }

        let widest = sizes_minus_1(&col_starts_sb).into_iter().max().unwrap_or(0) + 1;
        let tallest = sizes_minus_1(&row_starts_sb).into_iter().max().unwrap_or(0) + 1;
        if widest > grid.max_tile_width_sb {
            return Err(Av1Error::InvalidTileLayout(format!(
                "tile width of {widest} superblocks exceeds {}",
                grid.max_tile_width_sb
            )));
        }
        let max_height = grid.max_tile_height_sb(widest);
        if tallest > max_height {
            return Err(Av1Error::InvalidTileLayout(format!(
                "tile height of {tallest} superblocks exceeds {max_height}"
            )));
        }

        Ok(Self {
            grid,
            uniform_tile_spacing: false,
            tile_cols_log2: tile_log2(1, tile_cols),
            tile_rows_log2: tile_log2(1, tile_rows),
            col_starts_sb,
            row_starts_sb,
            context_update_tile_id: 0,
            tile_size_bytes,
        })
    }

    /// Like [`TileLayout::from_superblock_starts`] with starts given in
    /// pixels, which must sit on superblock boundaries.
    pub fn from_pixel_starts(grid: SuperblockGrid, col_x: &[u32], row_y: &[u32]) -> Result<Self> {
        let sb = grid.superblock_size();
        let to_sb = |axis: &str, px: &[u32]| -> Result<Vec<u32>> {
            px.iter()
                .map(|p| {
                    if p % sb == 0 {
                        Ok(p / sb)
                    } else {
                        Err(Av1Error::InvalidTileLayout(format!(
                            "tile {axis} start {p} is not a multiple of the {sb} pixel superblock"
                        )))
                    }
                })
                .collect()
        };

        Self::from_superblock_starts(grid, &to_sb("column", col_x)?, &to_sb("row", row_y)?)
    }

    /// `TileCols`
    pub fn tile_cols(&self) -> u32 {
        self.col_starts_sb.len().saturating_sub(1) as u32
    }

    /// `TileRows`
    pub fn tile_rows(&self) -> u32 {
        self.row_starts_sb.len().saturating_sub(1) as u32
    }

    /// `NumTiles`
    pub fn num_tiles(&self) -> u32 {
        self.tile_cols() * self.tile_rows()
    }

    /// Bits used for `tg_start`/`tg_end`.
    pub const fn tile_bits(&self) -> u32 {
        self.tile_cols_log2 + self.tile_rows_log2
    }

    /// Returns `true` if both layouts cut the frame at the same positions.
    pub fn same_grid(&self, other: &TileLayout) -> bool {
        self.col_starts_sb == other.col_starts_sb && self.row_starts_sb == other.row_starts_sb
    }

    /// The rectangle covered by tile `tile_idx`, in raster order.
    pub fn tile_rect(&self, tile_idx: u32) -> Option<TileRect> {
        if tile_idx >= self.num_tiles() {
            return None;
        }

        let sb = self.grid.superblock_size();
        let column = tile_idx % self.tile_cols();
        let row = tile_idx / self.tile_cols();
        let x = self.col_starts_sb[column as usize] * sb;
        let y = self.row_starts_sb[row as usize] * sb;
        let x_end = (self.col_starts_sb[column as usize + 1] * sb).min(self.grid.frame_width);
        let y_end = (self.row_starts_sb[row as usize + 1] * sb).min(self.grid.frame_height);

        Some(TileRect {
            column,
            row,
            x,
            y,
            width: x_end.saturating_sub(x),
            height: y_end.saturating_sub(y),
        })
    }
}

/// Validates tile starts and appends the closing superblock count.
fn close_starts(axis: &str, starts: &[u32], sb_count: u32) -> Result<Vec<u32>> {
    if starts.first() != Some(&0) {
        return Err(Av1Error::InvalidTileLayout(format!(
            "first tile {axis} must start at 0"
        )));
    }
    if starts.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Av1Error::InvalidTileLayout(format!(
            "tile {axis} starts {starts:?} are not strictly increasing"
        )));
    }
    if starts.iter().any(|start| *start >= sb_count) {
        return Err(Av1Error::InvalidTileLayout(format!(
            "tile {axis} starts {starts:?} reach past {sb_count} superblocks"
        )));
    }

    let mut closed = starts.to_vec();
    closed.push(sb_count);
    Ok(closed)
}

/// One tile inside a tile group payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileData {
    /// Raster index of the tile in the frame.
    pub tile_idx: u32,
    /// Offset of the tile data in the OBU payload.
    pub offset: usize,
    /// Size of the tile data in bytes.
    pub size: usize,
}

/// A parsed tile group OBU.
///
/// AV1-Spec-2 - 5.11.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGroup {
    /// `tile_start_and_end_present_flag`
    pub tile_start_and_end_present: bool,
    /// `tg_start`
    pub tg_start: u32,
    /// `tg_end`
    pub tg_end: u32,
    /// Bytes used by the tile group header, including `byte_alignment()`.
    pub header_bytes: usize,
    /// The tiles carried by this group.
    pub tiles: Vec<TileData>,
}

#[derive(Debug, Default)]
struct TileGroupSyntax {
    tile_start_and_end_present_flag: bool,
    tg_start: u32,
    tg_end: u32,
}

fn tile_group_header_syntax<S: SyntaxIo>(s: &mut S, layout: &TileLayout, tg: &mut TileGroupSyntax) -> io::Result<()> {
    let num_tiles = layout.num_tiles();
    if num_tiles > 1 {
        s.flag(&TILE_START_AND_END_PRESENT_FLAG, &mut tg.tile_start_and_end_present_flag)?;
    }

    if num_tiles == 1 || !tg.tile_start_and_end_present_flag {
        tg.tg_start = 0;
        tg.tg_end = num_tiles.saturating_sub(1);
    } else {
        let tile_bits = layout.tile_bits() as u8;
        s.field(&Field::bits("tg_start", tile_bits).with_range(0, num_tiles - 1), &mut tg.tg_start)?;
        s.field(
            &Field::bits("tg_end", tile_bits).with_range(tg.tg_start, num_tiles - 1),
            &mut tg.tg_end,
        )?;
    }

    s.byte_alignment()
}

impl TileGroup {
    /// Parses a tile group payload against the active frame's layout.
    pub fn parse(payload: &[u8], layout: &TileLayout) -> io::Result<Self> {
        let mut reader = BitReader::new(io::Cursor::new(payload));
        let mut syntax = TileGroupSyntax::default();
        tile_group_header_syntax(&mut FieldReader(&mut reader), layout, &mut syntax)?;

        let header_bytes = (reader.bits_read() / 8) as usize;
        let tile_size_bytes = usize::from(layout.tile_size_bytes);
        let mut pos = header_bytes;
        let mut tiles = Vec::with_capacity((syntax.tg_end - syntax.tg_start + 1) as usize);

        for tile_idx in syntax.tg_start..=syntax.tg_end {
            let size = if tile_idx == syntax.tg_end {
                payload.len() - pos
            } else {
                let field = payload.get(pos..pos + tile_size_bytes).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("tile {tile_idx} size field runs past the tile group"),
                    )
                })?;
                pos += tile_size_bytes;
                LittleEndian::read_uint(field, tile_size_bytes) as usize + 1
            };

            if pos + size > payload.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "tile {tile_idx} of {size} bytes at {pos} runs past the {} byte tile group",
                        payload.len()
                    ),
                ));
            }

            tiles.push(TileData {
                tile_idx,
                offset: pos,
                size,
            });
            pos += size;
        }

        Ok(Self {
            tile_start_and_end_present: syntax.tile_start_and_end_present_flag,
            tg_start: syntax.tg_start,
            tg_end: syntax.tg_end,
            header_bytes,
            tiles,
        })
    }

    /// Returns `true` if this group carries the last tile of the frame.
    pub fn ends_frame(&self, layout: &TileLayout) -> bool {
        self.tg_end + 1 == layout.num_tiles()
    }

    /// Writes a tile group payload carrying every tile of the frame.
    ///
    /// Every tile but the last is preceded by its `tile_size_minus_1` coded
    /// in `TileSizeBytes` little-endian bytes.
    pub fn write_all_tiles<W: io::Write>(writer: &mut BitWriter<W>, layout: &TileLayout, tiles: &[&[u8]]) -> io::Result<()> {
        if tiles.len() != layout.num_tiles() as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} tiles given for a {} tile layout", tiles.len(), layout.num_tiles()),
            ));
        }

        let mut syntax = TileGroupSyntax::default();
        tile_group_header_syntax(&mut FieldWriter(writer), layout, &mut syntax)?;

        let last = tiles.len() - 1;
        for (idx, tile) in tiles.iter().enumerate() {
            if idx < last {
                if tile.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("tile {idx} is empty"),
                    ));
                }
                write_le(writer, tile.len() as u64 - 1, layout.tile_size_bytes)?;
            }
            writer.write_all(tile)?;
        }

        Ok(())
    }
}
