//! Error types for tile splitting and repacking.

use std::io;

use av1::{Av1Error, ObuType};
use thiserror::Error;

/// Errors raised by the tile splitter and repacker.
#[derive(Error, Debug)]
pub enum TileError {
    /// The bitstream itself is malformed or the output does not fit.
    #[error(transparent)]
    Av1(Av1Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The packet names a tile the repacker has no slot for.
    #[error("tile index {index} out of range for {tile_num} tiles")]
    TileIndexOutOfRange {
        /// Index carried by the packet.
        index: u32,
        /// Configured number of tiles.
        tile_num: u32,
    },

    /// A tile index arrived twice for the same temporal unit.
    #[error("tile {index} already received")]
    DuplicateTile {
        /// Index carried by the packet.
        index: u32,
    },

    /// The packet carries no tile index.
    #[error("packet carries no tile index")]
    MissingTileIndex,

    /// Timing or stream metadata differs from the other tiles.
    #[error("tile {index} {field} does not match the other tiles")]
    MetadataMismatch {
        /// Index of the offending tile.
        index: u32,
        /// Name of the mismatching field.
        field: &'static str,
    },

    /// Frame or grid geometry differs from the other tiles.
    #[error("tile {index} {field} does not match the tile grid")]
    GeometryMismatch {
        /// Index of the offending tile.
        index: u32,
        /// Name of the mismatching field.
        field: &'static str,
    },

    /// The tile info header is malformed.
    #[error("invalid tile info: {0}")]
    InvalidTileInfo(String),

    /// The temporal unit carries an OBU that cannot be repacked.
    #[error("unsupported OBU {obu_type:?} at byte {offset}")]
    UnsupportedObu {
        /// Type of the offending OBU.
        obu_type: ObuType,
        /// Offset of the OBU in the temporal unit.
        offset: usize,
    },

    /// A tile group has no frame header to describe its layout.
    #[error("tile group at byte {offset} has no frame header")]
    MissingFrameHeader {
        /// Offset of the tile group OBU in the temporal unit.
        offset: usize,
    },
}

impl TileError {
    /// Returns `true` for errors caused by packet sequencing rather than by
    /// malformed data.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            TileError::TileIndexOutOfRange { .. }
                | TileError::DuplicateTile { .. }
                | TileError::MissingTileIndex
                | TileError::MetadataMismatch { .. }
                | TileError::GeometryMismatch { .. }
                | TileError::UnsupportedObu { .. }
                | TileError::MissingFrameHeader { .. }
        )
    }

    /// Returns `true` for malformed bitstreams and tile info headers.
    pub fn is_invalid_data(&self) -> bool {
        match self {
            TileError::Av1(err) => err.is_invalid_data(),
            TileError::InvalidTileInfo(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the output buffer was too small.
    pub fn is_no_space(&self) -> bool {
        matches!(self, TileError::Av1(err) if err.is_no_space())
    }
}

impl From<Av1Error> for TileError {
    fn from(err: Av1Error) -> Self {
        match err {
            Av1Error::MissingFrameHeader { offset } => TileError::MissingFrameHeader { offset },
            err => TileError::Av1(err),
        }
    }
}

impl From<io::Error> for TileError {
    fn from(err: io::Error) -> Self {
        TileError::Av1(Av1Error::from(err))
    }
}

/// Result type alias for tile operations.
pub type Result<T> = std::result::Result<T, TileError>;
