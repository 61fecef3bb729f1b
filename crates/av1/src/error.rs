//! Error types for AV1 bitstream parsing and writing.

use std::io;

use thiserror::Error;

/// Errors that can occur while parsing or writing AV1 OBUs.
#[derive(Error, Debug)]
pub enum Av1Error {
    /// An I/O error that is neither malformed data nor a full output buffer.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Malformed variable-length code, exhausted bitstream or out-of-range value.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Invalid OBU data.
    #[error("invalid OBU: {0}")]
    InvalidObu(String),

    /// LEB128 value overflow.
    #[error("LEB128 overflow: value exceeds maximum")]
    Leb128Overflow,

    /// Unexpected end of data.
    #[error("unexpected end of data: expected {expected} bytes, got {actual}")]
    UnexpectedEof {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes available.
        actual: usize,
    },

    /// The output buffer cannot hold what has to be written.
    #[error("no space left in output buffer: {0}")]
    NoSpace(String),

    /// A frame header arrived before any sequence header.
    #[error("no sequence header has been seen")]
    MissingSequenceHeader,

    /// A tile group arrived without an active frame header.
    #[error("tile group at byte {offset} without an active frame header")]
    MissingFrameHeader {
        /// Offset of the tile group OBU in the temporal unit.
        offset: usize,
    },

    /// The requested or parsed tile layout is not representable.
    #[error("invalid tile layout: {0}")]
    InvalidTileLayout(String),
}

impl Av1Error {
    /// Returns `true` for the recoverable malformed-input class.
    pub fn is_invalid_data(&self) -> bool {
        matches!(
            self,
            Av1Error::InvalidData(_)
                | Av1Error::InvalidObu(_)
                | Av1Error::Leb128Overflow
                | Av1Error::UnexpectedEof { .. }
        )
    }

    /// Returns `true` if the output buffer was too small.
    pub fn is_no_space(&self) -> bool {
        matches!(self, Av1Error::NoSpace(_))
    }
}

impl From<io::Error> for Av1Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Av1Error::InvalidData(err.to_string())
            }
            io::ErrorKind::WriteZero => Av1Error::NoSpace(err.to_string()),
            _ => Av1Error::Io(err),
        }
    }
}

/// Result type alias for AV1 operations.
pub type Result<T> = std::result::Result<T, Av1Error>;
