//! Error types for SEI parsing.

use std::io;

use thiserror::Error;

/// Errors that can occur while reading or writing SEI messages.
#[derive(Error, Debug)]
pub enum SeiError {
    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The SEI framing ends before a complete message.
    #[error("truncated SEI at byte {offset}: need {needed} bytes, {available} available")]
    Truncated {
        /// Offset in the RBSP where the missing data starts.
        offset: usize,
        /// Bytes required to continue.
        needed: usize,
        /// Bytes left in the RBSP.
        available: usize,
    },

    /// A fixed-size payload has the wrong length.
    #[error("SEI payload type {payload_type} must be {expected} bytes, got {actual}")]
    InvalidPayloadSize {
        /// The payload type.
        payload_type: u32,
        /// Size the payload type requires.
        expected: usize,
        /// Size found in the message.
        actual: usize,
    },
}

impl SeiError {
    /// Returns `true` for malformed SEI data.
    pub fn is_invalid_data(&self) -> bool {
        match self {
            SeiError::Io(err) => matches!(err.kind(), io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof),
            SeiError::Truncated { .. } | SeiError::InvalidPayloadSize { .. } => true,
        }
    }
}

/// Result type alias for SEI operations.
pub type Result<T> = std::result::Result<T, SeiError>;
