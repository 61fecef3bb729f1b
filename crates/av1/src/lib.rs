//! A crate for decoding and re-encoding the parts of an AV1 bitstream that
//! describe how a frame is cut into tiles.
//!
//! Supports:
//! - Variable-length codes (`leb128`, `uvlc`, `ns`, `le`, subexp, increments)
//!   behind one declarative [`Field`] descriptor
//! - OBU header parsing and writing
//! - Sequence header parsing and rewriting for new frame dimensions
//! - Frame header parsing through `tile_info()`, with reference frame state
//! - Tile layouts and tile group OBUs
//! - Low-overhead OBU bitstream iteration
//! - OBU writing with `obu_size` backpatching into a bounded buffer
//!
//! ## License
//!
//! This project is licensed under the [MIT](./LICENSE.MIT) or
//! [Apache-2.0](./LICENSE.Apache-2.0) license. You can choose between one of
//! them if you use this work.
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
mod obu;
pub mod obu_stream;
pub mod parser;
pub mod writer;

pub use error::{Av1Error, Result};
pub use obu::field::{Coding, Field, FieldReader, FieldWriter, SyntaxIo, decode_field, encode_field};
pub use obu::utils;
pub use obu::{BitSpan, ObuExtensionHeader, ObuHeader, ObuType, frame, seq, tile};
pub use obu_stream::{Obu, ObuIterator, write_obu};
pub use parser::{ObuContent, ParsedObu, ParserContext};
pub use writer::{ObuWriter, SizeField};
