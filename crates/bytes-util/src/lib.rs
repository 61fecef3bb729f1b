//! Bit and byte cursor helpers shared by the bitstream crates.
//!
//! - [`BitReader`]: MSB-first bit reader over any [`std::io::Read`], tracking how
//!   many bits were consumed.
//! - [`BitWriter`]: MSB-first bit writer over any [`std::io::Write`].
//! - [`BoundedBuffer`]: in-memory output buffer with a hard capacity and
//!   in-place patching, used for size backpatching.
//! - [`BytesCursorExt`]: zero-copy extraction from `io::Cursor<Bytes>`.
//! - [`copy_bits`]: bit-exact splice of a bit range into a [`BitWriter`].
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

mod bit_read;
mod bit_write;
mod bounded;
mod cursor;

pub use bit_read::BitReader;
pub use bit_write::{BitWriter, copy_bits};
pub use bounded::BoundedBuffer;
pub use cursor::BytesCursorExt;
