//! Splitting AV1 temporal units into per-tile packets and merging tile
//! packets back into one temporal unit.
//!
//! A hardware encoder that works tile by tile produces one temporal unit per
//! tile. [`TileSplitter`] tags each of them with a [`TileInfo`] header that
//! locates the tile data and its place in the full frame. [`TileRepacker`]
//! collects the tiles of one temporal unit and writes a single conformant
//! temporal unit whose sequence header, frame header and tile group describe
//! the full frame.
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

pub mod config;
pub mod error;
pub mod packet;
pub mod repack;
pub mod split;
pub mod tile_info;

pub use config::{RepackConfig, SplitConfig, TileGeometry};
pub use error::{Result, TileError};
pub use packet::{Packet, PacketFlags};
pub use repack::TileRepacker;
pub use split::TileSplitter;
pub use tile_info::{ObuEntry, TileDataSpan, TileInfo};
