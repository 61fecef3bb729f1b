//! A crate for pulling SEI payloads out of H.264/H.265 SEI RBSPs and
//! putting them back.
//!
//! Supports:
//! - SEI message framing (`0xFF`-extended payload type and size)
//! - Mastering display colour volume and content light level payloads
//! - One opaque payload type copied through unchanged
//! - Emulation prevention removal and insertion
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

pub mod emulation;
pub mod error;
pub mod extract;
pub mod message;
pub mod payload;

pub use emulation::{insert_emulation_prevention, remove_emulation_prevention};
pub use error::{Result, SeiError};
pub use extract::{SeiConfig, SeiExtractor, SeiPayloads, USER_DATA_UNREGISTERED};
pub use message::{SeiMessage, SeiReader, write_rbsp};
pub use payload::{ChromaticityPoint, ContentLightLevel, MasteringDisplay};
