//! Extraction and reinsertion of the SEI payloads a tile pipeline carries
//! across re-encoding: HDR metadata and one opaque user payload type.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::Result;
use crate::message::{SeiMessage, SeiReader, write_rbsp};
use crate::payload::{ContentLightLevel, MasteringDisplay};

/// `user_data_unregistered`.
pub const USER_DATA_UNREGISTERED: u32 = 5;

/// Which SEI payloads to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeiConfig {
    /// Payload type copied through without interpretation.
    pub custom_payload_type: u32,
}

impl Default for SeiConfig {
    fn default() -> Self {
        Self {
            custom_payload_type: USER_DATA_UNREGISTERED,
        }
    }
}

/// Payloads found in one SEI RBSP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeiPayloads {
    /// Last mastering display colour volume message.
    pub mastering_display: Option<MasteringDisplay>,
    /// Last content light level message.
    pub content_light_level: Option<ContentLightLevel>,
    /// Every custom payload, in order.
    pub custom: Vec<Bytes>,
}

impl SeiPayloads {
    /// Returns `true` if nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.mastering_display.is_none() && self.content_light_level.is_none() && self.custom.is_empty()
    }
}

/// Pulls known payloads out of SEI RBSPs and builds RBSPs from them.
#[derive(Debug, Clone, Default)]
pub struct SeiExtractor {
    config: SeiConfig,
}

impl SeiExtractor {
    /// Creates an extractor.
    pub fn new(config: SeiConfig) -> Self {
        Self { config }
    }

    /// Walks every message of `rbsp`. Payload types other than mastering
    /// display, content light level and the custom type are skipped.
    pub fn extract(&self, rbsp: Bytes) -> Result<SeiPayloads> {
        let mut payloads = SeiPayloads::default();

        for message in SeiReader::new(rbsp) {
            let message = message?;
            trace!(
                payload_type = message.payload_type,
                offset = message.offset,
                size = message.payload.len(),
                "SEI message"
            );

            match message.payload_type {
                MasteringDisplay::PAYLOAD_TYPE => {
                    payloads.mastering_display = Some(MasteringDisplay::parse(&message.payload)?);
                }
                ContentLightLevel::PAYLOAD_TYPE => {
                    payloads.content_light_level = Some(ContentLightLevel::parse(&message.payload)?);
                }
                payload_type if payload_type == self.config.custom_payload_type => {
                    payloads.custom.push(message.payload);
                }
                payload_type => {
                    warn!(
                        payload_type,
                        offset = message.offset,
                        size = message.payload.len(),
                        "skipping SEI payload"
                    );
                }
            }
        }

        Ok(payloads)
    }

    /// Builds an SEI RBSP carrying `payloads`: mastering display, content
    /// light level, then the custom payloads.
    pub fn build(&self, payloads: &SeiPayloads) -> Result<Bytes> {
        let mut messages = Vec::with_capacity(2 + payloads.custom.len());

        if let Some(mdcv) = &payloads.mastering_display {
            let mut payload = Vec::with_capacity(MasteringDisplay::SIZE);
            mdcv.write(&mut payload)?;
            messages.push(SeiMessage::new(MasteringDisplay::PAYLOAD_TYPE, payload));
        }
        if let Some(cll) = &payloads.content_light_level {
            let mut payload = Vec::with_capacity(ContentLightLevel::SIZE);
            cll.write(&mut payload)?;
            messages.push(SeiMessage::new(ContentLightLevel::PAYLOAD_TYPE, payload));
        }
        messages.extend(
            payloads
                .custom
                .iter()
                .map(|payload| SeiMessage::new(self.config.custom_payload_type, payload.clone())),
        );

        Ok(write_rbsp(&messages))
    }
}
