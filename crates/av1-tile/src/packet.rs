//! Compressed packets moving through the splitter and repacker.

use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    /// Packet properties carried alongside the data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// The packet starts a random access point.
        const KEY = 1 << 0;
        /// The packet content is known to be damaged.
        const CORRUPT = 1 << 1;
        /// The packet is needed for decoding but should not be shown.
        const DISCARD = 1 << 2;
        /// No other packet references this one.
        const DISPOSABLE = 1 << 4;
    }
}

/// One compressed packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// The packet data.
    pub data: Bytes,
    /// Presentation timestamp.
    pub pts: Option<i64>,
    /// Decoding timestamp.
    pub dts: Option<i64>,
    /// Packet properties.
    pub flags: PacketFlags,
    /// Stream the packet belongs to.
    pub stream_index: u32,
    /// Tile carried by the packet, if it is one tile of a frame.
    pub tile_index: Option<u32>,
}

impl Packet {
    /// Creates a packet with no timing and no flags.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Sets the timestamps.
    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    /// Sets the flags.
    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the tile index.
    pub fn with_tile_index(mut self, tile_index: u32) -> Self {
        self.tile_index = Some(tile_index);
        self
    }

    /// A packet carrying `data` with the same metadata as `self` and no tile
    /// index.
    pub fn with_data(&self, data: Bytes) -> Self {
        Self {
            data,
            tile_index: None,
            ..self.clone()
        }
    }

    /// Returns `true` if the packet is a random access point.
    pub fn is_key(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }
}
