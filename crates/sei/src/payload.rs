//! HDR metadata payloads.

use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SeiError};

/// A CIE 1931 chromaticity coordinate in units of 0.00002.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChromaticityPoint {
    /// x coordinate.
    pub x: u16,
    /// y coordinate.
    pub y: u16,
}

/// Mastering display colour volume, payload type 137.
///
/// | bytes | field |
/// |-------|-------|
/// | 0-11  | `display_primaries_x/y` for three primaries, be16 pairs |
/// | 12-15 | `white_point_x/y`, be16 |
/// | 16-19 | `max_display_mastering_luminance`, be32, 0.0001 cd/m2 |
/// | 20-23 | `min_display_mastering_luminance`, be32, 0.0001 cd/m2 |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasteringDisplay {
    /// Display primaries in the order they are coded.
    pub primaries: [ChromaticityPoint; 3],
    /// White point.
    pub white_point: ChromaticityPoint,
    /// Maximum luminance.
    pub max_luminance: u32,
    /// Minimum luminance.
    pub min_luminance: u32,
}

impl MasteringDisplay {
    /// SEI payload type.
    pub const PAYLOAD_TYPE: u32 = 137;
    /// Payload size in bytes.
    pub const SIZE: usize = 24;

    /// Parses a payload, which must be exactly [`Self::SIZE`] bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        check_size(Self::PAYLOAD_TYPE, Self::SIZE, payload)?;

        let mut reader = io::Cursor::new(payload);
        let mut point = || -> io::Result<ChromaticityPoint> {
            Ok(ChromaticityPoint {
                x: reader.read_u16::<BigEndian>()?,
                y: reader.read_u16::<BigEndian>()?,
            })
        };
        let primaries = [point()?, point()?, point()?];
        let white_point = point()?;

        Ok(Self {
            primaries,
            white_point,
            max_luminance: reader.read_u32::<BigEndian>()?,
            min_luminance: reader.read_u32::<BigEndian>()?,
        })
    }

    /// Writes the payload.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        for point in self.primaries.iter().chain([&self.white_point]) {
            writer.write_u16::<BigEndian>(point.x)?;
            writer.write_u16::<BigEndian>(point.y)?;
        }
        writer.write_u32::<BigEndian>(self.max_luminance)?;
        writer.write_u32::<BigEndian>(self.min_luminance)?;
        Ok(())
    }
}

/// Content light level information, payload type 144.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentLightLevel {
    /// `max_content_light_level` in cd/m2.
    pub max_content_light_level: u16,
    /// `max_pic_average_light_level` in cd/m2.
    pub max_frame_average_light_level: u16,
}

impl ContentLightLevel {
    /// SEI payload type.
    pub const PAYLOAD_TYPE: u32 = 144;
    /// Payload size in bytes.
    pub const SIZE: usize = 4;

    /// Parses a payload, which must be exactly [`Self::SIZE`] bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        check_size(Self::PAYLOAD_TYPE, Self::SIZE, payload)?;

        let mut reader = io::Cursor::new(payload);
        Ok(Self {
            max_content_light_level: reader.read_u16::<BigEndian>()?,
            max_frame_average_light_level: reader.read_u16::<BigEndian>()?,
        })
    }

    /// Writes the payload.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<BigEndian>(self.max_content_light_level)?;
        writer.write_u16::<BigEndian>(self.max_frame_average_light_level)
    }
}

fn check_size(payload_type: u32, expected: usize, payload: &[u8]) -> Result<()> {
    if payload.len() != expected {
        return Err(SeiError::InvalidPayloadSize {
            payload_type,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use insta::assert_debug_snapshot;
    use rstest::rstest;

    use super::*;

    /// BT.2020 primaries, D65 white point, 1000 / 0.005 cd/m2.
    const BT2020_MDCV: [u8; 24] = [
        0x8a, 0x48, 0x39, 0x08, // green
        0x21, 0x34, 0x9b, 0xaa, // blue
        0x1a, 0x5e, 0x0b, 0xb8, // red
        0x3d, 0x13, 0x40, 0x42, // white point
        0x00, 0x98, 0x96, 0x80, // max
        0x00, 0x00, 0x00, 0x32, // min
    ];

    #[test]
    fn test_mastering_display() {
        let mdcv = MasteringDisplay::parse(&BT2020_MDCV).unwrap();
        assert_eq!(
            mdcv,
            MasteringDisplay {
                primaries: [
                    ChromaticityPoint { x: 35400, y: 14600 },
                    ChromaticityPoint { x: 8500, y: 39850 },
                    ChromaticityPoint { x: 6750, y: 3000 },
                ],
                white_point: ChromaticityPoint { x: 15635, y: 16450 },
                max_luminance: 10_000_000,
                min_luminance: 50,
            }
        );

        let mut out = Vec::new();
        mdcv.write(&mut out).unwrap();
        assert_eq!(out, BT2020_MDCV);
    }

    #[rstest]
    #[case::empty(0)]
    #[case::one_short(23)]
    #[case::one_long(25)]
    fn test_mastering_display_size(#[case] len: usize) {
        let payload = vec![0x11u8; len];
        let err = MasteringDisplay::parse(&payload).unwrap_err();
        assert!(err.is_invalid_data());
        assert!(matches!(
            err,
            SeiError::InvalidPayloadSize {
                payload_type: 137,
                expected: 24,
                actual,
            } if actual == len
        ));
    }

    #[test]
    fn test_content_light_level() {
        let cll = ContentLightLevel::parse(&[0x03, 0xe8, 0x01, 0x90]).unwrap();
        assert_debug_snapshot!(cll, @r"
        ContentLightLevel {
            max_content_light_level: 1000,
            max_frame_average_light_level: 400,
        }
        ");

        let mut out = Vec::new();
        cll.write(&mut out).unwrap();
        assert_eq!(out, [0x03, 0xe8, 0x01, 0x90]);

        assert!(ContentLightLevel::parse(&[0x03, 0xe8, 0x01]).unwrap_err().is_invalid_data());
    }
}
