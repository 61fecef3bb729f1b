//! Splitter and repacker options.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};

/// Largest accepted frame dimension or pixel offset.
pub const MAX_PIXELS: u32 = 8192;

/// Largest accepted tile column or row count.
pub const MAX_GRID: u32 = 128;

/// Largest number of tiles the repacker can collect.
pub const MAX_TILE_COUNT: u32 = 128;

/// Default repacker output capacity.
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 4 * 1024 * 1024; // 4MB

/// Where one tile sits in the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGeometry {
    /// Full frame width in pixels.
    pub width: u32,
    /// Full frame height in pixels.
    pub height: u32,
    /// Number of tile columns.
    pub column: u32,
    /// Number of tile rows.
    pub row: u32,
    /// Left edge of the tile.
    pub x: u32,
    /// Top edge of the tile.
    pub y: u32,
    /// Tile width.
    pub x_w: u32,
    /// Tile height.
    pub y_h: u32,
}

impl TileGeometry {
    /// A single tile covering a `width`x`height` frame.
    pub const fn full_frame(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            column: 1,
            row: 1,
            x: 0,
            y: 0,
            x_w: width,
            y_h: height,
        }
    }

    /// Number of tiles in the grid.
    pub const fn tile_count(&self) -> u32 {
        self.column * self.row
    }

    /// Checks every value against its accepted range.
    pub fn validate(&self) -> Result<()> {
        check_range("width", self.width, 1, MAX_PIXELS)?;
        check_range("height", self.height, 1, MAX_PIXELS)?;
        check_range("column", self.column, 1, MAX_GRID)?;
        check_range("row", self.row, 1, MAX_GRID)?;
        check_range("x", self.x, 0, MAX_PIXELS)?;
        check_range("y", self.y, 0, MAX_PIXELS)?;
        check_range("x_w", self.x_w, 1, MAX_PIXELS)?;
        check_range("y_h", self.y_h, 1, MAX_PIXELS)?;

        if self.x + self.x_w > self.width || self.y + self.y_h > self.height {
            return Err(TileError::InvalidConfig(format!(
                "tile {}x{} at ({}, {}) exceeds the {}x{} frame",
                self.x_w, self.y_h, self.x, self.y, self.width, self.height
            )));
        }

        Ok(())
    }
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(TileError::InvalidConfig(format!(
            "{name} {value} outside {min}..={max}"
        )))
    }
}

/// Configuration for [`TileSplitter`](crate::TileSplitter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Index given to single-tile temporal units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_index: Option<u32>,
    /// Placement of single-tile temporal units in the full frame. Without it
    /// such a unit is taken to be the whole frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<TileGeometry>,
}

impl SplitConfig {
    /// Checks the geometry and that the tile index fits the grid.
    pub fn validate(&self) -> Result<()> {
        if let Some(geometry) = &self.geometry {
            geometry.validate()?;
        }

        let tile_count = self.geometry.map_or(1, |geometry| geometry.tile_count());
        match self.tile_index {
            Some(index) if index >= tile_count => Err(TileError::InvalidConfig(format!(
                "tile index {index} outside a {tile_count} tile grid"
            ))),
            _ => Ok(()),
        }
    }
}

/// Configuration for [`TileRepacker`](crate::TileRepacker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepackConfig {
    /// Number of tile packets making up one temporal unit.
    pub tile_num: u32,
    /// Capacity of the output buffer in bytes.
    pub max_output_size: usize,
}

impl Default for RepackConfig {
    fn default() -> Self {
        Self {
            tile_num: 1,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
        }
    }
}

impl RepackConfig {
    /// Checks `tile_num` and the output capacity.
    pub fn validate(&self) -> Result<()> {
        check_range("tile_num", self.tile_num, 1, MAX_TILE_COUNT)?;
        if self.max_output_size == 0 {
            return Err(TileError::InvalidConfig(
                "max_output_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use rstest::rstest;

    use super::*;

    fn quarter() -> TileGeometry {
        TileGeometry {
            width: 256,
            height: 256,
            column: 2,
            row: 2,
            x: 128,
            y: 0,
            x_w: 128,
            y_h: 128,
        }
    }

    #[test]
    fn test_geometry_valid() {
        quarter().validate().unwrap();
        TileGeometry::full_frame(8192, 8192).validate().unwrap();
        assert_eq!(quarter().tile_count(), 4);
    }

    #[rstest]
    #[case(TileGeometry { width: 0, ..quarter() })]
    #[case(TileGeometry { height: 8193, ..quarter() })]
    #[case(TileGeometry { column: 0, ..quarter() })]
    #[case(TileGeometry { row: 129, ..quarter() })]
    #[case(TileGeometry { x: 8193, ..quarter() })]
    #[case(TileGeometry { x_w: 0, ..quarter() })]
    #[case(TileGeometry { x: 192, ..quarter() })]
    #[case(TileGeometry { y: 129, ..quarter() })]
    fn test_geometry_invalid(#[case] geometry: TileGeometry) {
        let err = geometry.validate().unwrap_err();
        assert!(matches!(err, TileError::InvalidConfig(_)), "{err:?}");
    }

    #[test]
    fn test_split_config() {
        SplitConfig::default().validate().unwrap();

        let config = SplitConfig {
            tile_index: Some(3),
            geometry: Some(quarter()),
        };
        config.validate().unwrap();

        let config = SplitConfig {
            tile_index: Some(4),
            geometry: Some(quarter()),
        };
        assert!(config.validate().is_err());

        let config = SplitConfig {
            tile_index: Some(1),
            geometry: None,
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case(0, 1024, false)]
    #[case(1, 1024, true)]
    #[case(128, 1024, true)]
    #[case(129, 1024, false)]
    #[case(4, 0, false)]
    fn test_repack_config(#[case] tile_num: u32, #[case] max_output_size: usize, #[case] valid: bool) {
        let config = RepackConfig {
            tile_num,
            max_output_size,
        };
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[test]
    fn test_deserialize() {
        let config: RepackConfig = serde_json::from_str(r#"{ "tile_num": 4 }"#).unwrap();
        assert_eq!(config.tile_num, 4);
        assert_eq!(config.max_output_size, DEFAULT_MAX_OUTPUT_SIZE);

        let config: SplitConfig = serde_json::from_str(
            r#"{
                "tile_index": 1,
                "geometry": { "width": 256, "height": 256, "column": 2, "row": 2,
                              "x": 128, "y": 0, "x_w": 128, "y_h": 128 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.geometry, Some(quarter()));
        config.validate().unwrap();

        let json = serde_json::to_string(&SplitConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
