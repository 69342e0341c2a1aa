use std::f64::consts::PI;

use glam::DVec2;
use tilestream_common::Rectangle;

use crate::scheme::{HeightRange, TilingScheme, WGS84_RADIUS};

/// Equirectangular scheme: two level-zero tiles side by side, each covering a hemisphere.
#[derive(Debug, Clone)]
pub struct GeographicTilingScheme {
    rectangle: Rectangle,
    tiles_x: u32,
    tiles_y: u32,
    radius: f64,
    heights: HeightRange,
}

impl Default for GeographicTilingScheme {
    fn default() -> Self {
        Self {
            rectangle: Rectangle::new(-180.0, -90.0, 180.0, 90.0),
            tiles_x: 2,
            tiles_y: 1,
            radius: WGS84_RADIUS,
            heights: HeightRange::default(),
        }
    }
}

impl GeographicTilingScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheme over a custom extent with a custom level-zero layout.
    pub fn with_layout(rectangle: Rectangle, tiles_x: u32, tiles_y: u32) -> Self {
        assert!(tiles_x > 0 && tiles_y > 0, "level zero needs at least one tile");
        Self {
            rectangle,
            tiles_x,
            tiles_y,
            ..Self::default()
        }
    }

    pub fn with_height_range(mut self, heights: HeightRange) -> Self {
        self.heights = heights;
        self
    }

    fn metres_per_degree(&self) -> f64 {
        self.radius * PI / 180.0
    }
}

impl TilingScheme for GeographicTilingScheme {
    fn rectangle(&self) -> Rectangle {
        self.rectangle
    }

    fn project(&self, lon_lat: DVec2) -> DVec2 {
        lon_lat * self.metres_per_degree()
    }

    fn unproject(&self, native: DVec2) -> DVec2 {
        native / self.metres_per_degree()
    }

    fn level_zero_tiles_x(&self) -> u32 {
        self.tiles_x
    }

    fn level_zero_tiles_y(&self) -> u32 {
        self.tiles_y
    }

    fn height_range(&self) -> HeightRange {
        self.heights
    }
}
