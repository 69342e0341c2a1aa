use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use glam::DVec2;
use tilestream_common::Rectangle;

use crate::scheme::{HeightRange, TilingScheme, WGS84_RADIUS};

/// Latitude at which the square web-mercator extent is clipped.
pub const MAXIMUM_LATITUDE: f64 = 85.051_128_779_806_59;

/// Spherical web-mercator scheme with a single level-zero tile.
#[derive(Debug, Clone)]
pub struct WebMercatorTilingScheme {
    radius: f64,
    heights: HeightRange,
}

impl Default for WebMercatorTilingScheme {
    fn default() -> Self {
        Self {
            radius: WGS84_RADIUS,
            heights: HeightRange::default(),
        }
    }
}

impl WebMercatorTilingScheme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_height_range(mut self, heights: HeightRange) -> Self {
        self.heights = heights;
        self
    }
}

impl TilingScheme for WebMercatorTilingScheme {
    fn rectangle(&self) -> Rectangle {
        Rectangle::new(-180.0, -MAXIMUM_LATITUDE, 180.0, MAXIMUM_LATITUDE)
    }

    fn project(&self, lon_lat: DVec2) -> DVec2 {
        let lat = lon_lat.y.clamp(-MAXIMUM_LATITUDE, MAXIMUM_LATITUDE).to_radians();
        DVec2::new(
            lon_lat.x.to_radians() * self.radius,
            (FRAC_PI_4 + lat * 0.5).tan().ln() * self.radius,
        )
    }

    fn unproject(&self, native: DVec2) -> DVec2 {
        let lon = native.x / self.radius;
        let lat = FRAC_PI_2 - 2.0 * (-native.y / self.radius).exp().atan();
        DVec2::new(lon.to_degrees(), lat.to_degrees())
    }

    fn level_zero_tiles_x(&self) -> u32 {
        1
    }

    fn level_zero_tiles_y(&self) -> u32 {
        1
    }

    fn height_range(&self) -> HeightRange {
        self.heights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_extent_is_square() {
        let scheme = WebMercatorTilingScheme::new();
        let native = scheme.native_rectangle();
        assert!((native.width() - native.height()).abs() < 1e-3);
    }

    #[test]
    fn projection_round_trips() {
        let scheme = WebMercatorTilingScheme::new();
        let p = DVec2::new(-122.42, 37.77);
        let back = scheme.unproject(scheme.project(p));
        assert!((back - p).length() < 1e-9);
    }

    #[test]
    fn single_root_then_quadrants() {
        let scheme = WebMercatorTilingScheme::new();
        assert_eq!(scheme.number_of_x_tiles_at_level(0), 1);
        let ne = scheme.tile_xy_to_rectangle(1, 0, 1);
        assert!(ne.west.abs() < 1e-9);
        assert!(ne.south.abs() < 1e-9);
        assert!((ne.north - MAXIMUM_LATITUDE).abs() < 1e-6);
    }

    #[test]
    fn position_lookup_matches_rectangles() {
        let scheme = WebMercatorTilingScheme::new();
        let pos = DVec2::new(2.35, 48.85);
        let (x, y) = scheme.position_to_tile_xy(pos, 10).unwrap();
        assert!(scheme.tile_xy_to_rectangle(x, y, 10).contains(pos));
    }
}
