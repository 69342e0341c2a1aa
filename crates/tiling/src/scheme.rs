use glam::{DVec2, DVec3};
use tilestream_common::{Aabb, BoundingSphere, Rectangle};

/// Equatorial radius of the WGS84 ellipsoid in metres.
pub const WGS84_RADIUS: f64 = 6_378_137.0;

/// Deepest level any scheme can address: a single level-zero column still
/// has `2^31` tiles there, which fits a `u32`.
pub const MAXIMUM_TILE_LEVEL: u32 = 31;

/// Minimum and maximum surface height used to extrude tile bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightRange {
    pub min: f64,
    pub max: f64,
}

impl Default for HeightRange {
    fn default() -> Self {
        Self { min: 0.0, max: 0.0 }
    }
}

/// Maps tile coordinates to geographic and native extents.
///
/// Implementors supply the projection and the level-zero layout; every tile
/// query is derived from those. All functions are pure.
pub trait TilingScheme: Send + Sync {
    /// Geographic extent (degrees) covered by the scheme.
    fn rectangle(&self) -> Rectangle;

    /// Project geographic degrees (`x` = longitude, `y` = latitude) to native metres.
    fn project(&self, lon_lat: DVec2) -> DVec2;

    /// Inverse of [`TilingScheme::project`].
    fn unproject(&self, native: DVec2) -> DVec2;

    fn level_zero_tiles_x(&self) -> u32;

    fn level_zero_tiles_y(&self) -> u32;

    fn height_range(&self) -> HeightRange {
        HeightRange::default()
    }

    /// Native extent covered by the scheme.
    fn native_rectangle(&self) -> Rectangle {
        let rect = self.rectangle();
        let sw = self.project(DVec2::new(rect.west, rect.south));
        let ne = self.project(DVec2::new(rect.east, rect.north));
        Rectangle::new(sw.x, sw.y, ne.x, ne.y)
    }

    /// Deepest level whose tile counts fit a `u32` on both axes.
    fn maximum_level(&self) -> u32 {
        let widest = self.level_zero_tiles_x().max(self.level_zero_tiles_y());
        MAXIMUM_TILE_LEVEL.saturating_sub(widest.checked_ilog2().unwrap_or(0))
    }

    /// Saturates at `u32::MAX` past [`TilingScheme::maximum_level`].
    fn number_of_x_tiles_at_level(&self, level: u32) -> u32 {
        tiles_at_level(self.level_zero_tiles_x(), level)
    }

    /// Saturates at `u32::MAX` past [`TilingScheme::maximum_level`].
    fn number_of_y_tiles_at_level(&self, level: u32) -> u32 {
        tiles_at_level(self.level_zero_tiles_y(), level)
    }

    fn tile_xy_to_native_rectangle(&self, x: u32, y: u32, level: u32) -> Rectangle {
        let native = self.native_rectangle();
        let tile_width = native.width() / self.number_of_x_tiles_at_level(level) as f64;
        let tile_height = native.height() / self.number_of_y_tiles_at_level(level) as f64;

        let west = native.west + x as f64 * tile_width;
        let north = native.north - y as f64 * tile_height;
        Rectangle::new(west, north - tile_height, west + tile_width, north)
    }

    fn tile_xy_to_rectangle(&self, x: u32, y: u32, level: u32) -> Rectangle {
        let native = self.tile_xy_to_native_rectangle(x, y, level);
        let sw = self.unproject(DVec2::new(native.west, native.south));
        let ne = self.unproject(DVec2::new(native.east, native.north));
        Rectangle::new(sw.x, sw.y, ne.x, ne.y)
    }

    fn tile_xy_to_native_aabb(&self, x: u32, y: u32, level: u32) -> Aabb {
        let heights = self.height_range();
        Aabb::from_rectangle(
            &self.tile_xy_to_native_rectangle(x, y, level),
            heights.min,
            heights.max,
        )
    }

    fn tile_xy_to_native_sphere(&self, x: u32, y: u32, level: u32) -> BoundingSphere {
        BoundingSphere::from_aabb(&self.tile_xy_to_native_aabb(x, y, level))
    }

    /// Tile containing a geographic position, or `None` when it lies outside the scheme.
    fn position_to_tile_xy(&self, lon_lat: DVec2, level: u32) -> Option<(u32, u32)> {
        if !self.rectangle().contains(lon_lat) {
            return None;
        }
        let native = self.native_rectangle();
        let position = self.project(lon_lat);
        let x_tiles = self.number_of_x_tiles_at_level(level);
        let y_tiles = self.number_of_y_tiles_at_level(level);
        let tile_width = native.width() / x_tiles as f64;
        let tile_height = native.height() / y_tiles as f64;

        let x = ((position.x - native.west) / tile_width).floor() as u32;
        let y = ((native.north - position.y) / tile_height).floor() as u32;
        Some((x.min(x_tiles - 1), y.min(y_tiles - 1)))
    }
}

fn tiles_at_level(level_zero: u32, level: u32) -> u32 {
    1u32.checked_shl(level)
        .and_then(|scale| level_zero.checked_mul(scale))
        .unwrap_or(u32::MAX)
}

/// Native position of a geographic point lifted to a height.
pub fn native_position<S: TilingScheme + ?Sized>(scheme: &S, lon_lat: DVec2, height: f64) -> DVec3 {
    let p = scheme.project(lon_lat);
    DVec3::new(p.x, p.y, height)
}
