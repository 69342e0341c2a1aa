//! Tiling schemes: how the quadtree maps onto the map's coordinate space.
//!
//! # Invariants
//! - Every query is a pure function of its inputs; nothing is cached here.
//! - Level `n + 1` splits every level-`n` tile into exactly four quadrants.

mod geographic;
mod scheme;
mod web_mercator;

pub use geographic::GeographicTilingScheme;
pub use scheme::{HeightRange, MAXIMUM_TILE_LEVEL, TilingScheme, WGS84_RADIUS, native_position};
pub use web_mercator::{MAXIMUM_LATITUDE, WebMercatorTilingScheme};

pub fn crate_info() -> &'static str {
    "tilestream-tiling v0.1.0"
}
