use tilestream_common::TileCoord;
use tilestream_tiling::TilingScheme;

/// Nominal heightmap width used to estimate geometric error per level.
pub const DEFAULT_HEIGHTMAP_WIDTH: u32 = 65;

/// Terrain collaborator: availability probes and per-level geometric error.
pub trait TerrainProvider: Send + Sync {
    /// Synchronous probe. False means availability is not known yet.
    fn tile_data_available(&self, coord: TileCoord) -> bool;

    /// Start resolving availability for `coord` in the background.
    fn load_tile_data_availability(&self, coord: TileCoord);

    /// Maximum geometric error, in native units, of a tile at `level`.
    fn level_maximum_geometric_error(&self, level: u32) -> f64;
}

/// Level-zero geometric error estimate for a scheme, halved at every finer level.
pub fn estimate_level_zero_geometric_error(
    scheme: &dyn TilingScheme,
    heightmap_width: u32,
) -> f64 {
    scheme.native_rectangle().width() * 0.25
        / (heightmap_width as f64 * scheme.level_zero_tiles_x() as f64)
}

/// Terrain with zero height everywhere. Always available.
#[derive(Debug, Clone)]
pub struct FlatTerrainProvider {
    level_zero_error: f64,
}

impl FlatTerrainProvider {
    pub fn new(scheme: &dyn TilingScheme) -> Self {
        Self {
            level_zero_error: estimate_level_zero_geometric_error(
                scheme,
                DEFAULT_HEIGHTMAP_WIDTH,
            ),
        }
    }

    pub fn with_level_zero_error(level_zero_error: f64) -> Self {
        Self { level_zero_error }
    }
}

impl TerrainProvider for FlatTerrainProvider {
    fn tile_data_available(&self, _coord: TileCoord) -> bool {
        true
    }

    fn load_tile_data_availability(&self, _coord: TileCoord) {}

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.level_zero_error / 2f64.powi(level as i32)
    }
}
