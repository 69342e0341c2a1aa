use tilestream_common::Rectangle;

use crate::fetch::{FetchError, FetchRequest};
use crate::image::TileImage;
use crate::provider::AssetProvider;

/// Synchronous provider that paints every tile a solid colour keyed by level.
///
/// Useful as a network-free base layer and for exercising the scheduler.
#[derive(Debug, Clone)]
pub struct GridImageryProvider {
    name: String,
    tile_size: u32,
    minimum_level: u32,
    maximum_level: u32,
    rectangle: Rectangle,
}

impl Default for GridImageryProvider {
    fn default() -> Self {
        Self {
            name: "grid".into(),
            tile_size: 256,
            minimum_level: 0,
            maximum_level: 18,
            rectangle: Rectangle::new(-180.0, -90.0, 180.0, 90.0),
        }
    }
}

impl GridImageryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_levels(mut self, minimum: u32, maximum: u32) -> Self {
        self.minimum_level = minimum;
        self.maximum_level = maximum;
        self
    }

    pub fn with_rectangle(mut self, rectangle: Rectangle) -> Self {
        self.rectangle = rectangle;
        self
    }

    /// Colour used for tiles at `level`.
    pub fn level_color(level: u32) -> [u8; 4] {
        const PALETTE: [[u8; 4]; 6] = [
            [200, 60, 60, 255],
            [60, 160, 60, 255],
            [60, 90, 200, 255],
            [200, 170, 50, 255],
            [150, 60, 170, 255],
            [50, 170, 170, 255],
        ];
        PALETTE[level as usize % PALETTE.len()]
    }
}

impl AssetProvider for GridImageryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimum_level(&self) -> u32 {
        self.minimum_level
    }

    fn maximum_level(&self) -> u32 {
        self.maximum_level
    }

    fn tile_width(&self) -> u32 {
        self.tile_size
    }

    fn tile_height(&self) -> u32 {
        self.tile_size
    }

    fn rectangle(&self) -> Rectangle {
        self.rectangle
    }

    fn request_tile_asset(&self, request: FetchRequest) -> Result<(), FetchError> {
        let color = Self::level_color(request.coord().level);
        request.succeed(TileImage::solid(self.tile_size, self.tile_size, color));
        Ok(())
    }
}
