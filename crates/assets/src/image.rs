use std::sync::Arc;

/// Decoded raster payload for one tile, RGBA8.
///
/// Pixel data is shared, so handing an image to the renderer is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl TileImage {
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// An image filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let pixels: Vec<u8> = rgba.iter().copied().cycle().take(count * 4).collect();
        Self::new(width, height, pixels)
    }

    /// A decoded image with zero extent.
    pub fn empty() -> Self {
        Self::new(0, 0, Vec::new())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
