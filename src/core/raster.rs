//! Reassembling decoded runs into an image
//!
//! Runs fill the surface left to right, top to bottom, two pixels per pair,
//! wrapping at the right edge. A page is complete once the last row is full.

use super::protocol::{PixelRun, SCOPE_X_RES, SCOPE_Y_RES};
use image::{ImageResult, Rgb, RgbImage};
use std::path::Path;

/// RGB color for each of the eight palette indices
pub type Palette = [[u8; 3]; 8];

/// Palette matching the scope's own display
pub const DEFAULT_PALETTE: Palette = [
    [0, 0, 0],
    [77, 77, 77],
    [140, 140, 140],
    [160, 32, 240],
    [255, 255, 200],
    [0, 255, 0],
    [0, 255, 255],
    [255, 255, 255],
];

/// Palette-indexed capture surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    x: u32,
    y: u32,
}

impl Raster {
    /// Blank surface of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize)],
            x: 0,
            y: 0,
        }
    }

    /// Blank surface sized for the scope
    pub fn scope() -> Self {
        Self::new(SCOPE_X_RES, SCOPE_Y_RES)
    }

    /// Fully written surface built from row-major palette indices.
    /// Returns `None` if `indices` does not hold exactly `width * height` entries.
    pub fn from_indices(width: u32, height: u32, indices: Vec<u8>) -> Option<Self> {
        if indices.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels: indices,
            x: 0,
            y: height,
        })
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major palette indices
    pub fn indices(&self) -> &[u8] {
        &self.pixels
    }

    /// Palette index at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// Clear to index 0 and rewind the write position
    pub fn new_page(&mut self) {
        self.pixels.fill(0);
        self.x = 0;
        self.y = 0;
    }

    /// Check if every row has been written
    pub fn is_complete(&self) -> bool {
        self.y >= self.height
    }

    /// Pixels written since the last [`Raster::new_page`]
    pub fn written(&self) -> u64 {
        u64::from(self.y) * u64::from(self.width) + u64::from(self.x)
    }

    /// Write one run at the current position. Pixels past the last row are dropped.
    pub fn apply_run(&mut self, run: &PixelRun) {
        for i in 0..run.pixels() {
            if self.is_complete() || self.width == 0 {
                return;
            }
            let color = if i % 2 == 0 { run.color_a } else { run.color_b };
            let offset = (self.y * self.width + self.x) as usize;
            self.pixels[offset] = color;
            self.x += 1;
            if self.x >= self.width {
                self.x = 0;
                self.y += 1;
            }
        }
    }

    /// Write a batch of runs in order
    pub fn apply_runs(&mut self, runs: &[PixelRun]) {
        for run in runs {
            self.apply_run(run);
        }
    }

    /// Render through `palette`
    pub fn to_rgb_image(&self, palette: &Palette) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let index = self.pixel(x, y).unwrap_or(0) & 0x07;
            Rgb(palette[index as usize])
        })
    }

    /// Save as PNG
    pub fn save_png(&self, path: &Path, palette: &Palette) -> ImageResult<()> {
        self.to_rgb_image(palette).save_with_format(path, image::ImageFormat::Png)
    }
}
