//! Compositor - Output Surface
//!
//! Owns the canvas for one merge. `draw` takes `&mut self`, so pixel
//! writes to the surface are serialized by construction.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::MergeError;
use crate::layout::Cell;

pub struct Compositor {
    canvas: RgbaImage,
    filter: FilterType,
    draws: usize,
}

impl Compositor {
    /// Allocate a transparent `width` x `height` surface.
    ///
    /// Refuses surfaces above `max_pixels` instead of attempting the allocation.
    pub fn new(
        width: u32,
        height: u32,
        filter: FilterType,
        max_pixels: u64,
    ) -> Result<Self, MergeError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > max_pixels {
            return Err(MergeError::CompositeFailure(format!(
                "canvas {}x{} exceeds configured maxCanvasPixels ({})",
                width, height, max_pixels
            )));
        }
        Ok(Self {
            canvas: RgbaImage::new(width, height),
            filter,
            draws: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn draws(&self) -> usize {
        self.draws
    }

    /// Scale `bitmap` to exactly fill `cell` (aspect ratio not kept) and draw it.
    pub fn draw(&mut self, bitmap: &DynamicImage, cell: Cell) -> Result<(), MergeError> {
        if cell.is_empty() {
            log::debug!("cell {} has no area, nothing drawn", cell.index);
            return Ok(());
        }
        let fits = u64::from(cell.x) + u64::from(cell.width) <= u64::from(self.width())
            && u64::from(cell.y) + u64::from(cell.height) <= u64::from(self.height());
        if !fits {
            return Err(MergeError::CompositeFailure(format!(
                "cell {} at ({}, {}) size {}x{} falls outside {}x{} canvas",
                cell.index,
                cell.x,
                cell.y,
                cell.width,
                cell.height,
                self.width(),
                self.height()
            )));
        }

        let scaled = imageops::resize(bitmap, cell.width, cell.height, self.filter);
        imageops::overlay(&mut self.canvas, &scaled, i64::from(cell.x), i64::from(cell.y));
        self.draws += 1;
        Ok(())
    }

    /// Serialize the surface to PNG. Consumes the compositor.
    pub fn encode(self) -> Result<Vec<u8>, MergeError> {
        let mut buf = Vec::new();
        self.canvas
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| MergeError::CompositeFailure(format!("png encode: {}", e)))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::plan;
    use image::Rgba;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn test_draw_scales_to_cell() {
        let layout = plan(4, 200, 100).unwrap();
        let mut compositor = Compositor::new(200, 100, FilterType::Nearest, u64::MAX).unwrap();

        compositor.draw(&solid(3, 7, [255, 0, 0, 255]), layout.cell(0)).unwrap();
        compositor.draw(&solid(640, 10, [0, 0, 255, 255]), layout.cell(3)).unwrap();

        let png = compositor.encode().unwrap();
        let out = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (200, 100));
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(99, 49), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(150, 25), Rgba([0, 0, 0, 0]));
        assert_eq!(*out.get_pixel(199, 99), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_remainder_stays_transparent() {
        let layout = plan(4, 101, 50).unwrap();
        let mut compositor = Compositor::new(101, 50, FilterType::Nearest, u64::MAX).unwrap();
        compositor.draw(&solid(1, 1, [1, 2, 3, 255]), layout.cell(0)).unwrap();
        compositor.draw(&solid(1, 1, [4, 5, 6, 255]), layout.cell(1)).unwrap();
        assert_eq!(compositor.draws(), 2);

        let out = image::load_from_memory(&compositor.encode().unwrap()).unwrap().to_rgba8();
        assert_eq!(*out.get_pixel(99, 10), Rgba([4, 5, 6, 255]));
        assert_eq!(*out.get_pixel(100, 10), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_empty_cell_skipped() {
        let layout = plan(9, 2, 2).unwrap();
        let mut compositor = Compositor::new(2, 2, FilterType::Triangle, u64::MAX).unwrap();
        compositor.draw(&solid(4, 4, [9, 9, 9, 255]), layout.cell(0)).unwrap();
        assert_eq!(compositor.draws(), 0);
        assert!(!compositor.encode().unwrap().is_empty());
    }

    #[test]
    fn test_cell_outside_canvas_rejected() {
        let mut compositor = Compositor::new(10, 10, FilterType::Nearest, u64::MAX).unwrap();
        let cell = Cell { index: 0, row: 0, col: 1, x: 8, y: 0, width: 5, height: 5 };
        let err = compositor.draw(&solid(1, 1, [0, 0, 0, 255]), cell).unwrap_err();
        assert!(matches!(err, MergeError::CompositeFailure(_)));
    }

    #[test]
    fn test_oversized_canvas_refused() {
        let err = Compositor::new(10_000, 10_000, FilterType::Nearest, 8192 * 8192)
            .err()
            .unwrap();
        assert!(matches!(err, MergeError::CompositeFailure(_)));
        assert!(err.to_string().contains("maxCanvasPixels"));
    }

    #[test]
    fn test_cap_is_configurable() {
        let compositor = Compositor::new(10_000, 10, FilterType::Nearest, 100_000).unwrap();
        assert_eq!((compositor.width(), compositor.height()), (10_000, 10));
    }
}
