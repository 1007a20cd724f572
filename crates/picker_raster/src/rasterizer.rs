//! Polygon rasterization into RGBA overlays.
//!
//! Each call renders a fresh layer: every candidate ring is filled with the
//! fill color, then every hole ring is punched back to transparent. Holes
//! always win, regardless of how many candidate rings overlap them. The
//! finished layer is stacked onto the rasterizer's blank canvas, which is
//! either fully transparent or a copy of a configured base canvas.

use image::{Rgba, RgbaImage};
use tiny_skia::{FillRule, Paint, Pixmap, Transform};

use crate::compose::composite_onto;
use crate::error::{RasterError, Result};
use crate::{FillColor, Ring};

const TRANSPARENT: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Renders candidate geometry for one image size.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    width: u32,
    height: u32,
    /// Optional pre-existing annotation layer used instead of a blank canvas
    canvas: Option<RgbaImage>,
}

impl Rasterizer {
    /// Create a rasterizer with a fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            canvas: None,
        }
    }

    /// Use `canvas` as the starting layer for every overlay.
    ///
    /// The canvas must match the rasterizer size.
    pub fn with_canvas(mut self, canvas: RgbaImage) -> Result<Self> {
        let (found_width, found_height) = canvas.dimensions();
        if (found_width, found_height) != (self.width, self.height) {
            return Err(RasterError::CanvasSize {
                width: self.width,
                height: self.height,
                found_width,
                found_height,
            });
        }
        self.canvas = Some(canvas);
        Ok(self)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_canvas(&self) -> bool {
        self.canvas.is_some()
    }

    /// A new copy of the starting canvas.
    pub fn blank(&self) -> RgbaImage {
        match &self.canvas {
            Some(canvas) => canvas.clone(),
            None => RgbaImage::from_pixel(self.width, self.height, TRANSPARENT),
        }
    }

    /// Render one overlay.
    pub fn rasterize(&self, fill: FillColor, rings: &[Ring], holes: &[Ring]) -> Result<RgbaImage> {
        let filled = self.coverage(rings)?;
        let punched = self.coverage(holes)?;

        let mut layer = RgbaImage::from_pixel(self.width, self.height, TRANSPARENT);
        if let Some(filled) = &filled {
            let filled = filled.pixels();
            let punched = punched.as_ref().map(|p| p.pixels());
            for (index, pixel) in layer.pixels_mut().enumerate() {
                let is_hole = punched.is_some_and(|p| p[index].alpha() > 0);
                if filled[index].alpha() > 0 && !is_hole {
                    *pixel = fill;
                }
            }
        }

        log::trace!(
            "Rasterized {} ring(s) with {} hole(s) at {}x{}",
            rings.len(),
            holes.len(),
            self.width,
            self.height
        );

        match &self.canvas {
            Some(canvas) => {
                let mut overlay = canvas.clone();
                composite_onto(&mut overlay, &layer);
                Ok(overlay)
            }
            None => Ok(layer),
        }
    }

    /// Coverage mask of the union of `rings`, or `None` if nothing was drawn.
    fn coverage(&self, rings: &[Ring]) -> Result<Option<Pixmap>> {
        let paths: Vec<_> = rings.iter().filter_map(Ring::to_path).collect();
        if paths.is_empty() {
            return Ok(None);
        }

        let mut pixmap = Pixmap::new(self.width, self.height).ok_or(RasterError::EmptyCanvas {
            width: self.width,
            height: self.height,
        })?;

        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        // Hard edges: a pixel either belongs to the label or it does not.
        paint.anti_alias = false;

        for path in &paths {
            pixmap.fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
        }
        Ok(Some(pixmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn opaque_count(image: &RgbaImage) -> usize {
        image.pixels().filter(|p| p[3] > 0).count()
    }

    #[test]
    fn test_fill_covers_interior_only() {
        let rasterizer = Rasterizer::new(10, 10);
        let overlay = rasterizer
            .rasterize(RED, &[Ring::rect(2.0, 2.0, 6.0, 6.0)], &[])
            .unwrap();

        assert_eq!(overlay.dimensions(), (10, 10));
        assert_eq!(*overlay.get_pixel(3, 3), RED);
        assert_eq!(*overlay.get_pixel(4, 5), RED);
        assert_eq!(overlay.get_pixel(0, 0)[3], 0);
        assert_eq!(overlay.get_pixel(8, 8)[3], 0);
    }

    #[test]
    fn test_identical_hole_cancels_fill() {
        let ring = Ring::new(vec![[1.0, 1.0], [8.5, 2.0], [6.0, 9.0], [1.5, 7.0]]);
        let rasterizer = Rasterizer::new(10, 10);
        let overlay = rasterizer
            .rasterize(RED, std::slice::from_ref(&ring), std::slice::from_ref(&ring))
            .unwrap();
        assert_eq!(opaque_count(&overlay), 0);
    }

    #[test]
    fn test_hole_wins_over_overlapping_fills() {
        let rings = [Ring::rect(0.0, 0.0, 8.0, 8.0), Ring::rect(2.0, 2.0, 10.0, 10.0)];
        let holes = [Ring::rect(3.0, 3.0, 6.0, 6.0)];
        let overlay = Rasterizer::new(10, 10)
            .rasterize(RED, &rings, &holes)
            .unwrap();

        assert_eq!(overlay.get_pixel(4, 4)[3], 0);
        assert_eq!(*overlay.get_pixel(1, 1), RED);
        assert_eq!(*overlay.get_pixel(8, 8), RED);
    }

    #[test]
    fn test_no_rings_is_transparent() {
        let overlay = Rasterizer::new(4, 4).rasterize(RED, &[], &[]).unwrap();
        assert_eq!(opaque_count(&overlay), 0);
    }

    #[test]
    fn test_degenerate_rings_are_skipped() {
        let rings = [Ring::new(vec![[0.0, 0.0], [3.0, 3.0]])];
        let overlay = Rasterizer::new(4, 4).rasterize(RED, &rings, &[]).unwrap();
        assert_eq!(opaque_count(&overlay), 0);
    }

    #[test]
    fn test_zero_sized_canvas_is_an_error() {
        let result = Rasterizer::new(0, 0).rasterize(RED, &[Ring::rect(0.0, 0.0, 1.0, 1.0)], &[]);
        assert!(matches!(result, Err(RasterError::EmptyCanvas { .. })));
    }

    #[test]
    fn test_base_canvas_shows_through_holes() {
        let blue = Rgba([0, 0, 255, 255]);
        let canvas = RgbaImage::from_pixel(10, 10, blue);
        let rasterizer = Rasterizer::new(10, 10).with_canvas(canvas).unwrap();

        let overlay = rasterizer
            .rasterize(
                RED,
                &[Ring::rect(0.0, 0.0, 10.0, 10.0)],
                &[Ring::rect(4.0, 4.0, 6.0, 6.0)],
            )
            .unwrap();

        assert_eq!(*overlay.get_pixel(1, 1), RED);
        assert_eq!(*overlay.get_pixel(4, 4), blue);
    }

    #[test]
    fn test_canvas_size_mismatch() {
        let canvas = RgbaImage::new(5, 5);
        let result = Rasterizer::new(10, 10).with_canvas(canvas);
        assert!(matches!(result, Err(RasterError::CanvasSize { found_width: 5, .. })));
    }

    #[test]
    fn test_rasterize_does_not_mutate_canvas() {
        let rasterizer = Rasterizer::new(6, 6).with_canvas(RgbaImage::new(6, 6)).unwrap();
        let first = rasterizer
            .rasterize(RED, &[Ring::rect(0.0, 0.0, 6.0, 6.0)], &[])
            .unwrap();
        assert_eq!(opaque_count(&first), 36);
        assert_eq!(opaque_count(&rasterizer.blank()), 0);
    }
}
