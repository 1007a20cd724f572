//! Simple closed rings in image pixel coordinates.

use tiny_skia::{Path, PathBuilder};

/// A closed ring of vertices. The last vertex connects back to the first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ring {
    points: Vec<[f32; 2]>,
}

impl Ring {
    pub fn new(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    /// Build a ring from `f64` coordinate pairs as found in label files.
    pub fn from_f64(points: &[[f64; 2]]) -> Self {
        Self {
            points: points.iter().map(|[x, y]| [*x as f32, *y as f32]).collect(),
        }
    }

    /// Axis-aligned rectangle ring, mostly useful for fixtures.
    pub fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::new(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]])
    }

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rings with fewer than three vertices enclose no area.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3
    }

    /// Convert to a closed `tiny-skia` path.
    ///
    /// Returns `None` for degenerate rings or rings with non-finite vertices.
    pub(crate) fn to_path(&self) -> Option<Path> {
        if self.is_degenerate() {
            return None;
        }
        if self
            .points
            .iter()
            .any(|[x, y]| !x.is_finite() || !y.is_finite())
        {
            return None;
        }

        let mut builder = PathBuilder::new();
        let [x, y] = self.points[0];
        builder.move_to(x, y);
        for &[x, y] in &self.points[1..] {
            builder.line_to(x, y);
        }
        builder.close();
        builder.finish()
    }
}
