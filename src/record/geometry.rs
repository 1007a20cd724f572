//! Polygon encodings found in label files.
//!
//! A candidate geometry is either one shape object or a list of shape
//! objects. Shapes are GeoJSON-like and tagged by `type`:
//!
//! ```json
//! {"type": "Polygon", "coordinates": [[[0, 0], [4, 0], [4, 4]], [[1, 1], [2, 1], [2, 2]]]}
//! {"type": "MultiPolygon", "coordinates": [[[[0, 0], [4, 0], [4, 4]]], [[[5, 5], [6, 5], [6, 6]]]]}
//! {"type": "EmptyPolygon"}
//! ```
//!
//! Everything is normalized to [`PolygonRings`] before rasterization.

use picker_raster::Ring;
use serde::{Deserialize, Serialize};

/// An `[x, y]` pair in image pixel coordinates.
pub type Coord = [f64; 2];

/// One candidate geometry as stored in a label file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Geometry {
    /// A list of independent shapes
    Collection(Vec<Shape>),
    /// A single shape
    Single(Shape),
}

/// A tagged shape object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Shape {
    /// Outer ring followed by optional inner (hole) rings
    Polygon { coordinates: Vec<Vec<Coord>> },
    /// Independent polygons, each with its own ring list
    MultiPolygon { coordinates: Vec<Vec<Vec<Coord>>> },
    /// No geometry at all
    EmptyPolygon {},
}

/// A simple polygon: one outer ring and the rings cut out of it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonRings {
    pub outer: Ring,
    pub inner: Vec<Ring>,
}

impl PolygonRings {
    fn from_coordinates(rings: &[Vec<Coord>]) -> Option<Self> {
        let (outer, inner) = rings.split_first()?;
        Some(Self {
            outer: Ring::from_f64(outer),
            inner: inner.iter().map(|ring| Ring::from_f64(ring)).collect(),
        })
    }
}

impl Shape {
    fn push_polygons(&self, out: &mut Vec<PolygonRings>) {
        match self {
            Shape::Polygon { coordinates } => {
                out.extend(PolygonRings::from_coordinates(coordinates));
            }
            Shape::MultiPolygon { coordinates } => {
                out.extend(
                    coordinates
                        .iter()
                        .filter_map(|rings| PolygonRings::from_coordinates(rings)),
                );
            }
            Shape::EmptyPolygon {} => {}
        }
    }
}

impl Geometry {
    /// Geometry with no shapes.
    pub fn empty() -> Self {
        Geometry::Collection(Vec::new())
    }

    /// Flatten into a sequence of simple polygons.
    pub fn polygons(&self) -> Vec<PolygonRings> {
        let mut out = Vec::new();
        match self {
            Geometry::Collection(shapes) => {
                for shape in shapes {
                    shape.push_polygons(&mut out);
                }
            }
            Geometry::Single(shape) => shape.push_polygons(&mut out),
        }
        out
    }

    /// Outer rings of every polygon.
    pub fn outer_rings(&self) -> Vec<Ring> {
        self.polygons().into_iter().map(|p| p.outer).collect()
    }

    /// Inner rings of every polygon.
    pub fn inner_rings(&self) -> Vec<Ring> {
        self.polygons().into_iter().flat_map(|p| p.inner).collect()
    }
}
