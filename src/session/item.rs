//! Per-item review state.
//!
//! A [`ReviewItem`] is built when an item is loaded and dropped when the
//! session moves on. It owns the source image, one pre-rendered overlay per
//! candidate and the reviewer's current selection.

use image::{Rgba, RgbaImage};
use indexmap::IndexMap;
use picker_raster::{Rasterizer, Ring};

use super::ReviewOptions;
use crate::error::{PickerError, Result};
use crate::record::{ItemKey, ItemRecord};

/// Rings of one candidate, ready for the rasterizer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandidateGeometry {
    /// Filled with the category color
    pub rings: Vec<Ring>,
    /// Punched back to transparent after filling
    pub holes: Vec<Ring>,
}

/// Candidate geometries of `category`, each paired with its hole geometry.
///
/// Candidates are the user polygons followed by the averaged polygon. Both
/// the candidate list and the hole list are walked from the end, so the last
/// candidate pairs with the last hole and surplus candidates at the front
/// get no hole. The result is in that reversed order: index 0 is the most
/// recent candidate (the averaged polygon when there is one).
///
/// Inner rings of a candidate polygon are treated as holes of that candidate.
pub fn candidate_geometries(item: &ItemRecord, category: &str) -> Vec<CandidateGeometry> {
    let Some(set) = item.per_label.get(category) else {
        return Vec::new();
    };
    let holes = item
        .hole_set(category)
        .map(|hole_set| hole_set.geometries())
        .unwrap_or_default();
    let mut holes = holes.into_iter().rev();

    set.geometries()
        .into_iter()
        .rev()
        .map(|geometry| {
            let mut hole_rings = geometry.inner_rings();
            if let Some(hole) = holes.next() {
                hole_rings.extend(hole.outer_rings());
            }
            CandidateGeometry {
                rings: geometry.outer_rings(),
                holes: hole_rings,
            }
        })
        .collect()
}

/// Chosen candidate index per category.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    choices: IndexMap<String, usize>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, category: impl Into<String>, index: usize) {
        self.choices.insert(category.into(), index);
    }

    pub fn clear(&mut self, category: &str) -> bool {
        self.choices.shift_remove(category).is_some()
    }

    pub fn get(&self, category: &str) -> Option<usize> {
        self.choices.get(category).copied()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.choices.iter().map(|(name, index)| (name.as_str(), *index))
    }
}

/// Rendered candidates of one category.
#[derive(Debug, Clone)]
pub struct CategoryCandidates {
    pub name: String,
    pub color: Rgba<u8>,
    /// One overlay per candidate, in candidate index order
    pub overlays: Vec<RgbaImage>,
}

/// Everything the reviewer looks at for one item.
#[derive(Debug, Clone)]
pub struct ReviewItem {
    key: ItemKey,
    source: RgbaImage,
    /// Reviewed categories in drawing order
    categories: Vec<CategoryCandidates>,
    selection: Selection,
}

impl ReviewItem {
    /// Render every candidate of every reviewed category.
    ///
    /// Only categories named in the label order with at least one candidate
    /// are reviewed. When `canvas` is given, overlays start from it instead
    /// of a transparent layer.
    pub fn build(
        key: ItemKey,
        record: &ItemRecord,
        source: RgbaImage,
        canvas: Option<RgbaImage>,
        options: &ReviewOptions,
    ) -> Result<Self> {
        let (width, height) = source.dimensions();
        let mut rasterizer = Rasterizer::new(width, height);
        if let Some(canvas) = canvas {
            rasterizer = rasterizer.with_canvas(canvas)?;
        }

        let mut categories = Vec::new();
        for name in &options.label_order {
            if record.per_label.get(name).is_none_or(|set| set.is_empty()) {
                continue;
            }
            let color = options.colors.get(name).ok_or_else(|| {
                PickerError::config(format!("Label {:?} has no color in the color map", name))
            })?;

            let overlays = candidate_geometries(record, name)
                .iter()
                .map(|candidate| rasterizer.rasterize(color, &candidate.rings, &candidate.holes))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            log::debug!("{}: {} candidate(s) for {}", key, overlays.len(), name);
            categories.push(CategoryCandidates {
                name: name.clone(),
                color,
                overlays,
            });
        }

        let mut selection = Selection::new();
        if options.preselect {
            for category in &categories {
                selection.set(category.name.clone(), 0);
            }
        }

        Ok(Self {
            key,
            source,
            categories,
            selection,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    pub fn categories(&self) -> &[CategoryCandidates] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&CategoryCandidates> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Choose candidate `index` for `category`.
    pub fn select(&mut self, category: &str, index: usize) -> Result<()> {
        let Some(candidates) = self.category(category) else {
            return Err(PickerError::invalid_selection(format!(
                "{} has no category {:?}",
                self.key, category
            )));
        };
        if index >= candidates.overlays.len() {
            return Err(PickerError::invalid_selection(format!(
                "{:?} has {} candidate(s), got index {}",
                category,
                candidates.overlays.len(),
                index
            )));
        }
        self.selection.set(category, index);
        Ok(())
    }

    /// Drop the choice for `category`. Returns whether there was one.
    pub fn clear(&mut self, category: &str) -> bool {
        self.selection.clear(category)
    }

    /// Whether every reviewed category has a choice.
    pub fn is_resolved(&self) -> bool {
        self.categories
            .iter()
            .all(|category| self.selection.get(&category.name).is_some())
    }

    /// Categories still lacking a choice.
    pub fn unresolved(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|category| self.selection.get(&category.name).is_none())
            .map(|category| category.name.as_str())
            .collect()
    }

    /// Selected overlays in drawing order.
    fn selected_overlays(&self) -> impl Iterator<Item = &RgbaImage> + '_ {
        self.categories.iter().filter_map(|category| {
            let index = self.selection.get(&category.name)?;
            category.overlays.get(index)
        })
    }

    /// The final label: every selected overlay stacked on a transparent
    /// canvas, later categories on top. `None` until the item is resolved.
    pub fn composite(&self) -> Option<RgbaImage> {
        if !self.is_resolved() {
            return None;
        }
        let (width, height) = self.source.dimensions();
        let mut label = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));
        for overlay in self.selected_overlays() {
            picker_raster::composite_onto(&mut label, overlay);
        }
        Some(label)
    }

    /// One candidate drawn over the source image, scaled to `height`.
    pub fn candidate_preview(
        &self,
        category: &str,
        index: usize,
        height: u32,
    ) -> Option<RgbaImage> {
        let overlay = self.category(category)?.overlays.get(index)?;
        let joined = picker_raster::composite(&self.source, overlay);
        Some(picker_raster::scale_to_height(&joined, height))
    }

    /// The source image with the current selection drawn over it.
    pub fn selection_preview(&self, height: u32) -> RgbaImage {
        let mut joined = self.source.clone();
        for overlay in self.selected_overlays() {
            picker_raster::composite_onto(&mut joined, overlay);
        }
        picker_raster::scale_to_height(&joined, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorMap;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn square(x0: u32, y0: u32, x1: u32, y1: u32) -> String {
        format!(
            r#"{{"type": "Polygon", "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}]]]}}"#
        )
    }

    fn record(json: &str) -> ItemRecord {
        serde_json::from_str(json).expect("item should parse")
    }

    fn options(order: &[&str], preselect: bool) -> ReviewOptions {
        let mut colors = ColorMap::default();
        colors.insert("logo", RED);
        colors.insert("badge", GREEN);
        ReviewOptions {
            label_order: order.iter().map(|s| s.to_string()).collect(),
            colors,
            auto_commit: false,
            preselect,
        }
    }

    #[test]
    fn test_holes_pair_from_the_end() {
        let item = record(&format!(
            r#"{{"image_url": "x", "per_label": {{
                "logo": {{"user_polygons": [{a}, {b}, {c}]}},
                "logohole": {{"user_polygons": [{h1}, {h2}]}}
            }}}}"#,
            a = square(0, 0, 2, 2),
            b = square(0, 0, 4, 4),
            c = square(0, 0, 6, 6),
            h1 = square(1, 1, 2, 2),
            h2 = square(3, 3, 4, 4),
        ));

        let candidates = candidate_geometries(&item, "logo");
        assert_eq!(candidates.len(), 3);
        // Reversed: index 0 is the last submitted candidate with the last hole.
        assert_eq!(candidates[0].rings[0], Ring::rect(0.0, 0.0, 6.0, 6.0));
        assert_eq!(candidates[0].holes, vec![Ring::rect(3.0, 3.0, 4.0, 4.0)]);
        assert_eq!(candidates[1].holes, vec![Ring::rect(1.0, 1.0, 2.0, 2.0)]);
        assert!(candidates[2].holes.is_empty());
    }

    #[test]
    fn test_surplus_holes_are_dropped_and_averaged_comes_first() {
        let item = record(&format!(
            r#"{{"image_url": "x", "per_label": {{
                "logo": {{"user_polygons": [{a}], "averaged_polygon": {avg}}},
                "logohole": {{"user_polygons": [{h1}, {h2}, {h3}]}}
            }}}}"#,
            a = square(0, 0, 2, 2),
            avg = square(0, 0, 8, 8),
            h1 = square(0, 0, 1, 1),
            h2 = square(1, 1, 2, 2),
            h3 = square(2, 2, 3, 3),
        ));

        let candidates = candidate_geometries(&item, "logo");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].rings[0], Ring::rect(0.0, 0.0, 8.0, 8.0));
        assert_eq!(candidates[0].holes, vec![Ring::rect(2.0, 2.0, 3.0, 3.0)]);
        assert_eq!(candidates[1].holes, vec![Ring::rect(1.0, 1.0, 2.0, 2.0)]);
    }

    #[test]
    fn test_one_overlay_per_candidate_in_label_order() {
        let item = record(&format!(
            r#"{{"image_url": "x", "per_label": {{
                "badge": {{"user_polygons": [{a}]}},
                "logo": {{"user_polygons": [{a}, {b}]}},
                "other": {{"user_polygons": [{a}]}},
                "empty": {{"user_polygons": []}}
            }}}}"#,
            a = square(0, 0, 4, 4),
            b = square(4, 4, 8, 8),
        ));

        let review = ReviewItem::build(
            "a.png".to_string(),
            &item,
            RgbaImage::new(8, 8),
            None,
            &options(&["logo", "badge", "empty"], true),
        )
        .unwrap();

        let names: Vec<_> = review.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["logo", "badge"]);
        assert_eq!(review.category("logo").unwrap().overlays.len(), 2);
        assert_eq!(review.category("badge").unwrap().overlays.len(), 1);
        assert_eq!(review.selection().get("logo"), Some(0));
        assert!(review.is_resolved());
    }

    #[test]
    fn test_selection_and_composite() {
        let item = record(&format!(
            r#"{{"image_url": "x", "per_label": {{
                "logo": {{"user_polygons": [{a}, {b}]}},
                "badge": {{"user_polygons": [{c}]}}
            }}}}"#,
            a = square(0, 0, 4, 4),
            b = square(4, 4, 8, 8),
            c = square(2, 2, 6, 6),
        ));

        let mut review = ReviewItem::build(
            "a.png".to_string(),
            &item,
            RgbaImage::new(8, 8),
            None,
            &options(&["logo", "badge"], false),
        )
        .unwrap();

        assert!(!review.is_resolved());
        assert!(review.composite().is_none());
        assert_eq!(review.unresolved(), vec!["logo", "badge"]);

        // Index 1 is the first submitted square (0..4).
        review.select("logo", 1).unwrap();
        assert!(review.select("logo", 2).is_err());
        assert!(review.select("claw", 0).is_err());
        assert!(review.composite().is_none());

        review.select("badge", 0).unwrap();
        let label = review.composite().unwrap();
        assert_eq!(*label.get_pixel(0, 0), RED);
        // Badge is drawn after logo, so it wins where they overlap.
        assert_eq!(*label.get_pixel(3, 3), GREEN);
        assert_eq!(*label.get_pixel(5, 5), GREEN);
        assert_eq!(label.get_pixel(7, 7)[3], 0);

        assert!(review.clear("badge"));
        assert!(!review.clear("badge"));
        assert!(review.composite().is_none());
    }

    #[test]
    fn test_missing_color_is_config_error() {
        let item = record(&format!(
            r#"{{"image_url": "x", "per_label": {{"claw": {{"user_polygons": [{a}]}}}}}}"#,
            a = square(0, 0, 4, 4),
        ));
        let result = ReviewItem::build(
            "a.png".to_string(),
            &item,
            RgbaImage::new(8, 8),
            None,
            &options(&["claw"], true),
        );
        assert!(matches!(result, Err(PickerError::Config { .. })));
    }

    #[test]
    fn test_previews() {
        let item = record(&format!(
            r#"{{"image_url": "x", "per_label": {{"logo": {{"user_polygons": [{a}]}}}}}}"#,
            a = square(0, 0, 8, 8),
        ));
        let source = RgbaImage::from_pixel(16, 8, Rgba([0, 0, 255, 255]));
        let review =
            ReviewItem::build("a.png".to_string(), &item, source, None, &options(&["logo"], true))
                .unwrap();

        let preview = review.candidate_preview("logo", 0, 4).unwrap();
        assert_eq!(preview.dimensions(), (8, 4));
        assert!(review.candidate_preview("logo", 1, 4).is_none());

        let full = review.selection_preview(8);
        assert_eq!(*full.get_pixel(2, 2), RED);
        assert_eq!(*full.get_pixel(12, 2), Rgba([0, 0, 255, 255]));
    }
}
