//! Label records merged from one or more label files.
//!
//! A label file maps raw identifiers (usually image URLs) to an item entry:
//!
//! ```json
//! {
//!   "https://host/img/a.png?sig=1": {
//!     "image_url": "https://host/img/a.png?sig=1",
//!     "per_label": {
//!       "logo": {"user_polygons": [...], "averaged_polygon": {...}},
//!       "logohole": {"user_polygons": [...]}
//!     }
//!   }
//! }
//! ```
//!
//! Raw identifiers are normalized with [`item_key`] before merging. Merging is
//! "first writer wins per category": a later file can add items and add
//! categories to known items, but never replaces a category already present.

mod geometry;

pub use geometry::{Coord, Geometry, PolygonRings, Shape};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};

use crate::error::{PickerError, Result};

/// Normalized identifier for one reviewable item.
pub type ItemKey = String;

/// Suffix marking a category whose geometry is cut out of its sibling.
pub const HOLE_SUFFIX: &str = "hole";

/// Derive the item key from a raw identifier.
///
/// Drops any query string, then keeps only the last path component.
pub fn item_key(raw: &str) -> ItemKey {
    let without_query = raw.split('?').next().unwrap_or(raw);
    without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}

/// Whether a category only exists to subtract geometry from another.
pub fn is_hole_category(name: &str) -> bool {
    name.ends_with(HOLE_SUFFIX)
}

/// Candidate geometries of one item keyed by category name.
pub type PerLabel = IndexMap<String, CandidateSet>;

/// One item entry of a label file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Where the source image can be fetched from
    pub image_url: String,

    /// Proposed geometry per label category
    #[serde(default)]
    pub per_label: PerLabel,
}

impl ItemRecord {
    /// Find the hole category paired with `category`.
    ///
    /// This is the first category (in file order) whose name starts with
    /// `category` and ends with `"hole"`.
    pub fn hole_set(&self, category: &str) -> Option<&CandidateSet> {
        self.per_label
            .iter()
            .find(|(name, _)| {
                name.as_str() != category && name.starts_with(category) && is_hole_category(name)
            })
            .map(|(_, set)| set)
    }

    /// Categories that have at least one candidate.
    pub fn populated_categories(&self) -> impl Iterator<Item = &str> + '_ {
        self.per_label
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(name, _)| name.as_str())
    }
}

/// `user_polygons` is stored either as a list or as an object keyed by
/// submission id. Both keep submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserPolygons {
    List(Vec<Geometry>),
    Keyed(IndexMap<String, Geometry>),
}

impl Default for UserPolygons {
    fn default() -> Self {
        UserPolygons::List(Vec::new())
    }
}

impl UserPolygons {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Geometry> + '_> {
        match self {
            UserPolygons::List(list) => Box::new(list.iter()),
            UserPolygons::Keyed(map) => Box::new(map.values()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UserPolygons::List(list) => list.len(),
            UserPolygons::Keyed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One label category's proposed geometry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateSet {
    /// Individual submissions, oldest first
    #[serde(default)]
    pub user_polygons: UserPolygons,

    /// Consensus geometry, if one was computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub averaged_polygon: Option<Geometry>,
}

impl CandidateSet {
    /// All geometries in submission order, with the averaged polygon last.
    pub fn geometries(&self) -> Vec<&Geometry> {
        self.user_polygons
            .iter()
            .chain(self.averaged_polygon.as_ref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.user_polygons.len() + usize::from(self.averaged_polygon.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All items of a review session, in merge insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelRecord {
    items: IndexMap<ItemKey, ItemRecord>,
}

impl LabelRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge every source file in order.
    pub fn from_sources<P: AsRef<Path>>(sources: &[P]) -> Result<Self> {
        let mut record = Self::new();
        for source in sources {
            record.merge_file(source.as_ref())?;
        }
        log::info!(
            "Merged {} item(s) from {} label file(s)",
            record.len(),
            sources.len()
        );
        Ok(record)
    }

    /// Parse one label file and merge it in.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let raw = read_source(path)?;
        log::debug!("Read {} entries from {:?}", raw.len(), path);
        self.merge_raw(raw);
        Ok(())
    }

    /// Merge entries keyed by raw identifiers.
    pub fn merge_raw(&mut self, raw: IndexMap<String, ItemRecord>) {
        for (raw_key, item) in raw {
            let key = item_key(&raw_key);
            if key.is_empty() {
                log::warn!("Skipping entry with empty item key: {:?}", raw_key);
                continue;
            }
            self.merge_item(key, item);
        }
    }

    /// Merge one item. Unknown keys are inserted wholesale; known keys only
    /// gain categories they do not have yet.
    pub fn merge_item(&mut self, key: ItemKey, item: ItemRecord) {
        match self.items.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(item);
            }
            Entry::Occupied(mut entry) => {
                let existing = &mut entry.get_mut().per_label;
                for (category, set) in item.per_label {
                    if let Entry::Vacant(slot) = existing.entry(category) {
                        slot.insert(set);
                    }
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&ItemRecord> {
        self.items.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ItemKey> + '_ {
        self.items.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, &ItemRecord)> + '_ {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every category name seen on any item, excluding hole categories.
    pub fn observed_categories(&self) -> BTreeSet<String> {
        self.items
            .values()
            .flat_map(|item| item.per_label.keys())
            .filter(|name| !is_hole_category(name))
            .cloned()
            .collect()
    }

    /// Observed categories that `order` does not mention.
    pub fn categories_missing_from(&self, order: &[String]) -> Vec<String> {
        self.observed_categories()
            .into_iter()
            .filter(|name| !order.contains(name))
            .collect()
    }
}

/// Merge label files into one record.
pub fn merge(sources: &[PathBuf]) -> Result<LabelRecord> {
    LabelRecord::from_sources(sources)
}

fn read_source(path: &Path) -> Result<IndexMap<String, ItemRecord>> {
    let text = fs::read_to_string(path).map_err(|e| {
        PickerError::config(format!("Cannot read label file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        PickerError::config(format!("Invalid label file {}: {}", path.display(), e))
    })
}
