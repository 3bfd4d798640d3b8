use std::collections::{BTreeMap, BTreeSet};

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::content::catalog::{Catalog, SelectionShape};

/// Live picks for one category, shaped by the category definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategorySelection {
    Set(BTreeSet<String>),
    /// Item id -> purchased count. Items at their default count hold no entry.
    Counter(BTreeMap<String, u32>),
    /// Slot id -> referenced bundle name.
    Slots(BTreeMap<String, String>),
}

impl CategorySelection {
    pub fn empty(shape: SelectionShape) -> Self {
        match shape {
            SelectionShape::Set => CategorySelection::Set(BTreeSet::new()),
            SelectionShape::Counter => CategorySelection::Counter(BTreeMap::new()),
            SelectionShape::Slots => CategorySelection::Slots(BTreeMap::new()),
        }
    }

    pub fn shape(&self) -> SelectionShape {
        match self {
            CategorySelection::Set(_) => SelectionShape::Set,
            CategorySelection::Counter(_) => SelectionShape::Counter,
            CategorySelection::Slots(_) => SelectionShape::Slots,
        }
    }

    /// Whether the id counts as picked: a set member, a counter above zero, or a filled slot.
    pub fn contains(&self, id: &str) -> bool {
        match self {
            CategorySelection::Set(ids) => ids.contains(id),
            CategorySelection::Counter(counts) => counts.get(id).is_some_and(|count| *count > 0),
            CategorySelection::Slots(slots) => slots.contains_key(id),
        }
    }

    /// Stored count for a counter entry; `None` when the item sits at its default.
    pub fn stored_count(&self, id: &str) -> Option<u32> {
        match self {
            CategorySelection::Counter(counts) => counts.get(id).copied(),
            CategorySelection::Set(ids) => Some(u32::from(ids.contains(id))),
            CategorySelection::Slots(_) => None,
        }
    }

    /// Picks counted against the category quota.
    pub fn used(&self) -> u32 {
        let used = match self {
            CategorySelection::Set(ids) => ids.len(),
            CategorySelection::Counter(counts) => counts.values().filter(|count| **count > 0).count(),
            CategorySelection::Slots(slots) => slots.len(),
        };
        used as u32
    }

    /// Item ids with the count each one is charged at. Slots carry no items.
    pub fn counted(&self) -> Vec<(&str, u32)> {
        match self {
            CategorySelection::Set(ids) => ids.iter().map(|id| (id.as_str(), 1)).collect(),
            CategorySelection::Counter(counts) => counts
                .iter()
                .map(|(id, count)| (id.as_str(), *count))
                .collect(),
            CategorySelection::Slots(_) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CategorySelection::Set(ids) => ids.is_empty(),
            CategorySelection::Counter(counts) => counts.is_empty(),
            CategorySelection::Slots(slots) => slots.is_empty(),
        }
    }

    pub fn clear(&mut self) {
        *self = CategorySelection::empty(self.shape());
    }
}

/// The Selection Set: one entry per catalog category.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections {
    categories: BTreeMap<String, CategorySelection>,
}

impl Selections {
    pub fn for_catalog(catalog: &Catalog) -> Self {
        let categories = catalog
            .categories
            .iter()
            .map(|category| (category.id.clone(), CategorySelection::empty(category.shape)))
            .collect();
        Self { categories }
    }

    pub fn get(&self, category: &str) -> Option<&CategorySelection> {
        self.categories.get(category)
    }

    pub fn get_mut(&mut self, category: &str) -> Option<&mut CategorySelection> {
        self.categories.get_mut(category)
    }

    pub fn is_picked(&self, category: &str, id: &str) -> bool {
        self.get(category).is_some_and(|selection| selection.contains(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CategorySelection)> {
        self.categories.iter()
    }

    /// Replace one category wholesale. Categories unknown to this set are ignored.
    pub fn replace(&mut self, category: &str, selection: CategorySelection) {
        if let Some(slot) = self.categories.get_mut(category) {
            *slot = selection;
        }
    }
}

/// Stored sigil node ids per tree, including dormant ones.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct SigilSelections {
    trees: BTreeMap<String, BTreeSet<String>>,
}

impl SigilSelections {
    pub fn nodes(&self, tree: &str) -> Option<&BTreeSet<String>> {
        self.trees.get(tree)
    }

    pub fn is_selected(&self, tree: &str, node: &str) -> bool {
        self.nodes(tree).is_some_and(|nodes| nodes.contains(node))
    }

    pub fn nodes_mut(&mut self, tree: &str) -> &mut BTreeSet<String> {
        self.trees.entry(tree.to_string()).or_default()
    }

    pub fn replace(&mut self, tree: &str, nodes: BTreeSet<String>) {
        if nodes.is_empty() {
            self.trees.remove(tree);
        } else {
            self.trees.insert(tree.to_string(), nodes);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.trees.iter()
    }
}

/// Categories whose boost toggle is on.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct Boosts(pub BTreeSet<String>);

/// Signed sigil trade counter per kind: positive = bought, negative = sold.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct SigilTrades(pub BTreeMap<String, i64>);

/// Number of stored bundles per cost-gated kind, each holding its creation cost.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleCharges(pub BTreeMap<String, u32>);
