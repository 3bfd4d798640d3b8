use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::content::catalog::{BundleKind, Catalog, SelectionShape};
use crate::persistence::repository::StoredBundle;
use crate::rules::cost::{item_cost, CurrencyDelta};
use crate::state::selection::{Boosts, CategorySelection, SigilSelections, Selections};

pub const BUNDLE_VERSION: u32 = 1;

/// Order-stable image of every selection a bundle kind covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleData {
    #[serde(default)]
    pub sets: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub counters: BTreeMap<String, BTreeMap<String, u32>>,
    #[serde(default)]
    pub slots: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub sigils: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub boosts: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleDecodeError {
    #[error("unsupported bundle version {0}")]
    UnsupportedVersion(u32),
    #[error("malformed bundle data: {0}")]
    Malformed(String),
    #[error("bundle names category {0} outside its kind")]
    UnknownCategory(String),
    #[error("bundle names sigil tree {0} outside its kind")]
    UnknownTree(String),
    #[error("category {category} is stored in the wrong shape (expected {expected:?})")]
    ShapeMismatch {
        category: String,
        expected: SelectionShape,
    },
}

pub fn capture_bundle(
    kind: &BundleKind,
    selections: &Selections,
    sigils: &SigilSelections,
    boosts: &Boosts,
) -> BundleData {
    let mut data = BundleData::default();
    for category in &kind.categories {
        match selections.get(category) {
            Some(CategorySelection::Set(ids)) if !ids.is_empty() => {
                data.sets.insert(category.clone(), ids.clone());
            }
            Some(CategorySelection::Counter(counts)) if !counts.is_empty() => {
                data.counters.insert(category.clone(), counts.clone());
            }
            Some(CategorySelection::Slots(slots)) if !slots.is_empty() => {
                data.slots.insert(category.clone(), slots.clone());
            }
            _ => {}
        }
        if boosts.0.contains(category) {
            data.boosts.insert(category.clone());
        }
    }
    for tree in &kind.trees {
        if let Some(nodes) = sigils.nodes(tree).filter(|nodes| !nodes.is_empty()) {
            data.sigils.insert(tree.clone(), nodes.clone());
        }
    }
    data
}

/// Replace every category, tree and boost the kind covers with the bundle's
/// contents. Ids the catalog no longer knows are dropped.
pub fn apply_bundle(
    catalog: &Catalog,
    kind: &BundleKind,
    data: &BundleData,
    selections: &mut Selections,
    sigils: &mut SigilSelections,
    boosts: &mut Boosts,
) {
    for category_id in &kind.categories {
        let Some(category) = catalog.category(category_id) else {
            continue;
        };
        let known = |id: &String| {
            let ok = catalog.item_in(category_id, id).is_some();
            if !ok {
                warn!(category = %category_id, item = %id, "dropping unknown item from bundle");
            }
            ok
        };
        let selection = match category.shape {
            SelectionShape::Set => CategorySelection::Set(
                data.sets
                    .get(category_id)
                    .map(|ids| ids.iter().filter(|id| known(*id)).cloned().collect())
                    .unwrap_or_default(),
            ),
            SelectionShape::Counter => CategorySelection::Counter(
                data.counters
                    .get(category_id)
                    .map(|counts| {
                        counts
                            .iter()
                            .filter(|(id, _)| known(*id))
                            .filter(|(id, count)| {
                                catalog.item(id).map_or(0, |item| item.default_count()) != **count
                            })
                            .map(|(id, count)| (id.clone(), *count))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            SelectionShape::Slots => CategorySelection::Slots(
                data.slots
                    .get(category_id)
                    .map(|slots| {
                        slots
                            .iter()
                            .filter(|(slot, _)| category.slots.iter().any(|s| &s.id == *slot))
                            .map(|(slot, name)| (slot.clone(), name.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
        };
        selections.replace(category_id, selection);

        if data.boosts.contains(category_id) && category.boost.is_some() {
            boosts.0.insert(category_id.clone());
        } else {
            boosts.0.remove(category_id);
        }
    }

    for tree_id in &kind.trees {
        let Some(tree) = catalog.tree(tree_id) else {
            continue;
        };
        let nodes = data
            .sigils
            .get(tree_id)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|node| tree.node(node).is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sigils.replace(tree_id, nodes);
    }
}

pub fn encode_bundle(data: &BundleData) -> Result<StoredBundle, serde_json::Error> {
    Ok(StoredBundle {
        version: BUNDLE_VERSION,
        data: serde_json::to_value(data)?,
    })
}

/// Decode a stored bundle with the reader for its version.
pub fn decode_bundle(
    stored: &StoredBundle,
    kind: &BundleKind,
    catalog: &Catalog,
) -> Result<BundleData, BundleDecodeError> {
    match stored.version {
        1 => decode_v1(&stored.data, kind, catalog),
        0 => decode_v0(&stored.data, kind, catalog),
        other => Err(BundleDecodeError::UnsupportedVersion(other)),
    }
}

fn decode_v1(
    raw: &Value,
    kind: &BundleKind,
    catalog: &Catalog,
) -> Result<BundleData, BundleDecodeError> {
    let data: BundleData = serde_json::from_value(raw.clone())
        .map_err(|err| BundleDecodeError::Malformed(err.to_string()))?;

    let shaped = [
        (data.sets.keys().collect::<Vec<_>>(), SelectionShape::Set),
        (data.counters.keys().collect(), SelectionShape::Counter),
        (data.slots.keys().collect(), SelectionShape::Slots),
    ];
    for (categories, shape) in shaped {
        for category in categories {
            check_category(kind, catalog, category, shape)?;
        }
    }
    for category in &data.boosts {
        if !kind.categories.contains(category) {
            return Err(BundleDecodeError::UnknownCategory(category.clone()));
        }
    }
    for tree in data.sigils.keys() {
        if !kind.trees.contains(tree) {
            return Err(BundleDecodeError::UnknownTree(tree.clone()));
        }
    }
    Ok(data)
}

/// Legacy flat layout: `{ category: [ids] | [[id, count]] | {slot: name}, tree: [nodes] }`.
fn decode_v0(
    raw: &Value,
    kind: &BundleKind,
    catalog: &Catalog,
) -> Result<BundleData, BundleDecodeError> {
    let Value::Object(fields) = raw else {
        return Err(BundleDecodeError::Malformed(
            "legacy bundle is not an object".to_string(),
        ));
    };

    let mut data = BundleData::default();
    for (key, value) in fields {
        if kind.trees.contains(key) {
            let nodes: BTreeSet<String> = serde_json::from_value(value.clone())
                .map_err(|err| BundleDecodeError::Malformed(err.to_string()))?;
            data.sigils.insert(key.clone(), nodes);
            continue;
        }
        let shape = catalog
            .category(key)
            .filter(|_| kind.categories.contains(key))
            .map(|category| category.shape)
            .ok_or_else(|| BundleDecodeError::UnknownCategory(key.clone()))?;
        let mismatch = |_: serde_json::Error| BundleDecodeError::ShapeMismatch {
            category: key.clone(),
            expected: shape,
        };
        match shape {
            SelectionShape::Set => {
                let ids: BTreeSet<String> =
                    serde_json::from_value(value.clone()).map_err(mismatch)?;
                data.sets.insert(key.clone(), ids);
            }
            SelectionShape::Counter => {
                let pairs: Vec<(String, u32)> =
                    serde_json::from_value(value.clone()).map_err(mismatch)?;
                data.counters.insert(key.clone(), pairs.into_iter().collect());
            }
            SelectionShape::Slots => {
                let slots: BTreeMap<String, String> =
                    serde_json::from_value(value.clone()).map_err(mismatch)?;
                data.slots.insert(key.clone(), slots);
            }
        }
    }
    Ok(data)
}

fn check_category(
    kind: &BundleKind,
    catalog: &Catalog,
    category: &str,
    shape: SelectionShape,
) -> Result<(), BundleDecodeError> {
    if !kind.categories.iter().any(|c| c == category) {
        return Err(BundleDecodeError::UnknownCategory(category.to_string()));
    }
    match catalog.category(category) {
        Some(def) if def.shape == shape => Ok(()),
        Some(def) => Err(BundleDecodeError::ShapeMismatch {
            category: category.to_string(),
            expected: def.shape,
        }),
        None => Err(BundleDecodeError::UnknownCategory(category.to_string())),
    }
}

/// Net currency cost of a bundle, recomputed from current catalog costs.
pub fn bundle_points(catalog: &Catalog, data: &BundleData) -> CurrencyDelta {
    let picks = data
        .sets
        .iter()
        .flat_map(|(category, ids)| ids.iter().map(move |id| (category, id, 1)));
    let counts = data.counters.iter().flat_map(|(category, counts)| {
        counts.iter().map(move |(id, count)| (category, id, *count))
    });
    picks
        .chain(counts)
        .filter_map(|(category, id, count)| {
            catalog
                .item_in(category, id)
                .map(|item| item_cost(item, count))
        })
        .sum()
}

/// The item picked in the kind's type category.
pub fn build_type(kind: &BundleKind, data: &BundleData) -> Option<String> {
    let category = kind.type_category.as_ref()?;
    data.sets.get(category)?.iter().next().cloned()
}

/// Every pick outside the type category.
pub fn perks(kind: &BundleKind, data: &BundleData) -> BTreeSet<String> {
    let is_type = |category: &String| kind.type_category.as_ref() == Some(category);
    let picks = data
        .sets
        .iter()
        .filter(|(category, _)| !is_type(*category))
        .flat_map(|(_, ids)| ids.iter().cloned());
    let counted = data
        .counters
        .values()
        .flat_map(|counts| counts.iter().filter(|(_, count)| **count > 0))
        .map(|(id, _)| id.clone());
    picks.chain(counted).collect()
}
