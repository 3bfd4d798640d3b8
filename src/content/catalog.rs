use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::rules::cost::{parse_cost, PoolKey};
use crate::rules::counter::{CounterRule, CounterSpec};

pub const CATALOG_SCHEMA_VERSION: u32 = 1;

/// Static, read-only description of everything a build can contain.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub schema_version: u32,
    #[serde(default)]
    pub settings: CatalogSettings,
    #[serde(default)]
    pub sigil_kinds: Vec<SigilKindDef>,
    pub categories: Vec<CategoryDef>,
    #[serde(default)]
    pub items: Vec<ChoiceItem>,
    #[serde(default)]
    pub trees: Vec<SigilTree>,
    #[serde(default)]
    pub bundle_kinds: Vec<BundleKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Starting balance per pool, added to the pool total on every settle.
    #[serde(default)]
    pub starting: BTreeMap<PoolKey, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigilKindDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub starting: i64,
    /// Cost descriptor charged per bought unit.
    #[serde(default)]
    pub buy_cost: String,
    /// Cost descriptor applied per sold unit, usually a grant.
    #[serde(default)]
    pub sell_value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionShape {
    #[default]
    Set,
    Counter,
    Slots,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDef {
    pub id: String,
    #[serde(default)]
    pub shape: SelectionShape,
    /// Picks available before sigil benefits. `None` leaves the category
    /// unlimited unless some sigil node grants picks in it.
    #[serde(default)]
    pub base_quota: Option<u32>,
    #[serde(default)]
    pub blessing: Option<String>,
    /// Trigger item that exposes this category as a sub-collection.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub boost: Option<BoostDef>,
    #[serde(default)]
    pub slots: Vec<SlotDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostDef {
    pub pool: PoolKey,
    #[serde(default = "default_boost_bonus")]
    pub bonus: u32,
}

fn default_boost_bonus() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDef {
    pub id: String,
    pub bundle_kind: String,
    #[serde(default)]
    pub constraints: BuildConstraints,
}

/// Requirements a stored bundle must meet to be chosen in a referencing context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConstraints {
    #[serde(default)]
    pub point_ceiling: Option<i64>,
    #[serde(default)]
    pub required_type: Option<String>,
    #[serde(default)]
    pub required_perks: Vec<String>,
    #[serde(default)]
    pub excluded_perks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceItem {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub excludes: Option<String>,
    #[serde(default)]
    pub grants: Vec<PoolAmount>,
    #[serde(default)]
    pub counter: Option<CounterSpec>,
}

impl ChoiceItem {
    /// Count a counter item sits at when the selection holds no entry for it.
    pub fn default_count(&self) -> u32 {
        match self.counter.map(|spec| spec.rule) {
            Some(CounterRule::Baseline { baseline }) => baseline,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAmount {
    pub pool: PoolKey,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigilTree {
    pub id: String,
    #[serde(default)]
    pub blessing: Option<String>,
    pub nodes: Vec<SigilNode>,
}

impl SigilTree {
    pub fn node(&self, node_id: &str) -> Option<&SigilNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigilNode {
    pub id: String,
    /// Sigil kind whose pool pays for this node.
    pub kind: String,
    #[serde(default = "default_units")]
    pub units: i64,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<Benefit>,
}

fn default_units() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Benefit {
    pub category: String,
    pub picks: u32,
}

/// A family of named sub-builds saved independently of the live build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleKind {
    pub id: String,
    pub categories: Vec<String>,
    #[serde(default)]
    pub trees: Vec<String>,
    /// Category whose pick names the bundle's type.
    #[serde(default)]
    pub type_category: Option<String>,
    #[serde(default)]
    pub creation_cost: Option<PoolAmount>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Validation(String),
}

pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Catalog::from_json_str(&raw)
}

impl Catalog {
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn category(&self, id: &str) -> Option<&CategoryDef> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&ChoiceItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn item_in(&self, category: &str, id: &str) -> Option<&ChoiceItem> {
        self.item(id).filter(|item| item.category == category)
    }

    pub fn items_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ChoiceItem> + 'a {
        self.items.iter().filter(move |item| item.category == category)
    }

    pub fn tree(&self, id: &str) -> Option<&SigilTree> {
        self.trees.iter().find(|tree| tree.id == id)
    }

    pub fn sigil_kind(&self, id: &str) -> Option<&SigilKindDef> {
        self.sigil_kinds.iter().find(|kind| kind.id == id)
    }

    pub fn bundle_kind(&self, id: &str) -> Option<&BundleKind> {
        self.bundle_kinds.iter().find(|kind| kind.id == id)
    }

    /// Categories exposed by picking `trigger`.
    pub fn sub_collections<'a>(&'a self, trigger: &'a str) -> impl Iterator<Item = &'a CategoryDef> + 'a {
        self.categories
            .iter()
            .filter(move |category| category.parent.as_deref() == Some(trigger))
    }

    /// True when some sigil node grants picks in the category.
    pub fn is_benefit_target(&self, category: &str) -> bool {
        self.trees.iter().any(|tree| {
            tree.nodes
                .iter()
                .any(|node| node.benefits.iter().any(|b| b.category == category))
        })
    }

    /// Every pool the ledger tracks: both currencies plus one per sigil kind.
    pub fn pools(&self) -> Vec<PoolKey> {
        let mut pools = vec![PoolKey::BLESSING, PoolKey::FAVOR];
        pools.extend(self.sigil_kinds.iter().map(|kind| PoolKey::sigil(&kind.id)));
        pools
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.schema_version != CATALOG_SCHEMA_VERSION {
            return Err(invalid(format!(
                "catalog schema {} unsupported (expected {})",
                self.schema_version, CATALOG_SCHEMA_VERSION
            )));
        }

        let sigil_kinds = unique_ids("sigil kind", self.sigil_kinds.iter().map(|k| &k.id))?;
        let categories = unique_ids("category", self.categories.iter().map(|c| &c.id))?;
        let items = unique_ids("item", self.items.iter().map(|i| &i.id))?;
        let bundle_kinds = unique_ids("bundle kind", self.bundle_kinds.iter().map(|k| &k.id))?;
        unique_ids("tree", self.trees.iter().map(|t| &t.id))?;

        let check_pool = |pool: &PoolKey, context: &str| match pool {
            PoolKey::Sigil(kind) if !sigil_kinds.contains(kind.as_str()) => Err(invalid(format!(
                "{} references unknown sigil kind {}",
                context, kind
            ))),
            _ => Ok(()),
        };

        for pool in self.settings.starting.keys() {
            check_pool(pool, "settings.starting")?;
        }

        for category in &self.categories {
            if let Some(parent) = &category.parent {
                if !items.contains(parent.as_str()) {
                    return Err(invalid(format!(
                        "category {} has unknown trigger item {}",
                        category.id, parent
                    )));
                }
            }
            if let Some(boost) = &category.boost {
                check_pool(&boost.pool, &format!("boost of {}", category.id))?;
            }
            if category.shape != SelectionShape::Slots && !category.slots.is_empty() {
                return Err(invalid(format!(
                    "category {} declares slots but is not slot-shaped",
                    category.id
                )));
            }
            unique_ids("slot", category.slots.iter().map(|s| &s.id))?;
            for slot in &category.slots {
                if !bundle_kinds.contains(slot.bundle_kind.as_str()) {
                    return Err(invalid(format!(
                        "slot {}.{} references unknown bundle kind {}",
                        category.id, slot.id, slot.bundle_kind
                    )));
                }
            }
        }

        let mut node_ids = HashSet::new();
        for tree in &self.trees {
            let ids = unique_ids("sigil node", tree.nodes.iter().map(|n| &n.id))?;
            for node in &tree.nodes {
                if !sigil_kinds.contains(node.kind.as_str()) {
                    return Err(invalid(format!(
                        "node {}.{} uses unknown sigil kind {}",
                        tree.id, node.id, node.kind
                    )));
                }
                if node.units < 0 {
                    return Err(invalid(format!("node {}.{} has negative units", tree.id, node.id)));
                }
                for prerequisite in &node.prerequisites {
                    if !ids.contains(prerequisite.as_str()) {
                        return Err(invalid(format!(
                            "node {}.{} has unknown prerequisite {}",
                            tree.id, node.id, prerequisite
                        )));
                    }
                }
                for benefit in &node.benefits {
                    if !categories.contains(benefit.category.as_str()) {
                        return Err(invalid(format!(
                            "node {}.{} benefits unknown category {}",
                            tree.id, node.id, benefit.category
                        )));
                    }
                }
                node_ids.insert(node.id.as_str());
            }
            check_acyclic(tree)?;
        }

        for item in &self.items {
            let Some(category) = self.category(&item.category) else {
                return Err(invalid(format!(
                    "item {} references unknown category {}",
                    item.id, item.category
                )));
            };
            match (category.shape, item.counter.is_some()) {
                (SelectionShape::Slots, _) => {
                    return Err(invalid(format!(
                        "item {} cannot live in slot category {}",
                        item.id, category.id
                    )))
                }
                (SelectionShape::Set, true) => {
                    return Err(invalid(format!(
                        "item {} has a counter rule in set category {}",
                        item.id, category.id
                    )))
                }
                _ => {}
            }
            if let Some(partner) = &item.excludes {
                if !items.contains(partner.as_str()) {
                    return Err(invalid(format!(
                        "item {} excludes unknown item {}",
                        item.id, partner
                    )));
                }
            }
            for requirement in &item.requires {
                if !items.contains(requirement.as_str()) && !node_ids.contains(requirement.as_str())
                {
                    return Err(invalid(format!(
                        "item {} requires unknown id {}",
                        item.id, requirement
                    )));
                }
            }
            for grant in &item.grants {
                check_pool(&grant.pool, &format!("grant of {}", item.id))?;
            }
            if let Err(err) = parse_cost(&item.cost) {
                warn!(item = %item.id, %err, "cost descriptor will count as zero");
            }
        }

        for kind in &self.sigil_kinds {
            for descriptor in [&kind.buy_cost, &kind.sell_value] {
                if let Err(err) = parse_cost(descriptor) {
                    warn!(sigil = %kind.id, %err, "trade descriptor will count as zero");
                }
            }
        }

        let mut cost_gated = 0;
        for kind in &self.bundle_kinds {
            for category in &kind.categories {
                if !categories.contains(category.as_str()) {
                    return Err(invalid(format!(
                        "bundle kind {} covers unknown category {}",
                        kind.id, category
                    )));
                }
            }
            for tree in &kind.trees {
                if self.tree(tree).is_none() {
                    return Err(invalid(format!(
                        "bundle kind {} covers unknown tree {}",
                        kind.id, tree
                    )));
                }
            }
            if let Some(type_category) = &kind.type_category {
                if !kind.categories.contains(type_category) {
                    return Err(invalid(format!(
                        "bundle kind {} types by uncovered category {}",
                        kind.id, type_category
                    )));
                }
            }
            if let Some(cost) = &kind.creation_cost {
                check_pool(&cost.pool, &format!("creation cost of {}", kind.id))?;
                cost_gated += 1;
            }
        }
        if cost_gated > 1 {
            return Err(invalid(
                "at most one bundle kind may carry a creation cost".to_string(),
            ));
        }

        Ok(())
    }
}

fn invalid(message: String) -> CatalogError {
    CatalogError::Validation(message)
}

fn unique_ids<'a>(
    label: &str,
    ids: impl Iterator<Item = &'a String>,
) -> Result<HashSet<&'a str>, CatalogError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(invalid(format!("{} id cannot be empty", label)));
        }
        if !seen.insert(id.as_str()) {
            return Err(invalid(format!("duplicate {} id {}", label, id)));
        }
    }
    Ok(seen)
}

fn check_acyclic(tree: &SigilTree) -> Result<(), CatalogError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        tree: &'a SigilTree,
        node_id: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), CatalogError> {
        match marks.get(node_id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(invalid(format!(
                    "prerequisite cycle in tree {} through {}",
                    tree.id, node_id
                )))
            }
            None => {}
        }
        marks.insert(node_id, Mark::Visiting);
        if let Some(node) = tree.node(node_id) {
            for prerequisite in &node.prerequisites {
                visit(tree, prerequisite, marks)?;
            }
        }
        marks.insert(node_id, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for node in &tree.nodes {
        visit(tree, &node.id, &mut marks)?;
    }
    Ok(())
}
