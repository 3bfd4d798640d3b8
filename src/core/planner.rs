use std::collections::{BTreeMap, BTreeSet};

use bevy_ecs::prelude::*;
use bevy_ecs::system::{SystemParam, SystemState};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::content::catalog::{BuildConstraints, BundleKind, Catalog, PoolAmount, SelectionShape};
use crate::core::ecs::{create_schedule, create_world};
use crate::core::serialization::{
    apply_bundle, build_type, bundle_points, capture_bundle, decode_bundle, encode_bundle, perks,
    BundleData,
};
use crate::persistence::repository::{BuildRepository, SavedBuilds, StoreError};
use crate::rules::cost::{Currency, PoolKey};
use crate::rules::counter::counter_value;
use crate::rules::error::SelectionError;
use crate::rules::quota::{self, CountChange, PickContext, PickOutcome};
use crate::rules::sigil::{self, NodeStatus, SigilToggle};
use crate::state::selection::{BundleCharges, Boosts, CategorySelection, SigilSelections, SigilTrades, Selections};
use crate::state::snapshot::Snapshot;

/// One user action against the live build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerAction {
    Pick { category: String, item: String },
    SetCount { category: String, item: String, count: u32 },
    ToggleSigil { tree: String, node: String },
    PruneDormant,
    BuySigil { kind: String },
    SellSigil { kind: String },
    ToggleBoost { category: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Pick(PickOutcome),
    Count(CountChange),
    Sigil(SigilToggle),
    /// Dormant nodes released per tree.
    Pruned(BTreeMap<String, BTreeSet<String>>),
    Traded { kind: String, net: i64 },
    Boost { category: String, active: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Overwritten,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub refunded: Option<PoolAmount>,
    /// `(category, slot)` pairs that referenced the deleted build.
    pub cleared_slots: Vec<(String, String)>,
}

/// Point figures and filter keys of one stored build, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Net Blessing cost.
    pub points: i64,
    pub favor: i64,
    pub build_type: Option<String>,
    pub perks: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFilter {
    pub build_type: Option<String>,
    pub excluded_perks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incompatibility {
    #[error("costs {points} points, over the ceiling of {ceiling}")]
    OverCeiling { points: i64, ceiling: i64 },
    #[error("needs type {required}")]
    WrongType { required: String },
    #[error("lacks required perk {0}")]
    MissingPerk(String),
    #[error("has excluded perk {0}")]
    ExcludedPerk(String),
    #[error("cannot be read: {0}")]
    Corrupt(String),
}

/// A stored build as seen from a referencing context. Incompatible builds stay
/// listed with the reason they cannot be chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibleBuild {
    pub name: String,
    pub summary: Option<BuildSummary>,
    pub incompatibility: Option<Incompatibility>,
}

impl CompatibleBuild {
    pub fn is_selectable(&self) -> bool {
        self.incompatibility.is_none()
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unknown bundle kind {0}")]
    UnknownKind(String),
    #[error("build name cannot be empty")]
    InvalidName,
    #[error("no saved {kind} build named {name}")]
    NotFound { kind: String, name: String },
    #[error("a {kind} build named {name} already exists; confirm to overwrite")]
    NameTaken { kind: String, name: String },
    #[error("creating a {kind} build costs {required} {pool}, {available} available")]
    InsufficientFunds {
        kind: String,
        pool: PoolKey,
        required: i64,
        available: i64,
    },
    #[error("saved {kind} build {name} is corrupt: {reason}")]
    Corrupt {
        kind: String,
        name: String,
        reason: String,
    },
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Mutable view over the live build used by accepted actions.
#[derive(SystemParam)]
struct BuildEdit<'w> {
    catalog: Res<'w, Catalog>,
    snapshot: Res<'w, Snapshot>,
    selections: ResMut<'w, Selections>,
    sigils: ResMut<'w, SigilSelections>,
    boosts: ResMut<'w, Boosts>,
    trades: ResMut<'w, SigilTrades>,
}

impl BuildEdit<'_> {
    fn pick_context(&self) -> PickContext<'_> {
        PickContext {
            catalog: &self.catalog,
            selections: &self.selections,
            snapshot: &self.snapshot,
        }
    }
}

/// Wrapper around the build world, its settle schedule and the sub-build store.
///
/// Every accepted action mutates live state and then runs exactly one settle
/// pass, so legality checks always read a snapshot that reflects every
/// earlier action.
pub struct Planner {
    world: World,
    schedule: Schedule,
    store: Box<dyn BuildRepository>,
}

impl Planner {
    pub fn new(catalog: Catalog, store: Box<dyn BuildRepository>) -> Result<Self, StoreError> {
        let mut planner = Self {
            world: create_world(catalog),
            schedule: create_schedule(),
            store,
        };
        let document = planner.store.load_document()?;
        planner.sync_charges(&document);
        planner.settle();
        Ok(planner)
    }

    pub fn catalog(&self) -> &Catalog {
        self.world.resource::<Catalog>()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.world.resource::<Snapshot>()
    }

    pub fn selections(&self) -> &Selections {
        self.world.resource::<Selections>()
    }

    pub fn sigils(&self) -> &SigilSelections {
        self.world.resource::<SigilSelections>()
    }

    pub fn boosts(&self) -> &Boosts {
        self.world.resource::<Boosts>()
    }

    fn settle(&mut self) {
        self.schedule.run(&mut self.world);
    }

    fn edit<R>(&mut self, edit: impl FnOnce(&mut BuildEdit) -> R) -> R {
        let mut state = SystemState::<BuildEdit>::new(&mut self.world);
        let mut params = state.get_mut(&mut self.world);
        let result = edit(&mut params);
        state.apply(&mut self.world);
        result
    }

    /// Settle after an accepted action; rejected ones leave state untouched.
    fn accept<T>(&mut self, action: &str, result: Result<T, SelectionError>) -> Result<T, SelectionError> {
        match &result {
            Ok(_) => {
                self.settle();
                debug!(action, generation = self.snapshot().generation, "action accepted");
            }
            Err(err) => debug!(action, %err, "action rejected"),
        }
        result
    }

    pub fn apply(&mut self, action: PlannerAction) -> Result<ActionOutcome, SelectionError> {
        match action {
            PlannerAction::Pick { category, item } => self.pick(&category, &item).map(ActionOutcome::Pick),
            PlannerAction::SetCount {
                category,
                item,
                count,
            } => self.set_count(&category, &item, count).map(ActionOutcome::Count),
            PlannerAction::ToggleSigil { tree, node } => {
                self.toggle_sigil(&tree, &node).map(ActionOutcome::Sigil)
            }
            PlannerAction::PruneDormant => Ok(ActionOutcome::Pruned(self.prune_dormant())),
            PlannerAction::BuySigil { kind } => {
                let net = self.buy_sigil(&kind)?;
                Ok(ActionOutcome::Traded { kind, net })
            }
            PlannerAction::SellSigil { kind } => {
                let net = self.sell_sigil(&kind)?;
                Ok(ActionOutcome::Traded { kind, net })
            }
            PlannerAction::ToggleBoost { category } => {
                let active = self.toggle_boost(&category)?;
                Ok(ActionOutcome::Boost { category, active })
            }
        }
    }

    pub fn can_pick(&self, category: &str, item: &str) -> Result<(), SelectionError> {
        let ctx = PickContext {
            catalog: self.catalog(),
            selections: self.selections(),
            snapshot: self.snapshot(),
        };
        quota::can_pick(&ctx, category, item)
    }

    pub fn pick(&mut self, category: &str, item: &str) -> Result<PickOutcome, SelectionError> {
        let result: Result<PickOutcome, SelectionError> = self.edit(|edit| {
            quota::can_pick(&edit.pick_context(), category, item)?;
            Ok(quota::apply_pick(&edit.catalog, &mut edit.selections, category, item))
        });
        self.accept("pick", result)
    }

    pub fn set_count(
        &mut self,
        category: &str,
        item: &str,
        count: u32,
    ) -> Result<CountChange, SelectionError> {
        let result: Result<CountChange, SelectionError> = self.edit(|edit| {
            let previous = quota::can_set_count(&edit.pick_context(), category, item, count)?;
            Ok(quota::apply_count(
                &edit.catalog,
                &mut edit.selections,
                category,
                item,
                count,
                previous,
            ))
        });
        self.accept("count", result)
    }

    /// Current count of a counter item, its default when never touched.
    pub fn count_of(&self, category: &str, item: &str) -> u32 {
        let default = self.catalog().item(item).map_or(0, |item| item.default_count());
        self.selections()
            .get(category)
            .and_then(|selection| selection.stored_count(item))
            .unwrap_or(default)
    }

    /// Effective value of a counter item at its current count.
    pub fn counter_value(&self, category: &str, item: &str) -> Result<Option<i64>, SelectionError> {
        let def = self
            .catalog()
            .item_in(category, item)
            .ok_or_else(|| SelectionError::UnknownItem {
                category: category.to_string(),
                item: item.to_string(),
            })?;
        let count = self.count_of(category, item);
        Ok(def
            .counter
            .and_then(|spec| spec.value)
            .map(|value| counter_value(&value, count)))
    }

    fn sigil_inputs(&self, tree_id: &str, node_id: &str) -> Result<(i64, BTreeSet<String>), SelectionError> {
        let tree = self
            .catalog()
            .tree(tree_id)
            .ok_or_else(|| SelectionError::UnknownTree(tree_id.to_string()))?;
        let node = tree.node(node_id).ok_or_else(|| SelectionError::UnknownNode {
            tree: tree_id.to_string(),
            node: node_id.to_string(),
        })?;
        let available = self.snapshot().available(&PoolKey::sigil(&node.kind));
        let active = self
            .snapshot()
            .active_nodes
            .get(tree_id)
            .cloned()
            .unwrap_or_default();
        Ok((available, active))
    }

    pub fn can_select_sigil(&self, tree_id: &str, node_id: &str) -> Result<(), SelectionError> {
        let (available, active) = self.sigil_inputs(tree_id, node_id)?;
        let selected = self.sigils().nodes(tree_id).cloned().unwrap_or_default();
        let tree = self
            .catalog()
            .tree(tree_id)
            .ok_or_else(|| SelectionError::UnknownTree(tree_id.to_string()))?;
        sigil::can_select(tree, node_id, &selected, &active, available)
    }

    pub fn node_status(&self, tree_id: &str, node_id: &str) -> Result<NodeStatus, SelectionError> {
        let (available, active) = self.sigil_inputs(tree_id, node_id)?;
        let selected = self.sigils().nodes(tree_id).cloned().unwrap_or_default();
        let tree = self
            .catalog()
            .tree(tree_id)
            .ok_or_else(|| SelectionError::UnknownTree(tree_id.to_string()))?;
        sigil::node_status(tree, node_id, &selected, &active, available)
    }

    pub fn toggle_sigil(&mut self, tree_id: &str, node_id: &str) -> Result<SigilToggle, SelectionError> {
        let result = self.sigil_inputs(tree_id, node_id).and_then(|(available, active)| {
            self.edit(|edit| -> Result<SigilToggle, SelectionError> {
                let tree = edit
                    .catalog
                    .tree(tree_id)
                    .ok_or_else(|| SelectionError::UnknownTree(tree_id.to_string()))?;
                let mut selected = edit.sigils.nodes(tree_id).cloned().unwrap_or_default();
                let outcome = sigil::toggle(tree, node_id, &mut selected, &active, available)?;
                edit.sigils.replace(tree_id, selected);
                Ok(outcome)
            })
        });
        self.accept("sigil", result)
    }

    /// Release every dormant node and the units it holds.
    pub fn prune_dormant(&mut self) -> BTreeMap<String, BTreeSet<String>> {
        let dormant = self.snapshot().dormant_nodes.clone();
        let result: Result<_, SelectionError> = self.edit(|edit| {
            for (tree_id, nodes) in &dormant {
                let kept = edit
                    .sigils
                    .nodes(tree_id)
                    .map(|selected| selected.difference(nodes).cloned().collect())
                    .unwrap_or_default();
                edit.sigils.replace(tree_id, kept);
            }
            Ok(dormant)
        });
        self.accept("prune", result).unwrap_or_default()
    }

    /// Buying is never blocked; a currency shortfall shows up as overspend.
    pub fn buy_sigil(&mut self, kind: &str) -> Result<i64, SelectionError> {
        let result: Result<i64, SelectionError> = self.edit(|edit| {
            if edit.catalog.sigil_kind(kind).is_none() {
                return Err(SelectionError::UnknownSigilKind(kind.to_string()));
            }
            Ok(adjust_trade(&mut edit.trades, kind, 1))
        });
        self.accept("buy", result)
    }

    pub fn sell_sigil(&mut self, kind: &str) -> Result<i64, SelectionError> {
        let result: Result<i64, SelectionError> = self.edit(|edit| {
            if edit.catalog.sigil_kind(kind).is_none() {
                return Err(SelectionError::UnknownSigilKind(kind.to_string()));
            }
            let pool = PoolKey::sigil(kind);
            let available = edit.snapshot.available(&pool);
            if available < 1 {
                return Err(SelectionError::InsufficientPool {
                    pool,
                    required: 1,
                    available,
                });
            }
            Ok(adjust_trade(&mut edit.trades, kind, -1))
        });
        self.accept("sell", result)
    }

    /// Returns whether the boost is on afterwards.
    pub fn toggle_boost(&mut self, category: &str) -> Result<bool, SelectionError> {
        let result: Result<bool, SelectionError> = self.edit(|edit| {
            quota::can_toggle_boost(&edit.catalog, category, &edit.boosts, &edit.selections, &edit.snapshot)?;
            if edit.boosts.0.remove(category) {
                Ok(false)
            } else {
                edit.boosts.0.insert(category.to_string());
                Ok(true)
            }
        });
        self.accept("boost", result)
    }

    fn bundle_kind(&self, kind: &str) -> Result<BundleKind, BuildError> {
        self.catalog()
            .bundle_kind(kind)
            .cloned()
            .ok_or_else(|| BuildError::UnknownKind(kind.to_string()))
    }

    fn sync_charges(&mut self, document: &SavedBuilds) {
        let charges = self
            .catalog()
            .bundle_kinds
            .iter()
            .filter(|kind| kind.creation_cost.is_some())
            .map(|kind| (kind.id.clone(), document.count(&kind.id) as u32))
            .collect();
        self.world.resource_mut::<BundleCharges>().0 = charges;
    }

    fn read_build(&self, document: &SavedBuilds, kind: &BundleKind, name: &str) -> Result<BundleData, BuildError> {
        let stored = document.get(&kind.id, name).ok_or_else(|| BuildError::NotFound {
            kind: kind.id.clone(),
            name: name.to_string(),
        })?;
        decode_bundle(stored, kind, self.catalog()).map_err(|err| {
            warn!(kind = %kind.id, name, %err, "saved build is corrupt");
            BuildError::Corrupt {
                kind: kind.id.clone(),
                name: name.to_string(),
                reason: err.to_string(),
            }
        })
    }

    fn summarize(&self, kind: &BundleKind, data: &BundleData) -> BuildSummary {
        let cost = bundle_points(self.catalog(), data);
        BuildSummary {
            points: cost.get(Currency::Blessing),
            favor: cost.get(Currency::Favor),
            build_type: build_type(kind, data),
            perks: perks(kind, data),
        }
    }

    /// Save the live selections the kind covers under `name`. A cost-gated kind
    /// charges its creation cost for new names only.
    pub fn save_build(&mut self, kind: &str, name: &str, confirm_overwrite: bool) -> Result<SaveOutcome, BuildError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BuildError::InvalidName);
        }
        let kind = self.bundle_kind(kind)?;
        let mut document = self.store.load_document()?;
        let exists = document.contains(&kind.id, name);
        if exists && !confirm_overwrite {
            return Err(BuildError::NameTaken {
                kind: kind.id.clone(),
                name: name.to_string(),
            });
        }
        if let Some(cost) = kind.creation_cost.as_ref().filter(|_| !exists) {
            let available = self.snapshot().available(&cost.pool);
            if available < cost.amount {
                return Err(BuildError::InsufficientFunds {
                    kind: kind.id.clone(),
                    pool: cost.pool.clone(),
                    required: cost.amount,
                    available,
                });
            }
        }

        let data = capture_bundle(&kind, self.selections(), self.sigils(), self.boosts());
        let stored = encode_bundle(&data).map_err(StoreError::from)?;
        document.insert(&kind.id, name, stored);
        self.store.store_document(&document)?;
        self.sync_charges(&document);
        self.settle();

        info!(kind = %kind.id, name, overwrite = exists, "build saved");
        Ok(if exists {
            SaveOutcome::Overwritten
        } else {
            SaveOutcome::Created
        })
    }

    /// Replace the live selections the kind covers with a stored build.
    /// A corrupt build leaves everything untouched.
    pub fn load_build(&mut self, kind: &str, name: &str) -> Result<(), BuildError> {
        let kind = self.bundle_kind(kind)?;
        let document = self.store.load_document()?;
        let data = self.read_build(&document, &kind, name)?;
        self.edit(|edit| {
            apply_bundle(
                &edit.catalog,
                &kind,
                &data,
                &mut edit.selections,
                &mut edit.sigils,
                &mut edit.boosts,
            )
        });
        self.settle();
        info!(kind = %kind.id, name, "build loaded");
        Ok(())
    }

    /// Remove a stored build, refund its creation cost and clear every slot
    /// that referenced it.
    pub fn delete_build(&mut self, kind: &str, name: &str) -> Result<DeleteOutcome, BuildError> {
        let kind = self.bundle_kind(kind)?;
        let mut document = self.store.load_document()?;
        if document.remove(&kind.id, name).is_none() {
            return Err(BuildError::NotFound {
                kind: kind.id.clone(),
                name: name.to_string(),
            });
        }
        self.store.store_document(&document)?;
        self.sync_charges(&document);

        let referencing: Vec<(String, String)> = self
            .catalog()
            .categories
            .iter()
            .flat_map(|category| {
                category
                    .slots
                    .iter()
                    .filter(|slot| slot.bundle_kind == kind.id)
                    .map(move |slot| (category.id.clone(), slot.id.clone()))
            })
            .collect();
        let mut selections = self.world.resource_mut::<Selections>();
        let mut cleared_slots = Vec::new();
        for (category, slot) in referencing {
            if let Some(CategorySelection::Slots(slots)) = selections.get_mut(&category) {
                if slots.get(&slot).map(String::as_str) == Some(name) {
                    slots.remove(&slot);
                    cleared_slots.push((category, slot));
                }
            }
        }
        self.settle();

        info!(kind = %kind.id, name, "build deleted");
        Ok(DeleteOutcome {
            refunded: kind.creation_cost.clone(),
            cleared_slots,
        })
    }

    /// Stored builds of a kind with freshly recomputed points. Corrupt entries
    /// are skipped.
    pub fn list_builds(&self, kind: &str, filter: &BuildFilter) -> Result<BTreeMap<String, BuildSummary>, BuildError> {
        let kind = self.bundle_kind(kind)?;
        let document = self.store.load_document()?;
        let mut builds = BTreeMap::new();
        for (name, _) in document.builds(&kind.id) {
            let Ok(data) = self.read_build(&document, &kind, name) else {
                continue;
            };
            let summary = self.summarize(&kind, &data);
            let type_ok = filter
                .build_type
                .as_ref()
                .map_or(true, |wanted| summary.build_type.as_ref() == Some(wanted));
            let perks_ok = !filter
                .excluded_perks
                .iter()
                .any(|perk| summary.perks.contains(perk));
            if type_ok && perks_ok {
                builds.insert(name.clone(), summary);
            }
        }
        Ok(builds)
    }

    /// Every stored build of a kind, each marked with why it cannot satisfy
    /// `constraints` when it cannot.
    pub fn list_compatible_builds(
        &self,
        kind: &str,
        constraints: &BuildConstraints,
    ) -> Result<Vec<CompatibleBuild>, BuildError> {
        let kind = self.bundle_kind(kind)?;
        let document = self.store.load_document()?;
        let builds = document
            .builds(&kind.id)
            .map(|(name, _)| match self.read_build(&document, &kind, name) {
                Ok(data) => {
                    let summary = self.summarize(&kind, &data);
                    CompatibleBuild {
                        name: name.clone(),
                        incompatibility: check_constraints(&summary, constraints),
                        summary: Some(summary),
                    }
                }
                Err(err) => CompatibleBuild {
                    name: name.clone(),
                    summary: None,
                    incompatibility: Some(Incompatibility::Corrupt(err.to_string())),
                },
            })
            .collect();
        Ok(builds)
    }

    /// Point a slot at a stored build, or clear it with `None`.
    pub fn assign_slot(&mut self, category: &str, slot: &str, build: Option<&str>) -> Result<(), BuildError> {
        let def = self
            .catalog()
            .category(category)
            .ok_or_else(|| SelectionError::UnknownCategory(category.to_string()))?;
        if def.shape != SelectionShape::Slots {
            return Err(SelectionError::WrongShape {
                category: category.to_string(),
                expected: SelectionShape::Slots,
                actual: def.shape,
            }
            .into());
        }
        let slot_def = def
            .slots
            .iter()
            .find(|s| s.id == slot)
            .cloned()
            .ok_or_else(|| SelectionError::UnknownSlot {
                category: category.to_string(),
                slot: slot.to_string(),
            })?;

        if let Some(name) = build {
            let kind = self.bundle_kind(&slot_def.bundle_kind)?;
            let document = self.store.load_document()?;
            if !document.contains(&kind.id, name) {
                return Err(SelectionError::UnknownBuild {
                    kind: kind.id.clone(),
                    name: name.to_string(),
                }
                .into());
            }
            let data = self.read_build(&document, &kind, name)?;
            let summary = self.summarize(&kind, &data);
            if let Some(reason) = check_constraints(&summary, &slot_def.constraints) {
                return Err(SelectionError::IncompatibleBuild {
                    slot: slot.to_string(),
                    name: name.to_string(),
                    reason: reason.to_string(),
                }
                .into());
            }
        }

        if let Some(CategorySelection::Slots(slots)) =
            self.world.resource_mut::<Selections>().get_mut(category)
        {
            match build {
                Some(name) => {
                    slots.insert(slot.to_string(), name.to_string());
                }
                None => {
                    slots.remove(slot);
                }
            }
        }
        self.settle();
        debug!(category, slot, build, "slot assigned");
        Ok(())
    }
}

fn adjust_trade(trades: &mut SigilTrades, kind: &str, delta: i64) -> i64 {
    let net = trades.0.get(kind).copied().unwrap_or(0) + delta;
    if net == 0 {
        trades.0.remove(kind);
    } else {
        trades.0.insert(kind.to_string(), net);
    }
    net
}

/// First reason a build summary fails the constraints, if any.
pub fn check_constraints(summary: &BuildSummary, constraints: &BuildConstraints) -> Option<Incompatibility> {
    if let Some(ceiling) = constraints.point_ceiling {
        if summary.points > ceiling {
            return Some(Incompatibility::OverCeiling {
                points: summary.points,
                ceiling,
            });
        }
    }
    if let Some(required) = &constraints.required_type {
        if summary.build_type.as_ref() != Some(required) {
            return Some(Incompatibility::WrongType {
                required: required.clone(),
            });
        }
    }
    if let Some(perk) = constraints
        .required_perks
        .iter()
        .find(|perk| !summary.perks.contains(*perk))
    {
        return Some(Incompatibility::MissingPerk(perk.clone()));
    }
    constraints
        .excluded_perks
        .iter()
        .find(|perk| summary.perks.contains(*perk))
        .map(|perk| Incompatibility::ExcludedPerk(perk.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(points: i64, build_type: &str, perks: &[&str]) -> BuildSummary {
        BuildSummary {
            points,
            favor: 0,
            build_type: Some(build_type.to_string()),
            perks: perks.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn constraints_report_the_first_failure() {
        let constraints = BuildConstraints {
            point_ceiling: Some(10),
            required_type: Some("familiar".to_string()),
            required_perks: vec!["loyal".to_string()],
            excluded_perks: vec!["strong".to_string()],
        };
        assert_eq!(
            check_constraints(&summary(12, "familiar", &["loyal"]), &constraints),
            Some(Incompatibility::OverCeiling {
                points: 12,
                ceiling: 10
            })
        );
        assert_eq!(
            check_constraints(&summary(5, "human", &["loyal"]), &constraints),
            Some(Incompatibility::WrongType {
                required: "familiar".to_string()
            })
        );
        assert_eq!(
            check_constraints(&summary(5, "familiar", &["clever"]), &constraints),
            Some(Incompatibility::MissingPerk("loyal".to_string()))
        );
        assert_eq!(
            check_constraints(&summary(5, "familiar", &["loyal", "strong"]), &constraints),
            Some(Incompatibility::ExcludedPerk("strong".to_string()))
        );
        assert_eq!(check_constraints(&summary(5, "familiar", &["loyal"]), &constraints), None);
    }

    #[test]
    fn trades_net_to_zero_and_vanish() {
        let mut trades = SigilTrades::default();
        assert_eq!(adjust_trade(&mut trades, "kisin", 1), 1);
        assert_eq!(adjust_trade(&mut trades, "kisin", -1), 0);
        assert!(trades.0.is_empty());
        assert_eq!(adjust_trade(&mut trades, "lillu", -1), -1);
    }
}
