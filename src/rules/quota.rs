use std::collections::{BTreeMap, BTreeSet};

use crate::content::catalog::{Catalog, CategoryDef, ChoiceItem, SelectionShape};
use crate::rules::error::SelectionError;
use crate::rules::sigil;
use crate::state::selection::{Boosts, CategorySelection, Selections};
use crate::state::snapshot::{QuotaBalance, Snapshot};

/// Read-only view a pick is judged against: live picks plus the last
/// published snapshot for quotas and active sigils.
#[derive(Debug, Clone, Copy)]
pub struct PickContext<'a> {
    pub catalog: &'a Catalog,
    pub selections: &'a Selections,
    pub snapshot: &'a Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Picked,
    /// Carries the sub-collection categories cleared by the removal.
    Unpicked { cleared: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountChange {
    pub previous: u32,
    pub count: u32,
    pub cleared: Vec<String>,
}

/// Base quota plus picks granted by active nodes plus an active boost bonus.
/// `None` for categories nothing limits.
pub fn category_quota(
    catalog: &Catalog,
    category: &CategoryDef,
    active: &BTreeMap<String, BTreeSet<String>>,
    boosts: &Boosts,
) -> Option<u32> {
    let granted: u32 = catalog
        .trees
        .iter()
        .filter_map(|tree| {
            let nodes = active.get(&tree.id)?;
            sigil::benefits(tree, nodes).get(&category.id).copied()
        })
        .sum();
    let boosted = category
        .boost
        .as_ref()
        .filter(|_| boosts.0.contains(&category.id))
        .map_or(0, |boost| boost.bonus);

    match category.base_quota {
        Some(base) => Some(base + granted + boosted),
        None if catalog.is_benefit_target(&category.id) => Some(granted + boosted),
        None => None,
    }
}

pub fn quota_balances(
    catalog: &Catalog,
    selections: &Selections,
    active: &BTreeMap<String, BTreeSet<String>>,
    boosts: &Boosts,
) -> BTreeMap<String, QuotaBalance> {
    catalog
        .categories
        .iter()
        .map(|category| {
            let used = selections.get(&category.id).map_or(0, CategorySelection::used);
            let quota = category_quota(catalog, category, active, boosts);
            (category.id.clone(), QuotaBalance { quota, used })
        })
        .collect()
}

fn lookup<'a>(
    catalog: &'a Catalog,
    category_id: &str,
    item_id: &str,
    shape: SelectionShape,
) -> Result<(&'a CategoryDef, &'a ChoiceItem), SelectionError> {
    let category = catalog
        .category(category_id)
        .ok_or_else(|| SelectionError::UnknownCategory(category_id.to_string()))?;
    if category.shape != shape {
        return Err(SelectionError::WrongShape {
            category: category_id.to_string(),
            expected: shape,
            actual: category.shape,
        });
    }
    let item = catalog
        .item_in(category_id, item_id)
        .ok_or_else(|| SelectionError::UnknownItem {
            category: category_id.to_string(),
            item: item_id.to_string(),
        })?;
    Ok((category, item))
}

/// Removal is always allowed; adding needs a free quota slot, an active
/// trigger, no excluded partner, and every requirement met.
pub fn can_pick(ctx: &PickContext, category_id: &str, item_id: &str) -> Result<(), SelectionError> {
    let (category, item) = lookup(ctx.catalog, category_id, item_id, SelectionShape::Set)?;
    if ctx.selections.is_picked(category_id, item_id) {
        return Ok(());
    }
    check_addition(ctx, category, item)
}

/// Validates a counter change and returns the current count.
pub fn can_set_count(
    ctx: &PickContext,
    category_id: &str,
    item_id: &str,
    count: u32,
) -> Result<u32, SelectionError> {
    let (category, item) = lookup(ctx.catalog, category_id, item_id, SelectionShape::Counter)?;
    let current = ctx
        .selections
        .get(category_id)
        .and_then(|selection| selection.stored_count(item_id))
        .unwrap_or_else(|| item.default_count());
    if let Some(max) = item.counter.and_then(|spec| spec.max) {
        if count > max && count > current {
            return Err(SelectionError::CounterLimit {
                item: item_id.to_string(),
                max,
            });
        }
    }
    let becomes_pick = count > 0 && !ctx.selections.is_picked(category_id, item_id);
    if count > current && becomes_pick {
        check_addition(ctx, category, item)?;
    }
    Ok(current)
}

fn check_addition(
    ctx: &PickContext,
    category: &CategoryDef,
    item: &ChoiceItem,
) -> Result<(), SelectionError> {
    if let Some(trigger) = &category.parent {
        if !is_picked_anywhere(ctx, trigger) {
            return Err(SelectionError::TriggerInactive {
                category: category.id.clone(),
                trigger: trigger.clone(),
            });
        }
    }

    if let Some(partner) = &item.excludes {
        if is_picked_anywhere(ctx, partner) {
            return Err(SelectionError::Excluded {
                item: item.id.clone(),
                partner: partner.clone(),
            });
        }
    }
    if let Some(other) = ctx.catalog.items.iter().find(|other| {
        other.excludes.as_deref() == Some(item.id.as_str()) && is_picked_anywhere(ctx, &other.id)
    }) {
        return Err(SelectionError::Excluded {
            item: item.id.clone(),
            partner: other.id.clone(),
        });
    }

    let used = ctx
        .selections
        .get(&category.id)
        .map_or(0, CategorySelection::used);
    if let Some(quota) = ctx.snapshot.quota(&category.id).and_then(|q| q.quota) {
        if used >= quota {
            return Err(SelectionError::QuotaExhausted {
                category: category.id.clone(),
                quota,
            });
        }
    }

    for requirement in &item.requires {
        if !requirement_met(ctx, category.blessing.as_deref(), requirement) {
            return Err(SelectionError::RequirementUnmet {
                item: item.id.clone(),
                requirement: requirement.clone(),
            });
        }
    }
    Ok(())
}

fn is_picked_anywhere(ctx: &PickContext, item_id: &str) -> bool {
    ctx.catalog
        .item(item_id)
        .is_some_and(|item| ctx.selections.is_picked(&item.category, item_id))
}

fn in_scope(scope: Option<&str>, other: Option<&str>) -> bool {
    scope.is_none() || scope == other
}

/// Requirements are met by any pick or active sigil in the same blessing.
fn requirement_met(ctx: &PickContext, blessing: Option<&str>, requirement: &str) -> bool {
    let picked = ctx
        .catalog
        .categories
        .iter()
        .filter(|category| in_scope(blessing, category.blessing.as_deref()))
        .any(|category| ctx.selections.is_picked(&category.id, requirement));
    picked
        || ctx
            .catalog
            .trees
            .iter()
            .filter(|tree| in_scope(blessing, tree.blessing.as_deref()))
            .any(|tree| ctx.snapshot.is_active(&tree.id, requirement))
}

/// Toggle a set-shaped pick. Callers validate with [`can_pick`] first.
pub fn apply_pick(
    catalog: &Catalog,
    selections: &mut Selections,
    category_id: &str,
    item_id: &str,
) -> PickOutcome {
    let removed = match selections.get_mut(category_id) {
        Some(CategorySelection::Set(ids)) => {
            if ids.remove(item_id) {
                true
            } else {
                ids.insert(item_id.to_string());
                false
            }
        }
        _ => return PickOutcome::Picked,
    };
    if removed {
        PickOutcome::Unpicked {
            cleared: cascade_clear(catalog, selections, item_id),
        }
    } else {
        PickOutcome::Picked
    }
}

/// Set a counter. Callers validate with [`can_set_count`] first.
pub fn apply_count(
    catalog: &Catalog,
    selections: &mut Selections,
    category_id: &str,
    item_id: &str,
    count: u32,
    previous: u32,
) -> CountChange {
    let default = catalog.item(item_id).map_or(0, ChoiceItem::default_count);
    if let Some(CategorySelection::Counter(counts)) = selections.get_mut(category_id) {
        if count == default {
            counts.remove(item_id);
        } else {
            counts.insert(item_id.to_string(), count);
        }
    }
    let cleared = if count == 0 && previous > 0 {
        cascade_clear(catalog, selections, item_id)
    } else {
        Vec::new()
    };
    CountChange {
        previous,
        count,
        cleared,
    }
}

/// Clear every sub-collection exposed by `trigger`, following nested triggers.
pub fn cascade_clear(catalog: &Catalog, selections: &mut Selections, trigger: &str) -> Vec<String> {
    let mut cleared = Vec::new();
    let mut pending = vec![trigger.to_string()];
    while let Some(current) = pending.pop() {
        for sub in catalog.sub_collections(&current) {
            let Some(selection) = selections.get_mut(&sub.id) else {
                continue;
            };
            if selection.is_empty() {
                continue;
            }
            pending.extend(selection.counted().into_iter().map(|(id, _)| id.to_string()));
            selection.clear();
            cleared.push(sub.id.clone());
        }
    }
    cleared
}

/// Turning a boost on spends one unit of its pool; turning it off is blocked
/// while the category holds more picks than it could without the bonus.
pub fn can_toggle_boost(
    catalog: &Catalog,
    category_id: &str,
    boosts: &Boosts,
    selections: &Selections,
    snapshot: &Snapshot,
) -> Result<(), SelectionError> {
    let category = catalog
        .category(category_id)
        .ok_or_else(|| SelectionError::UnknownCategory(category_id.to_string()))?;
    let boost = category
        .boost
        .as_ref()
        .ok_or_else(|| SelectionError::NoBoost(category_id.to_string()))?;

    if boosts.0.contains(category_id) {
        let used = selections.get(category_id).map_or(0, CategorySelection::used);
        if let Some(quota) = snapshot.quota(category_id).and_then(|q| q.quota) {
            let quota_without = quota.saturating_sub(boost.bonus);
            if used > quota_without {
                return Err(SelectionError::BoostLocked {
                    category: category_id.to_string(),
                    used,
                    quota_without,
                });
            }
        }
        return Ok(());
    }

    let available = snapshot.available(&boost.pool);
    if available < 1 {
        return Err(SelectionError::InsufficientPool {
            pool: boost.pool.clone(),
            required: 1,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::catalog::fixtures;
    use crate::rules::cost::PoolKey;
    use crate::state::snapshot::PoolBalance;

    struct Fixture {
        catalog: Catalog,
        selections: Selections,
        snapshot: Snapshot,
        boosts: Boosts,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = fixtures::catalog();
            let selections = Selections::for_catalog(&catalog);
            let mut fixture = Self {
                catalog,
                selections,
                snapshot: Snapshot::default(),
                boosts: Boosts::default(),
            };
            fixture.republish();
            fixture
        }

        fn republish(&mut self) {
            self.snapshot.quotas = quota_balances(
                &self.catalog,
                &self.selections,
                &self.snapshot.active_nodes,
                &self.boosts,
            );
        }

        fn pick(&mut self, category: &str, item: &str) -> Result<PickOutcome, SelectionError> {
            let ctx = PickContext {
                catalog: &self.catalog,
                selections: &self.selections,
                snapshot: &self.snapshot,
            };
            can_pick(&ctx, category, item)?;
            let outcome = apply_pick(&self.catalog, &mut self.selections, category, item);
            self.republish();
            Ok(outcome)
        }

        fn count(&mut self, category: &str, item: &str, count: u32) -> Result<CountChange, SelectionError> {
            let ctx = PickContext {
                catalog: &self.catalog,
                selections: &self.selections,
                snapshot: &self.snapshot,
            };
            let previous = can_set_count(&ctx, category, item, count)?;
            let change = apply_count(&self.catalog, &mut self.selections, category, item, count, previous);
            self.republish();
            Ok(change)
        }
    }

    #[test]
    fn third_pick_is_rejected_until_one_is_freed() {
        let mut fx = Fixture::new();
        assert_eq!(fx.pick("perks", "iron_will"), Ok(PickOutcome::Picked));
        assert_eq!(fx.pick("perks", "quick_study"), Ok(PickOutcome::Picked));
        assert_eq!(
            fx.pick("perks", "homebody"),
            Err(SelectionError::QuotaExhausted {
                category: "perks".to_string(),
                quota: 2,
            })
        );
        assert_eq!(
            fx.pick("perks", "iron_will"),
            Ok(PickOutcome::Unpicked { cleared: vec![] })
        );
        assert_eq!(fx.pick("perks", "homebody"), Ok(PickOutcome::Picked));
        assert!(fx.pick("perks", "iron_will").is_err());
    }

    #[test]
    fn sigil_benefits_open_gated_categories() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.pick("spells", "firebolt"),
            Err(SelectionError::QuotaExhausted {
                category: "spells".to_string(),
                quota: 0,
            })
        );
        fx.snapshot
            .active_nodes
            .insert("arcane_tree".to_string(), ["a1".to_string()].into_iter().collect());
        fx.republish();
        assert_eq!(fx.snapshot.quota("spells").and_then(|q| q.quota), Some(1));
        assert_eq!(fx.pick("spells", "firebolt"), Ok(PickOutcome::Picked));
    }

    #[test]
    fn unlimited_categories_have_no_quota() {
        let fx = Fixture::new();
        assert_eq!(fx.snapshot.quota("personality").and_then(|q| q.quota), None);
        assert_eq!(fx.snapshot.quota("vehicles").and_then(|q| q.quota), None);
    }

    #[test]
    fn requirements_read_active_sigils() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.pick("perks", "arcane_focus"),
            Err(SelectionError::RequirementUnmet {
                item: "arcane_focus".to_string(),
                requirement: "a1".to_string(),
            })
        );
        fx.snapshot
            .active_nodes
            .insert("arcane_tree".to_string(), ["a1".to_string()].into_iter().collect());
        assert_eq!(fx.pick("perks", "arcane_focus"), Ok(PickOutcome::Picked));
    }

    #[test]
    fn exclusion_applies_in_both_directions() {
        let mut fx = Fixture::new();
        fx.pick("perks", "homebody").expect("homebody");
        assert_eq!(
            fx.pick("perks", "wanderer"),
            Err(SelectionError::Excluded {
                item: "wanderer".to_string(),
                partner: "homebody".to_string(),
            })
        );
        fx.pick("perks", "homebody").expect("drop homebody");
        fx.pick("perks", "wanderer").expect("wanderer");
        assert_eq!(
            fx.pick("perks", "homebody"),
            Err(SelectionError::Excluded {
                item: "homebody".to_string(),
                partner: "wanderer".to_string(),
            })
        );
    }

    #[test]
    fn removing_a_trigger_clears_its_sub_collection() {
        let mut fx = Fixture::new();
        assert!(matches!(
            fx.pick("personality", "brave"),
            Err(SelectionError::TriggerInactive { .. })
        ));
        fx.pick("perks", "split_soul").expect("trigger");
        fx.pick("personality", "brave").expect("brave");
        fx.pick("personality", "curious").expect("curious");
        assert_eq!(
            fx.pick("perks", "split_soul"),
            Ok(PickOutcome::Unpicked {
                cleared: vec!["personality".to_string()],
            })
        );
        assert!(fx.selections.get("personality").is_some_and(CategorySelection::is_empty));
    }

    #[test]
    fn counters_respect_max_and_baseline() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.count("vehicles", "car", 4),
            Err(SelectionError::CounterLimit {
                item: "car".to_string(),
                max: 3,
            })
        );
        let change = fx.count("vehicles", "car", 3).expect("car");
        assert_eq!(change.previous, 0);

        let change = fx.count("vehicles", "siblings", 0).expect("siblings");
        assert_eq!(change.previous, 2);
        assert_eq!(
            fx.selections.get("vehicles").and_then(|s| s.stored_count("siblings")),
            Some(0)
        );
        fx.count("vehicles", "siblings", 2).expect("back to baseline");
        assert_eq!(
            fx.selections.get("vehicles").and_then(|s| s.stored_count("siblings")),
            None
        );
    }

    #[test]
    fn counter_and_set_shapes_do_not_mix() {
        let mut fx = Fixture::new();
        assert!(matches!(
            fx.pick("vehicles", "bike"),
            Err(SelectionError::WrongShape { .. })
        ));
        assert!(matches!(
            fx.count("perks", "iron_will", 2),
            Err(SelectionError::WrongShape { .. })
        ));
    }

    #[test]
    fn boost_needs_a_unit_and_locks_when_relied_on() {
        let mut fx = Fixture::new();
        let kisin = PoolKey::sigil("kisin");
        fx.snapshot.pools.insert(kisin.clone(), PoolBalance::settle(0, 0));
        assert_eq!(
            can_toggle_boost(&fx.catalog, "perks", &fx.boosts, &fx.selections, &fx.snapshot),
            Err(SelectionError::InsufficientPool {
                pool: kisin.clone(),
                required: 1,
                available: 0,
            })
        );

        fx.snapshot.pools.insert(kisin, PoolBalance::settle(1, 0));
        assert!(can_toggle_boost(&fx.catalog, "perks", &fx.boosts, &fx.selections, &fx.snapshot).is_ok());
        fx.boosts.0.insert("perks".to_string());
        fx.republish();
        for item in ["iron_will", "quick_study", "homebody"] {
            fx.pick("perks", item).expect(item);
        }
        assert_eq!(
            can_toggle_boost(&fx.catalog, "perks", &fx.boosts, &fx.selections, &fx.snapshot),
            Err(SelectionError::BoostLocked {
                category: "perks".to_string(),
                used: 3,
                quota_without: 2,
            })
        );
        assert_eq!(
            can_toggle_boost(&fx.catalog, "houses", &fx.boosts, &fx.selections, &fx.snapshot),
            Err(SelectionError::NoBoost("houses".to_string()))
        );
    }
}
