//! Prerequisite trees of sigil nodes.
//!
//! Deselecting a node never strips its descendants from the stored selection.
//! A stored node whose prerequisite chain is broken goes *dormant*: it keeps
//! its pool units reserved, contributes no benefits, and becomes active again
//! as soon as the chain is restored.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::content::catalog::SigilTree;
use crate::rules::cost::PoolKey;
use crate::rules::error::SelectionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Active,
    Dormant { missing: Vec<String> },
    Selectable,
    Locked(SelectionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigilToggle {
    Selected,
    /// Carries the stored descendants that went dormant with this deselect.
    Deselected { dormant: Vec<String> },
}

/// Stored nodes whose every prerequisite is itself active.
pub fn active_nodes(tree: &SigilTree, selected: &BTreeSet<String>) -> BTreeSet<String> {
    fn is_active<'a>(
        tree: &'a SigilTree,
        node_id: &'a str,
        selected: &BTreeSet<String>,
        memo: &mut HashMap<&'a str, bool>,
    ) -> bool {
        if let Some(active) = memo.get(node_id) {
            return *active;
        }
        let active = selected.contains(node_id)
            && tree.node(node_id).is_some_and(|node| {
                node.prerequisites
                    .iter()
                    .all(|prerequisite| is_active(tree, prerequisite, selected, memo))
            });
        memo.insert(node_id, active);
        active
    }

    let mut memo = HashMap::new();
    tree.nodes
        .iter()
        .filter(|node| is_active(tree, &node.id, selected, &mut memo))
        .map(|node| node.id.clone())
        .collect()
}

pub fn dormant_nodes(selected: &BTreeSet<String>, active: &BTreeSet<String>) -> BTreeSet<String> {
    selected.difference(active).cloned().collect()
}

pub fn missing_prerequisites(
    tree: &SigilTree,
    node_id: &str,
    active: &BTreeSet<String>,
) -> Vec<String> {
    tree.node(node_id)
        .map(|node| {
            node.prerequisites
                .iter()
                .filter(|prerequisite| !active.contains(*prerequisite))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Turning a stored node off is always legal. Turning one on needs every
/// prerequisite active and enough units available in the node's pool.
pub fn can_select(
    tree: &SigilTree,
    node_id: &str,
    selected: &BTreeSet<String>,
    active: &BTreeSet<String>,
    available: i64,
) -> Result<(), SelectionError> {
    let Some(node) = tree.node(node_id) else {
        return Err(SelectionError::UnknownNode {
            tree: tree.id.clone(),
            node: node_id.to_string(),
        });
    };
    if selected.contains(node_id) {
        return Ok(());
    }
    if let Some(prerequisite) = missing_prerequisites(tree, node_id, active).into_iter().next() {
        return Err(SelectionError::MissingPrerequisite {
            node: node_id.to_string(),
            prerequisite,
        });
    }
    if available < node.units {
        return Err(SelectionError::InsufficientPool {
            pool: PoolKey::sigil(&node.kind),
            required: node.units,
            available,
        });
    }
    Ok(())
}

pub fn toggle(
    tree: &SigilTree,
    node_id: &str,
    selected: &mut BTreeSet<String>,
    active: &BTreeSet<String>,
    available: i64,
) -> Result<SigilToggle, SelectionError> {
    can_select(tree, node_id, selected, active, available)?;
    if selected.remove(node_id) {
        let still_active = active_nodes(tree, selected);
        let dormant = active
            .iter()
            .filter(|id| id.as_str() != node_id && !still_active.contains(*id))
            .cloned()
            .collect();
        Ok(SigilToggle::Deselected { dormant })
    } else {
        selected.insert(node_id.to_string());
        Ok(SigilToggle::Selected)
    }
}

pub fn node_status(
    tree: &SigilTree,
    node_id: &str,
    selected: &BTreeSet<String>,
    active: &BTreeSet<String>,
    available: i64,
) -> Result<NodeStatus, SelectionError> {
    if tree.node(node_id).is_none() {
        return Err(SelectionError::UnknownNode {
            tree: tree.id.clone(),
            node: node_id.to_string(),
        });
    }
    if active.contains(node_id) {
        return Ok(NodeStatus::Active);
    }
    if selected.contains(node_id) {
        return Ok(NodeStatus::Dormant {
            missing: missing_prerequisites(tree, node_id, active),
        });
    }
    Ok(match can_select(tree, node_id, selected, active, available) {
        Ok(()) => NodeStatus::Selectable,
        Err(err) => NodeStatus::Locked(err),
    })
}

/// Picks granted per category by the active nodes.
pub fn benefits(tree: &SigilTree, active: &BTreeSet<String>) -> BTreeMap<String, u32> {
    let mut out = BTreeMap::new();
    for node in tree.nodes.iter().filter(|node| active.contains(&node.id)) {
        for benefit in &node.benefits {
            *out.entry(benefit.category.clone()).or_insert(0) += benefit.picks;
        }
    }
    out
}

/// Units held per sigil kind by every stored node, dormant ones included.
pub fn reserved_units(tree: &SigilTree, selected: &BTreeSet<String>) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for node in tree.nodes.iter().filter(|node| selected.contains(&node.id)) {
        *out.entry(node.kind.clone()).or_insert(0) += node.units;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::catalog::fixtures;

    fn arcane() -> SigilTree {
        fixtures::catalog()
            .tree("arcane_tree")
            .cloned()
            .expect("fixture tree")
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn tier_three_needs_tiers_one_and_two() {
        let tree = arcane();
        let mut selected = BTreeSet::new();

        let active = active_nodes(&tree, &selected);
        assert_eq!(
            toggle(&tree, "a3", &mut selected, &active, 5),
            Err(SelectionError::MissingPrerequisite {
                node: "a3".to_string(),
                prerequisite: "a2".to_string(),
            })
        );
        assert!(selected.is_empty());

        for node in ["a1", "a2", "a3"] {
            let active = active_nodes(&tree, &selected);
            assert_eq!(
                toggle(&tree, node, &mut selected, &active, 5),
                Ok(SigilToggle::Selected)
            );
        }
        assert_eq!(active_nodes(&tree, &selected), set(&["a1", "a2", "a3"]));
    }

    #[test]
    fn selecting_needs_pool_units() {
        let tree = arcane();
        let selected = BTreeSet::new();
        let active = active_nodes(&tree, &selected);
        assert_eq!(
            can_select(&tree, "a1", &selected, &active, 0),
            Err(SelectionError::InsufficientPool {
                pool: PoolKey::sigil("kisin"),
                required: 1,
                available: 0,
            })
        );
    }

    #[test]
    fn deselecting_a_prerequisite_leaves_descendants_dormant() {
        let tree = arcane();
        let mut selected = set(&["a1", "a2", "a3"]);
        let active = active_nodes(&tree, &selected);

        let outcome = toggle(&tree, "a1", &mut selected, &active, 0);
        assert_eq!(
            outcome,
            Ok(SigilToggle::Deselected {
                dormant: vec!["a2".to_string(), "a3".to_string()],
            })
        );
        assert_eq!(selected, set(&["a2", "a3"]));

        let active = active_nodes(&tree, &selected);
        assert!(active.is_empty());
        assert_eq!(dormant_nodes(&selected, &active), set(&["a2", "a3"]));
        assert_eq!(
            node_status(&tree, "a2", &selected, &active, 0),
            Ok(NodeStatus::Dormant {
                missing: vec!["a1".to_string()],
            })
        );
        assert!(benefits(&tree, &active).is_empty());
        assert_eq!(reserved_units(&tree, &selected).get("kisin"), Some(&2));

        toggle(&tree, "a1", &mut selected, &active, 1).expect("restore a1");
        assert_eq!(active_nodes(&tree, &selected), set(&["a1", "a2", "a3"]));
    }

    #[test]
    fn deselect_is_unconditional() {
        let tree = arcane();
        let mut selected = set(&["a1"]);
        let active = active_nodes(&tree, &selected);
        assert!(toggle(&tree, "a1", &mut selected, &active, -3).is_ok());
        assert!(selected.is_empty());
    }

    #[test]
    fn benefits_sum_over_active_nodes() {
        let tree = arcane();
        let active = set(&["a1", "a2", "a3"]);
        let granted = benefits(&tree, &active);
        assert_eq!(granted.get("spells"), Some(&3));
        assert_eq!(granted.get("perks"), Some(&1));
    }

    #[test]
    fn statuses_cover_every_state() {
        let tree = arcane();
        let selected = set(&["a1"]);
        let active = active_nodes(&tree, &selected);
        assert_eq!(node_status(&tree, "a1", &selected, &active, 0), Ok(NodeStatus::Active));
        assert_eq!(
            node_status(&tree, "a2", &selected, &active, 1),
            Ok(NodeStatus::Selectable)
        );
        assert!(matches!(
            node_status(&tree, "a3", &selected, &active, 1),
            Ok(NodeStatus::Locked(SelectionError::MissingPrerequisite { .. }))
        ));
        assert!(node_status(&tree, "zz", &selected, &active, 1).is_err());
    }
}
