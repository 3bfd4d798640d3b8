//! Property checks over random action sequences against the fixture catalog.

use build_planner::content::catalog::Catalog;
use build_planner::persistence::SqliteBuildStore;
use build_planner::rules::PoolKey;
use build_planner::rules::sigil::SigilToggle;
use build_planner::{Planner, PlannerAction};
use proptest::prelude::*;

const CATALOG: &str = include_str!("fixtures/catalog.json");

fn planner() -> Planner {
    let catalog = Catalog::from_json_str(CATALOG).expect("fixture catalog");
    let store = SqliteBuildStore::open_in_memory().expect("store");
    Planner::new(catalog, Box::new(store)).expect("planner")
}

fn pick(category: &str, item: &str) -> PlannerAction {
    PlannerAction::Pick {
        category: category.to_string(),
        item: item.to_string(),
    }
}

fn sigil(tree: &str, node: &str) -> PlannerAction {
    PlannerAction::ToggleSigil {
        tree: tree.to_string(),
        node: node.to_string(),
    }
}

fn actions() -> Vec<PlannerAction> {
    vec![
        pick("perks", "iron_will"),
        pick("perks", "wanderer"),
        pick("perks", "homebody"),
        pick("perks", "sigil_gift"),
        pick("perks", "split_soul"),
        pick("perks", "arcane_focus"),
        pick("personality", "brave"),
        pick("spells", "firebolt"),
        pick("spells", "ward"),
        pick("houses", "house_tide"),
        pick("companion_perks", "strong"),
        PlannerAction::SetCount {
            category: "vehicles".to_string(),
            item: "car".to_string(),
            count: 2,
        },
        PlannerAction::SetCount {
            category: "vehicles".to_string(),
            item: "siblings".to_string(),
            count: 0,
        },
        sigil("arcane_tree", "a1"),
        sigil("arcane_tree", "a2"),
        sigil("arcane_tree", "a3"),
        sigil("tide_tree", "t1"),
        sigil("bond_tree", "b1"),
        PlannerAction::BuySigil {
            kind: "kisin".to_string(),
        },
        PlannerAction::SellSigil {
            kind: "kisin".to_string(),
        },
        PlannerAction::SellSigil {
            kind: "lillu".to_string(),
        },
        PlannerAction::ToggleBoost {
            category: "perks".to_string(),
        },
        PlannerAction::PruneDormant,
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn settled_snapshot_stays_consistent(
        sequence in prop::collection::vec(prop::sample::select(actions()), 0..40)
    ) {
        let mut planner = planner();
        for action in sequence {
            let before = planner.snapshot().clone();
            let selections = planner.selections().clone();
            if planner.apply(action).is_err() {
                prop_assert_eq!(planner.snapshot(), &before);
                prop_assert_eq!(planner.selections(), &selections);
            }

            let snapshot = planner.snapshot();
            for balance in snapshot.pools.values() {
                prop_assert_eq!(balance.available, balance.total - balance.consumed);
            }
            for (tree_id, active) in &snapshot.active_nodes {
                let tree = planner.catalog().tree(tree_id).expect("known tree");
                for node_id in active {
                    let node = tree.node(node_id).expect("known node");
                    for prerequisite in &node.prerequisites {
                        prop_assert!(active.contains(prerequisite));
                    }
                }
            }
        }
    }

    #[test]
    fn deselect_then_reselect_restores_the_snapshot(
        sequence in prop::collection::vec(prop::sample::select(actions()), 0..30)
    ) {
        let mut planner = planner();
        for action in sequence {
            let _ = planner.apply(action);
        }

        let active: Vec<(String, String)> = planner
            .snapshot()
            .active_nodes
            .iter()
            .flat_map(|(tree, nodes)| nodes.iter().map(move |node| (tree.clone(), node.clone())))
            .collect();
        for (tree, node) in active {
            let before = planner.snapshot().clone();
            let kind = planner
                .catalog()
                .tree(&tree)
                .and_then(|t| t.node(&node))
                .map(|n| n.kind.clone())
                .expect("known node");
            // An already overspent pool may not cover the reselect.
            if before.available(&PoolKey::sigil(kind)) < 0 {
                continue;
            }
            let sigils = planner.sigils().clone();

            let dropped = planner.toggle_sigil(&tree, &node);
            let was_deselect = matches!(dropped, Ok(SigilToggle::Deselected { .. }));
            prop_assert!(was_deselect, "{:?}", dropped);
            prop_assert_eq!(planner.toggle_sigil(&tree, &node), Ok(SigilToggle::Selected));

            let after = planner.snapshot();
            prop_assert_eq!(planner.sigils(), &sigils);
            prop_assert_eq!(&after.pools, &before.pools);
            prop_assert_eq!(&after.quotas, &before.quotas);
            prop_assert_eq!(&after.active_nodes, &before.active_nodes);
            prop_assert_eq!(&after.dormant_nodes, &before.dormant_nodes);
        }
    }
}
