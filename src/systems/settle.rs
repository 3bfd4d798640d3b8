use std::collections::{BTreeMap, BTreeSet};

use bevy_ecs::prelude::*;
use tracing::debug;

use crate::content::catalog::Catalog;
use crate::rules::ledger::{settle_consumption, settle_totals, BuildView};
use crate::rules::quota::quota_balances;
use crate::rules::sigil;
use crate::state::selection::{BundleCharges, Boosts, SigilSelections, SigilTrades, Selections};
use crate::state::snapshot::{PendingLedger, Snapshot};

/// Live build state as one system parameter.
#[derive(bevy_ecs::system::SystemParam)]
pub struct BuildState<'w> {
    catalog: Res<'w, Catalog>,
    selections: Res<'w, Selections>,
    sigils: Res<'w, SigilSelections>,
    boosts: Res<'w, Boosts>,
    trades: Res<'w, SigilTrades>,
    charges: Res<'w, BundleCharges>,
}

impl BuildState<'_> {
    fn view(&self) -> BuildView<'_> {
        BuildView {
            catalog: &self.catalog,
            selections: &self.selections,
            sigils: &self.sigils,
            boosts: &self.boosts,
            trades: &self.trades,
            charges: &self.charges,
        }
    }
}

/// Phase one: pool totals and which stored nodes are live.
pub fn totals_system(state: BuildState, mut pending: ResMut<PendingLedger>) {
    let view = state.view();
    let mut active_nodes = BTreeMap::new();
    let mut dormant_nodes = BTreeMap::new();
    for (tree_id, selected) in view.sigils.iter() {
        let Some(tree) = view.catalog.tree(tree_id) else {
            continue;
        };
        let active = sigil::active_nodes(tree, selected);
        let dormant = sigil::dormant_nodes(selected, &active);
        if !dormant.is_empty() {
            dormant_nodes.insert(tree_id.clone(), dormant);
        }
        active_nodes.insert(tree_id.clone(), active);
    }

    pending.totals = Some(settle_totals(&view));
    pending.ledger = None;
    pending.active_nodes = active_nodes;
    pending.dormant_nodes = dormant_nodes;
}

/// Phase two: consumption against the totals phase one produced.
pub fn consumption_system(state: BuildState, mut pending: ResMut<PendingLedger>) {
    let Some(totals) = pending.totals.as_ref() else {
        return;
    };
    let ledger = settle_consumption(&state.view(), totals);
    pending.ledger = Some(ledger);
}

/// Swap the settled figures into the published snapshot in one write.
pub fn publish_system(
    catalog: Res<Catalog>,
    selections: Res<Selections>,
    boosts: Res<Boosts>,
    mut pending: ResMut<PendingLedger>,
    mut snapshot: ResMut<Snapshot>,
) {
    let Some(ledger) = pending.ledger.take() else {
        return;
    };
    pending.totals = None;
    let active_nodes: BTreeMap<String, BTreeSet<String>> = std::mem::take(&mut pending.active_nodes);
    let dormant_nodes = std::mem::take(&mut pending.dormant_nodes);

    let next = Snapshot {
        generation: snapshot.generation + 1,
        pools: ledger.balances(),
        quotas: quota_balances(&catalog, &selections, &active_nodes, &boosts),
        active_nodes,
        dormant_nodes,
    };
    let overspent = next.overspent_pools().len();
    debug!(generation = next.generation, overspent, "settled snapshot");
    *snapshot = next;
}
