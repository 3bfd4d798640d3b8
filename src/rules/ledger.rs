//! Two-phase pool settlement.
//!
//! Phase one sums every source of pool totals (starting balances, refunds,
//! grants, traded sigils). Phase two sums every consumer against those
//! totals. Neither phase reads the other's output from a previous pass, so
//! a grant that is itself bought with currency can never feed back into its
//! own price.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::content::catalog::Catalog;
use crate::rules::cost::{aggregate_selection, cost_or_zero, Currency, CurrencyDelta, PoolKey};
use crate::rules::sigil;
use crate::state::selection::{BundleCharges, Boosts, SigilSelections, SigilTrades, Selections};
use crate::state::snapshot::PoolBalance;

/// Everything the ledger reads, borrowed from live state.
#[derive(Debug, Clone, Copy)]
pub struct BuildView<'a> {
    pub catalog: &'a Catalog,
    pub selections: &'a Selections,
    pub sigils: &'a SigilSelections,
    pub boosts: &'a Boosts,
    pub trades: &'a SigilTrades,
    pub charges: &'a BundleCharges,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolTotals(pub BTreeMap<PoolKey, i64>);

impl PoolTotals {
    pub fn get(&self, pool: &PoolKey) -> i64 {
        self.0.get(pool).copied().unwrap_or(0)
    }

    fn add(&mut self, pool: PoolKey, amount: i64) {
        let total = self.0.entry(pool).or_insert(0);
        *total = total.saturating_add(amount);
    }

    fn add_currency(&mut self, delta: CurrencyDelta) {
        for currency in Currency::ALL {
            self.add(PoolKey::Currency(currency), delta.get(currency));
        }
    }
}

/// Totals paired with what the current build consumes from each pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolLedger {
    totals: PoolTotals,
    consumed: BTreeMap<PoolKey, i64>,
}

impl PoolLedger {
    pub fn new(totals: PoolTotals) -> Self {
        let consumed = totals.0.keys().map(|pool| (pool.clone(), 0)).collect();
        Self { totals, consumed }
    }

    pub fn consumed(&self, pool: &PoolKey) -> i64 {
        self.consumed.get(pool).copied().unwrap_or(0)
    }

    fn consume(&mut self, pool: PoolKey, amount: i64) {
        let consumed = self.consumed.entry(pool).or_insert(0);
        *consumed = consumed.saturating_add(amount);
    }

    fn consume_currency(&mut self, delta: CurrencyDelta) {
        for currency in Currency::ALL {
            self.consume(PoolKey::Currency(currency), delta.get(currency));
        }
    }

    pub fn balances(&self) -> BTreeMap<PoolKey, PoolBalance> {
        let mut pools: BTreeMap<PoolKey, PoolBalance> = self
            .totals
            .0
            .iter()
            .map(|(pool, total)| (pool.clone(), PoolBalance::settle(*total, self.consumed(pool))))
            .collect();
        for (pool, consumed) in &self.consumed {
            pools
                .entry(pool.clone())
                .or_insert_with(|| PoolBalance::settle(0, *consumed));
        }
        pools
    }
}

/// Currency moved by trading `net` units of a sigil kind: positive buys at the
/// kind's buy cost, negative sells at its sell value.
pub fn trade_delta(catalog: &Catalog, kind: &str, net: i64) -> CurrencyDelta {
    let Some(def) = catalog.sigil_kind(kind) else {
        return CurrencyDelta::ZERO;
    };
    if net >= 0 {
        cost_or_zero(&def.buy_cost).scaled(net)
    } else {
        cost_or_zero(&def.sell_value).scaled(-net)
    }
}

pub fn settle_totals(view: &BuildView) -> PoolTotals {
    let catalog = view.catalog;
    let mut totals = PoolTotals(catalog.pools().into_iter().map(|pool| (pool, 0)).collect());

    for (pool, amount) in &catalog.settings.starting {
        totals.add(pool.clone(), *amount);
    }
    for kind in &catalog.sigil_kinds {
        totals.add(PoolKey::sigil(&kind.id), kind.starting);
    }

    totals.add_currency(aggregate_selection(catalog, view.selections).refunded);

    for (category_id, selection) in view.selections.iter() {
        for (item_id, count) in selection.counted() {
            let Some(item) = catalog.item_in(category_id, item_id) else {
                continue;
            };
            for grant in &item.grants {
                totals.add(grant.pool.clone(), grant.amount.saturating_mul(i64::from(count)));
            }
        }
    }

    for (kind, net) in &view.trades.0 {
        totals.add(PoolKey::sigil(kind), *net);
        totals.add_currency(trade_delta(catalog, kind, *net).refunded());
    }

    totals
}

pub fn settle_consumption(view: &BuildView, totals: &PoolTotals) -> PoolLedger {
    let catalog = view.catalog;
    let mut ledger = PoolLedger::new(totals.clone());

    ledger.consume_currency(aggregate_selection(catalog, view.selections).spent);

    for (kind, net) in &view.trades.0 {
        ledger.consume_currency(trade_delta(catalog, kind, *net).spent());
    }

    for category_id in &view.boosts.0 {
        if let Some(boost) = catalog.category(category_id).and_then(|c| c.boost.as_ref()) {
            ledger.consume(boost.pool.clone(), 1);
        }
    }

    for (tree_id, nodes) in view.sigils.iter() {
        let Some(tree) = catalog.tree(tree_id) else {
            continue;
        };
        for (kind, units) in sigil::reserved_units(tree, nodes) {
            ledger.consume(PoolKey::sigil(kind), units);
        }
    }

    for (kind_id, count) in &view.charges.0 {
        if let Some(cost) = catalog.bundle_kind(kind_id).and_then(|k| k.creation_cost.as_ref()) {
            ledger.consume(cost.pool.clone(), cost.amount.saturating_mul(i64::from(*count)));
        }
    }

    ledger
}
