use std::collections::{BTreeMap, BTreeSet};

use bevy_ecs::prelude::*;
use serde::Serialize;

use crate::rules::cost::PoolKey;
use crate::rules::ledger::{PoolLedger, PoolTotals};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolBalance {
    pub total: i64,
    pub consumed: i64,
    pub available: i64,
}

impl PoolBalance {
    pub fn settle(total: i64, consumed: i64) -> Self {
        Self {
            total,
            consumed,
            available: total.saturating_sub(consumed),
        }
    }

    /// Advisory only: spending past the total is allowed and merely flagged.
    pub fn is_overspent(&self) -> bool {
        self.available < 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaBalance {
    /// `None` means the category is unlimited.
    pub quota: Option<u32>,
    pub used: u32,
}

impl QuotaBalance {
    pub fn remaining(&self) -> Option<u32> {
        self.quota.map(|quota| quota.saturating_sub(self.used))
    }

    pub fn is_full(&self) -> bool {
        self.quota.is_some_and(|quota| self.used >= quota)
    }
}

/// The settled view every legality check reads. Replaced wholesale at the end
/// of each settle pass and never written mid-pass.
#[derive(Resource, Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub pools: BTreeMap<PoolKey, PoolBalance>,
    pub quotas: BTreeMap<String, QuotaBalance>,
    /// Stored nodes whose prerequisite chain is intact, per tree.
    pub active_nodes: BTreeMap<String, BTreeSet<String>>,
    /// Stored nodes waiting on a deselected prerequisite, per tree.
    pub dormant_nodes: BTreeMap<String, BTreeSet<String>>,
}

impl Snapshot {
    pub fn pool(&self, key: &PoolKey) -> PoolBalance {
        self.pools.get(key).copied().unwrap_or_default()
    }

    pub fn available(&self, key: &PoolKey) -> i64 {
        self.pool(key).available
    }

    pub fn quota(&self, category: &str) -> Option<&QuotaBalance> {
        self.quotas.get(category)
    }

    pub fn is_active(&self, tree: &str, node: &str) -> bool {
        self.active_nodes
            .get(tree)
            .is_some_and(|nodes| nodes.contains(node))
    }

    pub fn overspent_pools(&self) -> Vec<&PoolKey> {
        self.pools
            .iter()
            .filter(|(_, balance)| balance.is_overspent())
            .map(|(key, _)| key)
            .collect()
    }
}

/// Scratch state for the pass in flight. Only the settle systems touch it.
#[derive(Resource, Debug, Default)]
pub struct PendingLedger {
    pub totals: Option<PoolTotals>,
    pub ledger: Option<PoolLedger>,
    pub active_nodes: BTreeMap<String, BTreeSet<String>>,
    pub dormant_nodes: BTreeMap<String, BTreeSet<String>>,
}
