pub mod cost;
pub mod counter;
pub mod error;
pub mod ledger;
pub mod quota;
pub mod sigil;

pub use cost::{
    aggregate_selection, item_cost, parse_cost, CostParseError, CostTally, Currency, CurrencyDelta,
    PoolKey,
};
pub use counter::{counter_multiplier, counter_value, CounterRule, CounterSpec, CounterValue};
pub use error::SelectionError;
pub use ledger::{settle_consumption, settle_totals, BuildView, PoolLedger, PoolTotals};
pub use quota::{can_pick, can_set_count, can_toggle_boost, PickContext, PickOutcome};
pub use sigil::{NodeStatus, SigilToggle};
