pub mod selection;
pub mod snapshot;

pub use selection::{BundleCharges, Boosts, CategorySelection, SigilSelections, SigilTrades, Selections};
pub use snapshot::{PendingLedger, PoolBalance, QuotaBalance, Snapshot};
