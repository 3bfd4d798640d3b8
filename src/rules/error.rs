use thiserror::Error;

use crate::content::catalog::SelectionShape;
use crate::rules::cost::PoolKey;

/// A selection action the current state does not allow. Rejected actions
/// leave every piece of live state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("unknown category {0}")]
    UnknownCategory(String),
    #[error("unknown item {item} in category {category}")]
    UnknownItem { category: String, item: String },
    #[error("unknown sigil tree {0}")]
    UnknownTree(String),
    #[error("unknown node {node} in tree {tree}")]
    UnknownNode { tree: String, node: String },
    #[error("unknown sigil kind {0}")]
    UnknownSigilKind(String),
    #[error("unknown slot {slot} in category {category}")]
    UnknownSlot { category: String, slot: String },
    #[error("category {category} holds {actual:?} picks, not {expected:?}")]
    WrongShape {
        category: String,
        expected: SelectionShape,
        actual: SelectionShape,
    },
    #[error("{node} needs {prerequisite} selected first")]
    MissingPrerequisite { node: String, prerequisite: String },
    #[error("{pool} has {available} available, {required} required")]
    InsufficientPool {
        pool: PoolKey,
        required: i64,
        available: i64,
    },
    #[error("category {category} is at its quota of {quota}")]
    QuotaExhausted { category: String, quota: u32 },
    #[error("{item} requires {requirement}")]
    RequirementUnmet { item: String, requirement: String },
    #[error("{item} cannot be combined with {partner}")]
    Excluded { item: String, partner: String },
    #[error("category {category} opens only while {trigger} is picked")]
    TriggerInactive { category: String, trigger: String },
    #[error("category {0} has no boost")]
    NoBoost(String),
    #[error("boost on {category} backs {used} picks against a quota of {quota_without} without it")]
    BoostLocked {
        category: String,
        used: u32,
        quota_without: u32,
    },
    #[error("{item} is capped at {max}")]
    CounterLimit { item: String, max: u32 },
    #[error("no stored {kind} build named {name}")]
    UnknownBuild { kind: String, name: String },
    #[error("build {name} does not fit slot {slot}: {reason}")]
    IncompatibleBuild {
        slot: String,
        name: String,
        reason: String,
    },
}
