// Re-export core modules for use by the binary or other consumers
pub mod content;
pub mod core;
pub mod persistence;
pub mod rules;
pub mod state;
pub mod systems;

// Expose the planner wrapper and the types needed to drive it
pub use crate::core::planner::{
    ActionOutcome, BuildError, BuildFilter, BuildSummary, CompatibleBuild, Incompatibility,
    Planner, PlannerAction, SaveOutcome,
};
pub use crate::state::snapshot::Snapshot;
