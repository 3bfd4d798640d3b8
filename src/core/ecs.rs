use bevy_ecs::prelude::*;
use bevy_ecs::schedule::{ExecutorKind, SystemSet};

use crate::content::catalog::Catalog;
use crate::state::selection::{BundleCharges, Boosts, SigilSelections, SigilTrades, Selections};
use crate::state::snapshot::{PendingLedger, Snapshot};
use crate::systems::settle::{consumption_system, publish_system, totals_system};

/// Canonical ordering of one settle pass.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum SettleSet {
    Totals,
    Consumption,
    Publish,
}

/// Build the ECS world holding the catalog and an empty build.
pub fn create_world(catalog: Catalog) -> World {
    let mut world = World::new();
    world.insert_resource(Selections::for_catalog(&catalog));
    world.insert_resource(catalog);
    world.insert_resource(SigilSelections::default());
    world.insert_resource(Boosts::default());
    world.insert_resource(SigilTrades::default());
    world.insert_resource(BundleCharges::default());
    world.insert_resource(PendingLedger::default());
    world.insert_resource(Snapshot::default());
    world
}

/// Build the settle schedule in the canonical order.
pub fn create_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);

    schedule.configure_sets((SettleSet::Totals, SettleSet::Consumption, SettleSet::Publish).chain());

    schedule.add_systems((
        totals_system.in_set(SettleSet::Totals),
        consumption_system.in_set(SettleSet::Consumption),
        publish_system.in_set(SettleSet::Publish),
    ));

    schedule
}
