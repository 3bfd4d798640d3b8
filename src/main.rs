use std::env;
use std::io::{self, Write};
use std::path::PathBuf;

use build_planner::content::load_catalog;
use build_planner::core::planner::{BuildFilter, Planner, PlannerAction};
use build_planner::persistence::{BuildRepository, SqliteBuildStore};
use build_planner::rules::sigil::NodeStatus;
use build_planner::Snapshot;
use tracing::error;
use tracing_subscriber::EnvFilter;

const COMMANDS: &str = "Commands: status | pick <category> <item> | count <category> <item> <n> | sigil <tree> <node> | nodes <tree> | prune | buy <sigil> | sell <sigil> | boost <category> | slot <category> <slot> [build|-] | save <kind> <name> [--force] | load <kind> <name> | delete <kind> <name> | builds <kind> [type=<t>] [-<perk> ...] | compatible <category> <slot> | value <category> <item> | quit";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Initializing build planner...");
    let (catalog_path, db_path) = parse_paths(env::args().collect());

    let catalog = match load_catalog(&catalog_path) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(path = %catalog_path.display(), %err, "failed to load catalog");
            std::process::exit(1);
        }
    };

    if let Some(parent) = db_path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            error!(path = %parent.display(), %err, "failed to create store directory");
            std::process::exit(1);
        }
    }
    let store: Box<dyn BuildRepository> = match SqliteBuildStore::open(&db_path) {
        Ok(store) => Box::new(store),
        Err(err) => {
            error!(path = %db_path.display(), %err, "failed to open build store");
            std::process::exit(1);
        }
    };

    let mut planner = match Planner::new(catalog, store) {
        Ok(planner) => planner,
        Err(err) => {
            error!(%err, "failed to read saved builds");
            std::process::exit(1);
        }
    };

    print_status(planner.snapshot());
    println!("{}", COMMANDS);
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let cmd = parts.next().unwrap_or("").to_lowercase();
        let args: Vec<&str> = parts.collect();

        match (cmd.as_str(), args.as_slice()) {
            ("quit" | "exit", _) => break,
            ("help", _) => println!("{}", COMMANDS),
            ("status", _) => print_status(planner.snapshot()),
            ("pick", [category, item]) => run_action(
                &mut planner,
                PlannerAction::Pick {
                    category: category.to_string(),
                    item: item.to_string(),
                },
            ),
            ("count", [category, item, count]) => match count.parse::<u32>() {
                Ok(count) => run_action(
                    &mut planner,
                    PlannerAction::SetCount {
                        category: category.to_string(),
                        item: item.to_string(),
                        count,
                    },
                ),
                Err(_) => println!("Invalid count: {}", count),
            },
            ("sigil", [tree, node]) => run_action(
                &mut planner,
                PlannerAction::ToggleSigil {
                    tree: tree.to_string(),
                    node: node.to_string(),
                },
            ),
            ("nodes", [tree]) => print_nodes(&planner, tree),
            ("prune", _) => run_action(&mut planner, PlannerAction::PruneDormant),
            ("buy", [kind]) => run_action(
                &mut planner,
                PlannerAction::BuySigil {
                    kind: kind.to_string(),
                },
            ),
            ("sell", [kind]) => run_action(
                &mut planner,
                PlannerAction::SellSigil {
                    kind: kind.to_string(),
                },
            ),
            ("boost", [category]) => run_action(
                &mut planner,
                PlannerAction::ToggleBoost {
                    category: category.to_string(),
                },
            ),
            ("slot", [category, slot, rest @ ..]) => {
                let build = rest.first().copied().filter(|name| *name != "-");
                match planner.assign_slot(category, slot, build) {
                    Ok(()) => println!("Slot {}.{} set to {}", category, slot, build.unwrap_or("-")),
                    Err(err) => println!("Slot not assigned: {}", err),
                }
            }
            ("save", [kind, name, rest @ ..]) => {
                let force = rest.contains(&"--force");
                match planner.save_build(kind, name, force) {
                    Ok(outcome) => println!("Saved {} build {} ({:?})", kind, name, outcome),
                    Err(err) => println!("Save failed: {}", err),
                }
            }
            ("load", [kind, name]) => match planner.load_build(kind, name) {
                Ok(()) => println!("Loaded {} build {}", kind, name),
                Err(err) => println!("Load failed: {}", err),
            },
            ("delete", [kind, name]) => match planner.delete_build(kind, name) {
                Ok(outcome) => {
                    if let Some(refund) = outcome.refunded {
                        println!("Refunded {} {}", refund.amount, refund.pool);
                    }
                    for (category, slot) in outcome.cleared_slots {
                        println!("Cleared slot {}.{}", category, slot);
                    }
                    println!("Deleted {} build {}", kind, name);
                }
                Err(err) => println!("Delete failed: {}", err),
            },
            ("builds", [kind, rest @ ..]) => {
                let filter = parse_filter(rest);
                match planner.list_builds(kind, &filter) {
                    Ok(builds) if builds.is_empty() => println!("No {} builds.", kind),
                    Ok(builds) => {
                        for (name, summary) in builds {
                            println!(
                                "  {}: {} BP, {} FP, type {}",
                                name,
                                summary.points,
                                summary.favor,
                                summary.build_type.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    Err(err) => println!("Listing failed: {}", err),
                }
            }
            ("compatible", [category, slot]) => print_compatible(&planner, category, slot),
            ("value", [category, item]) => match planner.counter_value(category, item) {
                Ok(Some(value)) => println!(
                    "{} x{} = {}",
                    item,
                    planner.count_of(category, item),
                    value
                ),
                Ok(None) => println!("{} has no counter value.", item),
                Err(err) => println!("{}", err),
            },
            _ => println!("Unknown or incomplete command. {}", COMMANDS),
        }
    }
}

fn run_action(planner: &mut Planner, action: PlannerAction) {
    match planner.apply(action) {
        Ok(outcome) => {
            println!("{:?}", outcome);
            let overspent = planner.snapshot().overspent_pools();
            if !overspent.is_empty() {
                let pools: Vec<String> = overspent.iter().map(|pool| pool.to_string()).collect();
                println!("Overspent: {}", pools.join(", "));
            }
        }
        Err(err) => println!("Rejected: {}", err),
    }
}

fn parse_filter(args: &[&str]) -> BuildFilter {
    let mut filter = BuildFilter::default();
    for arg in args {
        if let Some(build_type) = arg.strip_prefix("type=") {
            filter.build_type = Some(build_type.to_string());
        } else if let Some(perk) = arg.strip_prefix('-') {
            filter.excluded_perks.push(perk.to_string());
        }
    }
    filter
}

fn print_status(snapshot: &Snapshot) {
    println!("Pools (settle #{}):", snapshot.generation);
    for (pool, balance) in &snapshot.pools {
        let flag = if balance.is_overspent() { "  OVERSPENT" } else { "" };
        println!(
            "  {:<12} total {:>4}  consumed {:>4}  available {:>4}{}",
            pool.to_string(),
            balance.total,
            balance.consumed,
            balance.available,
            flag
        );
    }
    println!("Quotas:");
    for (category, quota) in &snapshot.quotas {
        match quota.quota {
            Some(limit) => println!("  {:<16} {}/{}", category, quota.used, limit),
            None => println!("  {:<16} {}", category, quota.used),
        }
    }
    for (tree, nodes) in &snapshot.dormant_nodes {
        let nodes: Vec<&str> = nodes.iter().map(String::as_str).collect();
        println!("Dormant in {}: {}", tree, nodes.join(", "));
    }
}

fn print_nodes(planner: &Planner, tree_id: &str) {
    let Some(tree) = planner.catalog().tree(tree_id) else {
        println!("Unknown tree: {}", tree_id);
        return;
    };
    for node in &tree.nodes {
        let status = match planner.node_status(tree_id, &node.id) {
            Ok(NodeStatus::Active) => "active".to_string(),
            Ok(NodeStatus::Dormant { missing }) => format!("dormant (needs {})", missing.join(", ")),
            Ok(NodeStatus::Selectable) => "selectable".to_string(),
            Ok(NodeStatus::Locked(reason)) => format!("locked: {}", reason),
            Err(err) => err.to_string(),
        };
        println!("  {:<12} [{} x{}] {}", node.id, node.kind, node.units, status);
    }
}

fn print_compatible(planner: &Planner, category: &str, slot: &str) {
    let Some(slot_def) = planner
        .catalog()
        .category(category)
        .and_then(|def| def.slots.iter().find(|s| s.id == slot))
    else {
        println!("Unknown slot: {}.{}", category, slot);
        return;
    };
    match planner.list_compatible_builds(&slot_def.bundle_kind, &slot_def.constraints) {
        Ok(builds) if builds.is_empty() => println!("No {} builds.", slot_def.bundle_kind),
        Ok(builds) => {
            for build in builds {
                let points = build
                    .summary
                    .as_ref()
                    .map_or("?".to_string(), |summary| summary.points.to_string());
                match build.incompatibility {
                    None => println!("  {}: {} BP", build.name, points),
                    Some(reason) => println!("  {}: {} BP (unavailable: {})", build.name, points, reason),
                }
            }
        }
        Err(err) => println!("Listing failed: {}", err),
    }
}

fn parse_paths(args: Vec<String>) -> (PathBuf, PathBuf) {
    let mut iter = args.iter();
    let mut catalog_path = PathBuf::from("./assets/data/catalog.json");
    let mut db_path = PathBuf::from("./assets/db/builds.db");
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--catalog" => {
                if let Some(value) = iter.next() {
                    catalog_path = PathBuf::from(value);
                }
            }
            "--db" => {
                if let Some(value) = iter.next() {
                    db_path = PathBuf::from(value);
                }
            }
            _ => {}
        }
    }
    (catalog_path, db_path)
}
