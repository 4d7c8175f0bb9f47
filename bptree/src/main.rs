#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::collections::BTreeMap;
use std::time::Instant;

use bptree::btree::{BPlusTree, NodeStore};
use bptree::config::DriverConfig;
use bptree::holder::{IntHolder, LongHolder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Checks run this often during the workload.
const CHECK_INTERVAL: usize = 10_000;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bptree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match DriverConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: auto_tune={}, size={}, operations={}, seed={}",
        config.tree.auto_tune,
        config.tree.size,
        config.operations,
        config.seed
    );

    if let Err(message) = run(&config) {
        tracing::error!("Workload failed: {message}");
        std::process::exit(1);
    }
}

/// Run a random insert/remove/get mix and compare every result to a `BTreeMap`.
fn run(config: &DriverConfig) -> Result<(), String> {
    let tree: BPlusTree<IntHolder, LongHolder> =
        BPlusTree::with_defaults(config.tree).map_err(|e| e.to_string())?;
    let mut oracle: BTreeMap<i32, i64> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(config.seed);

    // Keep the key space small enough that removes and updates hit
    let key_space = i32::try_from(config.operations / 2).unwrap_or(i32::MAX).max(16);
    let started = Instant::now();
    let (mut inserts, mut removes, mut lookups) = (0usize, 0usize, 0usize);

    for step in 1..=config.operations {
        let key = rng.random_range(0..key_space);
        match rng.random_range(0..10) {
            0..=4 => {
                let value: i64 = rng.random();
                let old = tree
                    .insert(IntHolder(key), LongHolder(value))
                    .map_err(|e| e.to_string())?;
                let expected = oracle.insert(key, value);
                if old.map(|v| v.0) != expected {
                    return Err(format!("insert {key}: tree returned {old:?}, expected {expected:?}"));
                }
                inserts += 1;
            }
            5..=7 => {
                let removed = tree.remove(&IntHolder(key)).map_err(|e| e.to_string())?;
                let expected = oracle.remove(&key);
                if removed.map(|v| v.0) != expected {
                    return Err(format!(
                        "remove {key}: tree returned {removed:?}, expected {expected:?}"
                    ));
                }
                removes += 1;
            }
            _ => {
                let found = tree.get(&IntHolder(key)).map_err(|e| e.to_string())?;
                let expected = oracle.get(&key).copied();
                if found.map(|v| v.0) != expected {
                    return Err(format!("get {key}: tree returned {found:?}, expected {expected:?}"));
                }
                lookups += 1;
            }
        }

        if step % CHECK_INTERVAL == 0 {
            tree.check_invariants().map_err(|e| e.to_string())?;
            tracing::debug!(
                "step {step}: {} entries, height {}",
                tree.len().map_err(|e| e.to_string())?,
                tree.height().map_err(|e| e.to_string())?
            );
        }
    }

    tree.check_invariants().map_err(|e| e.to_string())?;
    let scanned = tree
        .iter()
        .map_err(|e| e.to_string())?
        .map(|entry| entry.map(|(k, v)| (k.0, v.0)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    if scanned.iter().copied().ne(oracle.iter().map(|(&k, &v)| (k, v))) {
        return Err("final scan does not match the reference map".to_string());
    }

    let order = tree.order();
    tracing::info!(
        "Completed {} operations in {:?}: {inserts} inserts, {removes} removes, {lookups} lookups",
        config.operations,
        started.elapsed()
    );
    tracing::info!(
        "Final tree: {} entries, height {}, {} nodes, leaf_order={}, internal_order={}",
        scanned.len(),
        tree.height().map_err(|e| e.to_string())?,
        tree.store().len(),
        order.leaf,
        order.internal
    );

    Ok(())
}
