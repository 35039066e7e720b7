pub mod config;
pub mod load;
pub mod pool;
pub mod rebalance;
pub mod scan;
pub mod telemetry;

use crate::driver::{config::DriverConfig, load::load, scan::run_scan};
use anyhow::{Context, bail};
use rand::{SeedableRng, rngs::StdRng};
use std::sync::Arc;
use tabletio::{ByteKey, KeyRange, MemoryTable, ScanPlanner};
use tokio_util::sync::CancellationToken;

/// Loads the table, plans a scan over all of it and reads every unit in
/// parallel, then checks that each stored row was read exactly once.
pub async fn run(config: DriverConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store = MemoryTable::new(config.sample_interval_bytes);
    let loaded = load(&store, &config)
        .await
        .with_context(|| format!("loading table {}", config.table))?;

    let planner = Arc::new(ScanPlanner::from_source(
        config.table.clone(),
        Arc::new(store.clone()),
    ));
    let estimate = planner
        .estimated_size_bytes(&KeyRange::ALL)
        .context("estimating table size")?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let units = planner
        .plan_splits_with_rng(&KeyRange::ALL, &config.split_options, &mut rng)
        .context("planning splits")?;
    tracing::info!(
        estimated_bytes = estimate,
        units = units.len(),
        workers = config.workers,
        "starting scan"
    );

    let report = run_scan(planner, units, &config, shutdown).await?;

    let mut scanned = report.keys;
    scanned.sort_unstable();
    let before = scanned.len();
    scanned.dedup();
    if scanned.len() != before {
        bail!("{} rows were read more than once", before - scanned.len());
    }
    let stored: Vec<ByteKey> = store.rows(&config.table).into_iter().map(|row| row.key).collect();
    if scanned != stored {
        bail!(
            "scan read {} rows but the table holds {}",
            scanned.len(),
            stored.len()
        );
    }

    tracing::info!(
        loaded = loaded.succeeded,
        rejected = loaded.failed,
        rows = scanned.len(),
        units = report.units,
        splits = report.splits,
        retries = report.retries,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "scan verified"
    );
    Ok(())
}
