use crate::driver::config::DriverConfig;
use bytes::Bytes;
use std::{sync::Arc, time::Instant};
use tabletio::{Cell, Error, MemoryTable, Mutation, MutationDispatcher, MutationFailures};

pub const FAMILY: &str = "cf";

#[derive(Debug, Default, Clone, Copy)]
pub struct LoadReport {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retry_safe: u64,
    pub batches: u64,
}

/// Bijective 64-bit mix, so keys are unique and spread over the keyspace.
const fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

pub fn row_key(index: u64, seed: u64) -> String {
    format!("user{:016x}", mix(index ^ seed))
}

fn record(report: &mut LoadReport, failures: &MutationFailures) {
    report.failed += failures.len() as u64;
    report.retry_safe += failures.retry_safe().count() as u64;
}

/// Writes `config.rows` rows into `store` through a [`MutationDispatcher`].
///
/// Every `poison_every`-th row is rejected by the store, so the report
/// always accounts for partial failures.
pub async fn load(store: &MemoryTable, config: &DriverConfig) -> anyhow::Result<LoadReport> {
    let started = Instant::now();
    let dispatcher = MutationDispatcher::new(
        Arc::new(store.clone()),
        [config.table.clone()],
        config.writer,
    )?;
    let value = Bytes::from(vec![b'x'; config.value_bytes]);
    let flush_every = config.writer.max_batch_size() as u64;
    let mut report = LoadReport::default();

    for i in 0..config.rows {
        let key = row_key(i, config.seed);
        if config.poison_every.is_some_and(|n| i % n == n - 1) {
            store.poison_row(key.as_str());
        }
        let cell = Cell {
            family: FAMILY.to_string(),
            qualifier: Bytes::from_static(b"v"),
            timestamp_micros: 0,
            value: value.clone(),
        };
        dispatcher.submit(&config.table, Mutation::put(key, vec![cell]))?;
        report.submitted += 1;

        if report.submitted % flush_every == 0 {
            match dispatcher.flush(&config.table).await {
                Ok(()) => {}
                Err(Error::PartialMutationFailure(failures)) => record(&mut report, &failures),
                Err(err) => return Err(err.into()),
            }
        }
    }

    match dispatcher.drain_all().await {
        Ok(summary) => {
            report.batches = summary.batches;
        }
        Err(Error::PartialMutationFailure(failures)) => {
            record(&mut report, &failures);
            report.batches = failures.batches;
        }
        Err(err) => return Err(err.into()),
    }
    report.succeeded = report.submitted - report.failed;

    tracing::info!(
        table = %config.table,
        submitted = report.submitted,
        failed = report.failed,
        batches = report.batches,
        retry_safe = report.retry_safe,
        peak_inflight = dispatcher.admission().counter(&config.table).peak(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "load complete"
    );
    Ok(report)
}
