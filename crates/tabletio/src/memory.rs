//! In-process tables implementing every collaborator trait, with failure and
//! latency injection.

use crate::{
    BatchOutcome, ByteKey, Cell, KeyRange, Mutation, MutationKind, MutationSink, RemoteError,
    Row, RowFilter, RowSource, RowStream, SampleEntry, SampleSource, TableRef,
};
use bytes::{Bytes, BytesMut};
use core::ops::Bound;
use futures::{FutureExt, future::BoxFuture};
use parking_lot::{Mutex, RwLock};
use portable_atomic::{AtomicUsize, Ordering};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

type Rows = BTreeMap<ByteKey, Row>;

#[derive(Default)]
struct Faults {
    failing_sample_fetches: usize,
    failing_batches: usize,
    stream_failure_after: Option<usize>,
    poisoned: HashSet<ByteKey>,
    batch_latency: Duration,
}

struct Inner {
    sample_interval_bytes: u64,
    tables: RwLock<HashMap<TableRef, Rows>>,
    faults: Mutex<Faults>,
    sample_fetches: AtomicUsize,
    batch_calls: AtomicUsize,
}

/// Tables held in memory, sampled every `sample_interval_bytes`.
///
/// Cloning shares the same tables.
#[derive(Clone)]
pub struct MemoryTable {
    inner: Arc<Inner>,
}

impl MemoryTable {
    pub fn new(sample_interval_bytes: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                sample_interval_bytes: sample_interval_bytes.max(1),
                tables: RwLock::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                sample_fetches: AtomicUsize::new(0),
                batch_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Inserts or replaces a row directly, bypassing every fault.
    pub fn insert(&self, table: &TableRef, row: Row) {
        self.inner
            .tables
            .write()
            .entry(table.clone())
            .or_default()
            .insert(row.key.clone(), row);
    }

    pub fn row_count(&self, table: &TableRef) -> usize {
        self.inner.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    pub fn get(&self, table: &TableRef, key: &ByteKey) -> Option<Row> {
        self.inner.tables.read().get(table)?.get(key).cloned()
    }

    /// Every row in key order.
    pub fn rows(&self, table: &TableRef) -> Vec<Row> {
        self.inner
            .tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The next `count` sampling calls fail.
    pub fn fail_sample_fetches(&self, count: usize) {
        self.inner.faults.lock().failing_sample_fetches = count;
    }

    /// The next `count` batch calls fail as a whole.
    pub fn fail_batches(&self, count: usize) {
        self.inner.faults.lock().failing_batches = count;
    }

    /// Row streams opened from now on fail after yielding `rows` rows.
    pub fn fail_streams_after(&self, rows: Option<usize>) {
        self.inner.faults.lock().stream_failure_after = rows;
    }

    /// Mutations on `key` are rejected.
    pub fn poison_row(&self, key: impl Into<ByteKey>) {
        self.inner.faults.lock().poisoned.insert(key.into());
    }

    pub fn set_batch_latency(&self, latency: Duration) {
        self.inner.faults.lock().batch_latency = latency;
    }

    /// Number of sampling calls served, including failed ones.
    pub fn sample_fetches(&self) -> usize {
        self.inner.sample_fetches.load(Ordering::Acquire)
    }

    pub fn batch_calls(&self) -> usize {
        self.inner.batch_calls.load(Ordering::Acquire)
    }
}

impl SampleSource for MemoryTable {
    fn fetch_samples(&self, table: &TableRef) -> Result<Vec<SampleEntry>, RemoteError> {
        self.inner.sample_fetches.fetch_add(1, Ordering::AcqRel);
        {
            let mut faults = self.inner.faults.lock();
            if faults.failing_sample_fetches > 0 {
                faults.failing_sample_fetches -= 1;
                return Err(RemoteError::new(format!("sampling {table} unavailable")));
            }
        }

        let tables = self.inner.tables.read();
        let interval = self.inner.sample_interval_bytes;
        let mut samples = Vec::new();
        let mut offset = 0_u64;
        let mut next_sample_at = interval;
        for (key, row) in tables.get(table).into_iter().flatten() {
            if offset >= next_sample_at {
                samples.push(SampleEntry::new(key.clone(), offset));
                next_sample_at = offset + interval;
            }
            offset += row.size_bytes();
        }
        samples.push(SampleEntry::new(ByteKey::EMPTY, offset));
        Ok(samples)
    }
}

impl RowSource for MemoryTable {
    fn open_row_stream(
        &self,
        table: &TableRef,
        range: &KeyRange,
        filter: &RowFilter,
    ) -> Result<RowStream, RemoteError> {
        let fail_after = self.inner.faults.lock().stream_failure_after;
        let upper = if range.is_unbounded_above() {
            Bound::Unbounded
        } else {
            Bound::Excluded(range.end().clone())
        };
        let tables = self.inner.tables.read();
        let rows: Vec<Row> = tables
            .get(table)
            .into_iter()
            .flat_map(|rows| rows.range((Bound::Included(range.start().clone()), upper.clone())))
            .filter_map(|(_, row)| filter.apply(row.clone()))
            .collect();
        drop(tables);

        let mut items: Vec<Result<Row, RemoteError>> = rows.into_iter().map(Ok).collect();
        if let Some(limit) = fail_after {
            items.truncate(limit);
            items.push(Err(RemoteError::new(format!("row stream over {range} reset"))));
        }
        Ok(Box::new(items.into_iter()))
    }
}

impl MutationSink for MemoryTable {
    fn send_batch(&self, table: &TableRef, mutations: Arc<[Mutation]>) -> BoxFuture<'static, BatchOutcome> {
        let inner = self.inner.clone();
        let table = table.clone();
        async move {
            inner.batch_calls.fetch_add(1, Ordering::AcqRel);
            let (latency, fail_call) = {
                let mut faults = inner.faults.lock();
                let fail = faults.failing_batches > 0;
                if fail {
                    faults.failing_batches -= 1;
                }
                (faults.batch_latency, fail)
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if fail_call {
                return Err(RemoteError::new(format!("batch call to {table} timed out")));
            }

            let poisoned = inner.faults.lock().poisoned.clone();
            let mut tables = inner.tables.write();
            let rows = tables.entry(table).or_default();
            Ok(mutations
                .iter()
                .map(|mutation| {
                    if poisoned.contains(&mutation.row_key) {
                        return Err(RemoteError::permanent(format!(
                            "row {} rejected",
                            mutation.row_key
                        )));
                    }
                    apply(rows, mutation)
                })
                .collect())
        }
        .boxed()
    }
}

fn apply(rows: &mut Rows, mutation: &Mutation) -> Result<(), RemoteError> {
    let key = &mutation.row_key;
    match &mutation.kind {
        MutationKind::Put { cells } => {
            let row = rows
                .entry(key.clone())
                .or_insert_with(|| Row::new(key.clone(), Vec::new()));
            for cell in cells {
                row.cells.retain(|c| {
                    !(c.family == cell.family
                        && c.qualifier == cell.qualifier
                        && c.timestamp_micros == cell.timestamp_micros)
                });
                row.cells.push(cell.clone());
            }
        }
        MutationKind::DeleteCells { family, qualifier } => {
            retain_cells(rows, key, |c| !(c.family == *family && c.qualifier == *qualifier));
        }
        MutationKind::DeleteFamily { family } => {
            retain_cells(rows, key, |c| c.family != *family);
        }
        MutationKind::DeleteRow => {
            rows.remove(key);
        }
        MutationKind::Increment {
            family,
            qualifier,
            amount,
        } => {
            let cell = cell_mut(rows, key, family, qualifier);
            let current = match cell.value.len() {
                0 => 0,
                8 => {
                    let mut raw = [0_u8; 8];
                    raw.copy_from_slice(&cell.value);
                    i64::from_be_bytes(raw)
                }
                len => {
                    return Err(RemoteError::permanent(format!(
                        "cell of {len} bytes is not a 64-bit counter"
                    )));
                }
            };
            let next = current.wrapping_add(*amount);
            cell.value = Bytes::copy_from_slice(&next.to_be_bytes());
        }
        MutationKind::Append {
            family,
            qualifier,
            value,
        } => {
            let cell = cell_mut(rows, key, family, qualifier);
            let mut joined = BytesMut::with_capacity(cell.value.len() + value.len());
            joined.extend_from_slice(&cell.value);
            joined.extend_from_slice(value);
            cell.value = joined.freeze();
        }
    }
    Ok(())
}

fn retain_cells(rows: &mut Rows, key: &ByteKey, keep: impl FnMut(&Cell) -> bool) {
    if let Some(row) = rows.get_mut(key) {
        row.cells.retain(keep);
        if row.cells.is_empty() {
            rows.remove(key);
        }
    }
}

/// Latest cell of `family:qualifier`, created empty if missing.
fn cell_mut<'a>(rows: &'a mut Rows, key: &ByteKey, family: &str, qualifier: &Bytes) -> &'a mut Cell {
    let row = rows
        .entry(key.clone())
        .or_insert_with(|| Row::new(key.clone(), Vec::new()));
    let position = row
        .cells
        .iter()
        .enumerate()
        .filter(|(_, c)| c.family == family && c.qualifier == *qualifier)
        .max_by_key(|(_, c)| c.timestamp_micros)
        .map(|(i, _)| i);
    let index = match position {
        Some(index) => index,
        None => {
            row.cells.push(Cell {
                family: family.to_string(),
                qualifier: qualifier.clone(),
                timestamp_micros: 0,
                value: Bytes::new(),
            });
            row.cells.len() - 1
        }
    };
    &mut row.cells[index]
}
