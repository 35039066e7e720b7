use crate::{Error, Result, TableRef};
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counts in-flight mutation RPCs against one destination and gates new ones
/// above a ceiling.
pub struct OutstandingRpcCounter {
    table: TableRef,
    ceiling: usize,
    semaphore: Arc<Semaphore>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Admission for one RPC. Dropping it releases the slot.
pub struct RpcPermit {
    counter: Arc<OutstandingRpcCounter>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for RpcPermit {
    fn drop(&mut self) {
        self.counter.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl OutstandingRpcCounter {
    /// A zero ceiling is treated as one.
    pub fn new(table: TableRef, ceiling: usize) -> Arc<Self> {
        let ceiling = ceiling.max(1);
        Arc::new(Self {
            table,
            ceiling,
            semaphore: Arc::new(Semaphore::new(ceiling)),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Waits until fewer than `ceiling` RPCs are outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriterClosed`] once [`close`](Self::close) was called.
    pub async fn acquire(self: &Arc<Self>) -> Result<RpcPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::WriterClosed(self.table.clone()))?;
        Ok(self.admit(permit))
    }

    /// Admits an RPC only if a slot is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RpcPermit> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.admit(permit))
    }

    fn admit(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> RpcPermit {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        RpcPermit {
            counter: self.clone(),
            _permit: permit,
        }
    }

    /// Stops admitting new RPCs. Outstanding permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of RPCs ever outstanding at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// One [`OutstandingRpcCounter`] per destination, shared by every dispatch
/// path that writes to it.
pub struct AdmissionRegistry {
    ceiling: usize,
    counters: Mutex<HashMap<TableRef, Arc<OutstandingRpcCounter>>>,
}

impl AdmissionRegistry {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn counter(&self, table: &TableRef) -> Arc<OutstandingRpcCounter> {
        self.counters
            .lock()
            .entry(table.clone())
            .or_insert_with(|| OutstandingRpcCounter::new(table.clone(), self.ceiling))
            .clone()
    }

    pub fn close_all(&self) {
        for counter in self.counters.lock().values() {
            counter.close();
        }
    }
}
