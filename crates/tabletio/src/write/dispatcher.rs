use crate::{
    AdmissionRegistry, Error, FailedMutation, Mutation, MutationFailures, MutationSink,
    RemoteError, Result, RpcPermit, TableRef, WriterConfig,
};
use core::{
    future::poll_fn,
    task::{Context, Poll},
};
use futures::FutureExt;
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use std::{
    collections::{HashMap, HashSet},
    panic::AssertUnwindSafe,
    sync::Arc,
};
use tokio::task::{Id, JoinError, JoinSet};

/// Outcome of one batch call.
struct BatchReport {
    succeeded: u64,
    failed: Vec<FailedMutation>,
}

impl BatchReport {
    fn all_failed(table: &TableRef, batch: &[Mutation], cause: &RemoteError) -> Self {
        Self {
            succeeded: 0,
            failed: batch
                .iter()
                .map(|m| FailedMutation {
                    table: table.clone(),
                    mutation: m.clone(),
                    cause: cause.clone(),
                })
                .collect(),
        }
    }
}

/// Spawned batch tasks plus the payload each one carries, so a task that
/// never completes can still be reported.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<BatchReport>,
    batches: HashMap<Id, (TableRef, Arc<[Mutation]>)>,
}

impl InFlight {
    fn complete(
        &mut self,
        joined: core::result::Result<(Id, BatchReport), JoinError>,
    ) -> BatchReport {
        match joined {
            Ok((id, report)) => {
                self.batches.remove(&id);
                report
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %err, "mutation batch task did not complete");
                match self.batches.remove(&err.id()) {
                    Some((table, batch)) => BatchReport::all_failed(
                        &table,
                        &batch,
                        &RemoteError::new(format!("batch task did not complete: {err}")),
                    ),
                    None => BatchReport {
                        succeeded: 0,
                        failed: Vec::new(),
                    },
                }
            }
        }
    }
}

/// Totals reported by a successful [`MutationDispatcher::drain_all`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub succeeded: u64,
    pub batches: u64,
}

/// Batches mutations per destination and sends them under a per-destination
/// admission ceiling.
///
/// Failed mutations are never retried here. They are handed back, with their
/// original payload and cause, from [`flush`](Self::flush) or
/// [`drain_all`](Self::drain_all); see [`FailedMutation::is_retry_safe`].
///
/// `flush` and `drain_all` are cancel safe: a mutation stays buffered until
/// its batch is admitted, and admitted batches keep running and are reported
/// by the next call.
pub struct MutationDispatcher {
    sink: Arc<dyn MutationSink>,
    config: WriterConfig,
    admission: Arc<AdmissionRegistry>,
    destinations: HashSet<TableRef>,
    pending: Mutex<HashMap<TableRef, Vec<Mutation>>>,
    in_flight: Mutex<InFlight>,
    reported: Mutex<MutationFailures>,
    batches: AtomicU64,
}

impl MutationDispatcher {
    /// Opens a writer for `destinations` with its own admission counters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `destinations` is empty.
    pub fn new(
        sink: Arc<dyn MutationSink>,
        destinations: impl IntoIterator<Item = TableRef>,
        config: WriterConfig,
    ) -> Result<Self> {
        let admission = Arc::new(AdmissionRegistry::new(config.max_inflight_rpcs()));
        Self::with_admission(sink, destinations, config, admission)
    }

    /// Opens a writer sharing `admission` with other dispatchers, so the
    /// ceiling holds across all of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `destinations` is empty.
    pub fn with_admission(
        sink: Arc<dyn MutationSink>,
        destinations: impl IntoIterator<Item = TableRef>,
        config: WriterConfig,
        admission: Arc<AdmissionRegistry>,
    ) -> Result<Self> {
        let destinations: HashSet<TableRef> = destinations.into_iter().collect();
        if destinations.is_empty() {
            return Err(Error::config("writer needs at least one destination"));
        }
        for table in &destinations {
            admission.counter(table);
        }
        Ok(Self {
            sink,
            config,
            admission,
            destinations,
            pending: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(InFlight::default()),
            reported: Mutex::new(MutationFailures::default()),
            batches: AtomicU64::new(0),
        })
    }

    pub fn admission(&self) -> &Arc<AdmissionRegistry> {
        &self.admission
    }

    /// Buffers `mutation` for `destination`. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `destination` was not declared
    /// when the writer was opened.
    pub fn submit(&self, destination: &TableRef, mutation: Mutation) -> Result<()> {
        if !self.destinations.contains(destination) {
            return Err(Error::config(format!(
                "table {destination} is not a destination of this writer"
            )));
        }
        self.pending
            .lock()
            .entry(destination.clone())
            .or_default()
            .push(mutation);
        Ok(())
    }

    /// Number of buffered, not yet admitted mutations for `destination`.
    pub fn pending(&self, destination: &TableRef) -> usize {
        self.pending.lock().get(destination).map_or(0, Vec::len)
    }

    /// Batches handed to the transport so far.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Acquire)
    }

    /// Sends every buffered mutation for `destination` in batches of
    /// `max_batch_size`, waiting only for admission of each batch.
    ///
    /// Returns once every batch is handed to the transport, not when it is
    /// acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialMutationFailure`] with failures of batches that
    /// already completed, and [`Error::WriterClosed`] after
    /// [`close`](Self::close). Mutations not yet admitted when the writer
    /// closes are reported as failed.
    pub async fn flush(&self, destination: &TableRef) -> Result<()> {
        self.dispatch(destination).await?;
        self.harvest();
        self.take_failures()
    }

    /// Flushes every destination, waits for all outstanding batches and
    /// reports every failure not yet reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialMutationFailure`] carrying each failed
    /// mutation and its cause.
    pub async fn drain_all(&self) -> Result<DrainSummary> {
        let destinations: Vec<TableRef> = self.pending.lock().keys().cloned().collect();
        for destination in &destinations {
            match self.dispatch(destination).await {
                Ok(()) | Err(Error::WriterClosed(_)) => {}
                Err(err) => return Err(err),
            }
        }

        while let Some(report) = poll_fn(|cx| self.poll_next_report(cx)).await {
            self.record(report);
        }

        let summary = DrainSummary {
            succeeded: self.reported.lock().succeeded,
            batches: self.batches(),
        };
        self.take_failures()?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            succeeded = summary.succeeded,
            batches = summary.batches,
            "drained mutation dispatcher"
        );
        Ok(summary)
    }

    /// Stops admitting batches. In-flight batches still complete and are
    /// reported by [`drain_all`](Self::drain_all).
    pub fn close(&self) {
        self.admission.close_all();
    }

    async fn dispatch(&self, destination: &TableRef) -> Result<()> {
        let counter = self.admission.counter(destination);
        let batch_size = self.config.max_batch_size();
        loop {
            // Nothing leaves the buffer until its batch holds a permit.
            let permit = match counter.acquire().await {
                Ok(permit) => permit,
                Err(err) => {
                    let unsent = self.pending.lock().remove(destination).unwrap_or_default();
                    let cause = RemoteError::permanent(err.to_string());
                    let report = BatchReport::all_failed(destination, &unsent, &cause);
                    self.record(report);
                    return Err(err);
                }
            };

            let batch: Arc<[Mutation]> = {
                let mut pending = self.pending.lock();
                let Some(buffered) = pending.get_mut(destination) else {
                    return Ok(());
                };
                let take = batch_size.min(buffered.len());
                let batch: Vec<Mutation> = buffered.drain(..take).collect();
                if buffered.is_empty() {
                    pending.remove(destination);
                }
                if batch.is_empty() {
                    return Ok(());
                }
                Arc::from(batch)
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                table = %destination,
                mutations = batch.len(),
                in_flight = counter.in_flight(),
                "dispatching mutation batch"
            );
            self.batches.fetch_add(1, Ordering::AcqRel);
            let task = send_batch(self.sink.clone(), destination.clone(), batch.clone(), permit);
            let mut in_flight = self.in_flight.lock();
            let id = in_flight.tasks.spawn(task).id();
            in_flight.batches.insert(id, (destination.clone(), batch));
        }
    }

    fn poll_next_report(&self, cx: &mut Context<'_>) -> Poll<Option<BatchReport>> {
        let mut in_flight = self.in_flight.lock();
        match in_flight.tasks.poll_join_next_with_id(cx) {
            Poll::Ready(Some(joined)) => Poll::Ready(Some(in_flight.complete(joined))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Collects batches that already finished without waiting.
    fn harvest(&self) {
        loop {
            let report = {
                let mut in_flight = self.in_flight.lock();
                match in_flight.tasks.try_join_next_with_id() {
                    Some(joined) => in_flight.complete(joined),
                    None => break,
                }
            };
            self.record(report);
        }
    }

    fn record(&self, report: BatchReport) {
        let mut reported = self.reported.lock();
        reported.succeeded += report.succeeded;
        reported.failed.extend(report.failed);
    }

    fn take_failures(&self) -> Result<()> {
        let mut reported = self.reported.lock();
        if reported.failed.is_empty() {
            return Ok(());
        }
        let failures = MutationFailures {
            failed: core::mem::take(&mut reported.failed),
            succeeded: reported.succeeded,
            batches: self.batches(),
        };
        #[cfg(feature = "tracing")]
        tracing::warn!(
            failed = failures.len(),
            succeeded = failures.succeeded,
            "mutations rejected"
        );
        Err(Error::PartialMutationFailure(failures))
    }
}

#[cfg(feature = "tracing")]
impl Drop for MutationDispatcher {
    fn drop(&mut self) {
        let pending: usize = self.pending.get_mut().values().map(Vec::len).sum();
        if pending > 0 {
            tracing::warn!(pending, "dropping dispatcher with unflushed mutations");
        }
    }
}

async fn send_batch(
    sink: Arc<dyn MutationSink>,
    table: TableRef,
    batch: Arc<[Mutation]>,
    permit: RpcPermit,
) -> BatchReport {
    let outcome = AssertUnwindSafe(sink.send_batch(&table, batch.clone()))
        .catch_unwind()
        .await;
    drop(permit);

    match outcome {
        Ok(Ok(results)) => {
            let mut report = BatchReport {
                succeeded: 0,
                failed: Vec::new(),
            };
            let mut results = results.into_iter();
            for mutation in batch.iter() {
                match results.next() {
                    Some(Ok(())) => report.succeeded += 1,
                    Some(Err(cause)) => report.failed.push(FailedMutation {
                        table: table.clone(),
                        mutation: mutation.clone(),
                        cause,
                    }),
                    None => report.failed.push(FailedMutation {
                        table: table.clone(),
                        mutation: mutation.clone(),
                        cause: RemoteError::new("no result returned for mutation"),
                    }),
                }
            }
            report
        }
        Ok(Err(cause)) => BatchReport::all_failed(&table, &batch, &cause),
        Err(_) => BatchReport::all_failed(
            &table,
            &batch,
            &RemoteError::new("mutation batch call panicked"),
        ),
    }
}
