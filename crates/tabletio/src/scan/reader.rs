use crate::{
    Error, RangeTracker, Result, RowFilter, RowSource, RowStream, ScanAdvancer, TableRef, WorkUnit,
};
use core::fmt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Per-reader options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub filter: RowFilter,
}

impl ReadOptions {
    pub fn with_filter(filter: RowFilter) -> Self {
        Self { filter }
    }
}

/// Cloneable handle used by a controller to watch and split a running reader.
#[derive(Clone)]
pub struct SplitHandle(Arc<RangeTracker>);

impl SplitHandle {
    pub fn fraction_consumed(&self) -> f64 {
        self.0.fraction_consumed()
    }

    pub fn try_split(&self, fraction: f64) -> Option<WorkUnit> {
        self.0.try_split_at_fraction(fraction)
    }

    pub fn current_unit(&self) -> WorkUnit {
        self.0.current_unit()
    }

    pub fn is_done(&self) -> bool {
        self.0.is_done()
    }
}

impl fmt::Debug for SplitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SplitHandle").field(&self.0.cursor()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Streaming,
    Exhausted,
    Closed,
}

/// Reads one work unit sequentially.
///
/// Blocking: run one reader per thread (or on `spawn_blocking`). Progress and
/// splitting are safe to drive from other threads through [`SplitHandle`].
pub struct ScanReader<A: ScanAdvancer> {
    table: TableRef,
    source: Arc<dyn RowSource>,
    options: ReadOptions,
    advancer: A,
    tracker: Arc<RangeTracker>,
    stream: Option<RowStream>,
    current: Option<A::Output>,
    phase: Phase,
    rows_read: u64,
    started_at: Option<Instant>,
}

impl<A: ScanAdvancer> ScanReader<A> {
    pub fn new(
        table: TableRef,
        source: Arc<dyn RowSource>,
        unit: WorkUnit,
        options: ReadOptions,
        advancer: A,
    ) -> Self {
        Self {
            table,
            source,
            options,
            advancer,
            tracker: Arc::new(RangeTracker::new(unit)),
            stream: None,
            current: None,
            phase: Phase::Idle,
            rows_read: 0,
            started_at: None,
        }
    }

    /// Opens the row stream and moves to the first item.
    ///
    /// Returns `false` if the unit holds no rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReaderClosed`] after [`close`](Self::close), and
    /// [`Error::Unavailable`] if the stream cannot be opened.
    pub fn start(&mut self) -> Result<bool> {
        match self.phase {
            Phase::Closed => return Err(Error::ReaderClosed),
            Phase::Idle => self.open()?,
            Phase::Streaming | Phase::Exhausted => {}
        }
        self.advance()
    }

    /// Moves to the next item. Returns `false` once the unit is exhausted,
    /// including when a split moved its end below the stream position.
    ///
    /// # Errors
    ///
    /// Any stream failure is terminal for the unit: the stream is released and
    /// the tracker is marked done before the error is returned.
    pub fn advance(&mut self) -> Result<bool> {
        match self.phase {
            Phase::Closed => return Err(Error::ReaderClosed),
            Phase::Exhausted => return Ok(false),
            Phase::Idle => self.open()?,
            Phase::Streaming => {}
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::ReaderClosed);
        };
        match self.advancer.advance(stream, &self.tracker) {
            Ok(Some(output)) => {
                self.rows_read += A::row_count(&output) as u64;
                self.current = Some(output);
                Ok(true)
            }
            Ok(None) => {
                self.current = None;
                self.finish(Phase::Exhausted);
                Ok(false)
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(table = %self.table, error = %err, "scan failed");
                self.current = None;
                self.finish(Phase::Exhausted);
                Err(err)
            }
        }
    }

    /// The item produced by the last successful `start`/`advance`.
    pub fn current(&self) -> Option<&A::Output> {
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<A::Output> {
        self.current.take()
    }

    pub fn fraction_consumed(&self) -> f64 {
        self.tracker.fraction_consumed()
    }

    /// See [`RangeTracker::try_split_at_fraction`].
    pub fn try_split(&self, fraction: f64) -> Option<WorkUnit> {
        self.tracker.try_split_at_fraction(fraction)
    }

    pub fn split_handle(&self) -> SplitHandle {
        SplitHandle(self.tracker.clone())
    }

    /// The possibly split-shrunk unit this reader still owns.
    pub fn current_unit(&self) -> WorkUnit {
        self.tracker.current_unit()
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Time since the row stream was opened.
    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Releases the row stream and marks the unit done. Pending splits
    /// against this reader fail from now on. Idempotent.
    pub fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.finish(Phase::Closed);
        self.current = None;

        #[cfg(feature = "tracing")]
        {
            let elapsed = self.elapsed();
            let secs = elapsed.as_secs_f64();
            let rate = if secs > 0.0 {
                self.rows_read as f64 / secs
            } else {
                0.0
            };
            tracing::info!(
                table = %self.table,
                unit = %self.tracker.current_unit(),
                rows = self.rows_read,
                elapsed_ms = elapsed.as_millis() as u64,
                rows_per_sec = rate,
                "closed scan reader"
            );
        }
    }

    fn open(&mut self) -> Result<()> {
        let range = self.tracker.current_unit().range;
        #[cfg(feature = "tracing")]
        tracing::debug!(table = %self.table, %range, "opening row stream");
        self.started_at = Some(Instant::now());
        match self
            .source
            .open_row_stream(&self.table, &range, &self.options.filter)
        {
            Ok(stream) => {
                self.stream = Some(stream);
                self.phase = Phase::Streaming;
                Ok(())
            }
            Err(source) => {
                self.finish(Phase::Exhausted);
                Err(Error::Unavailable {
                    context: format!("opening row stream over {range} of table {}", self.table),
                    source,
                })
            }
        }
    }

    fn finish(&mut self, phase: Phase) {
        self.stream = None;
        self.tracker.mark_done();
        self.phase = phase;
    }
}

impl<A: ScanAdvancer> Drop for ScanReader<A> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<A: ScanAdvancer> fmt::Debug for ScanReader<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanReader")
            .field("table", &self.table)
            .field("cursor", &self.tracker.cursor())
            .field("phase", &self.phase)
            .field("rows_read", &self.rows_read)
            .finish_non_exhaustive()
    }
}
