//! Output shapes of a scan.
//!
//! A reader is generic over a [`ScanAdvancer`], chosen at construction:
//! [`SingleRow`] yields one row per step, [`RowBatch`] up to `n` rows.

use crate::{Error, RangeTracker, Result, Row, RowStream};

/// Pulls the next output item from a row stream.
pub trait ScanAdvancer: Send {
    type Output: Send;

    /// Returns `None` at end of stream or once the tracker's boundary is
    /// reached.
    fn advance(&mut self, rows: &mut RowStream, tracker: &RangeTracker) -> Result<Option<Self::Output>>;

    /// Rows carried by one output item.
    fn row_count(output: &Self::Output) -> usize;
}

/// Pulls one row and records its key. Stream failures carry the range and last
/// consumed key of the unit.
pub(crate) fn next_row(rows: &mut RowStream, tracker: &RangeTracker) -> Result<Option<Row>> {
    match rows.next() {
        None => Ok(None),
        Some(Ok(row)) => Ok(tracker.record_consumed(&row.key)?.then_some(row)),
        Some(Err(source)) => {
            let cursor = tracker.cursor();
            let last = cursor
                .consumed_key
                .map_or_else(|| "<none>".to_string(), |key| key.to_string());
            Err(Error::Unavailable {
                context: format!("streaming rows of {} after key '{last}'", cursor.range),
                source,
            })
        }
    }
}

/// One row per step.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleRow;

impl ScanAdvancer for SingleRow {
    type Output = Row;

    fn advance(&mut self, rows: &mut RowStream, tracker: &RangeTracker) -> Result<Option<Row>> {
        next_row(rows, tracker)
    }

    fn row_count(_: &Row) -> usize {
        1
    }
}

/// Up to `size` rows per step. A batch ends early at end of stream or at a
/// split boundary; an empty batch is never returned.
#[derive(Clone, Copy, Debug)]
pub struct RowBatch {
    size: usize,
}

impl RowBatch {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::config("row batch size must be positive"));
        }
        Ok(Self { size })
    }

    pub const fn size(&self) -> usize {
        self.size
    }
}

impl ScanAdvancer for RowBatch {
    type Output = Vec<Row>;

    fn advance(&mut self, rows: &mut RowStream, tracker: &RangeTracker) -> Result<Option<Vec<Row>>> {
        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match next_row(rows, tracker)? {
                Some(row) => batch.push(row),
                None => break,
            }
        }
        Ok((!batch.is_empty()).then_some(batch))
    }

    fn row_count(batch: &Vec<Row>) -> usize {
        batch.len()
    }
}
