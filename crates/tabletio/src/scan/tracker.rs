use crate::{ByteKey, Error, KeyRange, Result, WorkUnit};
use parking_lot::Mutex;

/// Splits closer than this to the start of a unit are refused.
pub const MIN_SPLIT_FRACTION: f64 = 0.01;
/// Splits closer than this to the end of a unit are refused.
pub const MAX_SPLIT_FRACTION: f64 = 0.99;

/// Snapshot of a reader's position within its unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanCursor {
    pub range: KeyRange,
    pub consumed_key: Option<ByteKey>,
    pub done: bool,
}

struct TrackerState {
    cursor: ScanCursor,
    estimated_size_bytes: u64,
}

/// Tracks consumption of one work unit and splits off its unread tail.
///
/// The owning reader records every delivered key; a controller may concurrently
/// query progress or request a split. Both go through one lock, so a split
/// boundary is always strictly above the last key delivered to the caller.
pub struct RangeTracker {
    state: Mutex<TrackerState>,
}

impl RangeTracker {
    pub fn new(unit: WorkUnit) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                cursor: ScanCursor {
                    range: unit.range,
                    consumed_key: None,
                    done: false,
                },
                estimated_size_bytes: unit.estimated_size_bytes,
            }),
        }
    }

    /// Records `key` as delivered.
    ///
    /// Returns `Ok(false)` and marks the tracker done when `key` is at or past
    /// the current end, which after a split means the residual has been
    /// reached. Also returns `Ok(false)` once done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrderKey`] if `key` sorts below the unit start or
    /// below the last recorded key.
    pub fn record_consumed(&self, key: &ByteKey) -> Result<bool> {
        let mut state = self.state.lock();
        let cursor = &mut state.cursor;
        if cursor.done {
            return Ok(false);
        }
        let last = cursor.consumed_key.as_ref().unwrap_or(cursor.range.start());
        if key < last {
            return Err(Error::OutOfOrderKey {
                key: key.clone(),
                last: last.clone(),
            });
        }
        if !cursor.range.is_unbounded_above() && key >= cursor.range.end() {
            cursor.done = true;
            return Ok(false);
        }
        cursor.consumed_key = Some(key.clone());
        Ok(true)
    }

    /// Idempotent.
    pub fn mark_done(&self) {
        self.state.lock().cursor.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().cursor.done
    }

    /// Estimated fraction of the current range already delivered.
    ///
    /// `1.0` exactly when done, strictly below otherwise.
    pub fn fraction_consumed(&self) -> f64 {
        let state = self.state.lock();
        let cursor = &state.cursor;
        if cursor.done {
            return 1.0;
        }
        match &cursor.consumed_key {
            None => 0.0,
            Some(key) => cursor
                .range
                .estimate_fraction_for_key(key)
                .min(1.0 - f64::EPSILON),
        }
    }

    /// Shrinks the current unit to `[start, split_key)` and returns
    /// `[split_key, end)` as an independent residual unit.
    ///
    /// Returns `None`, leaving the tracker untouched, when `fraction` is
    /// outside `[0.01, 0.99]`, the tracker is done, interpolation fails, or
    /// the split key is not strictly above the last consumed key.
    pub fn try_split_at_fraction(&self, fraction: f64) -> Option<WorkUnit> {
        if !(MIN_SPLIT_FRACTION..=MAX_SPLIT_FRACTION).contains(&fraction) {
            #[cfg(feature = "tracing")]
            tracing::debug!(fraction, "refusing split outside [0.01, 0.99]");
            return None;
        }
        let mut state = self.state.lock();
        if state.cursor.done {
            return None;
        }
        let range = &state.cursor.range;
        let split_key = match range.interpolate_key(fraction) {
            Ok(key) => key,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%range, fraction, error = %_err, "refusing split");
                return None;
            }
        };
        let below_position = state
            .cursor
            .consumed_key
            .as_ref()
            .is_some_and(|consumed| split_key <= *consumed);
        if split_key <= *range.start()
            || below_position
            || (!range.is_unbounded_above() && split_key >= *range.end())
        {
            #[cfg(feature = "tracing")]
            tracing::debug!(%range, %split_key, "refusing split at or below consumed position");
            return None;
        }

        let size = state.estimated_size_bytes;
        let primary_size = ((size as f64 * fraction) as u64).min(size);
        let primary = KeyRange::new_unchecked(range.start().clone(), split_key.clone());
        let residual = KeyRange::new_unchecked(split_key, range.end().clone());

        #[cfg(feature = "tracing")]
        tracing::info!(%primary, %residual, fraction, "split work unit");
        state.cursor.range = primary;
        state.estimated_size_bytes = primary_size;
        Some(WorkUnit::new(residual, size - primary_size))
    }

    /// The unit this tracker still owns.
    pub fn current_unit(&self) -> WorkUnit {
        let state = self.state.lock();
        WorkUnit::new(state.cursor.range.clone(), state.estimated_size_bytes)
    }

    pub fn cursor(&self) -> ScanCursor {
        self.state.lock().cursor.clone()
    }
}
