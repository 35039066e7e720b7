use std::collections::HashMap;
use tabletio::{MAX_SPLIT_FRACTION, MIN_SPLIT_FRACTION, SplitHandle, WorkUnit};

/// Splits the slowest running reader and hands out its unread tail.
#[derive(Clone, Copy, Debug)]
pub struct Rebalancer {
    fraction: f64,
}

impl Rebalancer {
    /// `fraction` is the share of a straggler's unread range to give away.
    pub const fn new(fraction: f64) -> Self {
        Self { fraction }
    }

    /// Picks the active reader with the least progress and splits it so that
    /// `fraction` of what it has not yet read becomes a new unit.
    ///
    /// Returns `None` when no reader accepts a split.
    pub fn rebalance(&self, active: &HashMap<u64, SplitHandle>) -> Option<(u64, WorkUnit)> {
        let mut candidates: Vec<(u64, f64, &SplitHandle)> = active
            .iter()
            .filter(|(_, handle)| !handle.is_done())
            .map(|(id, handle)| (*id, handle.fraction_consumed(), handle))
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        candidates.into_iter().find_map(|(id, consumed, handle)| {
            let at = self.split_point(consumed);
            let residual = handle.try_split(at)?;
            tracing::info!(unit = id, consumed, at, residual = %residual, "rebalanced straggler");
            Some((id, residual))
        })
    }

    /// Fraction of the reader's current range to split at.
    pub fn split_point(&self, consumed: f64) -> f64 {
        let keep = 1.0 - self.fraction;
        (consumed + (1.0 - consumed) * keep).clamp(MIN_SPLIT_FRACTION, MAX_SPLIT_FRACTION)
    }
}
