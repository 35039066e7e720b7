use crate::{ByteKey, KeyRange, WorkUnit};

/// Caps the number of work units by merging contiguous runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitReducer {
    ceiling: usize,
}

impl SplitReducer {
    /// A zero ceiling is treated as one.
    pub const fn new(ceiling: usize) -> Self {
        Self {
            ceiling: if ceiling == 0 { 1 } else { ceiling },
        }
    }

    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Returns at most `ceiling` units. Input within the ceiling is returned
    /// unchanged; otherwise runs of `ceil(len / ceiling)` consecutive units
    /// are merged, summing their sizes.
    ///
    /// Expects units in key order, as produced by [`split`](crate::split).
    pub fn reduce(&self, units: Vec<WorkUnit>) -> Vec<WorkUnit> {
        if units.len() <= self.ceiling {
            return units;
        }
        let per_run = units.len().div_ceil(self.ceiling);
        let reduced: Vec<WorkUnit> = units.chunks(per_run).filter_map(merge).collect();

        #[cfg(feature = "tracing")]
        tracing::info!(
            before = units.len(),
            after = reduced.len(),
            ceiling = self.ceiling,
            "reduced work units"
        );
        reduced
    }
}

/// Merges a run into one unit spanning the lowest start to the highest end.
fn merge(run: &[WorkUnit]) -> Option<WorkUnit> {
    let first = run.first()?;
    let mut start = first.range.start();
    let mut end = first.range.end();
    let mut size = 0_u64;
    for unit in run {
        start = start.min(unit.range.start());
        if !end.is_empty() && (unit.range.end().is_empty() || unit.range.end() > end) {
            end = unit.range.end();
        }
        size = size.saturating_add(unit.estimated_size_bytes);
    }
    let range = KeyRange::new_unchecked(ByteKey::clone(start), ByteKey::clone(end));
    Some(WorkUnit::new(range, size))
}
