//! Sample-driven range splitting.
//!
//! Sample keys cut the table into regions `[prev_key, key)` whose size is the
//! difference of the cumulative offsets. Every region overlapping the user
//! range is clipped to it and, if larger than the desired unit size, divided
//! evenly by byte interpolation.

use crate::{
    ByteKey, DEFAULT_HARD_SPLIT_CEILING, Error, KeyRange, Result, SampleEntry, SplitOptions, WorkUnit,
};

/// One sample region with its byte delta.
struct Region {
    range: KeyRange,
    size_bytes: u64,
}

/// Walks consecutive samples as regions, skipping degenerate and out of
/// order ones. Stops after the terminal empty-key sample.
struct Regions<'a> {
    samples: core::slice::Iter<'a, SampleEntry>,
    prev_key: ByteKey,
    prev_offset: u64,
    reached_end: bool,
}

impl<'a> Regions<'a> {
    fn new(samples: &'a [SampleEntry]) -> Self {
        Self {
            samples: samples.iter(),
            prev_key: ByteKey::EMPTY,
            prev_offset: 0,
            reached_end: false,
        }
    }
}

impl Iterator for Regions<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        while !self.reached_end {
            let sample = self.samples.next()?;
            let key = &sample.row_key;
            if key.is_empty() {
                self.reached_end = true;
            } else if *key <= self.prev_key {
                // Equal keys describe an empty region; lower keys would
                // overlap regions already emitted.
                #[cfg(feature = "tracing")]
                if *key < self.prev_key {
                    tracing::debug!(%key, prev = %self.prev_key, "skipping out of order sample");
                }
                continue;
            }
            let size_bytes = sample.offset_bytes.saturating_sub(self.prev_offset);
            let start = core::mem::replace(&mut self.prev_key, key.clone());
            self.prev_offset = sample.offset_bytes;
            return Some(Region {
                range: KeyRange::new_unchecked(start, key.clone()),
                size_bytes,
            });
        }
        None
    }
}

/// Sums the byte deltas of every sample region overlapping `user_range`.
///
/// Regions are not clipped, so this is an upper bound.
pub fn estimated_size_bytes(samples: &[SampleEntry], user_range: &KeyRange) -> u64 {
    Regions::new(samples)
        .filter(|region| user_range.intersects(&region.range))
        .map(|region| region.size_bytes)
        .sum()
}

/// Plans work units over `user_range` in key order.
///
/// Units are contiguous, never overlap, and their union is exactly
/// `user_range`. No reduction or shuffling is applied here, see
/// [`SplitReducer`] and [`ScanPlanner`].
///
/// [`SplitReducer`]: crate::SplitReducer
/// [`ScanPlanner`]: crate::ScanPlanner
pub fn split(samples: &[SampleEntry], user_range: &KeyRange, options: &SplitOptions) -> Vec<WorkUnit> {
    let total = estimated_size_bytes(samples, user_range);
    let desired = options.effective_unit_size(total);
    let max_parts = options.hard_split_ceiling();

    let mut units = Vec::new();
    let mut regions = Regions::new(samples);
    for region in regions.by_ref() {
        if let Some(clipped) = user_range.intersect(&region.range) {
            units.extend(split_range(clipped, region.size_bytes, desired, max_parts));
        }
    }

    if !regions.reached_end {
        // Samples stopped short of the table end. Cover the rest with one
        // unit of unknown size.
        let start = (&regions.prev_key).max(user_range.start()).clone();
        let end = user_range.end().clone();
        if end.is_empty() || start < end {
            units.push(WorkUnit::new(KeyRange::new_unchecked(start, end), 0));
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        range = %user_range,
        total_bytes = total,
        unit_bytes = desired,
        units = units.len(),
        "planned splits"
    );
    units
}

/// Re-splits one planned unit by its own estimated size, into at most
/// [`DEFAULT_HARD_SPLIT_CEILING`] parts.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if `desired_unit_size_bytes` is zero.
pub fn split_unit(unit: &WorkUnit, desired_unit_size_bytes: u64) -> Result<Vec<WorkUnit>> {
    if desired_unit_size_bytes == 0 {
        return Err(Error::config("desired unit size must be positive"));
    }
    Ok(split_range(
        unit.range.clone(),
        unit.estimated_size_bytes,
        desired_unit_size_bytes,
        DEFAULT_HARD_SPLIT_CEILING,
    ))
}

/// Divides `range` into `ceil(size / desired)` even parts, never more than
/// `max_parts`. Ranges open above and ranges too narrow to interpolate are
/// kept whole.
fn split_range(range: KeyRange, size_bytes: u64, desired: u64, max_parts: usize) -> Vec<WorkUnit> {
    let wanted = size_bytes.div_ceil(desired);
    let count = usize::try_from(wanted).map_or(max_parts, |wanted| wanted.min(max_parts));
    if count < 2 || range.is_unbounded_above() {
        return vec![WorkUnit::new(range, size_bytes)];
    }
    #[cfg(feature = "tracing")]
    if wanted > count as u64 {
        tracing::debug!(%range, wanted, count, "capping region split count");
    }
    let parts = match range.split_evenly(count) {
        Ok(parts) => parts,
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%range, count, error = %_err, "interpolation failed, keeping region whole");
            return vec![WorkUnit::new(range, size_bytes)];
        }
    };

    let count = count as u64;
    let base = size_bytes / count;
    let remainder = size_bytes % count;
    parts
        .into_iter()
        .zip(0_u64..)
        .map(|(part, i)| WorkUnit::new(part, base + u64::from(i < remainder)))
        .collect()
}
