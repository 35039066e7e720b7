use crate::KeyRange;
use core::fmt;

/// A contiguous key range assigned as one unit of parallel work.
///
/// Work units are immutable values. A mid-scan split replaces the unit held by
/// a reader wholesale and hands out the residual as a new unit.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkUnit {
    pub range: KeyRange,
    /// Guesstimate from sampled offsets. It can be far off, especially when
    /// the unit was produced by interpolation.
    pub estimated_size_bytes: u64,
}

impl WorkUnit {
    pub const fn new(range: KeyRange, estimated_size_bytes: u64) -> Self {
        Self {
            range,
            estimated_size_bytes,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Split start: '{}', end: '{}', size: {}",
            self.range.start(),
            self.range.end(),
            self.estimated_size_bytes
        )
    }
}

impl fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkUnit({}, {}B)", self.range, self.estimated_size_bytes)
    }
}
