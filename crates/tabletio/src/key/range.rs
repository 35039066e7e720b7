use super::interpolate;
use crate::{ByteKey, Error, Result};
use core::fmt;

/// A half-open row-key range `[start, end)`.
///
/// An empty `start` is unbounded below, an empty `end` is unbounded above.
/// Unless `end` is empty, `start < end` always holds, so a `KeyRange` is never
/// empty.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyRange {
    start: ByteKey,
    end: ByteKey,
}

impl KeyRange {
    /// The whole keyspace.
    pub const ALL: Self = Self {
        start: ByteKey::EMPTY,
        end: ByteKey::EMPTY,
    };

    /// Creates a range, rejecting `start >= end` for a bounded `end`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRange`] when the keys are out of order.
    pub fn new(start: impl Into<ByteKey>, end: impl Into<ByteKey>) -> Result<Self> {
        let start = start.into();
        let end = end.into();
        if !end.is_empty() && start >= end {
            return Err(Error::malformed(&start, &end, "keys not in order"));
        }
        Ok(Self { start, end })
    }

    pub(crate) fn new_unchecked(start: ByteKey, end: ByteKey) -> Self {
        debug_assert!(end.is_empty() || start < end, "[{start}, {end}) out of order");
        Self { start, end }
    }

    /// `[start, +inf)`
    pub fn starting_at(start: impl Into<ByteKey>) -> Self {
        Self {
            start: start.into(),
            end: ByteKey::EMPTY,
        }
    }

    pub const fn start(&self) -> &ByteKey {
        &self.start
    }

    pub const fn end(&self) -> &ByteKey {
        &self.end
    }

    pub fn is_unbounded_above(&self) -> bool {
        self.end.is_empty()
    }

    pub fn is_unbounded_below(&self) -> bool {
        self.start.is_empty()
    }

    pub fn contains(&self, key: &ByteKey) -> bool {
        *key >= self.start && (self.end.is_empty() || *key < self.end)
    }

    /// Returns `true` if `region` shares at least one key with `self`.
    pub fn intersects(&self, region: &KeyRange) -> bool {
        (self.start.is_empty() || region.end.is_empty() || self.start < region.end)
            && (self.end.is_empty() || self.end > region.start)
    }

    /// Clips `region` to `self`, or `None` when they do not overlap.
    pub fn intersect(&self, region: &KeyRange) -> Option<KeyRange> {
        if !self.intersects(region) {
            return None;
        }
        // The empty key already sorts first, so `max` handles open starts.
        let start = (&self.start).max(&region.start).clone();
        let end = match (self.end.is_empty(), region.end.is_empty()) {
            (true, _) => region.end.clone(),
            (false, true) => self.end.clone(),
            (false, false) => (&self.end).min(&region.end).clone(),
        };
        (end.is_empty() || start < end).then(|| Self::new_unchecked(start, end))
    }

    /// Returns the key at `fraction` of the way through this range, using
    /// lexicographic byte interpolation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRange`] if `fraction` is outside `[0, 1)` or
    /// the range is too narrow to interpolate.
    pub fn interpolate_key(&self, fraction: f64) -> Result<ByteKey> {
        interpolate::interpolate(&self.start, &self.end, fraction)
    }

    /// Estimates the fraction of this range that lies before `key`.
    ///
    /// This is a best-effort estimate that assumes keys are uniformly
    /// distributed, which is rarely true.
    pub fn estimate_fraction_for_key(&self, key: &ByteKey) -> f64 {
        interpolate::fraction_of(&self.start, &self.end, key)
    }

    /// Divides the range into `count` contiguous sub-ranges of equal
    /// lexicographic width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRange`] if the range cannot be divided into
    /// `count` non-empty parts.
    pub fn split_evenly(&self, count: usize) -> Result<Vec<KeyRange>> {
        let boundaries = interpolate::split_evenly(&self.start, &self.end, count)?;
        Ok(boundaries
            .windows(2)
            .map(|w| Self::new_unchecked(w[0].clone(), w[1].clone()))
            .collect())
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "['{}', '{}')", self.start, self.end)
    }
}

impl fmt::Debug for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
