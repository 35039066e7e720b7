use crate::{Error, Result};

/// Upper bound on the number of units planned purely from size. Keeps units
/// from becoming pathologically small on huge tables.
pub const DEFAULT_MAX_SIZE_SPLITS: u64 = 4_000;

/// Hard limit on the number of units handed downstream.
pub const DEFAULT_HARD_SPLIT_CEILING: usize = 15_360;

/// Validated split planning parameters.
///
/// # Example
/// ```
/// use tabletio::SplitOptions;
///
/// let options = SplitOptions::builder(64 << 20)
///     .hard_split_ceiling(1_000)
///     .build()
///     .unwrap();
/// assert_eq!(options.desired_unit_size_bytes(), 64 << 20);
/// assert!(SplitOptions::new(0).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitOptions {
    desired_unit_size_bytes: u64,
    max_size_splits: u64,
    hard_split_ceiling: usize,
}

impl SplitOptions {
    /// Options with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `desired_unit_size_bytes` is zero.
    pub fn new(desired_unit_size_bytes: u64) -> Result<Self> {
        Self::builder(desired_unit_size_bytes).build()
    }

    pub fn builder(desired_unit_size_bytes: u64) -> SplitOptionsBuilder {
        SplitOptionsBuilder {
            desired_unit_size_bytes,
            max_size_splits: DEFAULT_MAX_SIZE_SPLITS,
            hard_split_ceiling: DEFAULT_HARD_SPLIT_CEILING,
        }
    }

    pub const fn desired_unit_size_bytes(&self) -> u64 {
        self.desired_unit_size_bytes
    }

    pub const fn max_size_splits(&self) -> u64 {
        self.max_size_splits
    }

    pub const fn hard_split_ceiling(&self) -> usize {
        self.hard_split_ceiling
    }

    /// Unit size actually used for a table of `total_size_bytes`: never fewer
    /// bytes per unit than `total / max_size_splits`.
    pub fn effective_unit_size(&self, total_size_bytes: u64) -> u64 {
        (total_size_bytes / self.max_size_splits).max(self.desired_unit_size_bytes)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SplitOptionsBuilder {
    desired_unit_size_bytes: u64,
    max_size_splits: u64,
    hard_split_ceiling: usize,
}

impl SplitOptionsBuilder {
    #[must_use]
    pub const fn max_size_splits(mut self, max_size_splits: u64) -> Self {
        self.max_size_splits = max_size_splits;
        self
    }

    #[must_use]
    pub const fn hard_split_ceiling(mut self, hard_split_ceiling: usize) -> Self {
        self.hard_split_ceiling = hard_split_ceiling;
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any value is zero.
    pub fn build(self) -> Result<SplitOptions> {
        if self.desired_unit_size_bytes == 0 {
            return Err(Error::config("desired unit size must be positive"));
        }
        if self.max_size_splits == 0 {
            return Err(Error::config("max size splits must be positive"));
        }
        if self.hard_split_ceiling == 0 {
            return Err(Error::config("hard split ceiling must be positive"));
        }
        Ok(SplitOptions {
            desired_unit_size_bytes: self.desired_unit_size_bytes,
            max_size_splits: self.max_size_splits,
            hard_split_ceiling: self.hard_split_ceiling,
        })
    }
}
