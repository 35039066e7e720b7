use crate::{Error, Result};

pub const DEFAULT_MAX_INFLIGHT_RPCS: usize = 10;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Validated mutation dispatch limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriterConfig {
    max_inflight_rpcs: usize,
    max_batch_size: usize,
}

impl WriterConfig {
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder {
            max_inflight_rpcs: DEFAULT_MAX_INFLIGHT_RPCS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Admission ceiling per destination.
    pub const fn max_inflight_rpcs(&self) -> usize {
        self.max_inflight_rpcs
    }

    /// Mutations per batch call.
    pub const fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_inflight_rpcs: DEFAULT_MAX_INFLIGHT_RPCS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WriterConfigBuilder {
    max_inflight_rpcs: usize,
    max_batch_size: usize,
}

impl WriterConfigBuilder {
    #[must_use]
    pub const fn max_inflight_rpcs(mut self, max_inflight_rpcs: usize) -> Self {
        self.max_inflight_rpcs = max_inflight_rpcs;
        self
    }

    #[must_use]
    pub const fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if either limit is zero.
    pub fn build(self) -> Result<WriterConfig> {
        if self.max_inflight_rpcs == 0 {
            return Err(Error::config("max in-flight RPCs must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(Error::config("max batch size must be positive"));
        }
        Ok(WriterConfig {
            max_inflight_rpcs: self.max_inflight_rpcs,
            max_batch_size: self.max_batch_size,
        })
    }
}
