use crate::{ByteKey, Error, Result, SampleSource, TableRef};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// A server-reported row key with the approximate number of table bytes that
/// sort before it.
///
/// An empty `row_key` marks the end of the table.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleEntry {
    pub row_key: ByteKey,
    pub offset_bytes: u64,
}

impl SampleEntry {
    pub fn new(row_key: impl Into<ByteKey>, offset_bytes: u64) -> Self {
        Self {
            row_key: row_key.into(),
            offset_bytes,
        }
    }
}

enum CacheState {
    NotFetched,
    Fetching,
    Fetched(Arc<[SampleEntry]>),
}

/// Fetches the sample keys of one table at most once and shares the result.
///
/// The first caller performs the remote call. Concurrent callers block on the
/// same in-flight fetch instead of issuing their own. A failed fetch is not
/// cached: waiters wake up and one of them retries.
pub struct SampleKeyProvider {
    table: TableRef,
    source: Arc<dyn SampleSource>,
    state: Mutex<CacheState>,
    fetched: Condvar,
}

impl SampleKeyProvider {
    pub fn new(table: TableRef, source: Arc<dyn SampleSource>) -> Self {
        Self {
            table,
            source,
            state: Mutex::new(CacheState::NotFetched),
            fetched: Condvar::new(),
        }
    }

    /// Creates a provider whose samples are already known. No remote call is
    /// ever made.
    pub fn with_samples(
        table: TableRef,
        source: Arc<dyn SampleSource>,
        samples: impl Into<Arc<[SampleEntry]>>,
    ) -> Self {
        Self {
            table,
            source,
            state: Mutex::new(CacheState::Fetched(samples.into())),
            fetched: Condvar::new(),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Returns the cached samples, fetching them on first access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the sampling call fails.
    pub fn sample_keys(&self) -> Result<Arc<[SampleEntry]>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                CacheState::Fetched(samples) => return Ok(samples.clone()),
                CacheState::Fetching => self.fetched.wait(&mut state),
                CacheState::NotFetched => break,
            }
        }
        *state = CacheState::Fetching;
        drop(state);

        let guard = FetchGuard { provider: self };
        #[cfg(feature = "tracing")]
        tracing::debug!(table = %self.table, "fetching sample row keys");
        let fetched = self.source.fetch_samples(&self.table);
        guard.complete(fetched.map(Arc::from))
    }

    /// Returns `true` once samples are cached.
    pub fn is_fetched(&self) -> bool {
        matches!(*self.state.lock(), CacheState::Fetched(_))
    }
}

// Resets the cache to `NotFetched` if the fetching thread unwinds, so waiters
// are not parked forever.
struct FetchGuard<'a> {
    provider: &'a SampleKeyProvider,
}

impl FetchGuard<'_> {
    fn complete(
        self,
        fetched: core::result::Result<Arc<[SampleEntry]>, crate::RemoteError>,
    ) -> Result<Arc<[SampleEntry]>> {
        let provider = self.provider;
        core::mem::forget(self);

        let mut state = provider.state.lock();
        let result = match fetched {
            Ok(samples) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(table = %provider.table, samples = samples.len(), "cached sample row keys");
                *state = CacheState::Fetched(samples.clone());
                Ok(samples)
            }
            Err(source) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(table = %provider.table, error = %source, "sampling row keys failed");
                *state = CacheState::NotFetched;
                Err(Error::Unavailable {
                    context: format!("sampling row keys of table {}", provider.table),
                    source,
                })
            }
        };
        drop(state);
        provider.fetched.notify_all();
        result
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        *self.provider.state.lock() = CacheState::NotFetched;
        self.provider.fetched.notify_all();
    }
}
