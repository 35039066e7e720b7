//! Contracts for the remote collaborators this crate drives.
//!
//! Three calls are consumed: sampling row keys ([`SampleSource`]), streaming
//! rows over a key range ([`RowSource`]) and sending a batch of mutations
//! ([`MutationSink`]). Retry policy, credentials and wire encoding all live
//! behind these traits.

use crate::{ByteKey, Error, KeyRange, Mutation, RemoteError, Result, SampleEntry};
use bytes::Bytes;
use core::fmt;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Longest accepted table identifier, in bytes.
pub const MAX_TABLE_ID_LEN: usize = 50;

/// Identifier of a destination table.
///
/// Valid identifiers match `[_a-zA-Z0-9][-_.a-zA-Z0-9]*` and are at most
/// [`MAX_TABLE_ID_LEN`] bytes long.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableRef(Arc<str>);

impl TableRef {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `id` is not a valid table
    /// identifier.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        let mut chars = id.chars();
        let Some(first) = chars.next() else {
            return Err(Error::config("table id must not be empty"));
        };
        if id.len() > MAX_TABLE_ID_LEN {
            return Err(Error::config(format!(
                "table id '{id}' exceeds {MAX_TABLE_ID_LEN} bytes"
            )));
        }
        if !(first.is_ascii_alphanumeric() || first == '_')
            || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::config(format!("invalid table id '{id}'")));
        }
        Ok(Self(Arc::from(id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef({})", self.0)
    }
}

/// One versioned cell of a row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub family: String,
    pub qualifier: Bytes,
    pub timestamp_micros: i64,
    pub value: Bytes,
}

/// A row as delivered by a row stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub key: ByteKey,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(key: impl Into<ByteKey>, cells: Vec<Cell>) -> Self {
        Self {
            key: key.into(),
            cells,
        }
    }

    /// Approximate stored size: key plus every cell's qualifier and value.
    pub fn size_bytes(&self) -> u64 {
        let cells: usize = self
            .cells
            .iter()
            .map(|c| c.family.len() + c.qualifier.len() + c.value.len() + 8)
            .sum();
        (self.key.len() + cells) as u64
    }
}

/// Server-side row filter forwarded untouched to the row stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RowFilter {
    #[default]
    PassAll,
    /// Keep only cells of this column family.
    Family(String),
    /// Keep at most this many cells per row.
    CellsPerRowLimit(usize),
    /// Apply each filter in order.
    Chain(Vec<RowFilter>),
}

impl RowFilter {
    /// Applies the filter to one row. Rows left without cells are dropped.
    pub fn apply(&self, mut row: Row) -> Option<Row> {
        match self {
            Self::PassAll => {}
            Self::Family(family) => row.cells.retain(|c| c.family == *family),
            Self::CellsPerRowLimit(limit) => row.cells.truncate(*limit),
            Self::Chain(filters) => {
                for filter in filters {
                    row = filter.apply(row)?;
                }
            }
        }
        (!row.cells.is_empty()).then_some(row)
    }
}

/// Lazily produced rows, blocking on `next()`.
pub type RowStream = Box<dyn Iterator<Item = core::result::Result<Row, RemoteError>> + Send>;

/// Per-mutation outcome of one batch call, in submission order.
pub type BatchOutcome = core::result::Result<Vec<core::result::Result<(), RemoteError>>, RemoteError>;

/// Remote sampling call.
pub trait SampleSource: Send + Sync {
    /// Returns `(row key, cumulative byte offset)` samples ordered by key.
    ///
    /// A trailing sample with an empty key marks the end of the table.
    fn fetch_samples(&self, table: &TableRef) -> core::result::Result<Vec<SampleEntry>, RemoteError>;
}

/// Remote row streaming call.
pub trait RowSource: Send + Sync {
    /// Opens a stream over `range`, in ascending key order.
    fn open_row_stream(
        &self,
        table: &TableRef,
        range: &KeyRange,
        filter: &RowFilter,
    ) -> core::result::Result<RowStream, RemoteError>;
}

/// Remote batched mutation call.
pub trait MutationSink: Send + Sync + 'static {
    /// Sends `mutations` in one call. `Ok` carries one result per mutation;
    /// `Err` means the whole call failed and nothing is known to be applied.
    fn send_batch(&self, table: &TableRef, mutations: Arc<[Mutation]>) -> BoxFuture<'static, BatchOutcome>;
}
