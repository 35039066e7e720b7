use crate::{ByteKey, Cell};
use bytes::Bytes;

/// What a mutation does to its row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationKind {
    /// Writes cells, overwriting any with the same family, qualifier and
    /// timestamp.
    Put { cells: Vec<Cell> },
    /// Deletes every version of one column.
    DeleteCells { family: String, qualifier: Bytes },
    /// Deletes every column of one family.
    DeleteFamily { family: String },
    DeleteRow,
    /// Adds `amount` to a big-endian `i64` counter cell.
    Increment {
        family: String,
        qualifier: Bytes,
        amount: i64,
    },
    /// Appends `value` to a cell.
    Append {
        family: String,
        qualifier: Bytes,
        value: Bytes,
    },
}

/// One row mutation bound for a destination table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub row_key: ByteKey,
    pub kind: MutationKind,
}

impl Mutation {
    pub fn new(row_key: impl Into<ByteKey>, kind: MutationKind) -> Self {
        Self {
            row_key: row_key.into(),
            kind,
        }
    }

    pub fn put(row_key: impl Into<ByteKey>, cells: Vec<Cell>) -> Self {
        Self::new(row_key, MutationKind::Put { cells })
    }

    pub fn delete_row(row_key: impl Into<ByteKey>) -> Self {
        Self::new(row_key, MutationKind::DeleteRow)
    }

    pub fn increment(
        row_key: impl Into<ByteKey>,
        family: impl Into<String>,
        qualifier: impl Into<Bytes>,
        amount: i64,
    ) -> Self {
        Self::new(
            row_key,
            MutationKind::Increment {
                family: family.into(),
                qualifier: qualifier.into(),
                amount,
            },
        )
    }

    pub fn append(
        row_key: impl Into<ByteKey>,
        family: impl Into<String>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self::new(
            row_key,
            MutationKind::Append {
                family: family.into(),
                qualifier: qualifier.into(),
                value: value.into(),
            },
        )
    }

    /// Returns `true` if applying this mutation twice has the same effect as
    /// applying it once.
    ///
    /// Puts and deletes are safe to resubmit after a failure. Increments and
    /// appends are not: the remote side may have applied them before the
    /// failure was reported.
    pub const fn is_idempotent(&self) -> bool {
        !matches!(
            self.kind,
            MutationKind::Increment { .. } | MutationKind::Append { .. }
        )
    }

    /// Approximate payload size.
    pub fn size_bytes(&self) -> usize {
        let body = match &self.kind {
            MutationKind::Put { cells } => cells
                .iter()
                .map(|c| c.family.len() + c.qualifier.len() + c.value.len() + 8)
                .sum(),
            MutationKind::DeleteCells { family, qualifier } => family.len() + qualifier.len(),
            MutationKind::DeleteFamily { family } => family.len(),
            MutationKind::DeleteRow => 0,
            MutationKind::Increment {
                family, qualifier, ..
            } => family.len() + qualifier.len() + 8,
            MutationKind::Append {
                family,
                qualifier,
                value,
            } => family.len() + qualifier.len() + value.len(),
        };
        self.row_key.len() + body
    }
}
