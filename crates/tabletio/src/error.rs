//! Error types for split planning, scanning and mutation dispatch.
//!
//! This module defines the central [`Error`] enum. Every failure that crosses
//! the crate boundary is one of these variants and carries enough structure
//! (range, key, mutation) for the caller to act on it.
//!
//! ## Error Cases
//! - `Unavailable`: a sampling or streaming call failed after the
//!   collaborator's own retries.
//! - `MalformedRange`: keys are out of order or could not be interpolated.
//!   Split planning recovers from this locally.
//! - `OutOfOrderKey`: a row stream went backwards. Terminal for the unit.
//! - `PartialMutationFailure`: some mutations were rejected by the remote
//!   service. Never retried here.
//! - `Configuration`: invalid sizes, limits or destination identifiers.
//! - `ReaderClosed`: the reader was used after `close()`.
//! - `WriterClosed`: a flush was attempted after the dispatcher was closed.

use crate::{ByteKey, Mutation, TableRef};
use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for `tabletio`.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A remote call failed after the collaborator's retry policy gave up.
    #[error("Unavailable: {context}: {source}")]
    Unavailable {
        context: String,
        #[source]
        source: RemoteError,
    },

    /// Start/end keys are out of order or interpolation between them failed.
    #[error("Malformed range [{start}, {end}): {reason}")]
    MalformedRange {
        start: ByteKey,
        end: ByteKey,
        reason: String,
    },

    /// A row stream delivered a key below a position already consumed.
    #[error("Out of order key {key} (last consumed {last})")]
    OutOfOrderKey { key: ByteKey, last: ByteKey },

    /// One or more mutations were rejected by the remote service.
    #[error("{0}")]
    PartialMutationFailure(MutationFailures),

    /// Invalid configuration value or destination identifier.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// The reader has already been closed.
    #[error("Reader is closed")]
    ReaderClosed,

    /// The dispatcher no longer admits batches for this destination.
    #[error("Writer is closed for table {0}")]
    WriterClosed(TableRef),
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(start: &ByteKey, end: &ByteKey, reason: impl Into<String>) -> Self {
        Self::MalformedRange {
            start: start.clone(),
            end: end.clone(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by an external collaborator (sampling, row stream or
/// mutation batch call).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
    retryable: bool,
}

impl RemoteError {
    /// A failure the remote service may accept on a later attempt.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will not go away by resubmitting (e.g. a rejected
    /// argument).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Hint from the remote side. Whether a retry is *safe* depends on the
    /// mutation kind, see [`FailedMutation::is_retry_safe`].
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// A single mutation the remote service rejected, with its original payload.
#[derive(Clone, Debug, PartialEq)]
pub struct FailedMutation {
    pub table: TableRef,
    pub mutation: Mutation,
    pub cause: RemoteError,
}

impl FailedMutation {
    /// Returns `true` when resubmitting this mutation cannot corrupt data.
    ///
    /// Puts and deletes may be replayed. Increments and appends may not: the
    /// remote side may already have applied them before reporting failure.
    pub fn is_retry_safe(&self) -> bool {
        self.mutation.is_idempotent() && self.cause.is_retryable()
    }
}

/// Every rejected mutation from a flush or drain, plus how many succeeded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationFailures {
    pub failed: Vec<FailedMutation>,
    pub succeeded: u64,
    /// Batches sent by the dispatcher so far.
    pub batches: u64,
}

impl MutationFailures {
    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    /// Mutations that the caller may resubmit without risk.
    pub fn retry_safe(&self) -> impl Iterator<Item = &FailedMutation> {
        self.failed.iter().filter(|f| f.is_retry_safe())
    }
}

impl fmt::Display for MutationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mutation(s) failed, {} succeeded",
            self.failed.len(),
            self.succeeded
        )?;
        if let Some(first) = self.failed.first() {
            write!(
                f,
                " (first: table {} row {}: {})",
                first.table, first.mutation.row_key, first.cause
            )?;
        }
        Ok(())
    }
}
