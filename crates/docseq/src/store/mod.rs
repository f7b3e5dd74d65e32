//! Durable keyed counters.
//!
//! A [`SequenceStore`] owns one counter row per `(sequence_type, date_key)`.
//! Rows are created lazily by the first allocation of the day, never
//! deleted, and only ever advanced through [`SequenceStore::allocate`], which
//! performs the increment and the caller's follow-up work inside a single
//! transaction.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use core::time::Duration;

use chrono::{DateTime, Utc};

pub use memory::*;
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
#[cfg(feature = "sqlite")]
pub use sqlite::*;

use crate::{DateKey, Result, StoreError};

/// Compound key of a counter row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    pub sequence_type: String,
    pub date_key: DateKey,
}

impl CounterKey {
    pub fn new(sequence_type: impl Into<String>, date_key: DateKey) -> Self {
        Self {
            sequence_type: sequence_type.into(),
            date_key,
        }
    }
}

/// The contiguous range of sequence values reserved by one allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// First reserved value (inclusive).
    pub first: u64,
    /// Last reserved value (inclusive); the counter's new `current_sequence`.
    pub last: u64,
}

impl Allocation {
    /// Derives the range from the counter value after an increment of `count`.
    pub const fn ending_at(last: u64, count: u64) -> Self {
        Self {
            first: last + 1 - count,
            last,
        }
    }

    /// Number of values in the range.
    pub const fn count(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn values(&self) -> core::ops::RangeInclusive<u64> {
        self.first..=self.last
    }
}

/// A read-only view of a counter row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub current_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only existence checks against business tables, evaluated inside the
/// allocation transaction.
///
/// Sequence types without a known business table always report `false`.
pub trait IdentifierLookup {
    /// Returns `true` if a business record of `sequence_type` already carries
    /// `identifier`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the lookup itself fails.
    fn exists(&self, sequence_type: &str, identifier: &str) -> Result<bool, StoreError>;
}

/// A lookup that knows no business tables.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLookup;

impl IdentifierLookup for NoLookup {
    fn exists(&self, _sequence_type: &str, _identifier: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// A transactional store of daily counters.
///
/// Implementations must make the increment atomic with respect to every other
/// allocation on the same key, including allocations from other processes:
/// either a single upsert-and-increment statement or a row lock held until
/// commit. Allocations on different keys are independent.
pub trait SequenceStore {
    /// Atomically advances the counter for `key` by `count`, creating it at
    /// zero first if it does not exist, then calls `finish` with the reserved
    /// range while the transaction is still open.
    ///
    /// The transaction commits only if `finish` returns `Ok`; on any error
    /// the counter is left exactly as it was. The whole attempt is bounded by
    /// `timeout`, after which [`StoreError::Timeout`] is reported.
    ///
    /// `count` is at least 1.
    ///
    /// # Errors
    ///
    /// Store failures surface through `From<StoreError> for Error`; errors
    /// from `finish` are passed through unchanged.
    fn allocate<T, F>(&self, key: &CounterKey, count: u64, timeout: Duration, finish: F) -> Result<T>
    where
        F: FnOnce(Allocation, &dyn IdentifierLookup) -> Result<T>;

    /// Reads a counter row without mutating it.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn snapshot(&self, key: &CounterKey) -> Result<Option<CounterSnapshot>, StoreError>;
}

impl<S: SequenceStore> SequenceStore for std::sync::Arc<S> {
    fn allocate<T, F>(&self, key: &CounterKey, count: u64, timeout: Duration, finish: F) -> Result<T>
    where
        F: FnOnce(Allocation, &dyn IdentifierLookup) -> Result<T>,
    {
        (**self).allocate(key, count, timeout, finish)
    }

    fn snapshot(&self, key: &CounterKey) -> Result<Option<CounterSnapshot>, StoreError> {
        (**self).snapshot(key)
    }
}

impl<S: SequenceStore> SequenceStore for &S {
    fn allocate<T, F>(&self, key: &CounterKey, count: u64, timeout: Duration, finish: F) -> Result<T>
    where
        F: FnOnce(Allocation, &dyn IdentifierLookup) -> Result<T>,
    {
        (**self).allocate(key, count, timeout, finish)
    }

    fn snapshot(&self, key: &CounterKey) -> Result<Option<CounterSnapshot>, StoreError> {
        (**self).snapshot(key)
    }
}
