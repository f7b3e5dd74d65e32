//! Error types for identifier generation.
//!
//! Two layers are kept apart:
//!
//! - [`StoreError`] is what a [`SequenceStore`](crate::SequenceStore) reports
//!   for a single transaction attempt.
//! - [`Error`] is what crosses the component boundary. Transient store
//!   outcomes are folded into [`Error::RetryableConflict`], which the
//!   [`ConflictPolicy`](crate::ConflictPolicy) absorbs. Callers only ever see
//!   it wrapped in [`Error::ExhaustedRetries`].

use core::time::Duration;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Outcome of a failed transaction attempt against a counter store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A write-write race: serialization failure, deadlock or lock contention.
    #[error("serialization conflict: {0}")]
    Conflict(String),

    /// The safety-net check found a business record already carrying the
    /// identifier that was about to be issued.
    #[error("identifier {identifier} is already in use")]
    Collision { identifier: String },

    /// The attempt did not acquire or complete its transaction in time.
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),

    /// The store cannot be reached or is unusable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns `true` when repeating the whole attempt may succeed without any
    /// side effects from the failed one.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::Collision { .. } | Self::Timeout(_)
        )
    }
}

/// All errors produced by identifier generation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A transient failure for a single attempt. Absorbed by the retry policy.
    #[error("retryable conflict: {0}")]
    RetryableConflict(#[source] StoreError),

    /// Every allowed attempt failed with a retryable conflict.
    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: StoreError,
    },

    /// A batch size outside `1..=max`. Rejected before any transaction opens.
    #[error("batch count {count} is outside 1..={max}")]
    InvalidCount { count: usize, max: usize },

    /// The configured tail width cannot hold the sequence value.
    #[error("sequence value {value} does not fit in {width} digits")]
    FormatOverflow { value: u64, width: usize },

    /// The counter store could not be reached. Never retried here.
    #[error("sequence store unavailable")]
    StoreUnavailable(#[source] StoreError),

    /// A [`GenerationConfig`](crate::GenerationConfig) failed validation.
    #[error("invalid generation config: {reason}")]
    InvalidConfig { reason: String },

    /// Text that does not follow the `PREFIX + YYYYMMDD + tail` layout.
    #[error("malformed identifier {identifier:?}: {reason}")]
    MalformedIdentifier { identifier: String, reason: String },
}

impl Error {
    /// Returns `true` for failures the retry policy should absorb.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableConflict(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        if err.is_retryable() {
            Self::RetryableConflict(err)
        } else {
            Self::StoreUnavailable(err)
        }
    }
}
