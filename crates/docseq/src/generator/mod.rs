//! Transactional identifier generation.
//!
//! [`SequenceGenerator::generate`] issues one identifier per call and
//! [`SequenceGenerator::generate_batch`] a contiguous run of them. Each
//! attempt computes today's [`DateKey`], advances the `(sequence_type,
//! date_key)` counter inside a single store transaction, formats the reserved
//! values, checks them against known business records, and commits. Retryable
//! failures are absorbed by the generator's [`ConflictPolicy`].

mod batch;

use core::time::Duration;

use chrono::{DateTime, Utc};
#[cfg(feature = "tracing")]
use tracing::instrument;

pub use batch::*;

use crate::{
    ConflictPolicy, CounterKey, DateKey, DateSource, Error, GenerationConfig, Identifier,
    IdentifierLookup, Result, SequenceStore, StoreError, UtcDate, classify_error,
    is_sequence_type,
};

/// Per-attempt transaction timeouts. A timed-out attempt counts as a
/// retryable conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub single: Duration,
    pub batch: Duration,
}

impl Timeouts {
    pub const DEFAULT_SINGLE: Duration = Duration::from_secs(10);
    pub const DEFAULT_BATCH: Duration = Duration::from_secs(15);

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either timeout is zero.
    pub fn new(single: Duration, batch: Duration) -> Result<Self> {
        if single.is_zero() || batch.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "transaction timeouts must be positive".to_string(),
            });
        }
        Ok(Self { single, batch })
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            single: Self::DEFAULT_SINGLE,
            batch: Self::DEFAULT_BATCH,
        }
    }
}

/// Read-only statistics for today's counter of one sequence type.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SequenceStats {
    pub sequence_type: String,
    pub date_key: DateKey,
    /// Values handed out today. Zero if nothing was issued yet.
    pub total_issued_today: u64,
    /// Last counter update, `None` if the row does not exist yet.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Generates unique, sequential, human-readable identifiers of the form
/// `PREFIX + YYYYMMDD + zero-padded tail`.
///
/// The generator holds no counter state of its own: uniqueness comes entirely
/// from the store's transactional increment, so any number of generators,
/// threads and processes may share one store.
///
/// ```
/// use docseq::{DateKey, FixedDate, GenerationConfig, MemoryStore, SequenceGenerator};
///
/// let day = DateKey::from_ymd(2025, 1, 19).unwrap();
/// let generator = SequenceGenerator::with_date_source(MemoryStore::new(), FixedDate::new(day));
/// let config = GenerationConfig::sales_order();
///
/// assert_eq!(generator.generate(&config).unwrap(), "SO202501190001");
/// assert_eq!(generator.generate(&config).unwrap(), "SO202501190002");
/// ```
pub struct SequenceGenerator<S, D = UtcDate> {
    store: S,
    dates: D,
    policy: ConflictPolicy,
    timeouts: Timeouts,
}

impl<S> SequenceGenerator<S>
where
    S: SequenceStore,
{
    /// A generator keyed on the UTC wall-clock date with default policy and
    /// timeouts.
    pub fn new(store: S) -> Self {
        Self::with_date_source(store, UtcDate)
    }
}

impl<S, D> SequenceGenerator<S, D>
where
    S: SequenceStore,
    D: DateSource,
{
    pub fn with_date_source(store: S, dates: D) -> Self {
        Self {
            store,
            dates,
            policy: ConflictPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn date_source(&self) -> &D {
        &self.dates
    }

    pub const fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    pub const fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Issues the next identifier for `config` on today's counter.
    ///
    /// # Errors
    ///
    /// - [`Error::ExhaustedRetries`] when every attempt hit a conflict,
    ///   timeout or safety-net collision.
    /// - [`Error::StoreUnavailable`] as soon as the store fails for a
    ///   non-transient reason.
    /// - [`Error::FormatOverflow`] when today's counter no longer fits
    ///   `config.number_length()` digits. Nothing is consumed.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(sequence_type = config.sequence_type()))
    )]
    pub fn generate(&self, config: &GenerationConfig) -> Result<Identifier> {
        let id = self
            .policy
            .execute(|_| self.try_generate(config), classify_error)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(identifier = %id, "issued identifier");

        Ok(id)
    }

    /// A single attempt of [`Self::generate`], without retries.
    ///
    /// # Errors
    ///
    /// Transient failures surface as [`Error::RetryableConflict`].
    pub fn try_generate(&self, config: &GenerationConfig) -> Result<Identifier> {
        let key = CounterKey::new(config.sequence_type(), self.dates.today());
        self.store
            .allocate(&key, 1, self.timeouts.single, |allocation, lookup| {
                let id = config.format(key.date_key, allocation.last)?;
                ensure_unused(config, lookup, &id)?;
                Ok(id)
            })
    }

    /// Reads today's counter for `sequence_type` without mutating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid sequence type, or the
    /// store's error if the row cannot be read.
    pub fn statistics(&self, sequence_type: &str) -> Result<SequenceStats> {
        if !is_sequence_type(sequence_type) {
            return Err(Error::InvalidConfig {
                reason: format!("invalid sequence type {sequence_type:?}"),
            });
        }
        let key = CounterKey::new(sequence_type, self.dates.today());
        let snapshot = self.store.snapshot(&key)?;
        Ok(SequenceStats {
            sequence_type: key.sequence_type,
            date_key: key.date_key,
            total_issued_today: snapshot.as_ref().map_or(0, |s| s.current_sequence),
            last_updated: snapshot.map(|s| s.updated_at),
        })
    }
}

/// Safety-net check: refuses to commit an identifier a business record
/// already carries.
pub(crate) fn ensure_unused(
    config: &GenerationConfig,
    lookup: &dyn IdentifierLookup,
    id: &Identifier,
) -> Result<()> {
    if lookup.exists(config.sequence_type(), id.as_str())? {
        #[cfg(feature = "tracing")]
        tracing::warn!(identifier = %id, "identifier already used by a business record");

        return Err(StoreError::Collision {
            identifier: id.to_string(),
        }
        .into());
    }
    Ok(())
}
