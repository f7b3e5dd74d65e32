#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    CounterKey, DateSource, Error, GenerationConfig, Identifier, Result, SequenceGenerator,
    SequenceStore, classify_error, generator::ensure_unused,
};

/// Largest number of identifiers one batch call may reserve.
pub const MAX_BATCH_SIZE: usize = 100;

impl<S, D> SequenceGenerator<S, D>
where
    S: SequenceStore,
    D: DateSource,
{
    /// Reserves `count` consecutive identifiers for `config` in one
    /// transaction and returns them in ascending order.
    ///
    /// The counter is advanced by `count` exactly once, so the run is gap-free
    /// even while other single or batch calls race on the same key. Every
    /// identifier in the run passes the same safety-net check as
    /// [`Self::generate`]; one collision rolls back the whole batch.
    ///
    /// ```
    /// use docseq::{DateKey, FixedDate, GenerationConfig, MemoryStore, SequenceGenerator};
    ///
    /// let day = DateKey::from_ymd(2025, 1, 19).unwrap();
    /// let generator = SequenceGenerator::with_date_source(MemoryStore::new(), FixedDate::new(day));
    /// let ids = generator.generate_batch(&GenerationConfig::return_order(), 3).unwrap();
    ///
    /// assert_eq!(ids, ["RO202501190001", "RO202501190002", "RO202501190003"]);
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCount`] if `count` is outside `1..=`[`MAX_BATCH_SIZE`],
    /// before the store is touched; otherwise as [`Self::generate`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(sequence_type = config.sequence_type(), count))
    )]
    pub fn generate_batch(&self, config: &GenerationConfig, count: usize) -> Result<Vec<Identifier>> {
        check_count(count)?;
        let ids = self
            .policy()
            .execute(|_| self.try_generate_batch(config, count), classify_error)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            first = %ids.first().map_or("", Identifier::as_str),
            last = %ids.last().map_or("", Identifier::as_str),
            "issued batch"
        );

        Ok(ids)
    }

    /// A single attempt of [`Self::generate_batch`], without retries.
    ///
    /// # Errors
    ///
    /// Transient failures surface as [`Error::RetryableConflict`].
    pub fn try_generate_batch(
        &self,
        config: &GenerationConfig,
        count: usize,
    ) -> Result<Vec<Identifier>> {
        check_count(count)?;
        let key = CounterKey::new(config.sequence_type(), self.date_source().today());
        self.store().allocate(
            &key,
            count as u64,
            self.timeouts().batch,
            |allocation, lookup| {
                allocation
                    .values()
                    .map(|seq| {
                        let id = config.format(key.date_key, seq)?;
                        ensure_unused(config, lookup, &id)?;
                        Ok(id)
                    })
                    .collect()
            },
        )
    }
}

fn check_count(count: usize) -> Result<()> {
    if (1..=MAX_BATCH_SIZE).contains(&count) {
        Ok(())
    } else {
        Err(Error::InvalidCount {
            count,
            max: MAX_BATCH_SIZE,
        })
    }
}
