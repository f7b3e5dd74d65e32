use core::future::Future;
use std::sync::Arc;

use crate::{
    DateSource, Error, GenerationConfig, Identifier, Result, SequenceGenerator, SequenceStore,
    StoreError, classify_error,
    futures::{SleepProvider, TokioSleep},
};

/// Extension trait for generating identifiers from async code.
///
/// Each transactional attempt runs on Tokio's blocking pool, since store
/// transactions block on locks and I/O. Between attempts the task sleeps
/// through the given [`SleepProvider`] instead of parking a thread, so
/// backoff does not starve the executor.
///
/// Implemented for `Arc<SequenceGenerator<..>>` so the attempt can outlive
/// the borrow of the caller.
pub trait SequenceGeneratorAsyncExt {
    /// Returns a future that resolves to the next identifier for `config`.
    ///
    /// # Errors
    ///
    /// As [`SequenceGenerator::generate`]. A blocking attempt that panics is
    /// reported as [`Error::StoreUnavailable`].
    fn generate_async<S>(
        &self,
        config: &GenerationConfig,
    ) -> impl Future<Output = Result<Identifier>> + Send
    where
        S: SleepProvider;

    /// Returns a future that resolves to `count` consecutive identifiers.
    ///
    /// # Errors
    ///
    /// As [`SequenceGenerator::generate_batch`].
    fn generate_batch_async<S>(
        &self,
        config: &GenerationConfig,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Identifier>>> + Send
    where
        S: SleepProvider;
}

impl<St, D> SequenceGeneratorAsyncExt for Arc<SequenceGenerator<St, D>>
where
    St: SequenceStore + Send + Sync + 'static,
    D: DateSource + Send + Sync + 'static,
{
    fn generate_async<S>(
        &self,
        config: &GenerationConfig,
    ) -> impl Future<Output = Result<Identifier>> + Send
    where
        S: SleepProvider,
    {
        let generator = Arc::clone(self);
        let config = Arc::new(config.clone());
        async move {
            let id = generator
                .policy()
                .execute_async::<S, _, _, _, _, _>(
                    |_| {
                        let generator = Arc::clone(&generator);
                        let config = Arc::clone(&config);
                        blocking(move || generator.try_generate(&config))
                    },
                    classify_error,
                )
                .await?;
            Ok(id)
        }
    }

    fn generate_batch_async<S>(
        &self,
        config: &GenerationConfig,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Identifier>>> + Send
    where
        S: SleepProvider,
    {
        let generator = Arc::clone(self);
        let config = Arc::new(config.clone());
        async move {
            // Rejected up front so an invalid count never reaches the pool.
            if !(1..=crate::MAX_BATCH_SIZE).contains(&count) {
                return Err(Error::InvalidCount {
                    count,
                    max: crate::MAX_BATCH_SIZE,
                });
            }
            let ids = generator
                .policy()
                .execute_async::<S, _, _, _, _, _>(
                    |_| {
                        let generator = Arc::clone(&generator);
                        let config = Arc::clone(&config);
                        blocking(move || generator.try_generate_batch(&config, count))
                    },
                    classify_error,
                )
                .await?;
            Ok(ids)
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::StoreUnavailable(StoreError::Unavailable(e.to_string())))?
}

/// Extension trait for generating identifiers on the
/// [`tokio`](https://docs.rs/tokio) runtime.
///
/// Uses [`TokioSleep`] as the sleep provider, so callers don't have to pick
/// one.
pub trait SequenceGeneratorAsyncTokioExt {
    /// # Errors
    ///
    /// As [`SequenceGeneratorAsyncExt::generate_async`].
    fn generate_async(
        &self,
        config: &GenerationConfig,
    ) -> impl Future<Output = Result<Identifier>> + Send;

    /// # Errors
    ///
    /// As [`SequenceGeneratorAsyncExt::generate_batch_async`].
    fn generate_batch_async(
        &self,
        config: &GenerationConfig,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Identifier>>> + Send;
}

impl<G> SequenceGeneratorAsyncTokioExt for G
where
    G: SequenceGeneratorAsyncExt,
{
    fn generate_async(
        &self,
        config: &GenerationConfig,
    ) -> impl Future<Output = Result<Identifier>> + Send {
        <Self as SequenceGeneratorAsyncExt>::generate_async::<TokioSleep>(self, config)
    }

    fn generate_batch_async(
        &self,
        config: &GenerationConfig,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Identifier>>> + Send {
        <Self as SequenceGeneratorAsyncExt>::generate_batch_async::<TokioSleep>(
            self, config, count,
        )
    }
}
