use core::future::Future;

use crate::{
    ConflictPolicy, Disposition, RetryError,
    futures::SleepProvider,
    policy::Step,
};

impl ConflictPolicy {
    /// The async counterpart of [`ConflictPolicy::execute`]: backs off with
    /// `S` instead of blocking the thread.
    ///
    /// # Errors
    ///
    /// As [`ConflictPolicy::execute`].
    pub async fn execute_async<S, T, E, F, Fut, C>(
        &self,
        mut op: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        S: SleepProvider,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Disposition,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => match self.next_step(attempt, error, &classify) {
                    Step::Stop(err) => return Err(err),
                    Step::Wait(delay) => S::sleep_for(delay).await,
                },
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{Error, StoreError, classify_error, futures::TokioSleep};

    #[tokio::test]
    async fn retries_then_gives_up() {
        let calls = AtomicU32::new(0);
        let policy =
            ConflictPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)).unwrap();

        let res: Result<(), _> = policy
            .execute_async::<TokioSleep, _, _, _, _, _>(
                |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                    async { Err(Error::from(StoreError::Conflict("busy".into()))) }
                },
                classify_error,
            )
            .await;

        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert!(matches!(res, Err(RetryError::Exhausted { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn fatal_error_stops_immediately() {
        let res: Result<(), _> = ConflictPolicy::default()
            .execute_async::<TokioSleep, _, _, _, _, _>(
                |attempt| async move {
                    Err(Error::StoreUnavailable(StoreError::Unavailable(format!(
                        "attempt {attempt}"
                    ))))
                },
                classify_error,
            )
            .await;
        assert!(matches!(res, Err(RetryError::Fatal { attempt: 1, .. })));
    }
}
