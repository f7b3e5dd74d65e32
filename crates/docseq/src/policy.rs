use core::time::Duration;

use rand::Rng;

use crate::{Error, Result};

/// How the retry policy should treat a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Transient. Back off and try the whole operation again.
    Retry,
    /// Terminal. Surface immediately without consuming a retry.
    Fatal,
}

/// Why [`ConflictPolicy::execute`] gave up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error classified as fatal.
    Fatal { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    /// The underlying error from the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }
}

/// Bounded retry with uniformly jittered backoff.
///
/// Each retry waits a fresh random delay drawn from `min_delay..=max_delay`,
/// so contending callers on different instances spread out instead of
/// retrying in lockstep. At most `max_attempts` attempts are made in total;
/// exhaustion is an expected outcome under extreme contention.
///
/// ```
/// use docseq::{ConflictPolicy, Disposition, RetryError};
///
/// let policy = ConflictPolicy::immediate(3);
/// let mut calls = 0;
/// let res: Result<(), _> = policy.execute(
///     |_| {
///         calls += 1;
///         Err("busy")
///     },
///     |_| Disposition::Retry,
/// );
/// assert_eq!(res, Err(RetryError::Exhausted { attempts: 3, last: "busy" }));
/// assert_eq!(calls, 3);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConflictPolicy {
    max_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            min_delay: Self::DEFAULT_MIN_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }
}

impl ConflictPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(50);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(200);

    /// Builds a policy making at most `max_attempts` attempts, sleeping a
    /// random duration in `min_delay..=max_delay` between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `max_attempts` is zero or
    /// `min_delay > max_delay`.
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::InvalidConfig {
                reason: "max attempts must be at least 1".to_string(),
            });
        }
        if min_delay > max_delay {
            return Err(Error::InvalidConfig {
                reason: format!("min delay {min_delay:?} exceeds max delay {max_delay:?}"),
            });
        }
        Ok(Self {
            max_attempts,
            min_delay,
            max_delay,
        })
    }

    /// A policy that retries without sleeping. `max_attempts` of zero is
    /// treated as one.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Draws the next backoff delay.
    pub fn jitter(&self) -> Duration {
        if self.min_delay >= self.max_delay {
            return self.min_delay;
        }
        let lo = self.min_delay.as_micros() as u64;
        let hi = self.max_delay.as_micros() as u64;
        Duration::from_micros(rand::rng().random_range(lo..=hi))
    }

    /// Runs `op` until it succeeds, fails fatally, or the attempt budget is
    /// spent, blocking the current thread between attempts.
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Fatal`] for the first error `classify` marks as
    /// [`Disposition::Fatal`], or [`RetryError::Exhausted`] with the last
    /// error once `max_attempts` attempts have failed.
    pub fn execute<T, E, F, C>(&self, op: F, classify: C) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        C: Fn(&E) -> Disposition,
    {
        self.execute_with(op, classify, std::thread::sleep)
    }

    /// Like [`Self::execute`] with a caller-supplied sleep.
    pub fn execute_with<T, E, F, C, S>(
        &self,
        mut op: F,
        classify: C,
        mut sleep: S,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        C: Fn(&E) -> Disposition,
        S: FnMut(Duration),
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => match self.next_step(attempt, error, &classify) {
                    Step::Stop(err) => return Err(err),
                    Step::Wait(delay) => sleep(delay),
                },
            }
            attempt += 1;
        }
    }

    /// Decides what follows a failed attempt.
    pub(crate) fn next_step<E, C>(&self, attempt: u32, error: E, classify: &C) -> Step<E>
    where
        C: Fn(&E) -> Disposition,
    {
        if classify(&error) == Disposition::Fatal {
            return Step::Stop(RetryError::Fatal { attempt, error });
        }
        if attempt >= self.max_attempts {
            #[cfg(feature = "tracing")]
            tracing::error!(attempts = attempt, "retry budget exhausted");
            return Step::Stop(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }
        let delay = self.jitter();
        #[cfg(feature = "tracing")]
        tracing::warn!(
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "retryable conflict, backing off"
        );
        Step::Wait(delay)
    }
}

pub(crate) enum Step<E> {
    Stop(RetryError<E>),
    Wait(Duration),
}

/// Classifier for this crate's [`Error`].
pub fn classify_error(err: &Error) -> Disposition {
    if err.is_retryable() {
        Disposition::Retry
    } else {
        Disposition::Fatal
    }
}

impl From<RetryError<Error>> for Error {
    /// Folds a policy outcome back into the public taxonomy.
    fn from(err: RetryError<Error>) -> Self {
        match err {
            RetryError::Exhausted {
                attempts,
                last: Error::RetryableConflict(cause),
            } => Error::ExhaustedRetries {
                attempts,
                last: cause,
            },
            other => other.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::StoreError;

    fn conflict() -> Error {
        Error::RetryableConflict(StoreError::Conflict("serialization failure".into()))
    }

    #[test]
    fn stops_after_exactly_max_attempts() {
        for max in 1..=7 {
            let calls = Cell::new(0);
            let sleeps = Cell::new(0);
            let res: Result<(), _> = ConflictPolicy::immediate(max).execute_with(
                |attempt| {
                    calls.set(calls.get() + 1);
                    assert_eq!(attempt, calls.get());
                    Err(conflict())
                },
                classify_error,
                |_| sleeps.set(sleeps.get() + 1),
            );
            assert_eq!(calls.get(), max);
            assert_eq!(sleeps.get(), max - 1);
            assert_eq!(res.unwrap_err().attempts(), max);
        }
    }

    #[test]
    fn fatal_error_does_not_consume_retries() {
        let calls = Cell::new(0);
        let res: Result<(), _> = ConflictPolicy::immediate(5).execute(
            |_| {
                calls.set(calls.get() + 1);
                Err(Error::StoreUnavailable(StoreError::Unavailable("gone".into())))
            },
            classify_error,
        );
        assert_eq!(calls.get(), 1);
        assert!(matches!(res, Err(RetryError::Fatal { attempt: 1, .. })));
    }

    #[test]
    fn recovers_after_transient_failures() {
        let res = ConflictPolicy::immediate(5).execute(
            |attempt| if attempt < 3 { Err(conflict()) } else { Ok(attempt) },
            classify_error,
        );
        assert_eq!(res, Ok(3));
    }

    #[test]
    fn exhaustion_maps_to_exhausted_retries_with_cause() {
        let err: Error = RetryError::Exhausted {
            attempts: 5,
            last: conflict(),
        }
        .into();
        assert_eq!(
            err,
            Error::ExhaustedRetries {
                attempts: 5,
                last: StoreError::Conflict("serialization failure".into()),
            }
        );

        let fatal: Error = RetryError::Fatal {
            attempt: 1,
            error: Error::InvalidCount { count: 0, max: 100 },
        }
        .into();
        assert_eq!(fatal, Error::InvalidCount { count: 0, max: 100 });
    }

    #[test]
    fn jitter_stays_within_window() {
        let policy = ConflictPolicy::default();
        for _ in 0..1_000 {
            let delay = policy.jitter();
            assert!(delay >= ConflictPolicy::DEFAULT_MIN_DELAY, "{delay:?}");
            assert!(delay <= ConflictPolicy::DEFAULT_MAX_DELAY, "{delay:?}");
        }
        assert_eq!(ConflictPolicy::immediate(3).jitter(), Duration::ZERO);
    }

    #[test]
    fn rejects_degenerate_policies() {
        assert!(ConflictPolicy::new(0, Duration::ZERO, Duration::ZERO).is_err());
        assert!(
            ConflictPolicy::new(3, Duration::from_millis(10), Duration::from_millis(5)).is_err()
        );
        assert_eq!(ConflictPolicy::immediate(0).max_attempts(), 1);
    }
}
